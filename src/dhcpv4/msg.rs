// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use super::option::{DhcpReplyOptions, MAX_OPTIONS_SIZE};
use crate::{
    buffer::{Buffer, BufferMut},
    frame::{UdpDatagram, IP_PROTO_UDP},
    mac::ETH_ALEN,
    ErrorContext, ErrorKind, MacAddr, NetError,
};

pub(crate) const SERVER_PORT: u16 = 67;
pub(crate) const CLIENT_PORT: u16 = 68;

/// Transaction id used for every exchange of this client.
pub const DHCP_XID: u32 = 0x21274a1d;

const DHCPV4_MAGIC_COOKIE: u32 = 0x63825363;
const BOOTREQUEST: u8 = 1;
const ARP_HW_TYPE_ETHERNET: u8 = 1;
const MAX_CHADDR_LEN: usize = 16;
// Legacy sname(64) and file(128) fields
const LEGACY_BOOTP_LEN: usize = 192;
// op..giaddr(28) + chaddr(16) + sname/file(192)
const DHCP_HEADER_LEN: usize = 236;
const XID_OFFSET: usize = 4;

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
#[non_exhaustive]
pub enum DhcpMessageType {
    #[default]
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl std::fmt::Display for DhcpMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

impl std::convert::TryFrom<u8> for DhcpMessageType {
    type Error = NetError;

    fn try_from(d: u8) -> Result<Self, NetError> {
        match d {
            d if d == Self::Discover as u8 => Ok(Self::Discover),
            d if d == Self::Offer as u8 => Ok(Self::Offer),
            d if d == Self::Request as u8 => Ok(Self::Request),
            d if d == Self::Decline as u8 => Ok(Self::Decline),
            d if d == Self::Ack as u8 => Ok(Self::Ack),
            d if d == Self::Nak as u8 => Ok(Self::Nak),
            d if d == Self::Release as u8 => Ok(Self::Release),
            d if d == Self::Inform as u8 => Ok(Self::Inform),
            _ => Err(NetError::new(
                ErrorKind::NotSupported,
                format!("DHCPv4 message type {d} is not supported"),
            )),
        }
    }
}

/// Whether a UDP datagram is a reply to this client: sent from the server
/// port and carrying our transaction id.
pub(crate) fn is_dhcp_reply(udp: &UdpDatagram) -> bool {
    udp.ip.protocol == IP_PROTO_UDP
        && udp.udp.src_port == SERVER_PORT
        && udp
            .payload
            .get(XID_OFFSET..XID_OFFSET + 4)
            .is_some_and(|d| u32::from_be_bytes([d[0], d[1], d[2], d[3]]) == DHCP_XID)
}

/// Client originated message. The option area is pre-built by the caller
/// and must already end with the END marker.
#[derive(Debug)]
pub(crate) struct DhcpRequestMessage<'a> {
    pub(crate) chaddr: MacAddr,
    /// Client IP address; only filled in BOUND, RENEWING, REBINDING or when
    /// releasing.
    pub(crate) ciaddr: Ipv4Addr,
    pub(crate) options: &'a [u8],
}

impl DhcpRequestMessage<'_> {
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, NetError> {
        let mut buf =
            BufferMut::new(DHCP_HEADER_LEN + 4 + MAX_OPTIONS_SIZE);
        buf.write_u8(BOOTREQUEST)?;
        buf.write_u8(ARP_HW_TYPE_ETHERNET)?;
        buf.write_u8(ETH_ALEN as u8)?;
        // hops
        buf.write_u8(0)?;
        buf.write_u32_be(DHCP_XID)?;
        // secs
        buf.write_u16_be(0)?;
        // flags: unicast reply
        buf.write_u16_be(0)?;
        buf.write_ipv4(self.ciaddr)?;
        // yiaddr, siaddr, giaddr
        buf.write_zeros(12)?;
        buf.write_mac(self.chaddr)?;
        buf.write_zeros(MAX_CHADDR_LEN - ETH_ALEN)?;
        buf.write_zeros(LEGACY_BOOTP_LEN)?;
        buf.write_u32_be(DHCPV4_MAGIC_COOKIE)?;
        buf.write_bytes(self.options)
            .context("DHCP options area overflow")?;
        Ok(buf.data)
    }
}

/// Fields of a server reply this client consumes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct DhcpReply {
    pub(crate) xid: u32,
    pub(crate) yiaddr: Ipv4Addr,
    /// Ethernet source of the frame carrying the reply.
    pub(crate) server_mac: MacAddr,
    pub(crate) options: DhcpReplyOptions,
}

impl DhcpReply {
    pub(crate) fn parse(udp: &UdpDatagram) -> Result<Self, NetError> {
        let mut buf = Buffer::new(udp.payload);
        // op, htype, hlen, hops
        buf.skip(4).context("Invalid DHCP header")?;
        let xid = buf.get_u32_be().context("Invalid DHCP xid")?;
        // secs, flags, ciaddr
        buf.skip(8).context("Invalid DHCP header")?;
        let yiaddr = buf.get_ipv4().context("Invalid DHCP yiaddr")?;
        // siaddr, giaddr, chaddr, sname, file
        buf.skip(8 + MAX_CHADDR_LEN + LEGACY_BOOTP_LEN)
            .context("Invalid DHCP header")?;
        let cookie = buf.get_u32_be().context("Invalid DHCP magic cookie")?;
        if cookie != DHCPV4_MAGIC_COOKIE {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!("Invalid DHCP magic cookie {cookie:#010x}"),
            ));
        }
        Ok(Self {
            xid,
            yiaddr,
            server_mac: udp.eth.src,
            options: DhcpReplyOptions::parse(buf.get_remains()),
        })
    }
}
