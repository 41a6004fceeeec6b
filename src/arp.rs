// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::{
    buffer::{Buffer, BufferMut},
    frame::{EthernetHeader, ETHER_TYPE_ARP, ETHER_TYPE_IPV4, ETH_HEADER_LEN},
    mac::ETH_ALEN,
    ErrorContext, ErrorKind, MacAddr, NetError,
};

const ARP_HW_TYPE_ETHERNET: u16 = 1;
const ARP_PACKET_LEN: usize = 28;
const IPV4_ADDR_LEN: u8 = 4;
// Ethernet payloads shorter than this are padded by the sender
const ETH_MIN_FRAME_LEN: usize = 60;
const ARP_CACHE_CAPACITY: usize = 8;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArpOperation {
    Request,
    Reply,
    Other(u16),
}

impl From<u16> for ArpOperation {
    fn from(d: u16) -> Self {
        match d {
            1 => Self::Request,
            2 => Self::Reply,
            _ => Self::Other(d),
        }
    }
}

impl From<ArpOperation> for u16 {
    fn from(v: ArpOperation) -> u16 {
        match v {
            ArpOperation::Request => 1,
            ArpOperation::Reply => 2,
            ArpOperation::Other(d) => d,
        }
    }
}

/// ARP for IPv4 over Ethernet (RFC 826).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ArpPacket {
    pub operation: ArpOperation,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Decode an Ethernet frame carrying ARP.
    pub fn parse_eth_frame(
        frame: &[u8],
    ) -> Result<(EthernetHeader, Self), NetError> {
        let mut buf = Buffer::new(frame);
        let eth = EthernetHeader::parse(&mut buf)?;
        if eth.ether_type != ETHER_TYPE_ARP {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!("Not ARP frame, ether type {:#06x}", eth.ether_type),
            ));
        }
        Ok((eth, Self::parse(&mut buf)?))
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, NetError> {
        let hw_type = buf.get_u16_be().context("Invalid ARP hardware type")?;
        let proto_type =
            buf.get_u16_be().context("Invalid ARP protocol type")?;
        let hw_len = buf.get_u8().context("Invalid ARP hardware length")?;
        let proto_len = buf.get_u8().context("Invalid ARP protocol length")?;
        if hw_type != ARP_HW_TYPE_ETHERNET
            || proto_type != ETHER_TYPE_IPV4
            || usize::from(hw_len) != ETH_ALEN
            || proto_len != IPV4_ADDR_LEN
        {
            return Err(NetError::new(
                ErrorKind::NotSupported,
                format!(
                    "Unsupported ARP hardware {hw_type}/{hw_len} protocol \
                     {proto_type:#06x}/{proto_len}"
                ),
            ));
        }
        Ok(Self {
            operation: buf
                .get_u16_be()
                .context("Invalid ARP operation")?
                .into(),
            sender_mac: buf.get_mac().context("Invalid ARP sender MAC")?,
            sender_ip: buf.get_ipv4().context("Invalid ARP sender IP")?,
            target_mac: buf.get_mac().context("Invalid ARP target MAC")?,
            target_ip: buf.get_ipv4().context("Invalid ARP target IP")?,
        })
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) -> Result<(), NetError> {
        buf.write_u16_be(ARP_HW_TYPE_ETHERNET)?;
        buf.write_u16_be(ETHER_TYPE_IPV4)?;
        buf.write_u8(ETH_ALEN as u8)?;
        buf.write_u8(IPV4_ADDR_LEN)?;
        buf.write_u16_be(self.operation.into())?;
        buf.write_mac(self.sender_mac)?;
        buf.write_ipv4(self.sender_ip)?;
        buf.write_mac(self.target_mac)?;
        buf.write_ipv4(self.target_ip)
    }

    /// Ethernet frame carrying this packet, padded to the minimum frame
    /// length.
    pub fn to_eth_frame(&self, dst: MacAddr) -> Result<Vec<u8>, NetError> {
        let mut buf = BufferMut::new(ETH_MIN_FRAME_LEN);
        EthernetHeader {
            dst,
            src: self.sender_mac,
            ether_type: ETHER_TYPE_ARP,
        }
        .emit(&mut buf)?;
        self.emit(&mut buf)?;
        buf.write_zeros(ETH_MIN_FRAME_LEN - ETH_HEADER_LEN - ARP_PACKET_LEN)?;
        Ok(buf.data)
    }

    pub fn request(
        mac: MacAddr,
        ip: Ipv4Addr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOperation::Request,
            sender_mac: mac,
            sender_ip: ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// RFC 5227 probe: sender IP all zeros, asking who owns `candidate`.
    pub fn probe(mac: MacAddr, candidate: Ipv4Addr) -> Self {
        Self::request(mac, Ipv4Addr::UNSPECIFIED, candidate)
    }

    /// Gratuitous ARP announcing `ip` as ours.
    pub fn announcement(mac: MacAddr, ip: Ipv4Addr) -> Self {
        Self::request(mac, ip, ip)
    }

    /// Answer to this request, claiming its target IP with `mac`.
    pub fn reply_from(&self, mac: MacAddr) -> Self {
        Self {
            operation: ArpOperation::Reply,
            sender_mac: mac,
            sender_ip: self.target_ip,
            target_mac: self.sender_mac,
            target_ip: self.sender_ip,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.operation == ArpOperation::Request
            && self.sender_ip.is_unspecified()
    }
}

/// Small IP to MAC table learned from ARP traffic. The oldest entry is
/// evicted when full.
#[derive(Debug, Clone, Default)]
pub struct ArpCache {
    entries: Vec<(Ipv4Addr, MacAddr)>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries
            .iter()
            .find(|(i, _)| *i == ip)
            .map(|(_, mac)| *mac)
    }

    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        if ip.is_unspecified() || mac.is_broadcast() || mac == MacAddr::ZERO {
            return;
        }
        self.entries.retain(|(i, _)| *i != ip);
        if self.entries.len() >= ARP_CACHE_CAPACITY {
            self.entries.remove(0);
        }
        self.entries.push((ip, mac));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
