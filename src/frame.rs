// SPDX-License-Identifier: Apache-2.0

//! Fixed layout Ethernet, IPv4, UDP and TCP headers.
//!
//! Inbound frames are decoded into owned header structs with bounds checks;
//! outbound frames are serialized into a [`BufferMut`] limited to
//! [`MAX_PACKET_SIZE`], with the IP header checksum and the pseudo-header
//! based transport checksum computed by [`Checksum`].

use std::net::Ipv4Addr;

use crate::{
    buffer::{Buffer, BufferMut},
    checksum::Checksum,
    tcp::TcpFlags,
    ErrorContext, ErrorKind, MacAddr, NetError,
};

/// Ethernet header(14) + maximum MTU(1500) + 802.1Q tag and CRC trailer(8)
pub const MAX_PACKET_SIZE: usize = 1522;

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_ARP: u16 = 0x0806;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

pub(crate) const ETH_HEADER_LEN: usize = 14;
pub(crate) const IPV4_MIN_HEADER_LEN: usize = 20;
pub(crate) const UDP_HEADER_LEN: usize = 8;
pub(crate) const TCP_MIN_HEADER_LEN: usize = 20;

const IPV4_VERSION_IHL: u8 = 0x45;
const DEFAULT_TTL: u8 = 128;
const TCP_WINDOW: u16 = 1280;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ether_type: u16,
}

impl EthernetHeader {
    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, NetError> {
        Ok(Self {
            dst: buf.get_mac().context("Invalid ethernet destination")?,
            src: buf.get_mac().context("Invalid ethernet source")?,
            ether_type: buf.get_u16_be().context("Invalid ethernet type")?,
        })
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) -> Result<(), NetError> {
        buf.write_mac(self.dst)?;
        buf.write_mac(self.src)?;
        buf.write_u16_be(self.ether_type)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Ipv4Header {
    /// Header length in bytes, derived from the IHL nibble.
    pub header_len: usize,
    pub tos: u8,
    pub total_len: u16,
    pub id: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    pub(crate) fn new(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
        payload_len: usize,
    ) -> Self {
        Self {
            header_len: IPV4_MIN_HEADER_LEN,
            tos: 0,
            total_len: (IPV4_MIN_HEADER_LEN + payload_len) as u16,
            id: 0,
            flags_fragment: 0,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0,
            src,
            dst,
        }
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, NetError> {
        let version_ihl = buf.get_u8().context("Invalid IPv4 version")?;
        if version_ihl >> 4 != 4 {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!("Not IPv4 packet, version {}", version_ihl >> 4),
            ));
        }
        let header_len = usize::from(version_ihl & 0xf) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!("IPv4 header length {header_len} is too small"),
            ));
        }
        let ret = Self {
            header_len,
            tos: buf.get_u8().context("Invalid IPv4 TOS")?,
            total_len: buf.get_u16_be().context("Invalid IPv4 length")?,
            id: buf.get_u16_be().context("Invalid IPv4 id")?,
            flags_fragment: buf
                .get_u16_be()
                .context("Invalid IPv4 fragment offset")?,
            ttl: buf.get_u8().context("Invalid IPv4 TTL")?,
            protocol: buf.get_u8().context("Invalid IPv4 protocol")?,
            checksum: buf.get_u16_be().context("Invalid IPv4 checksum")?,
            src: buf.get_ipv4().context("Invalid IPv4 source")?,
            dst: buf.get_ipv4().context("Invalid IPv4 destination")?,
        };
        // IP options are not interpreted
        buf.skip(header_len - IPV4_MIN_HEADER_LEN)
            .context("Truncated IPv4 options")?;
        if usize::from(ret.total_len) < header_len {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!(
                    "IPv4 total length {} shorter than header {header_len}",
                    ret.total_len
                ),
            ));
        }
        Ok(ret)
    }

    /// Length of the IP payload as declared by the header.
    pub fn payload_len(&self) -> usize {
        usize::from(self.total_len).saturating_sub(self.header_len)
    }

    /// Always emits the 20 bytes option-less header with a fresh checksum.
    pub(crate) fn emit(&self, buf: &mut BufferMut) -> Result<(), NetError> {
        let start = buf.len();
        buf.write_u8(IPV4_VERSION_IHL)?;
        buf.write_u8(self.tos)?;
        buf.write_u16_be(self.total_len)?;
        buf.write_u16_be(self.id)?;
        buf.write_u16_be(self.flags_fragment)?;
        buf.write_u8(self.ttl)?;
        buf.write_u8(self.protocol)?;
        buf.write_u16_be(0)?;
        buf.write_ipv4(self.src)?;
        buf.write_ipv4(self.dst)?;
        let sum = Checksum::new()
            .add_bytes(&buf.data[start..start + IPV4_MIN_HEADER_LEN])
            .finish();
        buf.set_u16_be(start + 10, sum)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, NetError> {
        Ok(Self {
            src_port: buf.get_u16_be().context("Invalid UDP source port")?,
            dst_port: buf.get_u16_be().context("Invalid UDP destination port")?,
            length: buf.get_u16_be().context("Invalid UDP length")?,
            checksum: buf.get_u16_be().context("Invalid UDP checksum")?,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in bytes, derived from the data offset nibble.
    pub header_len: usize,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    pub(crate) fn new(
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
    ) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack,
            header_len: TCP_MIN_HEADER_LEN,
            flags,
            window: TCP_WINDOW,
            checksum: 0,
            urgent: 0,
        }
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, NetError> {
        let src_port = buf.get_u16_be().context("Invalid TCP source port")?;
        let dst_port =
            buf.get_u16_be().context("Invalid TCP destination port")?;
        let seq = buf.get_u32_be().context("Invalid TCP sequence number")?;
        let ack = buf.get_u32_be().context("Invalid TCP ack number")?;
        let offset = buf.get_u8().context("Invalid TCP data offset")?;
        let header_len = usize::from(offset >> 4) * 4;
        if header_len < TCP_MIN_HEADER_LEN {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!("TCP header length {header_len} is too small"),
            ));
        }
        let ret = Self {
            src_port,
            dst_port,
            seq,
            ack,
            header_len,
            flags: TcpFlags::from(buf.get_u8().context("Invalid TCP flags")?),
            window: buf.get_u16_be().context("Invalid TCP window")?,
            checksum: buf.get_u16_be().context("Invalid TCP checksum")?,
            urgent: buf.get_u16_be().context("Invalid TCP urgent pointer")?,
        };
        buf.skip(header_len - TCP_MIN_HEADER_LEN)
            .context("Truncated TCP options")?;
        Ok(ret)
    }
}

/// Decoded Ethernet + IPv4 prefix of an inbound frame, with the raw bytes
/// following the IP header.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Ipv4Frame<'a> {
    pub eth: EthernetHeader,
    pub ip: Ipv4Header,
    /// IP payload, trimmed to the length declared by the IP header.
    pub payload: &'a [u8],
}

impl<'a> Ipv4Frame<'a> {
    pub fn parse(frame: &'a [u8]) -> Result<Self, NetError> {
        let mut buf = Buffer::new(frame);
        let eth = EthernetHeader::parse(&mut buf)?;
        if eth.ether_type != ETHER_TYPE_IPV4 {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!("Not IPv4 frame, ether type {:#06x}", eth.ether_type),
            ));
        }
        let ip = Ipv4Header::parse(&mut buf)?;
        let remains = buf.get_remains();
        let payload_len = ip.payload_len();
        if remains.len() < payload_len {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!(
                    "IPv4 payload truncated: declared {payload_len}, got {}",
                    remains.len()
                ),
            ));
        }
        Ok(Self {
            eth,
            ip,
            payload: &remains[..payload_len],
        })
    }
}

/// Decoded UDP datagram.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UdpDatagram<'a> {
    pub eth: EthernetHeader,
    pub ip: Ipv4Header,
    pub udp: UdpHeader,
    pub payload: &'a [u8],
}

impl<'a> UdpDatagram<'a> {
    pub fn parse(frame: &'a [u8]) -> Result<Self, NetError> {
        let ip_frame = Ipv4Frame::parse(frame)?;
        if ip_frame.ip.protocol != IP_PROTO_UDP {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!("Not UDP, IP protocol {}", ip_frame.ip.protocol),
            ));
        }
        let mut buf = Buffer::new(ip_frame.payload);
        let udp = UdpHeader::parse(&mut buf)?;
        let remains = buf.get_remains();
        let payload_len = usize::from(udp.length)
            .saturating_sub(UDP_HEADER_LEN)
            .min(remains.len());
        Ok(Self {
            eth: ip_frame.eth,
            ip: ip_frame.ip,
            udp,
            payload: &remains[..payload_len],
        })
    }
}

/// Decoded TCP segment.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TcpSegment<'a> {
    pub eth: EthernetHeader,
    pub ip: Ipv4Header,
    pub tcp: TcpHeader,
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    pub fn parse(frame: &'a [u8]) -> Result<Self, NetError> {
        let ip_frame = Ipv4Frame::parse(frame)?;
        if ip_frame.ip.protocol != IP_PROTO_TCP {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                format!("Not TCP, IP protocol {}", ip_frame.ip.protocol),
            ));
        }
        let mut buf = Buffer::new(ip_frame.payload);
        let tcp = TcpHeader::parse(&mut buf)?;
        Ok(Self {
            eth: ip_frame.eth,
            ip: ip_frame.ip,
            tcp,
            payload: buf.get_remains(),
        })
    }
}

/// Addressing of an outbound Ethernet/IPv4 frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct FrameAddr {
    pub(crate) src_mac: MacAddr,
    pub(crate) dst_mac: MacAddr,
    pub(crate) src_ip: Ipv4Addr,
    pub(crate) dst_ip: Ipv4Addr,
}

fn check_frame_len(transport_len: usize) -> Result<(), NetError> {
    let total = ETH_HEADER_LEN + IPV4_MIN_HEADER_LEN + transport_len;
    if total > MAX_PACKET_SIZE {
        let e = NetError::new(
            ErrorKind::CapacityExceeded,
            format!(
                "Frame of {total} bytes exceeds maximum packet size \
                 {MAX_PACKET_SIZE}"
            ),
        );
        log::error!("{e}");
        Err(e)
    } else {
        Ok(())
    }
}

fn emit_eth_ip(
    buf: &mut BufferMut,
    addr: &FrameAddr,
    protocol: u8,
    transport_len: usize,
) -> Result<(), NetError> {
    EthernetHeader {
        dst: addr.dst_mac,
        src: addr.src_mac,
        ether_type: ETHER_TYPE_IPV4,
    }
    .emit(buf)?;
    Ipv4Header::new(addr.src_ip, addr.dst_ip, protocol, transport_len).emit(buf)
}

pub(crate) fn build_udp_frame(
    addr: &FrameAddr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Result<Vec<u8>, NetError> {
    let udp_len = UDP_HEADER_LEN + payload.len();
    check_frame_len(udp_len)?;
    let mut buf = BufferMut::new(MAX_PACKET_SIZE);
    emit_eth_ip(&mut buf, addr, IP_PROTO_UDP, udp_len)?;

    let udp_start = buf.len();
    buf.write_u16_be(src_port)?;
    buf.write_u16_be(dst_port)?;
    buf.write_u16_be(udp_len as u16)?;
    buf.write_u16_be(0)?;
    buf.write_bytes(payload)?;

    let mut sum = Checksum::new();
    sum.add_pseudo_header(addr.src_ip, addr.dst_ip, IP_PROTO_UDP, udp_len as u16)
        .add_bytes(&buf.data[udp_start..]);
    let mut udp_sum = sum.finish();
    // RFC 768: a computed zero is transmitted as all ones
    if udp_sum == 0 {
        udp_sum = 0xffff;
    }
    buf.set_u16_be(udp_start + 6, udp_sum)?;
    log::trace!("UDP frame generated {:?}", buf.data);
    Ok(buf.data)
}

pub(crate) fn build_tcp_frame(
    addr: &FrameAddr,
    tcp: &TcpHeader,
    payload: &[u8],
) -> Result<Vec<u8>, NetError> {
    let tcp_len = TCP_MIN_HEADER_LEN + payload.len();
    check_frame_len(tcp_len)?;
    let mut buf = BufferMut::new(MAX_PACKET_SIZE);
    emit_eth_ip(&mut buf, addr, IP_PROTO_TCP, tcp_len)?;

    let tcp_start = buf.len();
    buf.write_u16_be(tcp.src_port)?;
    buf.write_u16_be(tcp.dst_port)?;
    buf.write_u32_be(tcp.seq)?;
    buf.write_u32_be(tcp.ack)?;
    // Data offset fixed to the option-less minimum, reserved/NS bits zero
    buf.write_u8(((TCP_MIN_HEADER_LEN / 4) as u8) << 4)?;
    buf.write_u8(tcp.flags.bits())?;
    buf.write_u16_be(tcp.window)?;
    buf.write_u16_be(0)?;
    buf.write_u16_be(tcp.urgent)?;
    buf.write_bytes(payload)?;

    let sum = Checksum::new()
        .add_pseudo_header(addr.src_ip, addr.dst_ip, IP_PROTO_TCP, tcp_len as u16)
        .add_bytes(&buf.data[tcp_start..])
        .finish();
    buf.set_u16_be(tcp_start + 16, sum)?;
    log::trace!("TCP frame generated {:?}", buf.data);
    Ok(buf.data)
}
