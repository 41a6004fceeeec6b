// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer::Buffer,
    checksum::checksum,
    frame::{build_udp_frame, FrameAddr, Ipv4Frame, UdpDatagram},
    ArpPacket, ErrorContext, ErrorKind, Interface, MacAddr, NetError,
};

const DEFAULT_TTL: u8 = 64;
const ICMP_ECHO_REQUEST: u8 = 8;

/// Answer sent back for every unicast UDP datagram.
pub const UDP_REPLY: &[u8] = b"Received\0";

/// Whether an IPv4 frame is unicast to this device.
pub(crate) fn is_unicast_to_us(frame: &Ipv4Frame, iface: &Interface) -> bool {
    iface.has_ip() && frame.ip.dst == iface.ip() && frame.eth.dst == iface.mac()
}

/// ARP reply claiming our IP, or `None` when the request is for another
/// host.
pub(crate) fn arp_reply(
    arp: &ArpPacket,
    iface: &Interface,
) -> Result<Option<Vec<u8>>, NetError> {
    if arp.operation != crate::ArpOperation::Request
        || !iface.has_ip()
        || arp.target_ip != iface.ip()
        || (arp.is_probe() && arp.sender_mac == iface.mac())
    {
        return Ok(None);
    }
    log::debug!("Answering ARP request from {}", arp.sender_ip);
    let dst = if arp.sender_mac == MacAddr::ZERO {
        MacAddr::BROADCAST
    } else {
        arp.sender_mac
    };
    arp.reply_from(iface.mac()).to_eth_frame(dst).map(Some)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct IcmpEcho<'a> {
    id: u16,
    seq: u16,
    data: &'a [u8],
}

impl<'a> IcmpEcho<'a> {
    /// `None` for any ICMP message other than a valid echo request.
    fn parse_request(raw: &'a [u8]) -> Result<Option<Self>, NetError> {
        let mut buf = Buffer::new(raw);
        let icmp_type = buf.get_u8().context("Invalid ICMP type")?;
        let code = buf.get_u8().context("Invalid ICMP code")?;
        buf.skip(2).context("Invalid ICMP checksum")?;
        if icmp_type != ICMP_ECHO_REQUEST || code != 0 {
            log::debug!("Ignoring ICMP type {icmp_type} code {code}");
            return Ok(None);
        }
        if checksum(raw) != 0 {
            return Err(NetError::new(
                ErrorKind::InvalidPacket,
                "ICMP echo request checksum mismatch".to_string(),
            ));
        }
        Ok(Some(Self {
            id: buf.get_u16_be().context("Invalid ICMP echo identifier")?,
            seq: buf.get_u16_be().context("Invalid ICMP echo sequence")?,
            data: buf.get_remains(),
        }))
    }
}

/// Echo reply for an ICMP echo request addressed to us.
pub(crate) fn icmp_echo_reply(
    frame: &Ipv4Frame,
) -> Result<Option<Vec<u8>>, NetError> {
    let Some(echo) = IcmpEcho::parse_request(frame.payload)? else {
        return Ok(None);
    };
    log::debug!(
        "Answering ping from {} id {} seq {}",
        frame.ip.src,
        echo.id,
        echo.seq
    );
    let builder = etherparse::PacketBuilder::ethernet2(
        frame.eth.dst.octets(),
        frame.eth.src.octets(),
    )
    .ipv4(frame.ip.dst.octets(), frame.ip.src.octets(), DEFAULT_TTL)
    .icmpv4_echo_reply(echo.id, echo.seq);

    let mut packet = Vec::<u8>::with_capacity(builder.size(echo.data.len()));
    builder.write(&mut packet, echo.data).map_err(|e| {
        let e = NetError::new(
            ErrorKind::Bug,
            format!("Failed to generate ICMP echo reply: {e}"),
        );
        log::error!("{e}");
        e
    })?;
    Ok(Some(packet))
}

/// Reply to `udp` from the port it was sent to.
pub(crate) fn udp_reply(
    udp: &UdpDatagram,
    payload: &[u8],
) -> Result<Vec<u8>, NetError> {
    build_udp_frame(
        &FrameAddr {
            src_mac: udp.eth.dst,
            dst_mac: udp.eth.src,
            src_ip: udp.ip.dst,
            dst_ip: udp.ip.src,
        },
        udp.udp.dst_port,
        udp.udp.src_port,
        payload,
    )
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use etherparse::{Icmpv4Type, NetSlice, SlicedPacket, TransportSlice};

    use super::*;

    const LOCAL_MAC: MacAddr = MacAddr([2, 3, 4, 5, 6, 0x83]);
    const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 131);
    const PEER_MAC: MacAddr = MacAddr([0x60, 0x45, 0xbd, 0xfa, 0xf6, 0x2b]);
    const PEER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);

    fn local_iface() -> Interface {
        let mut iface = Interface::new(LOCAL_MAC);
        iface.set_ip(LOCAL_IP);
        iface
    }

    fn ping(id: u16, seq: u16, data: &[u8]) -> Vec<u8> {
        let builder =
            etherparse::PacketBuilder::ethernet2(PEER_MAC.octets(), LOCAL_MAC.octets())
                .ipv4(PEER_IP.octets(), LOCAL_IP.octets(), 64)
                .icmpv4_echo_request(id, seq);
        let mut packet = Vec::new();
        builder.write(&mut packet, data).unwrap();
        packet
    }

    #[test]
    fn test_echo_reply_mirrors_request() {
        let request = ping(0x1234, 7, b"abcdefgh");
        let frame = Ipv4Frame::parse(&request).unwrap();
        assert!(is_unicast_to_us(&frame, &local_iface()));
        let reply = icmp_echo_reply(&frame).unwrap().unwrap();

        let sliced = SlicedPacket::from_ethernet(&reply).unwrap();
        let Some(NetSlice::Ipv4(ip)) = sliced.net else {
            panic!("reply is not IPv4");
        };
        assert_eq!(ip.header().source_addr(), LOCAL_IP);
        assert_eq!(ip.header().destination_addr(), PEER_IP);
        let Some(TransportSlice::Icmpv4(icmp)) = sliced.transport else {
            panic!("reply is not ICMP");
        };
        match icmp.icmp_type() {
            Icmpv4Type::EchoReply(echo) => {
                assert_eq!(echo.id, 0x1234);
                assert_eq!(echo.seq, 7);
            }
            t => panic!("unexpected ICMP type {t:?}"),
        }
        assert_eq!(icmp.payload(), b"abcdefgh");
        // Checksum of the whole message folds to zero
        assert_eq!(checksum(&reply[34..]), 0);
    }

    #[test]
    fn test_corrupted_echo_request_rejected() {
        let mut request = ping(1, 1, b"x");
        let last = request.len() - 1;
        request[last] ^= 0xff;
        let frame = Ipv4Frame::parse(&request).unwrap();
        assert_eq!(
            icmp_echo_reply(&frame).unwrap_err().kind(),
            ErrorKind::InvalidPacket
        );
    }

    #[test]
    fn test_arp_reply_only_for_our_ip() {
        let iface = local_iface();
        let request = ArpPacket::request(PEER_MAC, PEER_IP, LOCAL_IP);
        let reply = arp_reply(&request, &iface).unwrap().unwrap();
        let (eth, arp) = ArpPacket::parse_eth_frame(&reply).unwrap();
        assert_eq!(eth.dst, PEER_MAC);
        assert_eq!(arp, request.reply_from(LOCAL_MAC));

        let other = ArpPacket::request(PEER_MAC, PEER_IP, Ipv4Addr::new(192, 168, 1, 2));
        assert_eq!(arp_reply(&other, &iface).unwrap(), None);
        assert_eq!(arp_reply(&request, &Interface::new(LOCAL_MAC)).unwrap(), None);
    }

    #[test]
    fn test_udp_reply_swaps_endpoints() {
        let addr = FrameAddr {
            src_mac: PEER_MAC,
            dst_mac: LOCAL_MAC,
            src_ip: PEER_IP,
            dst_ip: LOCAL_IP,
        };
        let inbound = build_udp_frame(&addr, 40000, 1024, b"hi").unwrap();
        let udp = UdpDatagram::parse(&inbound).unwrap();
        let reply = udp_reply(&udp, UDP_REPLY).unwrap();

        let headers = etherparse::PacketHeaders::from_ethernet_slice(&reply).unwrap();
        let Some(etherparse::TransportHeader::Udp(udp_header)) = headers.transport
        else {
            panic!("reply is not UDP");
        };
        assert_eq!(udp_header.source_port, 1024);
        assert_eq!(udp_header.destination_port, 40000);
        assert_eq!(headers.payload.slice(), UDP_REPLY);
    }
}
