// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use super::{TcpFlags, TcpState, MQTT_BROKER_PORT};
use crate::{
    frame::{build_tcp_frame, FrameAddr, TcpHeader, TcpSegment, IP_PROTO_TCP},
    Interface, Link, MacAddr, NetError,
};

pub(crate) const EPHEMERAL_PORT_MIN: u16 = 49152;
pub(crate) const EPHEMERAL_PORT_MAX: u16 = 65535;

/// What a processed segment means for the layers around TCP.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct TcpOutcome {
    /// The connection entered ESTABLISHED while handling this segment.
    pub established: bool,
    /// The segment carries MQTT payload which should be dispatched once the
    /// acknowledgement has been sent.
    pub mqtt_payload: bool,
    /// The peer closed the connection and the state returned to LISTEN.
    pub closed: bool,
}

/// The single TCP connection of the device.
#[derive(Debug, Clone)]
pub struct TcpConnection {
    state: TcpState,
    seq: u32,
    ack_to_send: u32,
    local_port: u16,
    remote_port: u16,
    listen_ports: Vec<u16>,
}

impl TcpConnection {
    pub fn new(listen_ports: &[u16]) -> Self {
        let mut ret = Self {
            state: TcpState::Listen,
            seq: 0,
            ack_to_send: 0,
            local_port: EPHEMERAL_PORT_MIN,
            remote_port: MQTT_BROKER_PORT,
            listen_ports: listen_ports.to_vec(),
        };
        ret.reset();
        ret
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == TcpState::Established
    }

    /// Local running sequence number used by the next outbound segment.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn ack_to_send(&self) -> u32 {
        self.ack_to_send
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Back to LISTEN with a fresh random ephemeral port and zeroed
    /// sequence state.
    pub fn reset(&mut self) {
        self.seq = 0;
        self.ack_to_send = 0;
        self.local_port =
            rand::random_range(EPHEMERAL_PORT_MIN..=EPHEMERAL_PORT_MAX);
        self.remote_port = MQTT_BROKER_PORT;
        self.state = TcpState::Listen;
    }

    /// Whether the segment belongs to this connection: addressed to one of
    /// the listening ports or coming from the MQTT broker port.
    pub fn accepts(&self, seg: &TcpSegment) -> bool {
        seg.ip.protocol == IP_PROTO_TCP
            && (self.listen_ports.contains(&seg.tcp.dst_port)
                || seg.tcp.src_port == MQTT_BROKER_PORT)
    }

    pub fn process<L: Link + ?Sized>(
        &mut self,
        seg: &TcpSegment,
        link: &mut L,
    ) -> Result<TcpOutcome, NetError> {
        let flags = seg.tcp.flags;
        let mut outcome = TcpOutcome::default();
        log::debug!(
            "TCP {} segment {}:{} -> {} in state {}",
            flags,
            seg.ip.src,
            seg.tcp.src_port,
            seg.tcp.dst_port,
            self.state
        );

        match self.state {
            TcpState::Listen => {
                self.reset();
                if flags.contains(TcpFlags::SYN | TcpFlags::ACK) {
                    self.respond(seg, &[], TcpFlags::ACK, link)?;
                    self.set_established(&mut outcome);
                } else if flags.contains(TcpFlags::SYN) {
                    self.respond(seg, &[], TcpFlags::SYN | TcpFlags::ACK, link)?;
                    self.set_established(&mut outcome);
                }
            }
            TcpState::SynSent => {
                if flags.contains(TcpFlags::SYN | TcpFlags::ACK) {
                    self.remote_port = seg.tcp.src_port;
                    self.respond(seg, &[], TcpFlags::ACK, link)?;
                    self.set_established(&mut outcome);
                }
            }
            TcpState::Established => {
                if flags.contains(TcpFlags::FIN) {
                    let reply = if flags.contains(TcpFlags::ACK) {
                        TcpFlags::FIN | TcpFlags::ACK
                    } else {
                        TcpFlags::ACK
                    };
                    self.state = TcpState::Listen;
                    self.respond(seg, &[], reply, link)?;
                    log::info!("TCP connection closed by {}", seg.ip.src);
                    outcome.closed = true;
                } else if flags.contains(TcpFlags::PSH) {
                    outcome.mqtt_payload = seg.tcp.src_port == MQTT_BROKER_PORT
                        && !seg.payload.is_empty();
                    self.respond(seg, &[], TcpFlags::ACK, link)?;
                }
                // A bare ACK needs no reply.
            }
            state => {
                log::debug!("Ignoring TCP segment in unsupported state {state}");
            }
        }
        Ok(outcome)
    }

    fn set_established(&mut self, outcome: &mut TcpOutcome) {
        log::info!("TCP connection established");
        self.state = TcpState::Established;
        outcome.established = true;
    }

    /// Sequence number for an outbound segment, advancing the running
    /// counter by the sequence space the segment consumes.
    fn next_seq(&mut self, flags: TcpFlags, payload_len: usize) -> u32 {
        let seq = self.seq;
        if flags.contains(TcpFlags::PSH) {
            self.seq = self.seq.wrapping_add(payload_len as u32);
        } else if flags.intersects(TcpFlags::SYN | TcpFlags::FIN) {
            self.seq = self.seq.wrapping_add(1);
        }
        seq
    }

    /// Reply to `seg` with addresses and ports swapped.
    pub fn respond<L: Link + ?Sized>(
        &mut self,
        seg: &TcpSegment,
        payload: &[u8],
        flags: TcpFlags,
        link: &mut L,
    ) -> Result<(), NetError> {
        let inbound = seg.tcp.flags;
        if inbound.contains(TcpFlags::PSH) {
            self.ack_to_send =
                seg.tcp.seq.wrapping_add(seg.payload.len() as u32);
        } else if inbound.intersects(TcpFlags::SYN | TcpFlags::FIN) {
            self.ack_to_send = seg.tcp.seq.wrapping_add(1);
        }
        let addr = FrameAddr {
            src_mac: seg.eth.dst,
            dst_mac: seg.eth.src,
            src_ip: seg.ip.dst,
            dst_ip: seg.ip.src,
        };
        let seq = self.next_seq(flags, payload.len());
        let header = TcpHeader::new(
            seg.tcp.dst_port,
            seg.tcp.src_port,
            seq,
            self.ack_to_send,
            flags,
        );
        log::debug!("TCP reply {flags} seq {seq} ack {}", self.ack_to_send);
        link.transmit(&build_tcp_frame(&addr, &header, payload)?)
    }

    /// Send a segment built from the local identity towards an explicit
    /// destination.
    #[allow(clippy::too_many_arguments)]
    pub fn send<L: Link + ?Sized>(
        &mut self,
        iface: &Interface,
        payload: &[u8],
        flags: TcpFlags,
        dst_mac: MacAddr,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        link: &mut L,
    ) -> Result<(), NetError> {
        let addr = FrameAddr {
            src_mac: iface.mac(),
            dst_mac,
            src_ip: iface.ip(),
            dst_ip,
        };
        let seq = self.next_seq(flags, payload.len());
        let header = TcpHeader::new(
            self.local_port,
            dst_port,
            seq,
            self.ack_to_send,
            flags,
        );
        log::debug!(
            "TCP send {flags} to {dst_ip}:{dst_port} seq {seq} ack {}",
            self.ack_to_send
        );
        link.transmit(&build_tcp_frame(&addr, &header, payload)?)
    }

    /// Active open towards `dst_ip:dst_port`.
    pub fn establish<L: Link + ?Sized>(
        &mut self,
        iface: &Interface,
        dst_mac: MacAddr,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        link: &mut L,
    ) -> Result<(), NetError> {
        self.reset();
        self.state = TcpState::SynSent;
        self.remote_port = dst_port;
        log::info!(
            "TCP connecting from port {} to {dst_ip}:{dst_port}",
            self.local_port
        );
        self.send(iface, &[], TcpFlags::SYN, dst_mac, dst_ip, dst_port, link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLink;

    const PEER_MAC: MacAddr = MacAddr([0x60, 0x45, 0xbd, 0xfa, 0xf6, 0x2b]);
    const LOCAL_MAC: MacAddr = MacAddr([2, 3, 4, 5, 6, 0x83]);
    const PEER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 199);
    const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 131);

    fn inbound(
        src_port: u16,
        dst_port: u16,
        seq: u32,
        flags: TcpFlags,
        payload: &[u8],
    ) -> Vec<u8> {
        let addr = FrameAddr {
            src_mac: PEER_MAC,
            dst_mac: LOCAL_MAC,
            src_ip: PEER_IP,
            dst_ip: LOCAL_IP,
        };
        let header = TcpHeader::new(src_port, dst_port, seq, 0, flags);
        build_tcp_frame(&addr, &header, payload).unwrap()
    }

    fn process(
        conn: &mut TcpConnection,
        link: &mut MemoryLink,
        frame: &[u8],
    ) -> TcpOutcome {
        let seg = TcpSegment::parse(frame).unwrap();
        assert!(conn.accepts(&seg));
        conn.process(&seg, link).unwrap()
    }

    fn single_reply(link: &mut MemoryLink) -> Vec<u8> {
        let mut sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        sent.remove(0)
    }

    fn local_iface() -> Interface {
        let mut iface = Interface::new(LOCAL_MAC);
        iface.set_ip(LOCAL_IP);
        iface
    }

    #[test]
    fn test_passive_open_and_fin_ack_close() {
        let mut conn = TcpConnection::new(&[80, 23]);
        let mut link = MemoryLink::new();

        let outcome =
            process(&mut conn, &mut link, &inbound(40000, 80, 1000, TcpFlags::SYN, &[]));
        assert!(outcome.established);
        assert_eq!(conn.state(), TcpState::Established);
        let reply = single_reply(&mut link);
        let seg = TcpSegment::parse(&reply).unwrap();
        assert_eq!(seg.tcp.flags, TcpFlags::SYN | TcpFlags::ACK);
        assert_eq!(seg.tcp.seq, 0);
        assert_eq!(seg.tcp.ack, 1001);
        assert_eq!(seg.tcp.src_port, 80);
        assert_eq!(seg.tcp.dst_port, 40000);
        assert_eq!(seg.eth.dst, PEER_MAC);
        assert_eq!(seg.ip.dst, PEER_IP);
        assert_eq!(seg.ip.src, LOCAL_IP);

        let outcome = process(
            &mut conn,
            &mut link,
            &inbound(40000, 80, 1001, TcpFlags::FIN | TcpFlags::ACK, &[]),
        );
        assert!(outcome.closed);
        assert_eq!(conn.state(), TcpState::Listen);
        let seg = TcpSegment::parse(&single_reply(&mut link)).unwrap().tcp;
        assert_eq!(seg.flags, TcpFlags::FIN | TcpFlags::ACK);
        assert_eq!(seg.seq, 1);
        assert_eq!(seg.ack, 1002);
    }

    #[test]
    fn test_fin_without_ack_gets_plain_ack() {
        let mut conn = TcpConnection::new(&[80, 23]);
        let mut link = MemoryLink::new();
        process(&mut conn, &mut link, &inbound(40000, 23, 7, TcpFlags::SYN, &[]));
        link.take_sent();

        process(&mut conn, &mut link, &inbound(40000, 23, 8, TcpFlags::FIN, &[]));
        assert_eq!(conn.state(), TcpState::Listen);
        let seg = TcpSegment::parse(&single_reply(&mut link)).unwrap().tcp;
        assert_eq!(seg.flags, TcpFlags::ACK);
        assert_eq!(seg.ack, 9);
    }

    #[test]
    fn test_listen_syn_ack_gets_ack() {
        let mut conn = TcpConnection::new(&[80]);
        let mut link = MemoryLink::new();
        process(
            &mut conn,
            &mut link,
            &inbound(1883, 80, 500, TcpFlags::SYN | TcpFlags::ACK, &[]),
        );
        assert!(conn.is_established());
        let seg = TcpSegment::parse(&single_reply(&mut link)).unwrap().tcp;
        assert_eq!(seg.flags, TcpFlags::ACK);
        assert_eq!(seg.ack, 501);
    }

    #[test]
    fn test_active_open_then_push() {
        let mut conn = TcpConnection::new(&[80, 23]);
        let mut link = MemoryLink::new();
        conn.establish(&local_iface(), PEER_MAC, PEER_IP, 1883, &mut link)
            .unwrap();
        assert_eq!(conn.state(), TcpState::SynSent);
        let local_port = conn.local_port();
        assert!(local_port >= EPHEMERAL_PORT_MIN);
        let syn = TcpSegment::parse(&single_reply(&mut link)).unwrap().tcp;
        assert_eq!(syn.flags, TcpFlags::SYN);
        assert_eq!(syn.seq, 0);
        assert_eq!(syn.dst_port, 1883);
        assert_eq!(syn.src_port, local_port);

        let outcome = process(
            &mut conn,
            &mut link,
            &inbound(1883, local_port, 3000, TcpFlags::SYN | TcpFlags::ACK, &[]),
        );
        assert!(outcome.established);
        let ack = TcpSegment::parse(&single_reply(&mut link)).unwrap().tcp;
        assert_eq!(ack.flags, TcpFlags::ACK);
        assert_eq!(ack.seq, 1);
        assert_eq!(ack.ack, 3001);

        // CONNACK carried in a PUSH segment
        let outcome = process(
            &mut conn,
            &mut link,
            &inbound(
                1883,
                local_port,
                3001,
                TcpFlags::PSH | TcpFlags::ACK,
                &[0x20, 0x02, 0x00, 0x00],
            ),
        );
        assert!(outcome.mqtt_payload);
        assert!(!outcome.established);
        let ack = TcpSegment::parse(&single_reply(&mut link)).unwrap().tcp;
        assert_eq!(ack.flags, TcpFlags::ACK);
        assert_eq!(ack.ack, 3005);

        // Plain ACK: no reply, no state change
        let outcome = process(
            &mut conn,
            &mut link,
            &inbound(1883, local_port, 3005, TcpFlags::ACK, &[]),
        );
        assert_eq!(outcome, TcpOutcome::default());
        assert!(link.sent().is_empty());
        assert!(conn.is_established());
    }

    #[test]
    fn test_push_from_non_broker_port_is_not_mqtt() {
        let mut conn = TcpConnection::new(&[80]);
        let mut link = MemoryLink::new();
        process(&mut conn, &mut link, &inbound(40000, 80, 0, TcpFlags::SYN, &[]));
        let outcome = process(
            &mut conn,
            &mut link,
            &inbound(40000, 80, 1, TcpFlags::PSH | TcpFlags::ACK, b"GET /"),
        );
        assert!(!outcome.mqtt_payload);
    }

    #[test]
    fn test_running_sequence_numbers() {
        let mut conn = TcpConnection::new(&[80]);
        let mut link = MemoryLink::new();
        let iface = local_iface();
        assert_eq!(conn.seq(), 0);
        conn.send(
            &iface,
            b"123456789",
            TcpFlags::PSH | TcpFlags::ACK,
            PEER_MAC,
            PEER_IP,
            1883,
            &mut link,
        )
        .unwrap();
        assert_eq!(conn.seq(), 9);
        conn.send(&iface, &[], TcpFlags::SYN, PEER_MAC, PEER_IP, 1883, &mut link)
            .unwrap();
        assert_eq!(conn.seq(), 10);
        conn.send(&iface, &[], TcpFlags::ACK, PEER_MAC, PEER_IP, 1883, &mut link)
            .unwrap();
        assert_eq!(conn.seq(), 10);

        let seqs: Vec<u32> = link
            .take_sent()
            .iter()
            .map(|f| TcpSegment::parse(f).unwrap().tcp.seq)
            .collect();
        assert_eq!(seqs, vec![0, 9, 10]);
    }

    #[test]
    fn test_unrelated_port_not_accepted() {
        let conn = TcpConnection::new(&[80, 23]);
        let frame = inbound(40000, 8080, 0, TcpFlags::SYN, &[]);
        let seg = TcpSegment::parse(&frame).unwrap();
        assert!(!conn.accepts(&seg));
    }
}
