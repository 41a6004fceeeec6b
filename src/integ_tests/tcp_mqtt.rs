// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use super::env::{
    deliver, run_ticks, static_stack, BROKER_IP, BROKER_MAC, LOCAL_IP,
    LOCAL_MAC, PEER_IP, PEER_MAC,
};
use crate::{
    frame::{build_tcp_frame, build_udp_frame, FrameAddr, TcpHeader},
    ArpPacket, Command, MacAddr, MemoryLink, MqttConnectionState, Stack,
    StackEvent, TcpFlags, TcpSegment, TcpState, MQTT_BROKER_PORT, UDP_REPLY,
};

fn peer_addr() -> FrameAddr {
    FrameAddr {
        src_mac: PEER_MAC,
        dst_mac: LOCAL_MAC,
        src_ip: PEER_IP,
        dst_ip: LOCAL_IP,
    }
}

fn broker_addr() -> FrameAddr {
    FrameAddr {
        src_mac: BROKER_MAC,
        dst_mac: LOCAL_MAC,
        src_ip: BROKER_IP,
        dst_ip: LOCAL_IP,
    }
}

fn sent_segments(stack: &mut Stack<MemoryLink>) -> Vec<(TcpFlags, Vec<u8>)> {
    stack
        .link_mut()
        .take_sent()
        .iter()
        .filter_map(|f| TcpSegment::parse(f).ok())
        .map(|s| (s.tcp.flags, s.payload.to_vec()))
        .collect()
}

/// Broker side of the single MQTT session.
struct Broker {
    seq: u32,
}

impl Broker {
    fn send(
        &mut self,
        stack: &mut Stack<MemoryLink>,
        flags: TcpFlags,
        payload: &[u8],
    ) {
        let header = TcpHeader::new(
            MQTT_BROKER_PORT,
            stack.tcp().local_port(),
            self.seq,
            stack.tcp().seq(),
            flags,
        );
        self.seq = self.seq.wrapping_add(payload.len() as u32);
        deliver(
            stack,
            vec![build_tcp_frame(&broker_addr(), &header, payload).unwrap()],
        );
    }

    fn mqtt(&mut self, stack: &mut Stack<MemoryLink>, payload: &[u8]) {
        self.send(stack, TcpFlags::PSH | TcpFlags::ACK, payload);
    }
}

fn learn_broker(stack: &mut Stack<MemoryLink>) {
    let arp = ArpPacket::request(BROKER_MAC, BROKER_IP, Ipv4Addr::new(192, 168, 1, 1));
    deliver(stack, vec![arp.to_eth_frame(MacAddr::BROADCAST).unwrap()]);
}

fn connected_stack() -> (Stack<MemoryLink>, Broker) {
    let mut stack = static_stack();
    learn_broker(&mut stack);
    let mut broker = Broker { seq: 7000 };
    stack.mqtt_connect().unwrap();
    broker.send(&mut stack, TcpFlags::SYN | TcpFlags::ACK, &[]);
    broker.seq += 1;
    broker.mqtt(&mut stack, &[0x20, 2, 0, 0]);
    assert_eq!(stack.mqtt().state(), MqttConnectionState::Connected);
    stack.link_mut().take_sent();
    while stack.pop_event().is_some() {}
    (stack, broker)
}

#[test]
fn test_passive_open_data_and_close() {
    let mut stack = static_stack();
    let syn = TcpHeader::new(40000, 80, 5000, 0, TcpFlags::SYN);
    deliver(
        &mut stack,
        vec![build_tcp_frame(&peer_addr(), &syn, &[]).unwrap()],
    );
    assert_eq!(stack.tcp().state(), TcpState::Established);
    let sent = stack.link_mut().take_sent();
    let reply = TcpSegment::parse(&sent[0]).unwrap();
    assert_eq!(reply.tcp.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(reply.tcp.src_port, 80);
    assert_eq!(reply.tcp.dst_port, 40000);
    assert_eq!(reply.tcp.ack, 5001);
    assert_eq!(reply.eth.dst, PEER_MAC);

    let data =
        TcpHeader::new(40000, 80, 5001, 1, TcpFlags::PSH | TcpFlags::ACK);
    deliver(
        &mut stack,
        vec![build_tcp_frame(&peer_addr(), &data, b"GET /").unwrap()],
    );
    let sent = stack.link_mut().take_sent();
    let ack = TcpSegment::parse(&sent[0]).unwrap();
    assert_eq!(ack.tcp.flags, TcpFlags::ACK);
    assert_eq!(ack.tcp.ack, 5006);
    // Payload from a non broker port is not MQTT
    assert_eq!(stack.pop_event(), None);

    let fin = TcpHeader::new(40000, 80, 5006, 1, TcpFlags::FIN | TcpFlags::ACK);
    deliver(
        &mut stack,
        vec![build_tcp_frame(&peer_addr(), &fin, &[]).unwrap()],
    );
    assert_eq!(stack.tcp().state(), TcpState::Listen);
    assert_eq!(
        sent_segments(&mut stack),
        vec![(TcpFlags::FIN | TcpFlags::ACK, Vec::new())]
    );
}

#[test]
fn test_segment_to_closed_port_ignored() {
    let mut stack = static_stack();
    let syn = TcpHeader::new(40000, 8080, 1, 0, TcpFlags::SYN);
    deliver(
        &mut stack,
        vec![build_tcp_frame(&peer_addr(), &syn, &[]).unwrap()],
    );
    assert_eq!(stack.tcp().state(), TcpState::Listen);
    assert!(stack.link().sent().is_empty());
}

#[test]
fn test_mqtt_session_through_stack() {
    let mut stack = static_stack();
    learn_broker(&mut stack);
    assert_eq!(stack.arp_cache().lookup(BROKER_IP), Some(BROKER_MAC));

    let mut broker = Broker { seq: 7000 };
    Command::parse("connect").unwrap().execute(&mut stack).unwrap();
    let sent = stack.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    let syn = TcpSegment::parse(&sent[0]).unwrap();
    assert_eq!(syn.tcp.flags, TcpFlags::SYN);
    assert_eq!(syn.tcp.dst_port, MQTT_BROKER_PORT);
    assert_eq!(syn.eth.dst, BROKER_MAC);
    assert_eq!(syn.ip.dst, BROKER_IP);

    broker.send(&mut stack, TcpFlags::SYN | TcpFlags::ACK, &[]);
    broker.seq += 1;
    let sent = sent_segments(&mut stack);
    assert_eq!(sent[0], (TcpFlags::ACK, Vec::new()));
    assert_eq!(sent[1].0, TcpFlags::PSH | TcpFlags::ACK);
    assert_eq!(&sent[1].1[..2], &[0x10, 17]);

    broker.mqtt(&mut stack, &[0x20, 2, 0, 0]);
    assert_eq!(stack.pop_event(), Some(StackEvent::MqttConnected));

    let out = Command::parse("subscribe sensors/temp")
        .unwrap()
        .execute(&mut stack)
        .unwrap();
    assert!(out.contains("sensors/temp"));
    let sent = sent_segments(&mut stack);
    let subscribe = &sent.last().unwrap().1;
    assert_eq!(subscribe[0], 0x82);
    broker.mqtt(&mut stack, &[0x90, 3, 0, 1, 0]);
    assert_eq!(stack.mqtt().pending().map(|m| m.is_done()), Some(true));

    let subs = Command::parse("help subs")
        .unwrap()
        .execute(&mut stack)
        .unwrap();
    assert_eq!(subs, "subscribed topics:\n  1 sensors/temp\n");

    // Broker forwards a QoS 0 PUBLISH for the subscription
    let mut publish = vec![0x30, 0];
    publish.extend_from_slice(&[0, 12]);
    publish.extend_from_slice(b"sensors/temp");
    publish.extend_from_slice(b"21.5");
    publish[1] = (publish.len() - 2) as u8;
    broker.mqtt(&mut stack, &publish);
    assert_eq!(
        stack.pop_event(),
        Some(StackEvent::MqttMessage {
            topic: "sensors/temp".to_string(),
            payload: b"21.5".to_vec(),
        })
    );

    stack.mqtt_unsubscribe("sensors/temp").unwrap();
    broker.mqtt(&mut stack, &[0xb0, 2, 0, 2]);
    assert!(stack.mqtt().topics().is_empty());

    stack.mqtt_disconnect().unwrap();
    let sent = sent_segments(&mut stack);
    assert_eq!(sent.last().unwrap().1, vec![0xe0, 0]);
    assert_eq!(stack.mqtt().state(), MqttConnectionState::Disconnected);
}

#[test]
fn test_mqtt_keep_alive_ping() {
    let (mut stack, mut broker) = connected_stack();
    run_ticks(&mut stack, 50);
    let sent = sent_segments(&mut stack);
    assert_eq!(sent.last().unwrap().1, vec![0xc0, 0]);
    broker.mqtt(&mut stack, &[0xd0, 0]);
    assert_eq!(stack.pop_event(), Some(StackEvent::MqttHeartbeat));
}

#[test]
fn test_mqtt_publish_command() {
    let (mut stack, _) = connected_stack();
    Command::parse("publish leds ON")
        .unwrap()
        .execute(&mut stack)
        .unwrap();
    let sent = sent_segments(&mut stack);
    let payload = &sent.last().unwrap().1;
    assert_eq!(payload[0], 0x30);
    assert!(payload.ends_with(b"ledsON"));
}

#[test]
fn test_mqtt_broker_closes_connection() {
    let (mut stack, mut broker) = connected_stack();
    broker.send(&mut stack, TcpFlags::FIN | TcpFlags::ACK, &[]);
    assert_eq!(stack.tcp().state(), TcpState::Listen);
    assert_eq!(stack.mqtt().state(), MqttConnectionState::Disconnected);
    assert_eq!(stack.pop_event(), Some(StackEvent::MqttDisconnected));
}

#[test]
fn test_mqtt_connect_without_arp_entry() {
    let mut stack = static_stack();
    stack.mqtt_connect().unwrap();
    let sent = stack.link_mut().take_sent();
    let (_, arp) = ArpPacket::parse_eth_frame(&sent[0]).unwrap();
    assert_eq!(arp, ArpPacket::request(LOCAL_MAC, LOCAL_IP, BROKER_IP));
    // Falls back to the configured broker MAC
    let syn = TcpSegment::parse(&sent[1]).unwrap();
    assert_eq!(syn.eth.dst, MacAddr::BROADCAST);
}

#[test]
fn test_ping_and_udp_echo() {
    let mut stack = static_stack();
    let builder =
        etherparse::PacketBuilder::ethernet2(PEER_MAC.octets(), LOCAL_MAC.octets())
            .ipv4(PEER_IP.octets(), LOCAL_IP.octets(), 64)
            .icmpv4_echo_request(9, 1);
    let mut ping = Vec::new();
    builder.write(&mut ping, b"ping").unwrap();
    let udp = build_udp_frame(&peer_addr(), 5555, 1024, b"hello").unwrap();
    deliver(&mut stack, vec![ping, udp]);

    let sent = stack.link_mut().take_sent();
    assert_eq!(sent.len(), 2);
    let echo = SlicedPacket::from_ethernet(&sent[0]).unwrap();
    assert!(matches!(echo.net, Some(NetSlice::Ipv4(_))));
    let Some(TransportSlice::Icmpv4(icmp)) = echo.transport else {
        panic!("reply is not ICMP");
    };
    assert_eq!(icmp.payload(), b"ping");

    let reply = crate::UdpDatagram::parse(&sent[1]).unwrap();
    assert_eq!(reply.udp.dst_port, 5555);
    assert_eq!(reply.payload, UDP_REPLY);
    assert_eq!(
        stack.pop_event(),
        Some(StackEvent::UdpDatagram {
            src_ip: PEER_IP,
            src_port: 5555,
            dst_port: 1024,
            payload: b"hello".to_vec(),
        })
    );

    // Traffic for another host is not answered
    let mut other = peer_addr();
    other.dst_ip = Ipv4Addr::new(192, 168, 1, 200);
    deliver(
        &mut stack,
        vec![build_udp_frame(&other, 5555, 1024, b"hello").unwrap()],
    );
    assert!(stack.link().sent().is_empty());
}

#[test]
fn test_mqtt_refused_subscription_not_listed() {
    let (mut stack, mut broker) = connected_stack();
    let id = stack.mqtt_subscribe("alarms").unwrap();
    broker.mqtt(&mut stack, &[0x90, 3, 0, id as u8, 0x80]);
    assert_eq!(
        stack.pop_event(),
        Some(StackEvent::MqttSubscribeRejected("alarms".to_string()))
    );
    let subs = Command::parse("help subs")
        .unwrap()
        .execute(&mut stack)
        .unwrap();
    assert_eq!(subs, "subscribed topics: none\n");
}
