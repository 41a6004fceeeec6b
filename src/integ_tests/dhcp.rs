// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::timer::Timers;
use super::env::{deliver, dhcp_stack, init_log, run_ticks, LOCAL_MAC};
use crate::{
    dhcpv4::{server_reply, DhcpReply, CLIENT_PORT, SERVER_MAC, SERVER_PORT},
    ArpPacket, Command, DhcpMessageType, DhcpState, MemoryLink, Stack,
    NodeConfig, StackEvent, TimerId, UdpDatagram, DHCP_XID,
};

const OFFERED_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 131);
const LEASE_TIME: u32 = 3600;

fn reply(msg_type: DhcpMessageType) -> Vec<u8> {
    server_reply(msg_type, DHCP_XID, SERVER_PORT, OFFERED_IP, LEASE_TIME)
}

fn sent_dhcp_types(stack: &mut Stack<MemoryLink>) -> Vec<DhcpMessageType> {
    stack
        .link_mut()
        .take_sent()
        .iter()
        .filter_map(|f| UdpDatagram::parse(f).ok())
        .filter(|udp| udp.udp.dst_port == SERVER_PORT)
        .filter_map(|udp| DhcpReply::parse(&udp).ok())
        .filter_map(|msg| msg.options.message_type)
        .collect()
}

fn events(stack: &mut Stack<MemoryLink>) -> Vec<StackEvent> {
    std::iter::from_fn(|| stack.pop_event()).collect()
}

fn bound_stack() -> Stack<MemoryLink> {
    let mut stack = dhcp_stack();
    deliver(&mut stack, vec![reply(DhcpMessageType::Offer)]);
    deliver(&mut stack, vec![reply(DhcpMessageType::Ack)]);
    run_ticks(&mut stack, 15);
    assert_eq!(stack.dhcp().state(), DhcpState::Bound);
    stack.link_mut().take_sent();
    events(&mut stack);
    stack
}

#[test]
fn test_dhcp_full_lease_cycle() {
    let mut stack = dhcp_stack();
    assert_eq!(sent_dhcp_types(&mut stack), vec![DhcpMessageType::Discover]);

    deliver(&mut stack, vec![reply(DhcpMessageType::Offer)]);
    assert_eq!(stack.dhcp().state(), DhcpState::Requesting);
    assert_eq!(stack.dhcp().server_mac(), SERVER_MAC);
    assert_eq!(sent_dhcp_types(&mut stack), vec![DhcpMessageType::Request]);

    deliver(&mut stack, vec![reply(DhcpMessageType::Ack)]);
    assert_eq!(stack.dhcp().state(), DhcpState::IpValidating);
    run_ticks(&mut stack, 15);
    assert_eq!(stack.dhcp().state(), DhcpState::Bound);
    assert_eq!(stack.iface().ip(), OFFERED_IP);
    assert_eq!(stack.iface().gateway(), Ipv4Addr::new(192, 168, 1, 254));
    assert_eq!(stack.timers().remain(TimerId::DhcpRenew), Some(1800));
    assert_eq!(stack.timers().remain(TimerId::DhcpRebind), Some(3150));
    assert_eq!(stack.timers().remain(TimerId::DhcpLeaseExpired), Some(3600));
    assert!(matches!(
        events(&mut stack).as_slice(),
        [StackEvent::DhcpBound(lease)] if lease.yiaddr == OFFERED_IP
    ));
    assert!(stack.ifconfig().contains("IP: 192.168.1.131 (dhcp)"));

    run_ticks(&mut stack, 1800);
    assert_eq!(stack.dhcp().state(), DhcpState::Renewing);
    run_ticks(&mut stack, 3150 - 1800);
    assert_eq!(stack.dhcp().state(), DhcpState::Rebinding);
    run_ticks(&mut stack, 3600 - 3150);
    assert_eq!(stack.dhcp().state(), DhcpState::Init);
    assert_eq!(stack.iface().ip(), Ipv4Addr::UNSPECIFIED);
    assert!(events(&mut stack).contains(&StackEvent::DhcpLeaseLost));
    assert!(sent_dhcp_types(&mut stack).ends_with(&[DhcpMessageType::Discover]));
}

#[test]
fn test_dhcp_ignores_foreign_replies() {
    let mut stack = dhcp_stack();
    stack.link_mut().take_sent();
    deliver(
        &mut stack,
        vec![
            server_reply(
                DhcpMessageType::Offer,
                DHCP_XID + 1,
                SERVER_PORT,
                OFFERED_IP,
                LEASE_TIME,
            ),
            server_reply(
                DhcpMessageType::Offer,
                DHCP_XID,
                CLIENT_PORT,
                OFFERED_IP,
                LEASE_TIME,
            ),
        ],
    );
    assert_eq!(stack.dhcp().state(), DhcpState::Init);
    assert_eq!(stack.dhcp().offer().yiaddr, Ipv4Addr::UNSPECIFIED);
    assert!(sent_dhcp_types(&mut stack).is_empty());
}

#[test]
fn test_dhcp_bound_answers_arp() {
    let mut stack = bound_stack();
    let peer = crate::MacAddr([0, 0xe0, 0x4c, 0x68, 0x19, 0xf4]);
    let request =
        ArpPacket::request(peer, Ipv4Addr::new(192, 168, 1, 10), OFFERED_IP);
    deliver(
        &mut stack,
        vec![request.to_eth_frame(crate::MacAddr::BROADCAST).unwrap()],
    );
    let sent = stack.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    let (eth, arp) = ArpPacket::parse_eth_frame(&sent[0]).unwrap();
    assert_eq!(eth.dst, peer);
    assert_eq!(arp, request.reply_from(LOCAL_MAC));
    assert_eq!(
        stack.arp_cache().lookup(Ipv4Addr::new(192, 168, 1, 10)),
        Some(peer)
    );
}

#[test]
fn test_dhcp_address_conflict_declines() {
    let mut stack = dhcp_stack();
    deliver(&mut stack, vec![reply(DhcpMessageType::Offer)]);
    deliver(&mut stack, vec![reply(DhcpMessageType::Ack)]);
    stack.link_mut().take_sent();
    let owner = ArpPacket::announcement(
        crate::MacAddr([0, 0x11, 0x22, 0x33, 0x44, 0x55]),
        OFFERED_IP,
    );
    deliver(
        &mut stack,
        vec![owner.to_eth_frame(crate::MacAddr::BROADCAST).unwrap()],
    );
    run_ticks(&mut stack, 15);
    assert_eq!(stack.dhcp().state(), DhcpState::Requesting);
    assert_eq!(stack.iface().ip(), Ipv4Addr::UNSPECIFIED);
    assert!(sent_dhcp_types(&mut stack).contains(&DhcpMessageType::Decline));
    assert!(events(&mut stack)
        .contains(&StackEvent::DhcpAddressConflict(OFFERED_IP)));
}

#[test]
fn test_dhcp_link_down_and_up() {
    let mut stack = bound_stack();
    stack.link_mut().set_link_up(false);
    stack.tick();
    assert!(!stack.is_link_up());
    assert_eq!(stack.dhcp().state(), DhcpState::Init);
    assert!(!stack.timers().is_active(TimerId::DhcpRenew));
    assert!(!stack.timers().is_active(TimerId::DhcpDiscover));
    assert!(stack.ifconfig().ends_with("Link is down\n"));

    stack.link_mut().set_link_up(true);
    stack.tick();
    assert_eq!(sent_dhcp_types(&mut stack), vec![DhcpMessageType::Discover]);
    assert_eq!(stack.timers().period(TimerId::DhcpDiscover), Some(20));
}

fn link_down_stack(config: &NodeConfig) -> Stack<MemoryLink> {
    init_log();
    let mut link = MemoryLink::new();
    link.set_link_up(false);
    let mut stack = Stack::new(config, link);
    stack.start().unwrap();
    stack
}

#[test]
fn test_dhcp_starts_on_first_link_up() {
    let mut stack = link_down_stack(&NodeConfig::new());
    assert!(!stack.is_link_up());
    assert!(stack.link().sent().is_empty());
    run_ticks(&mut stack, 30);
    assert!(stack.link().sent().is_empty());

    stack.link_mut().set_link_up(true);
    stack.tick();
    assert!(stack.dhcp().is_running());
    assert_eq!(stack.dhcp().state(), DhcpState::Init);
    let discovers: Vec<DhcpReply> = stack
        .link_mut()
        .take_sent()
        .iter()
        .filter_map(|f| UdpDatagram::parse(f).ok())
        .filter(|udp| udp.udp.dst_port == SERVER_PORT)
        .filter_map(|udp| DhcpReply::parse(&udp).ok())
        .collect();
    assert_eq!(discovers.len(), 1);
    assert_eq!(discovers[0].xid, 0x21274a1d);
    assert_eq!(
        discovers[0].options.message_type,
        Some(DhcpMessageType::Discover)
    );

    deliver(&mut stack, vec![reply(DhcpMessageType::Offer)]);
    assert_eq!(stack.dhcp().state(), DhcpState::Requesting);
}

#[test]
fn test_dhcp_enable_waits_for_link_up() {
    let mut config = NodeConfig::new();
    config.set_dhcp_enabled(false);
    let mut stack = link_down_stack(&config);

    // Link-up with DHCP disabled leaves the client alone
    stack.link_mut().set_link_up(true);
    stack.tick();
    stack.link_mut().set_link_up(false);
    stack.tick();
    assert!(!stack.dhcp().is_running());
    assert!(sent_dhcp_types(&mut stack).is_empty());

    Command::parse("dhcp on").unwrap().execute(&mut stack).unwrap();
    assert!(stack.iface().is_dhcp_enabled());
    assert!(!stack.dhcp().is_running());
    assert!(sent_dhcp_types(&mut stack).is_empty());

    stack.link_mut().set_link_up(true);
    stack.tick();
    assert_eq!(sent_dhcp_types(&mut stack), vec![DhcpMessageType::Discover]);
}

#[test]
fn test_dhcp_operator_commands() {
    let mut stack = bound_stack();
    Command::parse("dhcp refresh")
        .unwrap()
        .execute(&mut stack)
        .unwrap();
    assert_eq!(sent_dhcp_types(&mut stack), vec![DhcpMessageType::Request]);

    Command::parse("dhcp release")
        .unwrap()
        .execute(&mut stack)
        .unwrap();
    assert_eq!(sent_dhcp_types(&mut stack), vec![DhcpMessageType::Release]);
    assert_eq!(stack.iface().ip(), Ipv4Addr::UNSPECIFIED);
    assert!(!stack.dhcp().is_running());
    assert!(events(&mut stack).contains(&StackEvent::DhcpLeaseLost));

    // Refresh needs a running client
    assert!(Command::parse("dhcp refresh")
        .unwrap()
        .execute(&mut stack)
        .is_err());

    Command::parse("dhcp on").unwrap().execute(&mut stack).unwrap();
    assert_eq!(sent_dhcp_types(&mut stack), vec![DhcpMessageType::Discover]);
    Command::parse("dhcp off").unwrap().execute(&mut stack).unwrap();
    assert!(!stack.iface().is_dhcp_enabled());
    run_ticks(&mut stack, 40);
    assert!(sent_dhcp_types(&mut stack).is_empty());
}
