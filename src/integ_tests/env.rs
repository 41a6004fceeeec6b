// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::{MacAddr, MemoryLink, NodeConfig, Stack};

pub(crate) const LOCAL_MAC: MacAddr = MacAddr([2, 3, 4, 5, 6, 0x83]);
pub(crate) const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 131);
pub(crate) const PEER_MAC: MacAddr =
    MacAddr([0x00, 0xe0, 0x4c, 0x68, 0x19, 0xf4]);
pub(crate) const PEER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
pub(crate) const BROKER_MAC: MacAddr =
    MacAddr([0x60, 0x45, 0xbd, 0xfa, 0xf6, 0x2b]);
pub(crate) const BROKER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 199);

pub(crate) fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn dhcp_stack() -> Stack<MemoryLink> {
    init_log();
    let mut stack = Stack::new(&NodeConfig::new(), MemoryLink::new());
    stack.start().unwrap();
    stack
}

pub(crate) fn static_stack() -> Stack<MemoryLink> {
    init_log();
    let mut config = NodeConfig::new();
    config
        .set_dhcp_enabled(false)
        .set_static_ip(
            LOCAL_IP,
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 1),
        )
        .set_broker_ip(BROKER_IP);
    let mut stack = Stack::new(&config, MemoryLink::new());
    stack.start().unwrap();
    stack
}

/// Deliver frames to the stack and process them.
pub(crate) fn deliver(stack: &mut Stack<MemoryLink>, frames: Vec<Vec<u8>>) {
    for frame in frames {
        stack.link_mut().inject(frame);
    }
    stack.poll().unwrap();
}

pub(crate) fn run_ticks(stack: &mut Stack<MemoryLink>, units: u32) {
    for _ in 0..units {
        stack.tick();
    }
}
