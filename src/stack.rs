// SPDX-License-Identifier: Apache-2.0

use std::{collections::VecDeque, net::Ipv4Addr};

use crate::{
    buffer::Buffer,
    context::NetContext,
    datagram::{arp_reply, icmp_echo_reply, is_unicast_to_us, udp_reply, UDP_REPLY},
    dhcpv4::is_dhcp_reply,
    frame::{
        EthernetHeader, Ipv4Frame, TcpSegment, UdpDatagram, ETHER_TYPE_ARP,
        ETHER_TYPE_IPV4, IP_PROTO_ICMP, IP_PROTO_TCP, IP_PROTO_UDP,
        MAX_PACKET_SIZE,
    },
    tcp::MQTT_BROKER_PORT,
    ArpCache, ArpPacket, DhcpClient, Interface, Link, MacAddr, MqttClient,
    NetError, NodeConfig, StackEvent, TcpConnection, TimerId, TimerQueue,
};

// Disjoint borrows of the collaborators so protocol state can be borrowed
// alongside.
macro_rules! net_ctx {
    ($stack:expr) => {
        NetContext {
            iface: &mut $stack.iface,
            link: &mut $stack.link,
            timers: &mut $stack.timers,
            events: &mut $stack.events,
        }
    };
}

/// The complete device stack bound to one link. Inbound frames and timer
/// ticks are the only inputs, both processed to completion.
#[derive(Debug)]
pub struct Stack<L: Link> {
    iface: Interface,
    link: L,
    timers: TimerQueue,
    arp_cache: ArpCache,
    dhcp: DhcpClient,
    tcp: TcpConnection,
    mqtt: MqttClient,
    events: VecDeque<StackEvent>,
    link_up: bool,
    fallback_broker_mac: MacAddr,
    rx_buf: Vec<u8>,
}

impl<L: Link> Stack<L> {
    pub fn new(config: &NodeConfig, link: L) -> Self {
        let mut iface = Interface::new(config.mac);
        iface
            .set_ip(config.ip)
            .set_subnet_mask(config.subnet_mask)
            .set_gateway(config.gateway)
            .set_dns(config.dns)
            .set_dhcp_enabled(config.dhcp_enabled);
        let link_up = link.is_link_up();
        Self {
            iface,
            link,
            timers: TimerQueue::new(),
            arp_cache: ArpCache::new(),
            dhcp: DhcpClient::new(config),
            tcp: TcpConnection::new(&config.listen_ports),
            mqtt: MqttClient::new(config),
            events: VecDeque::new(),
            link_up,
            fallback_broker_mac: config.broker_mac,
            rx_buf: vec![0u8; MAX_PACKET_SIZE],
        }
    }

    pub fn iface(&self) -> &Interface {
        &self.iface
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn dhcp(&self) -> &DhcpClient {
        &self.dhcp
    }

    pub fn tcp(&self) -> &TcpConnection {
        &self.tcp
    }

    pub fn mqtt(&self) -> &MqttClient {
        &self.mqtt
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    pub fn pop_event(&mut self) -> Option<StackEvent> {
        self.events.pop_front()
    }

    /// Report of the `ifconfig` command.
    pub fn ifconfig(&self) -> String {
        self.iface.ifconfig(self.link_up)
    }

    /// Begin DHCP discovery when enabled, otherwise run on the configured
    /// static addresses.
    pub fn start(&mut self) -> Result<(), NetError> {
        log::info!(
            "Starting stack on {} with {}",
            self.iface.mac(),
            if self.iface.is_dhcp_enabled() {
                "DHCP".to_string()
            } else {
                format!("static IP {}", self.iface.ip())
            }
        );
        if self.iface.is_dhcp_enabled() && self.link_up {
            let mut ctx = net_ctx!(self);
            self.dhcp.start(&mut ctx)?;
        }
        Ok(())
    }

    /// Process every frame the link has buffered, returning how many were
    /// handled.
    pub fn poll(&mut self) -> Result<usize, NetError> {
        let mut buf = std::mem::take(&mut self.rx_buf);
        let mut count = 0;
        let result = loop {
            if !self.link.is_data_available() {
                break Ok(count);
            }
            match self.link.receive(&mut buf) {
                Ok(Some(len)) => {
                    self.handle_frame(&buf[..len]);
                    count += 1;
                }
                Ok(None) => break Ok(count),
                Err(e) => break Err(e),
            }
        };
        self.rx_buf = buf;
        result
    }

    /// Classify and process one inbound Ethernet frame. Malformed or
    /// unrelated frames are dropped.
    pub fn handle_frame(&mut self, frame: &[u8]) {
        log::trace!("Received frame {frame:?}");
        if let Err(e) = self.process_frame(frame) {
            log::debug!("Dropped inbound frame: {e}");
        }
    }

    fn process_frame(&mut self, frame: &[u8]) -> Result<(), NetError> {
        let eth = EthernetHeader::parse(&mut Buffer::new(frame))?;
        match eth.ether_type {
            ETHER_TYPE_ARP => self.process_arp(frame),
            ETHER_TYPE_IPV4 => self.process_ipv4(frame),
            t => {
                log::trace!("Ignoring ether type {t:#06x}");
                Ok(())
            }
        }
    }

    fn process_arp(&mut self, frame: &[u8]) -> Result<(), NetError> {
        let (_, arp) = ArpPacket::parse_eth_frame(frame)?;
        if arp.sender_mac != self.iface.mac() {
            self.arp_cache.insert(arp.sender_ip, arp.sender_mac);
        }
        self.dhcp.process_arp(&arp, self.iface.mac());
        if let Some(reply) = arp_reply(&arp, &self.iface)? {
            self.link.transmit(&reply)?;
        }
        Ok(())
    }

    fn process_ipv4(&mut self, frame: &[u8]) -> Result<(), NetError> {
        let ip_frame = Ipv4Frame::parse(frame)?;
        let to_us = is_unicast_to_us(&ip_frame, &self.iface);
        match ip_frame.ip.protocol {
            IP_PROTO_UDP => {
                let udp = UdpDatagram::parse(frame)?;
                if is_dhcp_reply(&udp) {
                    let mut ctx = net_ctx!(self);
                    self.dhcp.process_reply(&mut ctx, &udp)
                } else if to_us {
                    self.process_udp(&udp)
                } else {
                    Ok(())
                }
            }
            IP_PROTO_ICMP if to_us => {
                if let Some(reply) = icmp_echo_reply(&ip_frame)? {
                    self.link.transmit(&reply)?;
                }
                Ok(())
            }
            IP_PROTO_TCP if to_us => {
                let seg = TcpSegment::parse(frame)?;
                if self.tcp.accepts(&seg) {
                    self.process_tcp(&seg)
                } else {
                    log::debug!(
                        "Ignoring TCP segment to port {}",
                        seg.tcp.dst_port
                    );
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    fn process_udp(&mut self, udp: &UdpDatagram) -> Result<(), NetError> {
        log::debug!(
            "UDP datagram from {}:{} to port {}",
            udp.ip.src,
            udp.udp.src_port,
            udp.udp.dst_port
        );
        self.events.push_back(StackEvent::UdpDatagram {
            src_ip: udp.ip.src,
            src_port: udp.udp.src_port,
            dst_port: udp.udp.dst_port,
            payload: udp.payload.to_vec(),
        });
        self.link.transmit(&udp_reply(udp, UDP_REPLY)?)
    }

    fn process_tcp(&mut self, seg: &TcpSegment) -> Result<(), NetError> {
        let outcome = self.tcp.process(seg, &mut self.link)?;
        if seg.tcp.src_port != MQTT_BROKER_PORT {
            return Ok(());
        }
        let mut ctx = net_ctx!(self);
        if outcome.established {
            self.mqtt.tcp_established(&mut ctx, &mut self.tcp)?;
        }
        if outcome.mqtt_payload {
            self.mqtt
                .process_payload(&mut ctx, &mut self.tcp, seg.payload)?;
        }
        if outcome.closed {
            self.mqtt.tcp_closed(&mut ctx);
        }
        Ok(())
    }

    /// Advance time by one unit: check the link state then run every timer
    /// which fired.
    pub fn tick(&mut self) {
        self.check_link();
        self.timers.tick();
        while let Some(id) = self.timers.pop_fired() {
            if let Err(e) = self.handle_timer(id) {
                log::warn!("Handling timer {id} failed: {e}");
            }
        }
    }

    pub fn handle_timer(&mut self, id: TimerId) -> Result<(), NetError> {
        log::trace!("Timer {id} fired");
        let mut ctx = net_ctx!(self);
        match id {
            TimerId::MqttPing | TimerId::MqttResend => {
                self.mqtt.process_timer(&mut ctx, &mut self.tcp, id)
            }
            _ => self.dhcp.process_timer(&mut ctx, id),
        }
    }

    fn check_link(&mut self) {
        let link_up = self.link.is_link_up();
        if link_up == self.link_up {
            return;
        }
        self.link_up = link_up;
        log::info!("Link is {}", if link_up { "up" } else { "down" });
        let mut ctx = net_ctx!(self);
        if let Err(e) = self.dhcp.link_changed(&mut ctx, link_up) {
            log::warn!("DHCP failed to follow link change: {e}");
        }
    }

    /// Enable DHCP. Discovery begins now if the link is up, otherwise on
    /// the next link-up.
    pub fn enable_dhcp(&mut self) -> Result<(), NetError> {
        self.iface.set_dhcp_enabled(true);
        if !self.link_up {
            log::info!("DHCP enabled, waiting for link up");
            return Ok(());
        }
        let mut ctx = net_ctx!(self);
        self.dhcp.start(&mut ctx)
    }

    /// Stop DHCP and keep the current addresses as static ones.
    pub fn disable_dhcp(&mut self) {
        self.iface.set_dhcp_enabled(false);
        let mut ctx = net_ctx!(self);
        self.dhcp.stop(&mut ctx);
    }

    pub fn refresh_dhcp(&mut self) -> Result<(), NetError> {
        let mut ctx = net_ctx!(self);
        self.dhcp.refresh(&mut ctx)
    }

    pub fn release_dhcp(&mut self) -> Result<(), NetError> {
        let mut ctx = net_ctx!(self);
        self.dhcp.release(&mut ctx)
    }

    pub fn set_ip(&mut self, ip: Ipv4Addr) {
        self.iface.set_ip(ip);
    }

    pub fn set_subnet_mask(&mut self, mask: Ipv4Addr) {
        self.iface.set_subnet_mask(mask);
    }

    pub fn set_gateway(&mut self, gateway: Ipv4Addr) {
        self.iface.set_gateway(gateway);
    }

    pub fn set_dns(&mut self, dns: Ipv4Addr) {
        self.iface.set_dns(dns);
    }

    pub fn set_mqtt_broker(&mut self, ip: Ipv4Addr) {
        self.mqtt.set_broker_ip(ip);
    }

    fn is_on_link(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.iface.subnet_mask());
        mask == 0 || u32::from(ip) & mask == u32::from(self.iface.ip()) & mask
    }

    /// MAC to reach `ip` through: learned from ARP for the host or the
    /// gateway in front of it, else the configured fallback. A miss sends
    /// an ARP request so a later attempt can resolve it.
    fn resolve_mac(&mut self, ip: Ipv4Addr) -> Result<MacAddr, NetError> {
        let next_hop = if self.is_on_link(ip) {
            ip
        } else {
            self.iface.gateway()
        };
        if let Some(mac) = self.arp_cache.lookup(next_hop) {
            return Ok(mac);
        }
        log::debug!(
            "{next_hop} not in ARP cache, using {}",
            self.fallback_broker_mac
        );
        let request =
            ArpPacket::request(self.iface.mac(), self.iface.ip(), next_hop);
        self.link.transmit(&request.to_eth_frame(MacAddr::BROADCAST)?)?;
        Ok(self.fallback_broker_mac)
    }

    pub fn mqtt_connect(&mut self) -> Result<(), NetError> {
        let broker_mac = self.resolve_mac(self.mqtt.broker_ip())?;
        let mut ctx = net_ctx!(self);
        self.mqtt.connect(&mut ctx, &mut self.tcp, broker_mac)
    }

    pub fn mqtt_disconnect(&mut self) -> Result<(), NetError> {
        let mut ctx = net_ctx!(self);
        self.mqtt.disconnect(&mut ctx, &mut self.tcp)
    }

    /// Returns the identifier assigned to the topic.
    pub fn mqtt_subscribe(&mut self, topic: &str) -> Result<u16, NetError> {
        let mut ctx = net_ctx!(self);
        self.mqtt.subscribe(&mut ctx, &mut self.tcp, topic)
    }

    pub fn mqtt_unsubscribe(&mut self, topic: &str) -> Result<(), NetError> {
        let mut ctx = net_ctx!(self);
        self.mqtt.unsubscribe(&mut ctx, &mut self.tcp, topic)
    }

    pub fn mqtt_publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), NetError> {
        let mut ctx = net_ctx!(self);
        self.mqtt.publish(&mut ctx, &mut self.tcp, topic, payload)
    }
}
