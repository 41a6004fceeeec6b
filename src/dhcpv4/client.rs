// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use super::{
    msg::{DhcpReply, DhcpRequestMessage, CLIENT_PORT, SERVER_PORT},
    option::{
        append_end, append_option, DhcpOptionCode, MAX_OPTIONS_SIZE,
        PARAMETER_REQUEST_LIST,
    },
    DhcpLease, DhcpMessageType, DhcpState,
};
use crate::{
    buffer::BufferMut,
    context::NetContext,
    frame::{build_udp_frame, FrameAddr, UdpDatagram},
    ArpPacket, ErrorKind, Interface, MacAddr, NetError, NodeConfig,
    StackEvent, TimerId,
};

const DISCOVER_INTERVAL: u32 = 20;
const REQUEST_INTERVAL: u32 = 20;
const ARP_PROBE_INTERVAL: u32 = 5;
const ARP_PROBE_WAIT: u32 = 15;

const DHCP_TIMERS: [TimerId; 7] = [
    TimerId::DhcpDiscover,
    TimerId::DhcpRequest,
    TimerId::DhcpArpProbe,
    TimerId::DhcpArpProbeDone,
    TimerId::DhcpRenew,
    TimerId::DhcpRebind,
    TimerId::DhcpLeaseExpired,
];

/// Per-message retry counts. Tracked for diagnostics only, retransmission
/// is driven by the periodic timers without a limit.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct DhcpRetryCounters {
    pub discover: u32,
    pub arp_probe: u32,
}

#[derive(Debug, Clone)]
pub struct DhcpClient {
    state: DhcpState,
    /// Destination of outbound messages, broadcast unless renewing.
    server_mac: MacAddr,
    server_ip: Ipv4Addr,
    lease_time: u32,
    ip_validated: bool,
    offer: DhcpLease,
    retry: DhcpRetryCounters,
    client_id: Vec<u8>,
    host_name: String,
    requested_ip: Option<Ipv4Addr>,
    running: bool,
}

impl DhcpClient {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            state: DhcpState::Init,
            server_mac: MacAddr::BROADCAST,
            server_ip: Ipv4Addr::BROADCAST,
            lease_time: 0,
            ip_validated: false,
            offer: DhcpLease::default(),
            retry: DhcpRetryCounters::default(),
            client_id: config.client_id.clone(),
            host_name: config.host_name.clone(),
            requested_ip: config.requested_ip,
            running: false,
        }
    }

    pub fn state(&self) -> DhcpState {
        self.state
    }

    /// Whether the client is enabled and driving its timers.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Data of the last accepted OFFER or ACK.
    pub fn offer(&self) -> &DhcpLease {
        &self.offer
    }

    pub fn server_mac(&self) -> MacAddr {
        self.server_mac
    }

    pub fn server_ip(&self) -> Ipv4Addr {
        self.server_ip
    }

    /// Granted lease duration, zero when not bound.
    pub fn lease_time(&self) -> u32 {
        self.lease_time
    }

    pub fn is_ip_validated(&self) -> bool {
        self.ip_validated
    }

    pub fn retry_counters(&self) -> DhcpRetryCounters {
        self.retry
    }

    fn reset(&mut self) {
        self.state = DhcpState::Init;
        self.server_mac = MacAddr::BROADCAST;
        self.server_ip = Ipv4Addr::BROADCAST;
        self.lease_time = 0;
        self.ip_validated = false;
        self.offer = DhcpLease::default();
        self.retry = DhcpRetryCounters::default();
    }

    fn teardown(&mut self, ctx: &mut NetContext) {
        for id in DHCP_TIMERS {
            ctx.timers.stop(id);
        }
        self.reset();
    }

    pub(crate) fn start(&mut self, ctx: &mut NetContext) -> Result<(), NetError> {
        log::info!("DHCP client started");
        self.running = true;
        self.transition(ctx, DhcpState::Init)
    }

    /// Stop every timer and forget the lease state. The interface
    /// addresses are left as they are.
    pub(crate) fn stop(&mut self, ctx: &mut NetContext) {
        log::info!("DHCP client stopped");
        self.running = false;
        self.teardown(ctx);
    }

    /// Send a REQUEST right away.
    pub(crate) fn refresh(
        &mut self,
        ctx: &mut NetContext,
    ) -> Result<(), NetError> {
        if !self.running {
            let e = NetError::new(
                ErrorKind::InvalidArgument,
                "DHCP is disabled".to_string(),
            );
            log::error!("{e}");
            return Err(e);
        }
        self.send_message(ctx, DhcpMessageType::Request)
    }

    /// Give the lease back to the server and deconfigure the address.
    pub(crate) fn release(
        &mut self,
        ctx: &mut NetContext,
    ) -> Result<(), NetError> {
        let had_lease = self.state.has_lease();
        if had_lease {
            self.send_message(ctx, DhcpMessageType::Release)?;
        } else {
            log::info!("No DHCP lease to release in state {}", self.state);
        }
        self.stop(ctx);
        ctx.iface.clear_addresses();
        if had_lease {
            ctx.notify(StackEvent::DhcpLeaseLost);
        }
        Ok(())
    }

    /// React to the link coming up or going down. The client (re)starts on
    /// link-up whenever DHCP is enabled on the interface, even if it never
    /// ran before.
    pub(crate) fn link_changed(
        &mut self,
        ctx: &mut NetContext,
        link_up: bool,
    ) -> Result<(), NetError> {
        if link_up {
            if !ctx.iface.is_dhcp_enabled() {
                return Ok(());
            }
            log::info!("Link up, restarting DHCP");
            self.start(ctx)
        } else if !self.running {
            Ok(())
        } else {
            log::info!("Link down, resetting DHCP");
            self.teardown(ctx);
            Ok(())
        }
    }

    /// Handle a UDP datagram already matched as a reply to this client.
    pub(crate) fn process_reply(
        &mut self,
        ctx: &mut NetContext,
        udp: &UdpDatagram,
    ) -> Result<(), NetError> {
        if !self.running {
            log::debug!("DHCP disabled, dropping DHCP reply");
            return Ok(());
        }
        let reply = DhcpReply::parse(udp)?;
        let Some(msg_type) = reply.options.message_type else {
            log::debug!(
                "Dropping DHCP message due to missing message type option"
            );
            return Ok(());
        };
        log::debug!(
            "Got DHCP {msg_type} offering {} in state {}",
            reply.yiaddr,
            self.state
        );
        match (msg_type, self.state) {
            (DhcpMessageType::Offer, DhcpState::Init) => {
                self.offer = DhcpLease::from(&reply);
                ctx.timers.stop(TimerId::DhcpDiscover);
                self.transition(ctx, DhcpState::Selecting)?;
                self.transition(ctx, DhcpState::Requesting)
            }
            (
                DhcpMessageType::Ack,
                DhcpState::Requesting | DhcpState::Renewing | DhcpState::Rebinding,
            ) => {
                self.offer = DhcpLease::from(&reply);
                ctx.timers.stop(TimerId::DhcpRequest);
                self.transition(ctx, DhcpState::IpValidating)
            }
            (
                DhcpMessageType::Nak,
                DhcpState::Requesting | DhcpState::Renewing | DhcpState::Rebinding,
            ) => {
                log::warn!("DHCP server refused the request");
                if self.state.has_lease() {
                    ctx.iface.clear_addresses();
                    ctx.notify(StackEvent::DhcpLeaseLost);
                }
                self.transition(ctx, DhcpState::Init)
            }
            _ => {
                log::debug!(
                    "Ignoring DHCP {msg_type} in state {}",
                    self.state
                );
                Ok(())
            }
        }
    }

    /// Conflict detection while probing the offered address: any ARP
    /// packet from another host claiming or probing it marks it in use.
    pub(crate) fn process_arp(&mut self, arp: &ArpPacket, own_mac: MacAddr) {
        if self.state != DhcpState::IpValidating || arp.sender_mac == own_mac
        {
            return;
        }
        let candidate = self.offer.yiaddr;
        if arp.sender_ip == candidate
            || (arp.is_probe() && arp.target_ip == candidate)
        {
            log::warn!(
                "Offered address {candidate} is in use by {}",
                arp.sender_mac
            );
            self.offer.ip_in_use = true;
        }
    }

    pub(crate) fn process_timer(
        &mut self,
        ctx: &mut NetContext,
        id: TimerId,
    ) -> Result<(), NetError> {
        match id {
            TimerId::DhcpDiscover => {
                self.send_message(ctx, DhcpMessageType::Discover)
            }
            TimerId::DhcpRequest => {
                self.send_message(ctx, DhcpMessageType::Request)
            }
            TimerId::DhcpArpProbe => self.send_arp_probe(ctx),
            TimerId::DhcpArpProbeDone => self.arp_probe_finished(ctx),
            TimerId::DhcpRenew => {
                if self.state == DhcpState::Bound {
                    self.transition(ctx, DhcpState::Renewing)
                } else {
                    log::debug!("Ignoring renew timer in state {}", self.state);
                    Ok(())
                }
            }
            TimerId::DhcpRebind => {
                if matches!(self.state, DhcpState::Bound | DhcpState::Renewing)
                {
                    self.transition(ctx, DhcpState::Rebinding)
                } else {
                    log::debug!("Ignoring rebind timer in state {}", self.state);
                    Ok(())
                }
            }
            TimerId::DhcpLeaseExpired => self.lease_expired(ctx),
            _ => Ok(()),
        }
    }

    fn transition(
        &mut self,
        ctx: &mut NetContext,
        new_state: DhcpState,
    ) -> Result<(), NetError> {
        log::info!("DHCP state {} -> {new_state}", self.state);
        // Messages sent on entry already reflect the new state
        self.state = new_state;
        match new_state {
            DhcpState::Init => {
                self.teardown(ctx);
                ctx.timers
                    .start_periodic(TimerId::DhcpDiscover, DISCOVER_INTERVAL);
                self.send_message(ctx, DhcpMessageType::Discover)
            }
            DhcpState::Selecting => {
                ctx.timers.stop(TimerId::DhcpDiscover);
                Ok(())
            }
            DhcpState::Requesting => {
                ctx.timers
                    .start_periodic(TimerId::DhcpRequest, REQUEST_INTERVAL);
                self.send_message(ctx, DhcpMessageType::Request)
            }
            DhcpState::IpValidating => {
                self.offer.ip_in_use = false;
                ctx.timers
                    .start_periodic(TimerId::DhcpArpProbe, ARP_PROBE_INTERVAL);
                ctx.timers
                    .start_one_shot(TimerId::DhcpArpProbeDone, ARP_PROBE_WAIT);
                Ok(())
            }
            DhcpState::Bound => {
                self.commit(ctx.iface);
                self.set_lease_timers(ctx.timers);
                ctx.notify(StackEvent::DhcpBound(self.offer.clone()));
                Ok(())
            }
            DhcpState::Renewing => {
                self.server_mac = self.offer.srv_mac;
                self.server_ip = self.offer.srv_id;
                ctx.timers
                    .start_periodic(TimerId::DhcpRequest, REQUEST_INTERVAL);
                self.send_message(ctx, DhcpMessageType::Request)
            }
            DhcpState::Rebinding => {
                self.server_mac = MacAddr::BROADCAST;
                self.server_ip = Ipv4Addr::BROADCAST;
                ctx.timers
                    .start_periodic(TimerId::DhcpRequest, REQUEST_INTERVAL);
                self.send_message(ctx, DhcpMessageType::Request)
            }
        }
    }

    fn commit(&mut self, iface: &mut Interface) {
        iface
            .set_ip(self.offer.yiaddr)
            .set_subnet_mask(self.offer.subnet_mask)
            .set_gateway(self.offer.gateway)
            .set_dns(self.offer.dns);
        self.lease_time = self.offer.lease_time_sec;
        self.ip_validated = true;
        log::info!("DHCP lease committed: {}", self.offer);
    }

    fn arp_probe_finished(
        &mut self,
        ctx: &mut NetContext,
    ) -> Result<(), NetError> {
        ctx.timers.stop(TimerId::DhcpArpProbe);
        if self.state != DhcpState::IpValidating {
            return Ok(());
        }
        if self.offer.ip_in_use {
            ctx.notify(StackEvent::DhcpAddressConflict(self.offer.yiaddr));
            self.send_message(ctx, DhcpMessageType::Decline)?;
            self.transition(ctx, DhcpState::Requesting)
        } else {
            self.transition(ctx, DhcpState::Bound)?;
            self.send_arp_announcement(ctx)
        }
    }

    fn lease_expired(&mut self, ctx: &mut NetContext) -> Result<(), NetError> {
        if self.state == DhcpState::Init {
            return Ok(());
        }
        log::warn!("DHCP lease of {} expired", self.offer.yiaddr);
        ctx.iface.clear_addresses();
        ctx.notify(StackEvent::DhcpLeaseLost);
        self.transition(ctx, DhcpState::Init)
    }

    fn send_arp_probe(&mut self, ctx: &mut NetContext) -> Result<(), NetError> {
        self.retry.arp_probe += 1;
        log::debug!("ARP probing {}", self.offer.yiaddr);
        let frame = ArpPacket::probe(ctx.iface.mac(), self.offer.yiaddr)
            .to_eth_frame(MacAddr::BROADCAST)?;
        ctx.link.transmit(&frame)
    }

    fn send_arp_announcement(
        &mut self,
        ctx: &mut NetContext,
    ) -> Result<(), NetError> {
        let frame = ArpPacket::announcement(ctx.iface.mac(), ctx.iface.ip())
            .to_eth_frame(MacAddr::BROADCAST)?;
        ctx.link.transmit(&frame)
    }

    /// The server identifier only belongs in a REQUEST answering an offer,
    /// never in one refreshing an existing lease (RFC 2131 4.3.2).
    fn include_server_id(&self) -> bool {
        !self.state.has_lease()
    }

    fn send_message(
        &mut self,
        ctx: &mut NetContext,
        msg_type: DhcpMessageType,
    ) -> Result<(), NetError> {
        if msg_type == DhcpMessageType::Discover {
            self.retry.discover += 1;
        }
        let frame = self.build_message(ctx.iface, msg_type)?;
        log::debug!(
            "Sending DHCP {msg_type} to {} in state {}",
            self.server_ip,
            self.state
        );
        ctx.link.transmit(&frame)
    }

    pub(crate) fn build_message(
        &self,
        iface: &Interface,
        msg_type: DhcpMessageType,
    ) -> Result<Vec<u8>, NetError> {
        let mut opts = BufferMut::new(MAX_OPTIONS_SIZE);
        let prl: Vec<u8> =
            PARAMETER_REQUEST_LIST.iter().map(|c| u8::from(*c)).collect();
        let mut len = append_option(
            &mut opts,
            DhcpOptionCode::MessageType,
            &[msg_type as u8],
        )?;
        match msg_type {
            DhcpMessageType::Discover => {
                len += self.append_client_id(&mut opts)?;
                if let Some(ip) = self.requested_ip {
                    len += append_option(
                        &mut opts,
                        DhcpOptionCode::RequestedIpAddress,
                        &ip.octets(),
                    )?;
                }
                len += append_option(
                    &mut opts,
                    DhcpOptionCode::ParameterRequestList,
                    &prl,
                )?;
            }
            DhcpMessageType::Request => {
                len += self.append_client_id(&mut opts)?;
                len += append_option(
                    &mut opts,
                    DhcpOptionCode::RequestedIpAddress,
                    &self.offer.yiaddr.octets(),
                )?;
                if self.include_server_id() {
                    len += append_option(
                        &mut opts,
                        DhcpOptionCode::ServerIdentifier,
                        &self.offer.srv_id.octets(),
                    )?;
                }
                if !self.host_name.is_empty() {
                    len += append_option(
                        &mut opts,
                        DhcpOptionCode::HostName,
                        self.host_name.as_bytes(),
                    )?;
                }
                len += append_option(
                    &mut opts,
                    DhcpOptionCode::ParameterRequestList,
                    &prl,
                )?;
            }
            DhcpMessageType::Release => {
                len += append_option(
                    &mut opts,
                    DhcpOptionCode::ServerIdentifier,
                    &self.offer.srv_id.octets(),
                )?;
                len += self.append_client_id(&mut opts)?;
            }
            DhcpMessageType::Decline => {
                len += append_option(
                    &mut opts,
                    DhcpOptionCode::RequestedIpAddress,
                    &self.offer.yiaddr.octets(),
                )?;
                len += append_option(
                    &mut opts,
                    DhcpOptionCode::ServerIdentifier,
                    &self.offer.srv_id.octets(),
                )?;
            }
            _ => {
                let e = NetError::new(
                    ErrorKind::NotSupported,
                    format!("DHCP client never sends {msg_type}"),
                );
                log::error!("{e}");
                return Err(e);
            }
        }
        len += append_end(&mut opts)?;
        log::trace!("DHCP {msg_type} options {len} bytes: {:?}", opts.data);

        let ciaddr =
            if self.state.has_lease() || msg_type == DhcpMessageType::Release {
                iface.ip()
            } else {
                Ipv4Addr::UNSPECIFIED
            };
        let payload = DhcpRequestMessage {
            chaddr: iface.mac(),
            ciaddr,
            options: &opts.data,
        }
        .to_bytes()?;
        build_udp_frame(
            &FrameAddr {
                src_mac: iface.mac(),
                dst_mac: self.server_mac,
                src_ip: iface.ip(),
                dst_ip: self.server_ip,
            },
            CLIENT_PORT,
            SERVER_PORT,
            &payload,
        )
    }

    fn append_client_id(&self, opts: &mut BufferMut) -> Result<usize, NetError> {
        if self.client_id.is_empty() {
            Ok(0)
        } else {
            append_option(opts, DhcpOptionCode::ClientIdentifier, &self.client_id)
        }
    }
}
