// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use super::{
    packet::{
        encode_ack, encode_connect, encode_empty, encode_publish,
        encode_subscribe, encode_unsubscribe, MqttInbound, MqttPacketType,
        MqttPublish,
    },
    pending::{PendingMessage, PendingState, RESEND_INTERVAL},
    topic::{TopicTable, FREE_TOPIC_ID},
    MqttQos,
};
use crate::{
    context::NetContext,
    tcp::{TcpConnection, TcpFlags, MQTT_BROKER_PORT},
    ErrorKind, MacAddr, NetError, NodeConfig, StackEvent, TimerId,
};

const PING_INTERVAL: u32 = 50;
const CONNACK_ACCEPTED: u8 = 0;
const SUBACK_FAILURE: u8 = 0x80;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum MqttConnectionState {
    #[default]
    Disconnected,
    /// CONNECT queued or sent, CONNACK not seen yet.
    Connecting,
    Connected,
}

impl std::fmt::Display for MqttConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Disconnected => "disconnected",
                Self::Connecting => "connecting",
                Self::Connected => "connected",
            }
        )
    }
}

/// MQTT 3.1.1 client running over the single TCP connection.
#[derive(Debug, Clone)]
pub struct MqttClient {
    state: MqttConnectionState,
    qos: MqttQos,
    broker_ip: Ipv4Addr,
    broker_mac: MacAddr,
    client_id: String,
    pending: Option<PendingMessage>,
    topics: TopicTable,
    next_packet_id: u16,
}

impl MqttClient {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            state: MqttConnectionState::Disconnected,
            qos: config.mqtt_qos,
            broker_ip: config.broker_ip,
            broker_mac: config.broker_mac,
            client_id: config.mqtt_client_id.clone(),
            pending: None,
            topics: TopicTable::new(),
            next_packet_id: 1,
        }
    }

    pub fn state(&self) -> MqttConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == MqttConnectionState::Connected
    }

    pub fn qos(&self) -> MqttQos {
        self.qos
    }

    pub fn broker_ip(&self) -> Ipv4Addr {
        self.broker_ip
    }

    pub fn broker_mac(&self) -> MacAddr {
        self.broker_mac
    }

    pub fn client_id(&self) -> &str {
        self.client_id.as_str()
    }

    pub fn pending(&self) -> Option<&PendingMessage> {
        self.pending.as_ref()
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    /// Takes effect on the next connect.
    pub fn set_broker_ip(&mut self, ip: Ipv4Addr) -> &mut Self {
        self.broker_ip = ip;
        self
    }

    pub fn set_qos(&mut self, qos: MqttQos) -> &mut Self {
        self.qos = qos;
        self
    }

    fn new_packet_id(&mut self) -> u16 {
        loop {
            let id = self.next_packet_id;
            self.next_packet_id = self.next_packet_id.wrapping_add(1);
            if id != 0 && id != FREE_TOPIC_ID {
                return id;
            }
        }
    }

    fn require_tcp(&self, tcp: &TcpConnection) -> Result<(), NetError> {
        if tcp.is_established() {
            Ok(())
        } else {
            let e = NetError::new(
                ErrorKind::InvalidArgument,
                format!("Not connected to MQTT broker {}", self.broker_ip),
            );
            log::error!("{e}");
            Err(e)
        }
    }

    /// Send a packet which expects no acknowledgement.
    fn send_now(
        &self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
        data: &[u8],
    ) -> Result<(), NetError> {
        self.require_tcp(tcp)?;
        tcp.send(
            ctx.iface,
            data,
            TcpFlags::ACK | TcpFlags::PSH,
            self.broker_mac,
            self.broker_ip,
            MQTT_BROKER_PORT,
            &mut *ctx.link,
        )
    }

    fn queue(&mut self, msg: PendingMessage) {
        if self.pending.as_ref().is_some_and(|m| !m.is_done()) {
            log::warn!("Replacing unacknowledged MQTT message");
        }
        self.pending = Some(msg);
    }

    /// Transmit the pending message unless it is settled.
    fn flush(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
    ) -> Result<(), NetError> {
        let Some(msg) = self.pending.as_mut() else {
            return Ok(());
        };
        if msg.is_done() {
            return Ok(());
        }
        if !tcp.is_established() {
            log::debug!("MQTT message waits for the TCP connection");
            return Ok(());
        }
        let data = msg.next_transmission().to_vec();
        tcp.send(
            ctx.iface,
            &data,
            TcpFlags::ACK | TcpFlags::PSH,
            self.broker_mac,
            self.broker_ip,
            MQTT_BROKER_PORT,
            &mut *ctx.link,
        )?;
        msg.mark_sent();
        if msg.expects_ack() && !ctx.timers.is_active(TimerId::MqttResend) {
            ctx.timers.start_periodic(TimerId::MqttResend, RESEND_INTERVAL);
        }
        Ok(())
    }

    /// Queue CONNECT and send it, opening the TCP connection towards
    /// `broker_mac` first when needed.
    pub(crate) fn connect(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
        broker_mac: MacAddr,
    ) -> Result<(), NetError> {
        self.broker_mac = broker_mac;
        self.topics.clear();
        let data = encode_connect(&self.client_id)?;
        self.queue(PendingMessage::new(
            data,
            Some(MqttPacketType::Connack),
            None,
        ));
        self.state = MqttConnectionState::Connecting;
        if tcp.is_established() {
            self.flush(ctx, tcp)
        } else {
            tcp.establish(
                ctx.iface,
                self.broker_mac,
                self.broker_ip,
                MQTT_BROKER_PORT,
                &mut *ctx.link,
            )?;
            ctx.timers.start_periodic(TimerId::MqttResend, RESEND_INTERVAL);
            Ok(())
        }
    }

    pub(crate) fn disconnect(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
    ) -> Result<(), NetError> {
        ctx.timers.stop(TimerId::MqttPing);
        ctx.timers.stop(TimerId::MqttResend);
        self.pending = None;
        let was_up = self.state != MqttConnectionState::Disconnected;
        self.state = MqttConnectionState::Disconnected;
        let result = if tcp.is_established() {
            encode_empty(MqttPacketType::Disconnect)
                .and_then(|data| self.send_now(ctx, tcp, &data))
        } else {
            Ok(())
        };
        if was_up {
            log::info!("MQTT disconnected from {}", self.broker_ip);
            ctx.notify(StackEvent::MqttDisconnected);
        }
        result
    }

    pub(crate) fn ping(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
    ) -> Result<(), NetError> {
        let data = encode_empty(MqttPacketType::Pingreq)?;
        self.send_now(ctx, tcp, &data)
    }

    /// Returns the packet identifier now naming the topic.
    pub(crate) fn subscribe(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
        topic: &str,
    ) -> Result<u16, NetError> {
        TopicTable::validate_name(topic)?;
        if self.topics.topic_id(topic).is_some() {
            let e = NetError::new(
                ErrorKind::InvalidArgument,
                format!("Already subscribed to MQTT topic {topic}"),
            );
            log::error!("{e}");
            return Err(e);
        }
        if self.topics.is_full() {
            let e = NetError::new(
                ErrorKind::CapacityExceeded,
                format!("No free MQTT topic slot for {topic}"),
            );
            log::error!("{e}");
            return Err(e);
        }
        self.require_tcp(tcp)?;
        let id = self.new_packet_id();
        let data = encode_subscribe(id, topic, self.qos)?;
        self.queue(PendingMessage::new(
            data,
            Some(MqttPacketType::Suback),
            Some(id),
        ));
        self.flush(ctx, tcp)?;
        self.topics.insert(id, topic)?;
        log::info!("MQTT subscribed to {topic} as {id}");
        Ok(id)
    }

    pub(crate) fn unsubscribe(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
        topic: &str,
    ) -> Result<(), NetError> {
        let Some(id) = self.topics.topic_id(topic) else {
            let e = NetError::new(
                ErrorKind::NotFound,
                format!("Not subscribed to MQTT topic {topic}"),
            );
            log::error!("{e}");
            return Err(e);
        };
        self.require_tcp(tcp)?;
        let data = encode_unsubscribe(id, topic)?;
        self.topics.remove(id);
        self.queue(PendingMessage::new(
            data,
            Some(MqttPacketType::Unsuback),
            Some(id),
        ));
        log::info!("MQTT unsubscribed from {topic}");
        self.flush(ctx, tcp)
    }

    pub(crate) fn publish(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), NetError> {
        if topic.is_empty() {
            let e = NetError::new(
                ErrorKind::InvalidArgument,
                "MQTT topic name cannot be empty".to_string(),
            );
            log::error!("{e}");
            return Err(e);
        }
        self.require_tcp(tcp)?;
        let ack = match self.qos {
            MqttQos::AtMostOnce => {
                let data = encode_publish(topic, payload, self.qos, None)?;
                return self.send_now(ctx, tcp, &data);
            }
            MqttQos::AtLeastOnce => MqttPacketType::Puback,
            MqttQos::ExactlyOnce => MqttPacketType::Pubrec,
        };
        let id = self.new_packet_id();
        let data = encode_publish(topic, payload, self.qos, Some(id))?;
        self.queue(PendingMessage::new(data, Some(ack), Some(id)));
        self.flush(ctx, tcp)
    }

    /// Flush a message queued while the TCP handshake was in flight.
    pub(crate) fn tcp_established(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
    ) -> Result<(), NetError> {
        if self
            .pending
            .as_ref()
            .is_some_and(|m| m.state() == PendingState::Unsent)
        {
            self.flush(ctx, tcp)
        } else {
            Ok(())
        }
    }

    /// The broker side closed the TCP connection.
    pub(crate) fn tcp_closed(&mut self, ctx: &mut NetContext) {
        ctx.timers.stop(TimerId::MqttPing);
        ctx.timers.stop(TimerId::MqttResend);
        self.pending = None;
        if self.state != MqttConnectionState::Disconnected {
            log::info!("MQTT connection to {} closed", self.broker_ip);
            self.state = MqttConnectionState::Disconnected;
            ctx.notify(StackEvent::MqttDisconnected);
        }
    }

    pub(crate) fn process_timer(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
        id: TimerId,
    ) -> Result<(), NetError> {
        match id {
            TimerId::MqttPing => {
                if tcp.is_established() {
                    self.ping(ctx, tcp)
                } else {
                    log::debug!("Skipping MQTT ping without TCP connection");
                    Ok(())
                }
            }
            TimerId::MqttResend => self.resend(ctx, tcp),
            _ => Ok(()),
        }
    }

    fn resend(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
    ) -> Result<(), NetError> {
        let Some(msg) = self.pending.as_mut() else {
            ctx.timers.stop(TimerId::MqttResend);
            return Ok(());
        };
        if msg.is_done() {
            ctx.timers.stop(TimerId::MqttResend);
            return Ok(());
        }
        if msg.is_exhausted() {
            log::warn!(
                "MQTT message unacknowledged after {} sends, giving up",
                msg.sends()
            );
            msg.mark_timed_out();
            ctx.timers.stop(TimerId::MqttResend);
            if self.state == MqttConnectionState::Connecting {
                self.state = MqttConnectionState::Disconnected;
            }
            ctx.notify(StackEvent::MqttTimedOut);
            return Ok(());
        }
        if tcp.is_established() {
            log::debug!("Resending MQTT message, {} sends so far", msg.sends());
            self.flush(ctx, tcp)
        } else {
            msg.mark_attempt();
            log::debug!("Retrying TCP connection to {}", self.broker_ip);
            tcp.establish(
                ctx.iface,
                self.broker_mac,
                self.broker_ip,
                MQTT_BROKER_PORT,
                &mut *ctx.link,
            )
        }
    }

    fn acknowledge(
        &mut self,
        ctx: &mut NetContext,
        packet_type: MqttPacketType,
        packet_id: Option<u16>,
    ) {
        if self
            .pending
            .as_mut()
            .is_some_and(|m| m.acknowledge(packet_type, packet_id))
        {
            log::debug!("MQTT {packet_type} settled the pending message");
            ctx.timers.stop(TimerId::MqttResend);
        }
    }

    /// Handle every control packet carried by a TCP payload from the
    /// broker.
    pub(crate) fn process_payload(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
        payload: &[u8],
    ) -> Result<(), NetError> {
        let mut remains = payload;
        while !remains.is_empty() {
            let (packet, next) = MqttInbound::parse(remains)?;
            remains = next;
            self.process_packet(ctx, tcp, &packet)?;
        }
        Ok(())
    }

    fn subscription_rejected(&mut self, ctx: &mut NetContext, id: Option<u16>) {
        let Some(id) = id else {
            return;
        };
        let Some(topic) = self.topics.topic_name(id).map(str::to_string)
        else {
            log::warn!("MQTT broker rejected unknown subscription {id}");
            return;
        };
        log::warn!("MQTT broker rejected subscription to {topic}");
        self.topics.remove(id);
        ctx.notify(StackEvent::MqttSubscribeRejected(topic));
    }

    fn process_packet(
        &mut self,
        ctx: &mut NetContext,
        tcp: &mut TcpConnection,
        packet: &MqttInbound,
    ) -> Result<(), NetError> {
        let packet_type = match MqttPacketType::try_from(packet.packet_type) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("Ignoring MQTT packet: {e}");
                return Ok(());
            }
        };
        log::debug!("Got MQTT {packet_type} in state {}", self.state);
        match packet_type {
            MqttPacketType::Connack => {
                self.acknowledge(ctx, packet_type, None);
                let rc = packet.body.get(1).copied().unwrap_or_default();
                if rc == CONNACK_ACCEPTED {
                    log::info!("MQTT connected to {}", self.broker_ip);
                    self.state = MqttConnectionState::Connected;
                    ctx.timers.start_periodic(TimerId::MqttPing, PING_INTERVAL);
                    ctx.notify(StackEvent::MqttConnected);
                } else {
                    log::warn!("MQTT broker refused connection with code {rc}");
                    self.state = MqttConnectionState::Disconnected;
                    ctx.notify(StackEvent::MqttDisconnected);
                }
            }
            MqttPacketType::Pingresp => {
                log::debug!("MQTT heartbeat from {}", self.broker_ip);
                ctx.notify(StackEvent::MqttHeartbeat);
            }
            MqttPacketType::Suback => {
                self.acknowledge(ctx, packet_type, packet.packet_id());
                if packet.body.get(2) == Some(&SUBACK_FAILURE) {
                    self.subscription_rejected(ctx, packet.packet_id());
                }
            }
            MqttPacketType::Unsuback | MqttPacketType::Puback => {
                self.acknowledge(ctx, packet_type, packet.packet_id());
            }
            MqttPacketType::Pubrec => {
                self.acknowledge(ctx, packet_type, packet.packet_id());
                if let Some(id) = packet.packet_id() {
                    let data = encode_ack(MqttPacketType::Pubrel, id)?;
                    self.send_now(ctx, tcp, &data)?;
                }
            }
            MqttPacketType::Pubrel => {
                if let Some(id) = packet.packet_id() {
                    let data = encode_ack(MqttPacketType::Pubcomp, id)?;
                    self.send_now(ctx, tcp, &data)?;
                }
            }
            MqttPacketType::Publish => {
                let publish = MqttPublish::parse(packet)?;
                if let Some(id) = publish.packet_id {
                    let reply = match publish.qos {
                        MqttQos::ExactlyOnce => MqttPacketType::Pubrec,
                        _ => MqttPacketType::Puback,
                    };
                    let data = encode_ack(reply, id)?;
                    self.send_now(ctx, tcp, &data)?;
                }
                log::info!(
                    "MQTT message on {}{}",
                    publish.topic,
                    if publish.retain { " (retained)" } else { "" }
                );
                ctx.notify(StackEvent::MqttMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                });
            }
            _ => {
                log::debug!("Ignoring MQTT {packet_type}");
            }
        }
        Ok(())
    }
}
