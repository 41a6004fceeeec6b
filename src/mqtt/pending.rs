// SPDX-License-Identifier: Apache-2.0

use super::packet::{MqttPacketType, FLAG_DUP};

pub(crate) const RESEND_INTERVAL: u32 = 15;
/// Sends of one message before it is given up.
pub(crate) const MAX_SENDS: u32 = 8;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum PendingState {
    #[default]
    Unsent,
    Sent,
    Acknowledged,
    TimedOut,
}

impl std::fmt::Display for PendingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Unsent => "unsent",
                Self::Sent => "sent",
                Self::Acknowledged => "acknowledged",
                Self::TimedOut => "timed_out",
            }
        )
    }
}

/// The one outbound message waiting for the broker.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PendingMessage {
    data: Vec<u8>,
    state: PendingState,
    /// Packet type acknowledging this message, `None` for fire and forget.
    ack: Option<MqttPacketType>,
    packet_id: Option<u16>,
    sends: u32,
}

impl PendingMessage {
    pub(crate) fn new(
        data: Vec<u8>,
        ack: Option<MqttPacketType>,
        packet_id: Option<u16>,
    ) -> Self {
        Self {
            data,
            state: PendingState::Unsent,
            ack,
            packet_id,
            sends: 0,
        }
    }

    pub fn state(&self) -> PendingState {
        self.state
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn sends(&self) -> u32 {
        self.sends
    }

    pub fn packet_id(&self) -> Option<u16> {
        self.packet_id
    }

    pub fn expects_ack(&self) -> bool {
        self.ack.is_some()
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.state,
            PendingState::Acknowledged | PendingState::TimedOut
        )
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.sends >= MAX_SENDS
    }

    /// Bytes for the next transmission. A PUBLISH sent again carries DUP.
    pub(crate) fn next_transmission(&mut self) -> &[u8] {
        if self.sends > 0
            && self.data.first().is_some_and(|b| {
                b >> 4 == MqttPacketType::Publish as u8
            })
        {
            self.data[0] |= FLAG_DUP;
        }
        self.data.as_slice()
    }

    /// Count a send attempt that could not reach the broker.
    pub(crate) fn mark_attempt(&mut self) {
        self.sends += 1;
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sends += 1;
        self.state = if self.ack.is_some() {
            PendingState::Sent
        } else {
            PendingState::Acknowledged
        };
    }

    pub(crate) fn mark_timed_out(&mut self) {
        self.state = PendingState::TimedOut;
    }

    /// Mark acknowledged when `packet_type` with `packet_id` answers this
    /// message. CONNACK carries no identifier.
    pub(crate) fn acknowledge(
        &mut self,
        packet_type: MqttPacketType,
        packet_id: Option<u16>,
    ) -> bool {
        if self.is_done() || self.ack != Some(packet_type) {
            return false;
        }
        if self.packet_id.is_some() && self.packet_id != packet_id {
            return false;
        }
        self.state = PendingState::Acknowledged;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_matches_type_and_id() {
        let mut msg = PendingMessage::new(
            vec![0x82, 0],
            Some(MqttPacketType::Suback),
            Some(4),
        );
        msg.mark_sent();
        assert_eq!(msg.state(), PendingState::Sent);
        assert!(!msg.acknowledge(MqttPacketType::Unsuback, Some(4)));
        assert!(!msg.acknowledge(MqttPacketType::Suback, Some(5)));
        assert!(msg.acknowledge(MqttPacketType::Suback, Some(4)));
        assert_eq!(msg.state(), PendingState::Acknowledged);
        assert!(!msg.acknowledge(MqttPacketType::Suback, Some(4)));
    }

    #[test]
    fn test_publish_resend_sets_dup() {
        let mut msg = PendingMessage::new(
            vec![0x32, 0],
            Some(MqttPacketType::Puback),
            Some(1),
        );
        assert_eq!(msg.next_transmission()[0], 0x32);
        msg.mark_sent();
        assert_eq!(msg.next_transmission()[0], 0x3a);

        let mut msg =
            PendingMessage::new(vec![0x10, 0], Some(MqttPacketType::Connack), None);
        msg.mark_sent();
        assert_eq!(msg.next_transmission()[0], 0x10);
        assert!(msg.acknowledge(MqttPacketType::Connack, None));
    }

    #[test]
    fn test_exhaustion() {
        let mut msg =
            PendingMessage::new(vec![0x10, 0], Some(MqttPacketType::Connack), None);
        for _ in 0..MAX_SENDS {
            assert!(!msg.is_exhausted());
            msg.mark_sent();
        }
        assert!(msg.is_exhausted());
        msg.mark_timed_out();
        assert!(msg.is_done());
    }
}
