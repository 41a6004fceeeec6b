// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer::{Buffer, BufferMut},
    ErrorContext, ErrorKind, NetError,
};

/// Remaining length travels in a single byte; 127 is the largest value the
/// one byte MQTT variable length encoding can carry.
pub(crate) const MAX_REMAINING_LEN: usize = 127;
const FIXED_HEADER_LEN: usize = 2;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4;
const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;
pub(crate) const KEEP_ALIVE_SECS: u16 = 60;

// Flags mandated on SUBSCRIBE, UNSUBSCRIBE and PUBREL
const FLAGS_RESERVED_QOS1: u8 = 0x02;
pub(crate) const FLAG_DUP: u8 = 0x08;
const FLAG_RETAIN: u8 = 0x01;

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum MqttQos {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl std::fmt::Display for MqttQos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl std::convert::TryFrom<u8> for MqttQos {
    type Error = NetError;

    fn try_from(d: u8) -> Result<Self, NetError> {
        match d {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            _ => Err(NetError::new(
                ErrorKind::InvalidArgument,
                format!("Invalid MQTT QoS {d}, should be 0, 1 or 2"),
            )),
        }
    }
}

impl MqttQos {
    fn publish_flags(&self) -> u8 {
        (*self as u8) << 1
    }
}

/// MQTT 3.1.1 control packet types.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MqttPacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl std::fmt::Display for MqttPacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Connect => "CONNECT",
                Self::Connack => "CONNACK",
                Self::Publish => "PUBLISH",
                Self::Puback => "PUBACK",
                Self::Pubrec => "PUBREC",
                Self::Pubrel => "PUBREL",
                Self::Pubcomp => "PUBCOMP",
                Self::Subscribe => "SUBSCRIBE",
                Self::Suback => "SUBACK",
                Self::Unsubscribe => "UNSUBSCRIBE",
                Self::Unsuback => "UNSUBACK",
                Self::Pingreq => "PINGREQ",
                Self::Pingresp => "PINGRESP",
                Self::Disconnect => "DISCONNECT",
            }
        )
    }
}

impl std::convert::TryFrom<u8> for MqttPacketType {
    type Error = NetError;

    fn try_from(d: u8) -> Result<Self, NetError> {
        Ok(match d {
            1 => Self::Connect,
            2 => Self::Connack,
            3 => Self::Publish,
            4 => Self::Puback,
            5 => Self::Pubrec,
            6 => Self::Pubrel,
            7 => Self::Pubcomp,
            8 => Self::Subscribe,
            9 => Self::Suback,
            10 => Self::Unsubscribe,
            11 => Self::Unsuback,
            12 => Self::Pingreq,
            13 => Self::Pingresp,
            14 => Self::Disconnect,
            _ => {
                return Err(NetError::new(
                    ErrorKind::NotSupported,
                    format!("MQTT control packet type {d} is not supported"),
                ));
            }
        })
    }
}

/// Start a packet with its fixed header once the remaining length is known.
fn new_packet(
    packet_type: MqttPacketType,
    flags: u8,
    remaining_len: usize,
) -> Result<BufferMut, NetError> {
    if remaining_len > MAX_REMAINING_LEN {
        let e = NetError::new(
            ErrorKind::CapacityExceeded,
            format!(
                "MQTT {packet_type} remaining length {remaining_len} exceeds \
                 {MAX_REMAINING_LEN}"
            ),
        );
        log::error!("{e}");
        return Err(e);
    }
    let mut buf = BufferMut::new(FIXED_HEADER_LEN + remaining_len);
    buf.write_u8(((packet_type as u8) << 4) | (flags & 0x0f))?;
    buf.write_u8(remaining_len as u8)?;
    Ok(buf)
}

fn str_len(s: &[u8]) -> Result<u16, NetError> {
    u16::try_from(s.len()).map_err(|_| {
        NetError::new(
            ErrorKind::CapacityExceeded,
            format!("MQTT string of {} bytes is too long", s.len()),
        )
    })
}

pub(crate) fn encode_connect(client_id: &str) -> Result<Vec<u8>, NetError> {
    let client_id = client_id.as_bytes();
    // name length(2) + name + level + flags + keep alive(2) + id length(2)
    let remaining_len = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + client_id.len();
    let mut buf = new_packet(MqttPacketType::Connect, 0, remaining_len)?;
    buf.write_u16_be(PROTOCOL_NAME.len() as u16)?;
    buf.write_bytes(PROTOCOL_NAME)?;
    buf.write_u8(PROTOCOL_LEVEL)?;
    buf.write_u8(CONNECT_FLAG_CLEAN_SESSION)?;
    buf.write_u16_be(KEEP_ALIVE_SECS)?;
    buf.write_u16_be(str_len(client_id)?)?;
    buf.write_bytes(client_id)?;
    Ok(buf.data)
}

pub(crate) fn encode_subscribe(
    packet_id: u16,
    topic: &str,
    qos: MqttQos,
) -> Result<Vec<u8>, NetError> {
    let topic = topic.as_bytes();
    let remaining_len = 2 + 2 + topic.len() + 1;
    let mut buf = new_packet(
        MqttPacketType::Subscribe,
        FLAGS_RESERVED_QOS1,
        remaining_len,
    )?;
    buf.write_u16_be(packet_id)?;
    buf.write_u16_be(str_len(topic)?)?;
    buf.write_bytes(topic)?;
    buf.write_u8(qos as u8)?;
    Ok(buf.data)
}

pub(crate) fn encode_unsubscribe(
    packet_id: u16,
    topic: &str,
) -> Result<Vec<u8>, NetError> {
    let topic = topic.as_bytes();
    let remaining_len = 2 + 2 + topic.len();
    let mut buf = new_packet(
        MqttPacketType::Unsubscribe,
        FLAGS_RESERVED_QOS1,
        remaining_len,
    )?;
    buf.write_u16_be(packet_id)?;
    buf.write_u16_be(str_len(topic)?)?;
    buf.write_bytes(topic)?;
    Ok(buf.data)
}

/// The packet identifier is only present for QoS 1 and 2.
pub(crate) fn encode_publish(
    topic: &str,
    payload: &[u8],
    qos: MqttQos,
    packet_id: Option<u16>,
) -> Result<Vec<u8>, NetError> {
    let topic = topic.as_bytes();
    let packet_id = if qos == MqttQos::AtMostOnce {
        None
    } else {
        Some(packet_id.ok_or_else(|| {
            let e = NetError::new(
                ErrorKind::Bug,
                format!("MQTT PUBLISH with QoS {qos} needs a packet id"),
            );
            log::error!("{e}");
            e
        })?)
    };
    let remaining_len = 2
        + topic.len()
        + if packet_id.is_some() { 2 } else { 0 }
        + payload.len();
    let mut buf = new_packet(
        MqttPacketType::Publish,
        qos.publish_flags(),
        remaining_len,
    )?;
    buf.write_u16_be(str_len(topic)?)?;
    buf.write_bytes(topic)?;
    if let Some(packet_id) = packet_id {
        buf.write_u16_be(packet_id)?;
    }
    buf.write_bytes(payload)?;
    Ok(buf.data)
}

/// PUBACK, PUBREC, PUBREL or PUBCOMP for `packet_id`.
pub(crate) fn encode_ack(
    packet_type: MqttPacketType,
    packet_id: u16,
) -> Result<Vec<u8>, NetError> {
    let flags = if packet_type == MqttPacketType::Pubrel {
        FLAGS_RESERVED_QOS1
    } else {
        0
    };
    let mut buf = new_packet(packet_type, flags, 2)?;
    buf.write_u16_be(packet_id)?;
    Ok(buf.data)
}

/// Zero length packets: PINGREQ and DISCONNECT.
pub(crate) fn encode_empty(
    packet_type: MqttPacketType,
) -> Result<Vec<u8>, NetError> {
    Ok(new_packet(packet_type, 0, 0)?.data)
}

/// One control packet split off the front of a TCP payload.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct MqttInbound<'a> {
    pub(crate) packet_type: u8,
    pub(crate) flags: u8,
    pub(crate) body: &'a [u8],
}

impl<'a> MqttInbound<'a> {
    /// Returns the packet and the bytes following it.
    pub(crate) fn parse(data: &'a [u8]) -> Result<(Self, &'a [u8]), NetError> {
        let mut buf = Buffer::new(data);
        let first = buf.get_u8().context("Invalid MQTT fixed header")?;
        let remaining_len =
            buf.get_u8().context("Invalid MQTT remaining length")?;
        if remaining_len & 0x80 != 0 {
            return Err(NetError::new(
                ErrorKind::NotSupported,
                format!(
                    "Multi-byte MQTT remaining length {remaining_len:#04x} \
                     is not supported"
                ),
            ));
        }
        let body = buf
            .get_bytes(usize::from(remaining_len))
            .context("Truncated MQTT packet")?;
        Ok((
            Self {
                packet_type: first >> 4,
                flags: first & 0x0f,
                body,
            },
            buf.get_remains(),
        ))
    }

    /// Leading packet identifier of acknowledgement packets.
    pub(crate) fn packet_id(&self) -> Option<u16> {
        self.body
            .get(..2)
            .map(|d| u16::from_be_bytes([d[0], d[1]]))
    }
}

/// Application message delivered by the broker.
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct MqttPublish {
    pub(crate) topic: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) qos: MqttQos,
    pub(crate) packet_id: Option<u16>,
    pub(crate) retain: bool,
}

impl MqttPublish {
    pub(crate) fn parse(packet: &MqttInbound) -> Result<Self, NetError> {
        let qos = MqttQos::try_from((packet.flags >> 1) & 0x03)?;
        let mut buf = Buffer::new(packet.body);
        let topic_len =
            buf.get_u16_be().context("Invalid MQTT PUBLISH topic length")?;
        let topic = buf
            .get_bytes(usize::from(topic_len))
            .context("Invalid MQTT PUBLISH topic")?;
        let packet_id = if qos == MqttQos::AtMostOnce {
            None
        } else {
            Some(
                buf.get_u16_be()
                    .context("Invalid MQTT PUBLISH packet identifier")?,
            )
        };
        Ok(Self {
            topic: String::from_utf8_lossy(topic).to_string(),
            payload: buf.get_remains().to_vec(),
            qos,
            packet_id,
            retain: packet.flags & FLAG_RETAIN != 0,
        })
    }
}
