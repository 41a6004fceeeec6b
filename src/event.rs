// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::DhcpLease;

/// Notifications for the application driving the stack.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum StackEvent {
    /// DHCP committed a lease to the interface.
    DhcpBound(DhcpLease),
    /// The lease expired or was withdrawn, the address is gone.
    DhcpLeaseLost,
    /// The ARP probe found the offered address in use.
    DhcpAddressConflict(Ipv4Addr),
    MqttConnected,
    /// PINGRESP received from the broker.
    MqttHeartbeat,
    /// PUBLISH received for a subscribed topic.
    MqttMessage { topic: String, payload: Vec<u8> },
    /// The broker refused a subscription, its topic slot was freed.
    MqttSubscribeRejected(String),
    /// A message waiting for acknowledgement was given up.
    MqttTimedOut,
    MqttDisconnected,
    /// Unicast UDP datagram addressed to the device.
    UdpDatagram {
        src_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        payload: Vec<u8>,
    },
}

impl std::fmt::Display for StackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DhcpBound(lease) => write!(f, "dhcp_bound({lease})"),
            Self::DhcpLeaseLost => write!(f, "dhcp_lease_lost"),
            Self::DhcpAddressConflict(ip) => {
                write!(f, "dhcp_address_conflict({ip})")
            }
            Self::MqttConnected => write!(f, "mqtt_connected"),
            Self::MqttHeartbeat => write!(f, "mqtt_heartbeat"),
            Self::MqttMessage { topic, payload } => write!(
                f,
                "mqtt_message({topic}: {})",
                String::from_utf8_lossy(payload)
            ),
            Self::MqttSubscribeRejected(topic) => {
                write!(f, "mqtt_subscribe_rejected({topic})")
            }
            Self::MqttTimedOut => write!(f, "mqtt_timed_out"),
            Self::MqttDisconnected => write!(f, "mqtt_disconnected"),
            Self::UdpDatagram {
                src_ip,
                src_port,
                dst_port,
                payload,
            } => write!(
                f,
                "udp({src_ip}:{src_port} -> {dst_port}, {} bytes)",
                payload.len()
            ),
        }
    }
}
