// SPDX-License-Identifier: Apache-2.0

mod arp;
mod buffer;
mod checksum;
mod cli;
mod config;
mod context;
mod datagram;
mod dhcpv4;
mod error;
mod event;
mod frame;
mod iface;
mod link;
mod mac;
mod mqtt;
#[cfg(feature = "netlink")]
mod netlink;
mod raw_socket;
mod runner;
mod stack;
mod tcp;
mod timer;

#[cfg(test)]
mod integ_tests;

pub use crate::arp::{ArpCache, ArpOperation, ArpPacket};
pub use crate::checksum::{checksum, Checksum};
pub use crate::cli::{Command, DhcpCommand, HelpTopic, SetTarget};
pub use crate::config::NodeConfig;
pub use crate::datagram::UDP_REPLY;
pub use crate::dhcpv4::{
    DhcpClient, DhcpLease, DhcpMessageType, DhcpOptionCode,
    DhcpRetryCounters, DhcpState, DHCP_XID,
};
pub use crate::error::{ErrorKind, NetError};
pub use crate::event::StackEvent;
pub use crate::frame::{
    EthernetHeader, Ipv4Frame, Ipv4Header, TcpHeader, TcpSegment,
    UdpDatagram, UdpHeader, ETHER_TYPE_ARP, ETHER_TYPE_IPV4, IP_PROTO_ICMP,
    IP_PROTO_TCP, IP_PROTO_UDP, MAX_PACKET_SIZE,
};
pub use crate::iface::Interface;
pub use crate::link::{Link, MemoryLink};
pub use crate::mac::MacAddr;
pub use crate::mqtt::{
    MqttClient, MqttConnectionState, MqttPacketType, MqttQos, MqttTopic,
    PendingMessage, PendingState, TopicTable, FREE_TOPIC_ID,
    MAX_SUBSCRIBED_TOPICS, MAX_TOPIC_NAME_LEN,
};
pub use crate::raw_socket::RawEthLink;
pub use crate::runner::run;
pub use crate::stack::Stack;
pub use crate::tcp::{
    TcpConnection, TcpFlags, TcpOutcome, TcpState, MQTT_BROKER_PORT,
};
pub use crate::timer::{TimerId, TimerQueue, Timers};

pub(crate) use crate::error::ErrorContext;
