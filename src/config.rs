// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::{mac::ETH_ALEN, MacAddr, MqttQos};

// https://www.iana.org/assignments/arp-parameters/arp-parameters.xhtml#arp-parameters-2
const ARP_HW_TYPE_ETHERNET: u8 = 1;

const DEFAULT_MAC: MacAddr = MacAddr([2, 3, 4, 5, 6, 131]);
const DEFAULT_HOST_NAME: &str = "IoT Node";
const DEFAULT_BROKER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 199);
const DEFAULT_MQTT_CLIENT_ID: &str = "hello";
const HTTP_PORT: u16 = 80;
const TELNET_PORT: u16 = 23;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NodeConfig {
    pub(crate) mac: MacAddr,
    pub(crate) ip: Ipv4Addr,
    pub(crate) subnet_mask: Ipv4Addr,
    pub(crate) gateway: Ipv4Addr,
    pub(crate) dns: Ipv4Addr,
    pub(crate) dhcp_enabled: bool,
    pub(crate) host_name: String,
    pub(crate) client_id: Vec<u8>,
    pub(crate) requested_ip: Option<Ipv4Addr>,
    pub(crate) broker_ip: Ipv4Addr,
    /// Used when the broker has not been seen in ARP traffic.
    pub(crate) broker_mac: MacAddr,
    pub(crate) mqtt_client_id: String,
    pub(crate) mqtt_qos: MqttQos,
    pub(crate) listen_ports: Vec<u16>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut ret = Self {
            mac: DEFAULT_MAC,
            ip: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns: Ipv4Addr::UNSPECIFIED,
            dhcp_enabled: true,
            host_name: DEFAULT_HOST_NAME.to_string(),
            client_id: Vec::new(),
            requested_ip: None,
            broker_ip: DEFAULT_BROKER_IP,
            broker_mac: MacAddr::BROADCAST,
            mqtt_client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
            mqtt_qos: MqttQos::AtMostOnce,
            listen_ports: vec![HTTP_PORT, TELNET_PORT],
        };
        ret.use_mac_as_client_id();
        ret
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn client_id(&self) -> &[u8] {
        self.client_id.as_slice()
    }

    /// Also refreshes a MAC based DHCP client identifier.
    pub fn set_mac(&mut self, mac: MacAddr) -> &mut Self {
        let mac_based = self.is_mac_client_id();
        self.mac = mac;
        if mac_based {
            self.use_mac_as_client_id();
        }
        self
    }

    /// Static addressing, used when DHCP is disabled.
    pub fn set_static_ip(
        &mut self,
        ip: Ipv4Addr,
        subnet_mask: Ipv4Addr,
        gateway: Ipv4Addr,
        dns: Ipv4Addr,
    ) -> &mut Self {
        self.ip = ip;
        self.subnet_mask = subnet_mask;
        self.gateway = gateway;
        self.dns = dns;
        self
    }

    pub fn set_dhcp_enabled(&mut self, enabled: bool) -> &mut Self {
        self.dhcp_enabled = enabled;
        self
    }

    pub fn set_host_name(&mut self, host_name: &str) -> &mut Self {
        self.host_name = host_name.to_string();
        self
    }

    pub fn use_mac_as_client_id(&mut self) -> &mut Self {
        let mac = self.mac.octets();
        self.set_client_id(ARP_HW_TYPE_ETHERNET, &mac)
    }

    pub fn set_client_id(
        &mut self,
        client_id_type: u8,
        client_id: &[u8],
    ) -> &mut Self {
        // RFC 2132: 9.14. Client-identifier
        self.client_id = vec![client_id_type];
        self.client_id.extend_from_slice(client_id);
        self
    }

    /// Ask the DHCP server for a specific address in DISCOVER.
    pub fn set_requested_ip(&mut self, ip: Option<Ipv4Addr>) -> &mut Self {
        self.requested_ip = ip;
        self
    }

    pub fn set_broker_ip(&mut self, ip: Ipv4Addr) -> &mut Self {
        self.broker_ip = ip;
        self
    }

    pub fn set_broker_mac(&mut self, mac: MacAddr) -> &mut Self {
        self.broker_mac = mac;
        self
    }

    pub fn set_mqtt_client_id(&mut self, client_id: &str) -> &mut Self {
        self.mqtt_client_id = client_id.to_string();
        self
    }

    pub fn set_mqtt_qos(&mut self, qos: MqttQos) -> &mut Self {
        self.mqtt_qos = qos;
        self
    }

    pub fn set_listen_ports(&mut self, ports: &[u16]) -> &mut Self {
        self.listen_ports = ports.to_vec();
        self
    }

    fn is_mac_client_id(&self) -> bool {
        self.client_id.len() == ETH_ALEN + 1
            && self.client_id[0] == ARP_HW_TYPE_ETHERNET
            && self.client_id[1..] == self.mac.octets()
    }
}
