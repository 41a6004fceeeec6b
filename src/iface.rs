// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::MacAddr;

/// Network identity of the device, either configured statically or
/// committed by the DHCP client.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Interface {
    mac: MacAddr,
    ip: Ipv4Addr,
    subnet_mask: Ipv4Addr,
    gateway: Ipv4Addr,
    dns: Ipv4Addr,
    dhcp_enabled: bool,
}

impl Default for Interface {
    fn default() -> Self {
        Self {
            mac: MacAddr::ZERO,
            ip: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns: Ipv4Addr::UNSPECIFIED,
            dhcp_enabled: false,
        }
    }
}

impl Interface {
    pub fn new(mac: MacAddr) -> Self {
        Self {
            mac,
            ..Default::default()
        }
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn subnet_mask(&self) -> Ipv4Addr {
        self.subnet_mask
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn dns(&self) -> Ipv4Addr {
        self.dns
    }

    pub fn is_dhcp_enabled(&self) -> bool {
        self.dhcp_enabled
    }

    /// Whether an address has been configured or leased.
    pub fn has_ip(&self) -> bool {
        !self.ip.is_unspecified()
    }

    pub fn set_mac(&mut self, mac: MacAddr) -> &mut Self {
        self.mac = mac;
        self
    }

    pub fn set_ip(&mut self, ip: Ipv4Addr) -> &mut Self {
        self.ip = ip;
        self
    }

    pub fn set_subnet_mask(&mut self, mask: Ipv4Addr) -> &mut Self {
        self.subnet_mask = mask;
        self
    }

    pub fn set_gateway(&mut self, gateway: Ipv4Addr) -> &mut Self {
        self.gateway = gateway;
        self
    }

    pub fn set_dns(&mut self, dns: Ipv4Addr) -> &mut Self {
        self.dns = dns;
        self
    }

    pub fn set_dhcp_enabled(&mut self, enabled: bool) -> &mut Self {
        self.dhcp_enabled = enabled;
        self
    }

    /// Forget every address, keeping the MAC and DHCP flag.
    pub fn clear_addresses(&mut self) {
        self.ip = Ipv4Addr::UNSPECIFIED;
        self.subnet_mask = Ipv4Addr::UNSPECIFIED;
        self.gateway = Ipv4Addr::UNSPECIFIED;
        self.dns = Ipv4Addr::UNSPECIFIED;
    }

    /// Text of the `ifconfig` command.
    pub fn ifconfig(&self, link_up: bool) -> String {
        format!(
            "HW: {}\nIP: {} ({})\nSN: {}\nGW: {}\nDNS: {}\nLink is {}\n",
            self.mac,
            self.ip,
            if self.dhcp_enabled { "dhcp" } else { "static" },
            self.subnet_mask,
            self.gateway,
            self.dns,
            if link_up { "up" } else { "down" },
        )
    }
}
