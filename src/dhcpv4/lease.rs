// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use super::msg::DhcpReply;
use crate::MacAddr;

/// Address offered or acknowledged by a DHCP server.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpLease {
    /// Your(Client) IP address
    pub yiaddr: Ipv4Addr,
    pub srv_id: Ipv4Addr,
    /// Hardware address the offer came from
    pub srv_mac: MacAddr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub lease_time_sec: u32,
    /// Set when ARP probing found the address already claimed.
    pub ip_in_use: bool,
}

impl Default for DhcpLease {
    fn default() -> Self {
        Self {
            yiaddr: Ipv4Addr::UNSPECIFIED,
            srv_id: Ipv4Addr::UNSPECIFIED,
            srv_mac: MacAddr::BROADCAST,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns: Ipv4Addr::UNSPECIFIED,
            lease_time_sec: 0,
            ip_in_use: false,
        }
    }
}

impl From<&DhcpReply> for DhcpLease {
    fn from(reply: &DhcpReply) -> Self {
        let opts = &reply.options;
        Self {
            yiaddr: reply.yiaddr,
            srv_id: opts.server_id.unwrap_or(Ipv4Addr::UNSPECIFIED),
            srv_mac: reply.server_mac,
            subnet_mask: opts.subnet_mask.unwrap_or(Ipv4Addr::UNSPECIFIED),
            gateway: opts.router.unwrap_or(Ipv4Addr::UNSPECIFIED),
            dns: opts.dns.unwrap_or(Ipv4Addr::UNSPECIFIED),
            lease_time_sec: opts.lease_time.unwrap_or_default(),
            ip_in_use: false,
        }
    }
}

impl std::fmt::Display for DhcpLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} gw {} dns {} from {} for {}s",
            self.yiaddr,
            self.subnet_mask,
            self.gateway,
            self.dns,
            self.srv_id,
            self.lease_time_sec
        )
    }
}
