// SPDX-License-Identifier: Apache-2.0

/// DHCPv4 client state (RFC 2131 figure 5, without INIT-REBOOT and
/// REBOOTING).
#[derive(Debug, PartialEq, Clone, Copy, Eq, Default)]
pub enum DhcpState {
    /// Broadcasting DHCPDISCOVER and waiting DHCPOFFER
    #[default]
    Init,
    /// Transient: an offer was picked, discovery stops
    Selecting,
    /// Broadcasting DHCPREQUEST and waiting DHCPACK
    Requesting,
    /// ARP probing the acknowledged address before using it
    IpValidating,
    /// Lease committed, waiting T1/T2 to refresh it
    Bound,
    /// T1 expired, sending unicast DHCPREQUEST to the leasing server
    Renewing,
    /// T2 expired, sending broadcast DHCPREQUEST to any server
    Rebinding,
}

impl std::fmt::Display for DhcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Selecting => write!(f, "selecting"),
            Self::Requesting => write!(f, "requesting"),
            Self::IpValidating => write!(f, "ip_validating"),
            Self::Bound => write!(f, "bound"),
            Self::Renewing => write!(f, "renewing"),
            Self::Rebinding => write!(f, "rebinding"),
        }
    }
}

impl DhcpState {
    /// States in which the client owns its address and fills `ciaddr`.
    pub fn has_lease(&self) -> bool {
        matches!(self, Self::Bound | Self::Renewing | Self::Rebinding)
    }
}
