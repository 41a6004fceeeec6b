// SPDX-License-Identifier: Apache-2.0

mod client;
mod lease;
mod msg;
mod option;
mod state;
mod time;

pub use self::{
    client::{DhcpClient, DhcpRetryCounters},
    lease::DhcpLease,
    msg::{DhcpMessageType, DHCP_XID},
    option::DhcpOptionCode,
    state::DhcpState,
};
pub(crate) use self::msg::is_dhcp_reply;

#[cfg(test)]
pub(crate) use self::msg::{
    tests::{server_reply, SERVER_IP, SERVER_MAC},
    DhcpReply, CLIENT_PORT, SERVER_PORT,
};
