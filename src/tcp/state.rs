// SPDX-License-Identifier: Apache-2.0

/// TCP connection state of the single supported connection.
///
/// Only `Listen`, `SynSent` and `Established` are reached by the transition
/// logic; closing is collapsed straight back into `Listen`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum TcpState {
    #[default]
    Listen,
    SynReceived,
    SynSent,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
}

impl std::fmt::Display for TcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Listen => "LISTEN",
                Self::SynReceived => "SYN_RECEIVED",
                Self::SynSent => "SYN_SENT",
                Self::Established => "ESTABLISHED",
                Self::FinWait1 => "FIN_WAIT_1",
                Self::FinWait2 => "FIN_WAIT_2",
                Self::Closing => "CLOSING",
                Self::TimeWait => "TIME_WAIT",
            }
        )
    }
}
