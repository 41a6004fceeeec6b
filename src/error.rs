// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidArgument,
    InvalidPacket,
    CapacityExceeded,
    NotFound,
    NotSupported,
    Timeout,
    Bug,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NetError {
    kind: ErrorKind,
    msg: String,
}

impl NetError {
    pub fn new(kind: ErrorKind, msg: String) -> Self {
        Self { kind, msg }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn msg(&self) -> &str {
        self.msg.as_str()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for NetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for NetError {}

pub(crate) trait ErrorContext<T> {
    fn context<C: std::fmt::Display>(self, msg: C) -> Result<T, NetError>;
}

impl<T> ErrorContext<T> for Result<T, NetError> {
    fn context<C: std::fmt::Display>(self, msg: C) -> Result<T, NetError> {
        self.map_err(|e| NetError::new(e.kind, format!("{msg}: {}", e.msg)))
    }
}

impl From<std::io::Error> for NetError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Bug, format!("IO error: {e}"))
    }
}

impl From<std::net::AddrParseError> for NetError {
    fn from(e: std::net::AddrParseError) -> Self {
        Self::new(
            ErrorKind::InvalidArgument,
            format!("IPv4 address parse error: {e}"),
        )
    }
}

impl From<nix::errno::Errno> for NetError {
    fn from(e: nix::errno::Errno) -> Self {
        Self::new(ErrorKind::Bug, format!("System call failed: {e}"))
    }
}

#[cfg(feature = "netlink")]
impl From<rtnetlink::Error> for NetError {
    fn from(e: rtnetlink::Error) -> Self {
        Self::new(ErrorKind::Bug, format!("Netlink error: {e}"))
    }
}
