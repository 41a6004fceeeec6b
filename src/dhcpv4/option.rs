// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use super::msg::DhcpMessageType;
use crate::{buffer::BufferMut, ErrorKind, NetError};

/// Options area limit from RFC 2131 (minimum 312 octets a client must
/// accept).
pub(crate) const MAX_OPTIONS_SIZE: usize = 312;

/// DHCPv4 option code(u8) defined by RFC 2132, limited to the ones this
/// client sends or reads.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub enum DhcpOptionCode {
    Pad,
    SubnetMask,
    Router,
    DomainNameServer,
    HostName,
    DomainName,
    RequestedIpAddress,
    IpAddressLeaseTime,
    MessageType,
    ServerIdentifier,
    ParameterRequestList,
    ClientIdentifier,
    End,
    Other(u8),
}

const CODE_PAD: u8 = 0;
const CODE_SUBNET_MASK: u8 = 1;
const CODE_ROUTER: u8 = 3;
const CODE_DOMAIN_NAME_SERVER: u8 = 6;
const CODE_HOST_NAME: u8 = 12;
const CODE_DOMAIN_NAME: u8 = 15;
const CODE_REQUESTED_IP_ADDRESS: u8 = 50;
const CODE_IP_ADDRESS_LEASE_TIME: u8 = 51;
const CODE_MESSAGE_TYPE: u8 = 53;
const CODE_SERVER_IDENTIFIER: u8 = 54;
const CODE_PARAMETER_REQUEST_LIST: u8 = 55;
const CODE_CLIENT_IDENTIFIER: u8 = 61;
const CODE_END: u8 = 255;

impl From<DhcpOptionCode> for u8 {
    fn from(v: DhcpOptionCode) -> u8 {
        match v {
            DhcpOptionCode::Pad => CODE_PAD,
            DhcpOptionCode::SubnetMask => CODE_SUBNET_MASK,
            DhcpOptionCode::Router => CODE_ROUTER,
            DhcpOptionCode::DomainNameServer => CODE_DOMAIN_NAME_SERVER,
            DhcpOptionCode::HostName => CODE_HOST_NAME,
            DhcpOptionCode::DomainName => CODE_DOMAIN_NAME,
            DhcpOptionCode::RequestedIpAddress => CODE_REQUESTED_IP_ADDRESS,
            DhcpOptionCode::IpAddressLeaseTime => CODE_IP_ADDRESS_LEASE_TIME,
            DhcpOptionCode::MessageType => CODE_MESSAGE_TYPE,
            DhcpOptionCode::ServerIdentifier => CODE_SERVER_IDENTIFIER,
            DhcpOptionCode::ParameterRequestList => {
                CODE_PARAMETER_REQUEST_LIST
            }
            DhcpOptionCode::ClientIdentifier => CODE_CLIENT_IDENTIFIER,
            DhcpOptionCode::End => CODE_END,
            DhcpOptionCode::Other(d) => d,
        }
    }
}

impl From<u8> for DhcpOptionCode {
    fn from(d: u8) -> Self {
        match d {
            CODE_PAD => Self::Pad,
            CODE_SUBNET_MASK => Self::SubnetMask,
            CODE_ROUTER => Self::Router,
            CODE_DOMAIN_NAME_SERVER => Self::DomainNameServer,
            CODE_HOST_NAME => Self::HostName,
            CODE_DOMAIN_NAME => Self::DomainName,
            CODE_REQUESTED_IP_ADDRESS => Self::RequestedIpAddress,
            CODE_IP_ADDRESS_LEASE_TIME => Self::IpAddressLeaseTime,
            CODE_MESSAGE_TYPE => Self::MessageType,
            CODE_SERVER_IDENTIFIER => Self::ServerIdentifier,
            CODE_PARAMETER_REQUEST_LIST => Self::ParameterRequestList,
            CODE_CLIENT_IDENTIFIER => Self::ClientIdentifier,
            CODE_END => Self::End,
            _ => Self::Other(d),
        }
    }
}

/// Parameters asked from the server in DISCOVER and REQUEST.
pub(crate) const PARAMETER_REQUEST_LIST: [DhcpOptionCode; 4] = [
    DhcpOptionCode::SubnetMask,
    DhcpOptionCode::Router,
    DhcpOptionCode::DomainNameServer,
    DhcpOptionCode::DomainName,
];

/// Write one (code, length, value) triplet, returning the number of bytes
/// written.
pub(crate) fn append_option(
    buf: &mut BufferMut,
    code: DhcpOptionCode,
    data: &[u8],
) -> Result<usize, NetError> {
    let len = u8::try_from(data.len()).map_err(|_| {
        let e = NetError::new(
            ErrorKind::InvalidArgument,
            format!(
                "DHCP option {} value of {} bytes exceeds 255",
                u8::from(code),
                data.len()
            ),
        );
        log::error!("{e}");
        e
    })?;
    buf.write_u8(code.into())?;
    buf.write_u8(len)?;
    buf.write_bytes(data)?;
    Ok(data.len() + 2)
}

/// The END marker is a single byte without length.
pub(crate) fn append_end(buf: &mut BufferMut) -> Result<usize, NetError> {
    buf.write_u8(DhcpOptionCode::End.into())?;
    Ok(1)
}

/// Values captured from the options of a server reply.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub(crate) struct DhcpReplyOptions {
    pub(crate) message_type: Option<DhcpMessageType>,
    pub(crate) server_id: Option<Ipv4Addr>,
    pub(crate) lease_time: Option<u32>,
    pub(crate) subnet_mask: Option<Ipv4Addr>,
    pub(crate) router: Option<Ipv4Addr>,
    pub(crate) dns: Option<Ipv4Addr>,
}

fn first_ipv4(data: &[u8]) -> Option<Ipv4Addr> {
    data.get(..4).map(|d| Ipv4Addr::new(d[0], d[1], d[2], d[3]))
}

impl DhcpReplyOptions {
    /// Walk the options until END or a PAD byte. Unknown and malformed
    /// options are skipped, a truncated option ends the walk. Inbound
    /// options are not bounded by `MAX_OPTIONS_SIZE`.
    pub(crate) fn parse(raw: &[u8]) -> Self {
        let mut ret = Self::default();
        let mut i = 0usize;
        while i + 1 < raw.len() {
            let code = DhcpOptionCode::from(raw[i]);
            if code == DhcpOptionCode::End || code == DhcpOptionCode::Pad {
                break;
            }
            let len = usize::from(raw[i + 1]);
            let Some(data) = raw.get(i + 2..i + 2 + len) else {
                log::debug!(
                    "Truncated DHCP option {}, ignoring the remains",
                    u8::from(code)
                );
                break;
            };
            match code {
                DhcpOptionCode::MessageType => {
                    ret.message_type = data.first().and_then(|t| {
                        DhcpMessageType::try_from(*t)
                            .map_err(|e| log::debug!("{e}"))
                            .ok()
                    });
                }
                DhcpOptionCode::ServerIdentifier => {
                    ret.server_id = first_ipv4(data);
                }
                DhcpOptionCode::IpAddressLeaseTime => {
                    ret.lease_time = data
                        .get(..4)
                        .map(|d| u32::from_be_bytes([d[0], d[1], d[2], d[3]]));
                }
                DhcpOptionCode::SubnetMask => {
                    ret.subnet_mask = first_ipv4(data);
                }
                DhcpOptionCode::Router => {
                    ret.router = first_ipv4(data);
                }
                DhcpOptionCode::DomainNameServer => {
                    ret.dns = first_ipv4(data);
                }
                _ => {
                    log::trace!("Skipping DHCP option {}", u8::from(code));
                }
            }
            i += 2 + len;
        }
        ret
    }
}
