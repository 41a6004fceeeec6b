// SPDX-License-Identifier: Apache-2.0

use std::os::{
    fd::{AsRawFd, OwnedFd},
    unix::io::RawFd,
};

use nix::{
    errno::Errno,
    sys::socket::{
        AddressFamily, LinkAddr, MsgFlags, SockFlag, SockProtocol, SockType,
    },
};

use crate::{
    frame::MAX_PACKET_SIZE, mac::ETH_ALEN, ErrorKind, Link, MacAddr, NetError,
};

const PACKET_HOST: u8 = 0; // a packet addressed to the local host
const PACKET_OUTGOING: u8 = 4; // a packet sent by the local host

/// Ethernet link over a Linux `AF_PACKET` raw socket bound to one
/// interface. The socket is nonblocking so the stack can poll it.
#[derive(Debug)]
pub struct RawEthLink {
    fd: OwnedFd,
    iface_name: String,
    iface_index: u32,
    mac: MacAddr,
    pending: Option<Vec<u8>>,
}

impl RawEthLink {
    /// Open a raw socket on `iface_name`. The interface index is looked up
    /// with `if_nametoindex()`. When `mac` differs from the hardware address
    /// of the interface, enable `promiscuous` to receive its unicast frames.
    pub fn new(
        iface_name: &str,
        mac: MacAddr,
        promiscuous: bool,
    ) -> Result<Self, NetError> {
        let iface_index =
            nix::net::if_::if_nametoindex(iface_name).map_err(|e| {
                let e = NetError::new(
                    ErrorKind::NotFound,
                    format!("Interface {iface_name} not found: {e}"),
                );
                log::error!("{e}");
                e
            })?;
        Self::with_index(iface_name, iface_index, mac, promiscuous)
    }

    /// Open a raw socket on `iface_name` using its own hardware address.
    #[cfg(feature = "netlink")]
    pub async fn open(iface_name: &str) -> Result<Self, NetError> {
        let (iface_index, mac) =
            crate::netlink::get_iface_index_mac(iface_name).await?;
        Self::with_index(iface_name, iface_index, mac, false)
    }

    fn with_index(
        iface_name: &str,
        iface_index: u32,
        mac: MacAddr,
        promiscuous: bool,
    ) -> Result<Self, NetError> {
        let fd = create_raw_eth_socket()?;
        let index = iface_index as libc::c_int;
        bind_raw_socket(fd.as_raw_fd(), libc::ETH_P_ALL, index, &mac)?;
        if promiscuous {
            enable_promiscuous_mode(fd.as_raw_fd(), index)?;
        }
        log::debug!(
            "Raw socket {} created on {iface_name}({iface_index}) for {mac}",
            fd.as_raw_fd()
        );
        Ok(Self {
            fd,
            iface_name: iface_name.to_string(),
            iface_index,
            mac,
            pending: None,
        })
    }

    pub fn iface_name(&self) -> &str {
        self.iface_name.as_str()
    }

    pub fn iface_index(&self) -> u32 {
        self.iface_index
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Next inbound frame, skipping the copies of our own transmissions.
    fn recv_frame(&mut self) -> Result<Option<Vec<u8>>, NetError> {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        loop {
            match nix::sys::socket::recvfrom::<LinkAddr>(
                self.fd.as_raw_fd(),
                &mut buffer,
            ) {
                Ok((len, addr)) => {
                    if addr.is_some_and(|a| a.pkttype() == PACKET_OUTGOING) {
                        continue;
                    }
                    log::trace!("Raw socket received {:?}", &buffer[..len]);
                    return Ok(Some(buffer[..len].to_vec()));
                }
                Err(Errno::EAGAIN) => return Ok(None),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    let e = NetError::new(
                        ErrorKind::Bug,
                        format!(
                            "Failed to receive from raw socket on {}: {e}",
                            self.iface_name
                        ),
                    );
                    log::error!("{e}");
                    return Err(e);
                }
            }
        }
    }
}

impl AsRawFd for RawEthLink {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Link for RawEthLink {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        log::trace!("Sending ethernet packet: {frame:?}");
        let mut sent = 0;
        while sent < frame.len() {
            match nix::sys::socket::send(
                self.fd.as_raw_fd(),
                &frame[sent..],
                MsgFlags::empty(),
            ) {
                Ok(len) => sent += len,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    let e = NetError::new(
                        ErrorKind::Bug,
                        format!("Failed to send packet to raw socket: {e}"),
                    );
                    log::error!("{e}");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn is_data_available(&mut self) -> bool {
        if self.pending.is_none() {
            match self.recv_frame() {
                Ok(frame) => self.pending = frame,
                Err(_) => return false,
            }
        }
        self.pending.is_some()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, NetError> {
        let frame = match self.pending.take() {
            Some(f) => f,
            None => match self.recv_frame()? {
                Some(f) => f,
                None => return Ok(None),
            },
        };
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(Some(len))
    }

    fn is_link_up(&self) -> bool {
        match nix::ifaddrs::getifaddrs() {
            Ok(addrs) => addrs
                .filter(|a| a.interface_name == self.iface_name)
                .any(|a| {
                    a.flags
                        .contains(nix::net::if_::InterfaceFlags::IFF_RUNNING)
                }),
            Err(e) => {
                log::warn!("Failed to query link state: {e}");
                false
            }
        }
    }
}

fn create_raw_eth_socket() -> Result<OwnedFd, NetError> {
    nix::sys::socket::socket(
        AddressFamily::Packet,
        SockType::Raw,
        SockFlag::SOCK_NONBLOCK,
        Some(SockProtocol::EthAll),
    )
    .map_err(|e| {
        let e = NetError::new(
            ErrorKind::Bug,
            format!("Failed to create raw ethernet socket: {e}"),
        );
        log::error!("{e}");
        e
    })
}

fn bind_raw_socket(
    fd: RawFd,
    eth_protocol: libc::c_int,
    iface_index: libc::c_int,
    mac_address: &MacAddr,
) -> Result<(), NetError> {
    let mut sll_addr: [libc::c_uchar; 8] = [0; 8];

    sll_addr[..ETH_ALEN].clone_from_slice(&mac_address.octets());

    let socket_addr = libc::sockaddr_ll {
        sll_family: libc::AF_PACKET as libc::c_ushort,
        sll_protocol: (eth_protocol as libc::c_ushort).to_be(),
        sll_ifindex: iface_index,
        sll_hatype: libc::ARPHRD_ETHER as libc::c_ushort,
        sll_pkttype: PACKET_HOST as libc::c_uchar,
        sll_halen: libc::ETH_ALEN as libc::c_uchar,
        sll_addr,
    };

    let rc = unsafe {
        libc::bind(
            fd,
            (&socket_addr as *const libc::sockaddr_ll).cast::<libc::sockaddr>(),
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        let e = NetError::new(
            ErrorKind::Bug,
            format!("Failed to bind socket: {}", Errno::last()),
        );
        log::error!("{e}");
        return Err(e);
    }
    Ok(())
}

fn enable_promiscuous_mode(
    fd: RawFd,
    iface_index: libc::c_int,
) -> Result<(), NetError> {
    let mreq = libc::packet_mreq {
        mr_ifindex: iface_index,
        mr_type: libc::PACKET_MR_PROMISC as libc::c_ushort,
        mr_alen: 0,
        mr_address: [0; 8],
    };

    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            libc::PACKET_ADD_MEMBERSHIP,
            (&mreq as *const libc::packet_mreq).cast::<libc::c_void>(),
            std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        let e = NetError::new(
            ErrorKind::Bug,
            format!(
                "Failed to set socket to promiscuous mode: {}",
                Errno::last()
            ),
        );
        log::error!("{e}");
        return Err(e);
    }
    Ok(())
}
