// SPDX-License-Identifier: Apache-2.0

use futures::stream::TryStreamExt;
use rtnetlink::packet_route::link::LinkAttribute;

use crate::{mac::ETH_ALEN, ErrorKind, MacAddr, NetError};

/// Kernel interface index and hardware address of `iface_name`.
pub(crate) async fn get_iface_index_mac(
    iface_name: &str,
) -> Result<(u32, MacAddr), NetError> {
    let (connection, handle, _) = rtnetlink::new_connection()?;

    tokio::spawn(connection);

    let mut links = handle
        .link()
        .get()
        .match_name(iface_name.to_string())
        .execute();

    while let Some(nl_msg) = links.try_next().await? {
        for nla in nl_msg.attributes {
            if let LinkAttribute::Address(mac) = nla {
                let Ok(mac) = <[u8; ETH_ALEN]>::try_from(mac.as_slice()) else {
                    let e = NetError::new(
                        ErrorKind::NotSupported,
                        format!(
                            "Interface {iface_name} is not Ethernet, hardware \
                             address {mac:?}"
                        ),
                    );
                    log::error!("{e}");
                    return Err(e);
                };
                return Ok((nl_msg.header.index, MacAddr(mac)));
            }
        }
    }
    let e = NetError::new(
        ErrorKind::NotFound,
        format!("Interface {iface_name} not found"),
    );
    log::error!("{e}");
    Err(e)
}
