// SPDX-License-Identifier: Apache-2.0

use crate::{ErrorKind, NetError};

pub(crate) const ETH_ALEN: usize = 6;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub struct MacAddr(pub [u8; ETH_ALEN]);

impl MacAddr {
    pub const BROADCAST: Self = Self([u8::MAX; ETH_ALEN]);
    pub const ZERO: Self = Self([0u8; ETH_ALEN]);

    pub fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl std::str::FromStr for MacAddr {
    type Err = NetError;

    fn from_str(mac: &str) -> Result<Self, NetError> {
        let invalid = || {
            NetError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "Invalid MAC address {mac}, expecting format \
                     01:02:2a:2c:f7:04"
                ),
            )
        };
        let mut ret = [0u8; ETH_ALEN];
        let mut count = 0usize;
        for item in mac.split(':') {
            if count >= ETH_ALEN {
                return Err(invalid());
            }
            ret[count] = u8::from_str_radix(item, 16).map_err(|_| invalid())?;
            count += 1;
        }
        if count != ETH_ALEN {
            return Err(invalid());
        }
        Ok(Self(ret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mac() {
        let mac: MacAddr = "02:03:04:05:06:83".parse().unwrap();
        assert_eq!(mac, MacAddr([2, 3, 4, 5, 6, 0x83]));
        assert_eq!(mac.to_string(), "02:03:04:05:06:83");
        assert!("02:03:04:05:06".parse::<MacAddr>().is_err());
        assert!("02:03:04:05:06:zz".parse::<MacAddr>().is_err());
        assert!("02:03:04:05:06:07:08".parse::<MacAddr>().is_err());
    }
}
