// SPDX-License-Identifier: Apache-2.0

use super::DhcpClient;
use crate::{TimerId, Timers};

// RFC 2132, 9.2: 0xffffffff means infinity
const INFINITE_LEASE: u32 = u32::MAX;

/// T1: half of the lease.
pub(crate) fn renew_time(lease_time: u32) -> u32 {
    lease_time / 2
}

/// T2: seven eighths of the lease.
pub(crate) fn rebind_time(lease_time: u32) -> u32 {
    (u64::from(lease_time) * 7 / 8) as u32
}

impl DhcpClient {
    pub(crate) fn set_lease_timers(&self, timers: &mut dyn Timers) {
        for id in [
            TimerId::DhcpRenew,
            TimerId::DhcpRebind,
            TimerId::DhcpLeaseExpired,
        ] {
            timers.stop(id);
        }
        let lease_time = self.lease_time();
        if lease_time == 0 || lease_time == INFINITE_LEASE {
            log::info!("DHCP lease has no expiry, lease timers not armed");
            return;
        }
        timers.start_one_shot(TimerId::DhcpRenew, renew_time(lease_time));
        timers.start_one_shot(TimerId::DhcpRebind, rebind_time(lease_time));
        timers.start_one_shot(TimerId::DhcpLeaseExpired, lease_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_fractions() {
        assert_eq!(renew_time(3600), 1800);
        assert_eq!(rebind_time(3600), 3150);
        assert_eq!(rebind_time(u32::MAX - 1), 3758096382);
    }
}
