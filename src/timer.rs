// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

/// Every logical timer of the stack. Starting an id replaces the running
/// timer of the same id, so an id is also its own cancellation key.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub enum TimerId {
    DhcpDiscover,
    DhcpRequest,
    DhcpArpProbe,
    DhcpArpProbeDone,
    DhcpRenew,
    DhcpRebind,
    DhcpLeaseExpired,
    MqttResend,
    MqttPing,
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::DhcpDiscover => "dhcp_discover",
                Self::DhcpRequest => "dhcp_request",
                Self::DhcpArpProbe => "dhcp_arp_probe",
                Self::DhcpArpProbeDone => "dhcp_arp_probe_done",
                Self::DhcpRenew => "dhcp_renew",
                Self::DhcpRebind => "dhcp_rebind",
                Self::DhcpLeaseExpired => "dhcp_lease_expired",
                Self::MqttResend => "mqtt_resend",
                Self::MqttPing => "mqtt_ping",
            }
        )
    }
}

/// Timer service consumed by the protocol state machines. Durations are in
/// time units of one second.
pub trait Timers {
    fn start_one_shot(&mut self, id: TimerId, secs: u32);

    fn start_periodic(&mut self, id: TimerId, secs: u32);

    /// Returns whether a timer was running.
    fn stop(&mut self, id: TimerId) -> bool;

    fn is_active(&self, id: TimerId) -> bool;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct TimerEntry {
    remain: u32,
    period: Option<u32>,
}

/// Deterministic timer queue advanced by explicit [`TimerQueue::tick()`]
/// calls.
#[derive(Debug, Default, Clone)]
pub struct TimerQueue {
    timers: BTreeMap<TimerId, TimerEntry>,
    fired: Vec<TimerId>,
    now: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time units elapsed since creation.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Units left before `id` fires next.
    pub fn remain(&self, id: TimerId) -> Option<u32> {
        self.timers.get(&id).map(|t| t.remain)
    }

    /// Period of a running periodic timer.
    pub fn period(&self, id: TimerId) -> Option<u32> {
        self.timers.get(&id).and_then(|t| t.period)
    }

    /// Advance by one unit. Expired ids are queued in [`TimerId`] order.
    pub fn tick(&mut self) {
        self.now += 1;
        let mut expired = Vec::new();
        for (id, timer) in self.timers.iter_mut() {
            timer.remain = timer.remain.saturating_sub(1);
            if timer.remain == 0 {
                expired.push(*id);
                if let Some(period) = timer.period {
                    timer.remain = period;
                }
            }
        }
        for id in expired {
            if self.timers.get(&id).is_some_and(|t| t.period.is_none()) {
                self.timers.remove(&id);
            }
            log::trace!("Timer {id} fired at {}", self.now);
            self.fired.push(id);
        }
    }

    /// Next fired timer not yet handled.
    pub fn pop_fired(&mut self) -> Option<TimerId> {
        if self.fired.is_empty() {
            None
        } else {
            Some(self.fired.remove(0))
        }
    }

    fn start(&mut self, id: TimerId, secs: u32, period: Option<u32>) {
        // Zero length timers fire on the next tick
        let remain = secs.max(1);
        self.fired.retain(|i| *i != id);
        self.timers.insert(
            id,
            TimerEntry {
                remain,
                period: period.map(|p| p.max(1)),
            },
        );
    }
}

impl Timers for TimerQueue {
    fn start_one_shot(&mut self, id: TimerId, secs: u32) {
        log::trace!("Starting one shot timer {id} for {secs}");
        self.start(id, secs, None);
    }

    fn start_periodic(&mut self, id: TimerId, secs: u32) {
        log::trace!("Starting periodic timer {id} every {secs}");
        self.start(id, secs, Some(secs));
    }

    fn stop(&mut self, id: TimerId) -> bool {
        let queued = self.fired.len();
        self.fired.retain(|i| *i != id);
        self.timers.remove(&id).is_some() || queued != self.fired.len()
    }

    fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }
}
