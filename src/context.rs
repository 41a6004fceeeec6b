// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

use crate::{Interface, Link, StackEvent, Timers};

/// Collaborators a protocol handler works with while it runs: the device
/// identity, the link to transmit on, the timer service and the event queue
/// of the application.
pub(crate) struct NetContext<'a> {
    pub(crate) iface: &'a mut Interface,
    pub(crate) link: &'a mut dyn Link,
    pub(crate) timers: &'a mut dyn Timers,
    pub(crate) events: &'a mut VecDeque<StackEvent>,
}

impl NetContext<'_> {
    pub(crate) fn notify(&mut self, event: StackEvent) {
        log::debug!("Stack event {event}");
        self.events.push_back(event);
    }
}
