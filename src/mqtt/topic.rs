// SPDX-License-Identifier: Apache-2.0

use crate::{ErrorKind, NetError};

pub const MAX_SUBSCRIBED_TOPICS: usize = 10;
/// Longest topic name stored, one byte short of the 30 byte slot.
pub const MAX_TOPIC_NAME_LEN: usize = 29;
/// Identifier of a free slot.
pub const FREE_TOPIC_ID: u16 = 0xff;

/// One slot of the subscription table.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MqttTopic {
    pub id: u16,
    pub name: String,
}

impl Default for MqttTopic {
    fn default() -> Self {
        Self {
            id: FREE_TOPIC_ID,
            name: String::new(),
        }
    }
}

impl MqttTopic {
    pub fn is_free(&self) -> bool {
        self.id == FREE_TOPIC_ID
    }
}

/// Fixed capacity table of subscribed topics, scanned linearly.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TopicTable {
    slots: [MqttTopic; MAX_SUBSCRIBED_TOPICS],
}

impl Default for TopicTable {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| MqttTopic::default()),
        }
    }
}

impl TopicTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.slots.fill(MqttTopic::default());
    }

    /// Every slot including the free ones.
    pub fn slots(&self) -> &[MqttTopic] {
        &self.slots
    }

    /// Occupied slots in table order.
    pub fn iter(&self) -> impl Iterator<Item = &MqttTopic> {
        self.slots.iter().filter(|t| !t.is_free())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == MAX_SUBSCRIBED_TOPICS
    }

    pub fn topic_id(&self, name: &str) -> Option<u16> {
        self.iter().find(|t| t.name == name).map(|t| t.id)
    }

    pub fn topic_name(&self, id: u16) -> Option<&str> {
        if id == FREE_TOPIC_ID {
            return None;
        }
        self.iter().find(|t| t.id == id).map(|t| t.name.as_str())
    }

    pub(crate) fn validate_name(name: &str) -> Result<(), NetError> {
        if name.is_empty() || name.len() > MAX_TOPIC_NAME_LEN {
            let e = NetError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "MQTT topic name should be 1 to {MAX_TOPIC_NAME_LEN} \
                     bytes, got {} bytes",
                    name.len()
                ),
            );
            log::error!("{e}");
            return Err(e);
        }
        Ok(())
    }

    /// Store `name` under `id` in the first free slot.
    pub fn insert(&mut self, id: u16, name: &str) -> Result<(), NetError> {
        Self::validate_name(name)?;
        if id == FREE_TOPIC_ID {
            let e = NetError::new(
                ErrorKind::InvalidArgument,
                format!("Topic id {id:#x} is reserved for free slots"),
            );
            log::error!("{e}");
            return Err(e);
        }
        let Some(slot) = self.slots.iter_mut().find(|t| t.is_free()) else {
            let e = NetError::new(
                ErrorKind::CapacityExceeded,
                format!(
                    "MQTT topic table is full with {MAX_SUBSCRIBED_TOPICS} \
                     topics"
                ),
            );
            log::error!("{e}");
            return Err(e);
        };
        slot.id = id;
        slot.name = name.to_string();
        Ok(())
    }

    /// Free the slot holding `id`, returning whether one was found.
    pub fn remove(&mut self, id: u16) -> bool {
        if id == FREE_TOPIC_ID {
            return false;
        }
        match self.slots.iter_mut().find(|t| t.id == id) {
            Some(slot) => {
                *slot = MqttTopic::default();
                true
            }
            None => false,
        }
    }
}
