// SPDX-License-Identifier: Apache-2.0

mod client;
mod packet;
mod pending;
mod topic;

pub use self::{
    client::{MqttClient, MqttConnectionState},
    packet::{MqttPacketType, MqttQos},
    pending::{PendingMessage, PendingState},
    topic::{
        MqttTopic, TopicTable, FREE_TOPIC_ID, MAX_SUBSCRIBED_TOPICS,
        MAX_TOPIC_NAME_LEN,
    },
};
