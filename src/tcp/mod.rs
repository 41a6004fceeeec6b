// SPDX-License-Identifier: Apache-2.0

mod conn;
mod flags;
mod state;

pub use self::conn::{TcpConnection, TcpOutcome};
pub use self::flags::TcpFlags;
pub use self::state::TcpState;

pub const MQTT_BROKER_PORT: u16 = 1883;
