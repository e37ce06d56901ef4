use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Protocol dialect negotiated by the handshake.
///
/// The plain 0-9-1 dialect treats `basic.qos(global=true)` as
/// connection-wide; the RabbitMQ dialect re-reads it as channel-wide, with
/// the non-global limit applying per consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtoVersion {
    #[serde(rename = "amqp-0-9-1")]
    Amqp091,
    #[serde(rename = "amqp-rabbit")]
    Rabbit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_proto")]
    pub proto: ProtoVersion,
    /// Confirm drain period. Trades publisher throughput against
    /// end-to-end confirm latency.
    #[serde(default = "default_confirm_tick_ms")]
    pub confirm_tick_ms: u64,
}

fn default_proto() -> ProtoVersion {
    ProtoVersion::Amqp091
}

fn default_confirm_tick_ms() -> u64 {
    20
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            proto: default_proto(),
            confirm_tick_ms: default_confirm_tick_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn confirm_tick(&self) -> Duration {
        Duration::from_millis(self.confirm_tick_ms)
    }
}
