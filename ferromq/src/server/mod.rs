//! The broker session layer: connections, channels and consumer pumps.

mod channel;
mod connection;
mod consumer;

pub use channel::{Channel, ChannelStatus};
pub use connection::{Connection, ConnectionStatus};
pub use consumer::Consumer;
