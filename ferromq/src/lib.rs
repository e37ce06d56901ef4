//! Per-channel session core of an AMQP 0-9-1 broker.
//!
//! This crate multiplexes channels over a connection, drives the
//! publish/consume state machine, enforces QoS prefetch, tracks unacked
//! deliveries and implements publisher confirms. Transport framing, the
//! connection handshake and exchange/queue internals live behind the
//! interfaces in [`vhost`] and the frame streams wired up by the embedding
//! server.
pub mod config;
pub mod metrics;
pub mod qos;
pub mod server;
pub mod vhost;

pub use amqp_proto as amqp;
