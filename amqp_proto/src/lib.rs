//! Protocol model for AMQP 0-9-1, shared between the broker core and the
//! transport codec.
//!
//! Frames cross this boundary fully parsed: the codec owns the byte layout
//! (frame type octet, channel id, payload length, 0xCE end marker) and the
//! broker only ever sees the typed payloads defined here.
mod content;
mod error;
mod frame;
mod message;
pub mod method;
pub mod types;

pub use content::*;
pub use error::*;
pub use frame::*;
pub use message::*;
pub use method::Method;
