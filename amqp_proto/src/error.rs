use std::fmt;

use crate::types::{ClassId, MethodId, ReplyCode};

/// AMQP reply codes.
pub mod reply_code {
    use crate::types::ReplyCode;

    pub const REPLY_SUCCESS: ReplyCode = 200;
    pub const CONTENT_TOO_LARGE: ReplyCode = 311;
    pub const NO_CONSUMERS: ReplyCode = 313;
    pub const CONNECTION_FORCED: ReplyCode = 320;
    pub const INVALID_PATH: ReplyCode = 402;
    pub const ACCESS_REFUSED: ReplyCode = 403;
    pub const NOT_FOUND: ReplyCode = 404;
    pub const RESOURCE_LOCKED: ReplyCode = 405;
    pub const PRECONDITION_FAILED: ReplyCode = 406;
    pub const FRAME_ERROR: ReplyCode = 501;
    pub const SYNTAX_ERROR: ReplyCode = 502;
    pub const COMMAND_INVALID: ReplyCode = 503;
    pub const CHANNEL_ERROR: ReplyCode = 504;
    pub const UNEXPECTED_FRAME: ReplyCode = 505;
    pub const RESOURCE_ERROR: ReplyCode = 506;
    pub const NOT_ALLOWED: ReplyCode = 530;
    pub const NOT_IMPLEMENTED: ReplyCode = 540;
    pub const INTERNAL_ERROR: ReplyCode = 541;
}

/// Whether an error tears down the channel or the whole connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Channel,
    Connection,
}

/// A structured AMQP error, carried by `channel.close` or `connection.close`.
#[derive(Debug, Clone)]
pub struct AmqpError {
    pub scope: ErrorScope,
    pub reply_code: ReplyCode,
    pub reply_text: String,
    pub class_id: ClassId,
    pub method_id: MethodId,
}

impl AmqpError {
    pub fn channel(
        reply_code: ReplyCode,
        reply_text: impl Into<String>,
        class_id: ClassId,
        method_id: MethodId,
    ) -> Self {
        Self {
            scope: ErrorScope::Channel,
            reply_code,
            reply_text: reply_text.into(),
            class_id,
            method_id,
        }
    }

    pub fn connection(
        reply_code: ReplyCode,
        reply_text: impl Into<String>,
        class_id: ClassId,
        method_id: MethodId,
    ) -> Self {
        Self {
            scope: ErrorScope::Connection,
            reply_code,
            reply_text: reply_text.into(),
            class_id,
            method_id,
        }
    }
}

impl fmt::Display for AmqpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let scope = match self.scope {
            ErrorScope::Channel => "channel",
            ErrorScope::Connection => "connection",
        };
        write!(
            f,
            "{} error {}: {} (class {}, method {})",
            scope, self.reply_code, self.reply_text, self.class_id, self.method_id
        )
    }
}

impl std::error::Error for AmqpError {}
