use serde::{Deserialize, Serialize};

use crate::types::{ClassId, MethodId, ReplyCode};

pub const METHOD_CLOSE: MethodId = 50;
pub const METHOD_CLOSE_OK: MethodId = 51;

/// Connection class methods seen by the channel core. The negotiation
/// methods (start/tune/open) belong to the transport handshake and never
/// reach a channel.
#[derive(Debug, Clone)]
pub enum ConnectionMethod {
    Close(ConnectionClose),
    CloseOk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionClose {
    pub reply_code: ReplyCode,
    pub reply_text: String,
    pub class_id: ClassId,
    pub method_id: MethodId,
}

impl ConnectionMethod {
    pub fn method_id(&self) -> MethodId {
        match self {
            ConnectionMethod::Close(_) => METHOD_CLOSE,
            ConnectionMethod::CloseOk => METHOD_CLOSE_OK,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionMethod::Close(_) => "connection.close",
            ConnectionMethod::CloseOk => "connection.close-ok",
        }
    }

    pub fn synchronous(&self) -> bool {
        matches!(self, ConnectionMethod::Close(_))
    }
}
