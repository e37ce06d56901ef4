use serde::{Deserialize, Serialize};

use crate::types::{FieldTable, MethodId};

pub const METHOD_DECLARE: MethodId = 10;
pub const METHOD_DECLARE_OK: MethodId = 11;
pub const METHOD_DELETE: MethodId = 20;
pub const METHOD_DELETE_OK: MethodId = 21;

#[derive(Debug, Clone)]
pub enum ExchangeMethod {
    Declare(ExchangeDeclare),
    DeclareOk,
    Delete(ExchangeDelete),
    DeleteOk,
}

/// See [AMQP 0-9-1 Reference](https://www.rabbitmq.com/amqp-0-9-1-reference.html#exchange.declare).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeDeclare {
    pub exchange: String,
    /// Exchange type alias ("direct", "fanout", "topic", "headers").
    pub kind: String,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeDelete {
    pub exchange: String,
    pub if_unused: bool,
    pub no_wait: bool,
}

impl ExchangeMethod {
    pub fn method_id(&self) -> MethodId {
        match self {
            ExchangeMethod::Declare(_) => METHOD_DECLARE,
            ExchangeMethod::DeclareOk => METHOD_DECLARE_OK,
            ExchangeMethod::Delete(_) => METHOD_DELETE,
            ExchangeMethod::DeleteOk => METHOD_DELETE_OK,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExchangeMethod::Declare(_) => "exchange.declare",
            ExchangeMethod::DeclareOk => "exchange.declare-ok",
            ExchangeMethod::Delete(_) => "exchange.delete",
            ExchangeMethod::DeleteOk => "exchange.delete-ok",
        }
    }

    pub fn synchronous(&self) -> bool {
        matches!(self, ExchangeMethod::Declare(_) | ExchangeMethod::Delete(_))
    }
}
