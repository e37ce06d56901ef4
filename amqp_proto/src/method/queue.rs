use serde::{Deserialize, Serialize};

use crate::types::{FieldTable, MethodId};

pub const METHOD_DECLARE: MethodId = 10;
pub const METHOD_DECLARE_OK: MethodId = 11;
pub const METHOD_BIND: MethodId = 20;
pub const METHOD_BIND_OK: MethodId = 21;
pub const METHOD_PURGE: MethodId = 30;
pub const METHOD_PURGE_OK: MethodId = 31;
pub const METHOD_DELETE: MethodId = 40;
pub const METHOD_DELETE_OK: MethodId = 41;
pub const METHOD_UNBIND: MethodId = 50;
pub const METHOD_UNBIND_OK: MethodId = 51;

#[derive(Debug, Clone)]
pub enum QueueMethod {
    Declare(QueueDeclare),
    DeclareOk(QueueDeclareOk),
    Bind(QueueBind),
    BindOk,
    Purge(QueuePurge),
    PurgeOk(QueuePurgeOk),
    Delete(QueueDelete),
    DeleteOk(QueueDeleteOk),
    Unbind(QueueUnbind),
    UnbindOk,
}

/// See [AMQP 0-9-1 Reference](https://www.rabbitmq.com/amqp-0-9-1-reference.html#queue.declare).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDeclare {
    pub queue: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDeclareOk {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueBind {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueUnbind {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePurge {
    pub queue: String,
    pub no_wait: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePurgeOk {
    pub message_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDelete {
    pub queue: String,
    pub if_unused: bool,
    pub if_empty: bool,
    pub no_wait: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDeleteOk {
    pub message_count: u32,
}

impl QueueMethod {
    pub fn method_id(&self) -> MethodId {
        match self {
            QueueMethod::Declare(_) => METHOD_DECLARE,
            QueueMethod::DeclareOk(_) => METHOD_DECLARE_OK,
            QueueMethod::Bind(_) => METHOD_BIND,
            QueueMethod::BindOk => METHOD_BIND_OK,
            QueueMethod::Purge(_) => METHOD_PURGE,
            QueueMethod::PurgeOk(_) => METHOD_PURGE_OK,
            QueueMethod::Delete(_) => METHOD_DELETE,
            QueueMethod::DeleteOk(_) => METHOD_DELETE_OK,
            QueueMethod::Unbind(_) => METHOD_UNBIND,
            QueueMethod::UnbindOk => METHOD_UNBIND_OK,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueueMethod::Declare(_) => "queue.declare",
            QueueMethod::DeclareOk(_) => "queue.declare-ok",
            QueueMethod::Bind(_) => "queue.bind",
            QueueMethod::BindOk => "queue.bind-ok",
            QueueMethod::Purge(_) => "queue.purge",
            QueueMethod::PurgeOk(_) => "queue.purge-ok",
            QueueMethod::Delete(_) => "queue.delete",
            QueueMethod::DeleteOk(_) => "queue.delete-ok",
            QueueMethod::Unbind(_) => "queue.unbind",
            QueueMethod::UnbindOk => "queue.unbind-ok",
        }
    }

    pub fn synchronous(&self) -> bool {
        matches!(
            self,
            QueueMethod::Declare(_)
                | QueueMethod::Bind(_)
                | QueueMethod::Purge(_)
                | QueueMethod::Delete(_)
                | QueueMethod::Unbind(_)
        )
    }
}
