//! AMQP methods, one module per class.
//!
//! Methods are modelled as a tagged variant over the classes so handlers can
//! pattern-match instead of dispatching through a registry. Reply methods
//! with no arguments are plain variants; everything else carries a struct
//! named after the full AMQP method.

pub mod basic;
pub mod channel;
pub mod confirm;
pub mod connection;
pub mod exchange;
pub mod queue;
pub mod tx;

pub use basic::{
    BasicAck, BasicCancel, BasicCancelOk, BasicConsume, BasicConsumeOk, BasicDeliver, BasicGet,
    BasicGetOk, BasicMethod, BasicNack, BasicPublish, BasicQos, BasicRecover, BasicRecoverAsync,
    BasicReject, BasicReturn,
};
pub use channel::{ChannelClose, ChannelFlow, ChannelFlowOk, ChannelMethod};
pub use confirm::{ConfirmMethod, ConfirmSelect};
pub use connection::{ConnectionClose, ConnectionMethod};
pub use exchange::{ExchangeDeclare, ExchangeDelete, ExchangeMethod};
pub use queue::{
    QueueBind, QueueDeclare, QueueDeclareOk, QueueDelete, QueueDeleteOk, QueueMethod, QueuePurge,
    QueuePurgeOk, QueueUnbind,
};
pub use tx::TxMethod;

use crate::types::{ClassId, MethodId};

pub const CLASS_CONNECTION: ClassId = 10;
pub const CLASS_CHANNEL: ClassId = 20;
pub const CLASS_EXCHANGE: ClassId = 40;
pub const CLASS_QUEUE: ClassId = 50;
pub const CLASS_BASIC: ClassId = 60;
pub const CLASS_CONFIRM: ClassId = 85;
pub const CLASS_TX: ClassId = 90;

#[derive(Debug, Clone)]
pub enum Method {
    Connection(ConnectionMethod),
    Channel(ChannelMethod),
    Basic(BasicMethod),
    Exchange(ExchangeMethod),
    Queue(QueueMethod),
    Confirm(ConfirmMethod),
    Tx(TxMethod),
}

impl Method {
    pub fn class_id(&self) -> ClassId {
        match self {
            Method::Connection(_) => CLASS_CONNECTION,
            Method::Channel(_) => CLASS_CHANNEL,
            Method::Basic(_) => CLASS_BASIC,
            Method::Exchange(_) => CLASS_EXCHANGE,
            Method::Queue(_) => CLASS_QUEUE,
            Method::Confirm(_) => CLASS_CONFIRM,
            Method::Tx(_) => CLASS_TX,
        }
    }

    pub fn method_id(&self) -> MethodId {
        match self {
            Method::Connection(m) => m.method_id(),
            Method::Channel(m) => m.method_id(),
            Method::Basic(m) => m.method_id(),
            Method::Exchange(m) => m.method_id(),
            Method::Queue(m) => m.method_id(),
            Method::Confirm(m) => m.method_id(),
            Method::Tx(m) => m.method_id(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::Connection(m) => m.name(),
            Method::Channel(m) => m.name(),
            Method::Basic(m) => m.name(),
            Method::Exchange(m) => m.name(),
            Method::Queue(m) => m.name(),
            Method::Confirm(m) => m.name(),
            Method::Tx(m) => m.name(),
        }
    }

    /// Whether the method expects a reply. The writer may flush aggressively
    /// after synchronous methods.
    pub fn synchronous(&self) -> bool {
        match self {
            Method::Connection(m) => m.synchronous(),
            Method::Channel(m) => m.synchronous(),
            Method::Basic(m) => m.synchronous(),
            Method::Exchange(m) => m.synchronous(),
            Method::Queue(m) => m.synchronous(),
            Method::Confirm(m) => m.synchronous(),
            Method::Tx(m) => m.synchronous(),
        }
    }
}

macro_rules! into_method {
    ($ty:ident, $class:ident, $sub:ident, $variant:ident) => {
        impl From<$ty> for Method {
            fn from(method: $ty) -> Method {
                Method::$class($sub::$variant(method))
            }
        }
    };
}

into_method!(ConnectionClose, Connection, ConnectionMethod, Close);
into_method!(ChannelFlow, Channel, ChannelMethod, Flow);
into_method!(ChannelFlowOk, Channel, ChannelMethod, FlowOk);
into_method!(ChannelClose, Channel, ChannelMethod, Close);
into_method!(BasicQos, Basic, BasicMethod, Qos);
into_method!(BasicConsume, Basic, BasicMethod, Consume);
into_method!(BasicConsumeOk, Basic, BasicMethod, ConsumeOk);
into_method!(BasicCancel, Basic, BasicMethod, Cancel);
into_method!(BasicCancelOk, Basic, BasicMethod, CancelOk);
into_method!(BasicPublish, Basic, BasicMethod, Publish);
into_method!(BasicReturn, Basic, BasicMethod, Return);
into_method!(BasicDeliver, Basic, BasicMethod, Deliver);
into_method!(BasicGet, Basic, BasicMethod, Get);
into_method!(BasicGetOk, Basic, BasicMethod, GetOk);
into_method!(BasicAck, Basic, BasicMethod, Ack);
into_method!(BasicReject, Basic, BasicMethod, Reject);
into_method!(BasicRecoverAsync, Basic, BasicMethod, RecoverAsync);
into_method!(BasicRecover, Basic, BasicMethod, Recover);
into_method!(BasicNack, Basic, BasicMethod, Nack);
into_method!(ExchangeDeclare, Exchange, ExchangeMethod, Declare);
into_method!(ExchangeDelete, Exchange, ExchangeMethod, Delete);
into_method!(QueueDeclare, Queue, QueueMethod, Declare);
into_method!(QueueDeclareOk, Queue, QueueMethod, DeclareOk);
into_method!(QueueBind, Queue, QueueMethod, Bind);
into_method!(QueueUnbind, Queue, QueueMethod, Unbind);
into_method!(QueuePurge, Queue, QueueMethod, Purge);
into_method!(QueuePurgeOk, Queue, QueueMethod, PurgeOk);
into_method!(QueueDelete, Queue, QueueMethod, Delete);
into_method!(QueueDeleteOk, Queue, QueueMethod, DeleteOk);
into_method!(ConfirmSelect, Confirm, ConfirmMethod, Select);
