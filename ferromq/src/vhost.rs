//! Virtual host facade.
//!
//! The channel core only ever touches exchanges and queues through the
//! traits below; binding tables, topic matching and the message store are
//! the implementations' business. The concrete [`VirtualHost`] keeps the
//! name-keyed registries and delegates construction to injected factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use amqp_proto::types::{ConnectionId, FieldTable};
use amqp_proto::Message;

use crate::qos::QosLimiter;

pub const DEFAULT_EXCHANGE_NAME: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeKind {
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "direct" => Some(ExchangeKind::Direct),
            "fanout" => Some(ExchangeKind::Fanout),
            "topic" => Some(ExchangeKind::Topic),
            "headers" => Some(ExchangeKind::Headers),
            _ => None,
        }
    }

    pub fn alias(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.alias())
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub arguments: FieldTable,
}

impl Binding {
    pub fn new(queue: String, exchange: String, routing_key: String, arguments: FieldTable) -> Self {
        Self {
            queue,
            exchange,
            routing_key,
            arguments,
        }
    }
}

/// Queue-side refusals surfaced to the channel, which wraps them into AMQP
/// errors.
#[derive(Debug)]
pub enum VhostError {
    QueueNotFound(String),
    QueueInUse(String),
    QueueNotEmpty(String),
    ConsumeRefused(String),
}

impl fmt::Display for VhostError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VhostError::QueueNotFound(name) => write!(f, "queue '{}' not found", name),
            VhostError::QueueInUse(name) => write!(f, "queue '{}' is in use", name),
            VhostError::QueueNotEmpty(name) => write!(f, "queue '{}' is not empty", name),
            VhostError::ConsumeRefused(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for VhostError {}

/// The queue side of a consumer session. Implemented by the channel's
/// consumer type; queues use it to wake pumps and to cancel on deletion.
pub trait QueueConsumer: Send + Sync {
    fn tag(&self) -> &str;
    /// Wake the pump; there may be something to deliver.
    fn consume(&self);
    fn stop(&self);
}

pub trait AmqpExchange: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> ExchangeKind;
    /// Names of the queues this message routes to.
    fn matched_queues(&self, message: &Message) -> Vec<String>;
    fn append_binding(&self, binding: Binding);
    fn remove_binding(&self, queue: &str, routing_key: &str);
    fn remove_queue_bindings(&self, queue: &str);
}

#[async_trait]
pub trait AmqpQueue: Send + Sync {
    fn name(&self) -> &str;
    fn is_active(&self) -> bool;
    fn is_exclusive(&self) -> bool;
    fn is_durable(&self) -> bool;
    fn conn_id(&self) -> ConnectionId;
    fn length(&self) -> u64;
    fn consumer_count(&self) -> u32;

    async fn push(&self, message: Arc<Message>);
    async fn pop(&self) -> Option<Arc<Message>>;
    /// Pop only if the delivery fits every limiter; the queue accounts the
    /// admit atomically with the pop.
    async fn pop_qos(&self, limits: &[Arc<QosLimiter>]) -> Option<Arc<Message>>;
    async fn ack_msg(&self, message: Arc<Message>);
    async fn requeue(&self, message: Arc<Message>);
    async fn purge(&self) -> u64;
    async fn delete(&self, if_unused: bool, if_empty: bool) -> Result<u64, VhostError>;

    fn add_consumer(
        &self,
        consumer: Arc<dyn QueueConsumer>,
        exclusive: bool,
    ) -> Result<(), VhostError>;
    fn remove_consumer(&self, tag: &str);
}

/// Construction seams for the out-of-scope implementations.
pub trait ExchangeFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
        auto_delete: bool,
        internal: bool,
    ) -> Arc<dyn AmqpExchange>;
}

pub trait QueueFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        conn_id: ConnectionId,
        exclusive: bool,
        auto_delete: bool,
        durable: bool,
    ) -> Arc<dyn AmqpQueue>;
}

pub struct VirtualHost {
    name: String,
    exchanges: Mutex<HashMap<String, Arc<dyn AmqpExchange>>>,
    queues: Mutex<HashMap<String, Arc<dyn AmqpQueue>>>,
    exchange_factory: Arc<dyn ExchangeFactory>,
    queue_factory: Arc<dyn QueueFactory>,
}

impl VirtualHost {
    pub fn new(
        name: &str,
        exchange_factory: Arc<dyn ExchangeFactory>,
        queue_factory: Arc<dyn QueueFactory>,
    ) -> Arc<Self> {
        let vhost = Arc::new(Self {
            name: name.to_owned(),
            exchanges: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            exchange_factory,
            queue_factory,
        });
        vhost.init_system_exchanges();
        vhost
    }

    fn init_system_exchanges(&self) {
        info!(vhost = %self.name, "initialize default exchanges");
        for kind in [
            ExchangeKind::Direct,
            ExchangeKind::Fanout,
            ExchangeKind::Headers,
            ExchangeKind::Topic,
        ] {
            let name = format!("amq.{}", kind.alias());
            self.append_exchange(self.exchange_factory.create(&name, kind, true, false, false));
        }
        self.append_exchange(self.exchange_factory.create(
            DEFAULT_EXCHANGE_NAME,
            ExchangeKind::Direct,
            true,
            false,
            false,
        ));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_exchange(&self, name: &str) -> Option<Arc<dyn AmqpExchange>> {
        self.exchanges.lock().unwrap().get(name).cloned()
    }

    pub fn get_queue(&self, name: &str) -> Option<Arc<dyn AmqpQueue>> {
        self.queues.lock().unwrap().get(name).cloned()
    }

    pub fn append_exchange(&self, exchange: Arc<dyn AmqpExchange>) {
        info!(vhost = %self.name, name = exchange.name(), kind = %exchange.kind(), "append exchange");
        self.exchanges
            .lock()
            .unwrap()
            .insert(exchange.name().to_owned(), exchange);
    }

    pub fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
        auto_delete: bool,
        internal: bool,
    ) -> Arc<dyn AmqpExchange> {
        let exchange = self
            .exchange_factory
            .create(name, kind, durable, auto_delete, internal);
        self.append_exchange(Arc::clone(&exchange));
        exchange
    }

    /// Register a queue and bind it to the default exchange under its own
    /// name, as every AMQP broker must.
    pub fn append_queue(&self, queue: Arc<dyn AmqpQueue>) {
        info!(vhost = %self.name, queue = queue.name(), "append queue");
        let name = queue.name().to_owned();
        self.queues.lock().unwrap().insert(name.clone(), queue);

        if let Some(default_exchange) = self.get_exchange(DEFAULT_EXCHANGE_NAME) {
            default_exchange.append_binding(Binding::new(
                name.clone(),
                DEFAULT_EXCHANGE_NAME.to_owned(),
                name,
                FieldTable::new(),
            ));
        }
    }

    pub fn declare_queue(
        &self,
        name: &str,
        conn_id: ConnectionId,
        exclusive: bool,
        auto_delete: bool,
        durable: bool,
    ) -> Arc<dyn AmqpQueue> {
        let queue = self
            .queue_factory
            .create(name, conn_id, exclusive, auto_delete, durable);
        self.append_queue(Arc::clone(&queue));
        queue
    }

    pub async fn delete_queue(
        &self,
        name: &str,
        if_unused: bool,
        if_empty: bool,
    ) -> Result<u64, VhostError> {
        let queue = self
            .get_queue(name)
            .ok_or_else(|| VhostError::QueueNotFound(name.to_owned()))?;

        let length = queue.delete(if_unused, if_empty).await?;

        for exchange in self.exchanges.lock().unwrap().values() {
            exchange.remove_queue_bindings(name);
        }
        self.queues.lock().unwrap().remove(name);
        info!(vhost = %self.name, queue = name, "queue deleted");

        Ok(length)
    }
}
