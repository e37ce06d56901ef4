//! Shared fixtures: an in-memory queue/exchange pair behind the vhost
//! traits and a broker harness that speaks frames to a connection.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;

use amqp_proto::method::Method;
use amqp_proto::types::{ChannelId, ConnectionId, FieldTable};
use amqp_proto::{BasicProperties, ContentBody, ContentHeader, Frame, FramePayload, Message};
use ferromq::config::{BrokerConfig, ProtoVersion};
use ferromq::metrics::BrokerMetrics;
use ferromq::qos::{self, QosLimiter};
use ferromq::server::Connection;
use ferromq::vhost::{
    AmqpExchange, AmqpQueue, Binding, ExchangeFactory, ExchangeKind, QueueConsumer, QueueFactory,
    VhostError, VirtualHost,
};

pub const TEST_CONN_ID: ConnectionId = 1;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

////////////////////////////////////////////////////////////////////////////
// in-memory queue

pub struct TestQueue {
    name: String,
    conn_id: ConnectionId,
    exclusive: bool,
    active: AtomicBool,
    has_exclusive_consumer: AtomicBool,
    messages: Mutex<VecDeque<Arc<Message>>>,
    consumers: Mutex<Vec<Arc<dyn QueueConsumer>>>,
    pub acked: AtomicUsize,
    pub requeued: AtomicUsize,
    pub deleted: AtomicBool,
}

impl TestQueue {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_owner(name, TEST_CONN_ID, false)
    }

    pub fn with_owner(name: &str, conn_id: ConnectionId, exclusive: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            conn_id,
            exclusive,
            active: AtomicBool::new(true),
            has_exclusive_consumer: AtomicBool::new(false),
            messages: Mutex::new(VecDeque::new()),
            consumers: Mutex::new(Vec::new()),
            acked: AtomicUsize::new(0),
            requeued: AtomicUsize::new(0),
            deleted: AtomicBool::new(false),
        })
    }

    pub fn consumer_tags(&self) -> Vec<String> {
        self.consumers
            .lock()
            .unwrap()
            .iter()
            .map(|consumer| consumer.tag().to_owned())
            .collect()
    }

    fn wake_consumers(&self) {
        for consumer in self.consumers.lock().unwrap().iter() {
            consumer.consume();
        }
    }
}

#[async_trait]
impl AmqpQueue for TestQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    fn length(&self) -> u64 {
        self.messages.lock().unwrap().len() as u64
    }

    fn consumer_count(&self) -> u32 {
        self.consumers.lock().unwrap().len() as u32
    }

    async fn push(&self, message: Arc<Message>) {
        self.messages.lock().unwrap().push_back(message);
        self.wake_consumers();
    }

    async fn pop(&self) -> Option<Arc<Message>> {
        self.messages.lock().unwrap().pop_front()
    }

    async fn pop_qos(&self, limits: &[Arc<QosLimiter>]) -> Option<Arc<Message>> {
        let mut messages = self.messages.lock().unwrap();
        let front_size = messages.front()?.body_size;
        if !qos::inc_all(limits, 1, front_size) {
            return None;
        }
        messages.pop_front()
    }

    async fn ack_msg(&self, _message: Arc<Message>) {
        self.acked.fetch_add(1, Ordering::SeqCst);
    }

    async fn requeue(&self, message: Arc<Message>) {
        self.requeued.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().push_front(message);
    }

    async fn purge(&self) -> u64 {
        let mut messages = self.messages.lock().unwrap();
        let purged = messages.len() as u64;
        messages.clear();
        purged
    }

    async fn delete(&self, if_unused: bool, if_empty: bool) -> Result<u64, VhostError> {
        if if_unused && self.consumer_count() > 0 {
            return Err(VhostError::QueueInUse(self.name.clone()));
        }
        if if_empty && self.length() > 0 {
            return Err(VhostError::QueueNotEmpty(self.name.clone()));
        }
        self.active.store(false, Ordering::SeqCst);
        self.deleted.store(true, Ordering::SeqCst);
        Ok(self.length())
    }

    fn add_consumer(
        &self,
        consumer: Arc<dyn QueueConsumer>,
        exclusive: bool,
    ) -> Result<(), VhostError> {
        let mut consumers = self.consumers.lock().unwrap();
        if self.has_exclusive_consumer.load(Ordering::SeqCst) {
            return Err(VhostError::ConsumeRefused(format!(
                "queue '{}' has an exclusive consumer",
                self.name
            )));
        }
        if exclusive && !consumers.is_empty() {
            return Err(VhostError::ConsumeRefused(format!(
                "queue '{}' already has consumers",
                self.name
            )));
        }
        if exclusive {
            self.has_exclusive_consumer.store(true, Ordering::SeqCst);
        }
        consumers.push(consumer);
        Ok(())
    }

    fn remove_consumer(&self, tag: &str) {
        let mut consumers = self.consumers.lock().unwrap();
        consumers.retain(|consumer| consumer.tag() != tag);
        if consumers.is_empty() {
            self.has_exclusive_consumer.store(false, Ordering::SeqCst);
        }
    }
}

////////////////////////////////////////////////////////////////////////////
// in-memory exchange with direct matching

pub struct TestExchange {
    name: String,
    kind: ExchangeKind,
    bindings: Mutex<Vec<Binding>>,
}

impl TestExchange {
    pub fn new(name: &str, kind: ExchangeKind) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            kind,
            bindings: Mutex::new(Vec::new()),
        })
    }
}

impl AmqpExchange for TestExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ExchangeKind {
        self.kind
    }

    fn matched_queues(&self, message: &Message) -> Vec<String> {
        let bindings = self.bindings.lock().unwrap();
        let mut matched = Vec::new();
        for binding in bindings.iter() {
            if binding.routing_key == message.routing_key && !matched.contains(&binding.queue) {
                matched.push(binding.queue.clone());
            }
        }
        matched
    }

    fn append_binding(&self, binding: Binding) {
        self.bindings.lock().unwrap().push(binding);
    }

    fn remove_binding(&self, queue: &str, routing_key: &str) {
        self.bindings
            .lock()
            .unwrap()
            .retain(|binding| !(binding.queue == queue && binding.routing_key == routing_key));
    }

    fn remove_queue_bindings(&self, queue: &str) {
        self.bindings
            .lock()
            .unwrap()
            .retain(|binding| binding.queue != queue);
    }
}

pub struct TestExchangeFactory;

impl ExchangeFactory for TestExchangeFactory {
    fn create(
        &self,
        name: &str,
        kind: ExchangeKind,
        _durable: bool,
        _auto_delete: bool,
        _internal: bool,
    ) -> Arc<dyn AmqpExchange> {
        TestExchange::new(name, kind)
    }
}

pub struct TestQueueFactory;

impl QueueFactory for TestQueueFactory {
    fn create(
        &self,
        name: &str,
        conn_id: ConnectionId,
        exclusive: bool,
        _auto_delete: bool,
        _durable: bool,
    ) -> Arc<dyn AmqpQueue> {
        TestQueue::with_owner(name, conn_id, exclusive)
    }
}

////////////////////////////////////////////////////////////////////////////
// broker harness

pub struct TestBroker {
    pub conn: Arc<Connection>,
    pub outgoing: mpsc::Receiver<Frame>,
    pub vhost: Arc<VirtualHost>,
    pub metrics: Arc<BrokerMetrics>,
}

impl TestBroker {
    pub fn start() -> Self {
        Self::start_with(ProtoVersion::Amqp091)
    }

    pub fn start_with(proto: ProtoVersion) -> Self {
        init_tracing();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
        let vhost = VirtualHost::new("/", Arc::new(TestExchangeFactory), Arc::new(TestQueueFactory));
        let metrics = Arc::new(BrokerMetrics::default());
        let config = BrokerConfig {
            proto,
            confirm_tick_ms: 20,
        };
        let conn = Connection::new(
            TEST_CONN_ID,
            Arc::clone(&vhost),
            config,
            Arc::clone(&metrics),
            outgoing_tx,
        );
        Self {
            conn,
            outgoing: outgoing_rx,
            vhost,
            metrics,
        }
    }

    /// Register an in-memory queue, bound to the default exchange under its
    /// own name.
    pub fn queue(&self, name: &str) -> Arc<TestQueue> {
        let queue = TestQueue::new(name);
        self.vhost.append_queue(queue.clone());
        queue
    }

    pub fn bind(&self, exchange: &str, queue: &str, routing_key: &str) {
        self.vhost
            .get_exchange(exchange)
            .expect("exchange must exist")
            .append_binding(Binding::new(
                queue.to_owned(),
                exchange.to_owned(),
                routing_key.to_owned(),
                FieldTable::new(),
            ));
    }

    pub async fn send(&self, channel_id: ChannelId, payload: FramePayload) {
        self.conn
            .route_frame(Frame {
                channel_id,
                payload,
                close_after: false,
                sync: false,
            })
            .await;
    }

    pub async fn send_method(&self, channel_id: ChannelId, method: impl Into<Method>) {
        self.send(channel_id, FramePayload::Method(method.into()))
            .await;
    }

    pub async fn recv_frame(&mut self) -> Frame {
        timeout(Duration::from_secs(1), self.outgoing.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("outgoing sink closed")
    }

    pub async fn recv_method(&mut self) -> (ChannelId, Method) {
        let frame = self.recv_frame().await;
        match frame.payload {
            FramePayload::Method(method) => (frame.channel_id, method),
            other => panic!("expected a method frame, got {:?}", other),
        }
    }

    /// Read one content send: method + header + body fragments up to the
    /// declared size.
    pub async fn recv_content(&mut self) -> (ChannelId, Method, ContentHeader, Vec<u8>) {
        let (channel_id, method) = self.recv_method().await;
        let header = match self.recv_frame().await.payload {
            FramePayload::Header(header) => header,
            other => panic!("expected a header frame, got {:?}", other),
        };
        let mut body = Vec::new();
        while (body.len() as u64) < header.body_size {
            match self.recv_frame().await.payload {
                FramePayload::Body(chunk) => body.extend_from_slice(&chunk.inner),
                other => panic!("expected a body frame, got {:?}", other),
            }
        }
        (channel_id, method, header, body)
    }

    pub async fn expect_no_frame(&mut self, wait: Duration) {
        if let Ok(frame) = timeout(wait, self.outgoing.recv()).await {
            panic!("expected silence, got {:?}", frame);
        }
    }

    pub async fn open_channel(&mut self, channel_id: ChannelId) {
        use amqp_proto::method::ChannelMethod;
        self.send_method(channel_id, Method::Channel(ChannelMethod::Open))
            .await;
        let (id, method) = self.recv_method().await;
        assert_eq!(id, channel_id);
        assert!(
            matches!(method, Method::Channel(ChannelMethod::OpenOk)),
            "expected channel.open-ok, got {}",
            method.name()
        );
    }

    pub async fn publish(
        &self,
        channel_id: ChannelId,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        properties: BasicProperties,
        body: &[u8],
    ) {
        use amqp_proto::method::BasicPublish;
        self.send_method(
            channel_id,
            BasicPublish {
                exchange: exchange.to_owned(),
                routing_key: routing_key.to_owned(),
                mandatory,
                immediate: false,
            },
        )
        .await;
        self.send(
            channel_id,
            FramePayload::Header(ContentHeader::for_basic(
                body.len() as u64,
                properties,
            )),
        )
        .await;
        if !body.is_empty() {
            self.send(
                channel_id,
                FramePayload::Body(ContentBody::new(Bytes::copy_from_slice(body))),
            )
            .await;
        }
    }
}
