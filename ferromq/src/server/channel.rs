use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tracing::{debug, error, info, trace, Instrument};

use amqp_proto::method::{
    basic, exchange as exchange_method, queue as queue_method, BasicAck,
    BasicCancel, BasicCancelOk, BasicConsume, BasicConsumeOk, BasicGet, BasicGetOk, BasicMethod,
    BasicPublish, BasicQos, BasicReturn, ChannelClose, ChannelFlowOk, ChannelMethod, ConfirmMethod,
    ConnectionClose, ConnectionMethod, ExchangeDeclare, ExchangeMethod, Method, QueueBind,
    QueueDeclare, QueueDeclareOk, QueueDelete, QueueDeleteOk, QueueMethod, QueuePurge,
    QueuePurgeOk, QueueUnbind, TxMethod, CLASS_BASIC, CLASS_CHANNEL, CLASS_CONFIRM,
    CLASS_CONNECTION, CLASS_EXCHANGE, CLASS_QUEUE, CLASS_TX,
};
use amqp_proto::types::{ChannelId, ConnectionId, DeliveryTag, MethodId};
use amqp_proto::{
    reply_code, AmqpError, ConfirmMeta, ContentBody, ContentHeader, ErrorScope, Frame,
    FramePayload, Message,
};

use crate::config::{BrokerConfig, ProtoVersion};
use crate::metrics::BrokerMetrics;
use crate::qos::QosLimiter;
use crate::vhost::{AmqpExchange, AmqpQueue, Binding, ExchangeKind, QueueConsumer, VirtualHost};

use super::connection::{Connection, ConnectionStatus};
use super::consumer::Consumer;

// Bigger buffers would help throughput but make it hard to deal with
// already-queued frames on shutdown or connection close.
const INCOMING_BUFFER_SIZE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    New,
    Open,
    Closing,
    Closed,
}

struct UnackedMessage {
    consumer_tag: String,
    queue: String,
    message: Arc<Message>,
}

/// One AMQP channel: an independent thread of control multiplexed inside a
/// connection, identified by a 16-bit id.
pub struct Channel {
    id: ChannelId,
    conn: Weak<Connection>,
    conn_id: ConnectionId,
    proto: ProtoVersion,
    config: BrokerConfig,
    vhost: Arc<VirtualHost>,
    metrics: Arc<BrokerMetrics>,
    outgoing_tx: mpsc::Sender<Frame>,
    incoming_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    status: RwLock<ChannelStatus>,
    active: AtomicBool,
    confirm_mode: AtomicBool,
    delivery_tag: AtomicU64,
    confirm_delivery_tag: AtomicU64,
    name_seq: AtomicU64,
    current_message: Mutex<Option<Message>>,
    consumers: Mutex<HashMap<String, Arc<Consumer>>>,
    unacked: AsyncMutex<HashMap<DeliveryTag, UnackedMessage>>,
    confirm_queue: Mutex<Vec<ConfirmMeta>>,
    qos: Arc<QosLimiter>,
    consumer_qos: Arc<QosLimiter>,
    conn_qos: Arc<QosLimiter>,
    closed: Notify,
}

fn is_close_handshake(method: &Method) -> bool {
    matches!(
        method,
        Method::Channel(ChannelMethod::Close(_))
            | Method::Channel(ChannelMethod::CloseOk)
            | Method::Connection(ConnectionMethod::Close(_))
            | Method::Connection(ConnectionMethod::CloseOk)
    )
}

impl Channel {
    /// Returns the channel and the sender half of its inbound frame stream.
    /// The sender stays with the connection so dropping it ends the
    /// dispatch task.
    pub(crate) fn new(id: ChannelId, conn: &Arc<Connection>) -> (Arc<Self>, mpsc::Sender<Frame>) {
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_BUFFER_SIZE);
        // channel 0 is implicitly open once the connection is negotiated
        let status = if id == 0 {
            ChannelStatus::Open
        } else {
            ChannelStatus::New
        };
        let channel = Arc::new(Self {
            id,
            conn: Arc::downgrade(conn),
            conn_id: conn.id(),
            proto: conn.config().proto,
            config: conn.config(),
            vhost: Arc::clone(conn.vhost()),
            metrics: Arc::clone(conn.metrics()),
            outgoing_tx: conn.outgoing(),
            incoming_rx: Mutex::new(Some(incoming_rx)),
            status: RwLock::new(status),
            active: AtomicBool::new(true),
            confirm_mode: AtomicBool::new(false),
            delivery_tag: AtomicU64::new(0),
            confirm_delivery_tag: AtomicU64::new(0),
            name_seq: AtomicU64::new(0),
            current_message: Mutex::new(None),
            consumers: Mutex::new(HashMap::new()),
            unacked: AsyncMutex::new(HashMap::new()),
            confirm_queue: Mutex::new(Vec::new()),
            qos: Arc::new(QosLimiter::default()),
            consumer_qos: Arc::new(QosLimiter::default()),
            conn_qos: Arc::clone(conn.qos()),
            closed: Notify::new(),
        });
        (channel, incoming_tx)
    }

    pub(crate) fn start(self: &Arc<Self>) {
        let channel = Arc::clone(self);
        let mut incoming_rx = self
            .incoming_rx
            .lock()
            .unwrap()
            .take()
            .expect("channel already started");
        let span = tracing::info_span!("channel", conn_id = self.conn_id, channel_id = self.id);
        tokio::spawn(
            async move {
                trace!("channel dispatch task started");
                while let Some(frame) = incoming_rx.recv().await {
                    // Closed is terminal, late frames are dropped
                    if channel.status() == ChannelStatus::Closed {
                        continue;
                    }
                    if let Err(err) = channel.handle_frame(frame).await {
                        channel.send_error(err).await;
                    }
                }
                trace!("channel dispatch task stopped");
            }
            .instrument(span),
        );
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.read().unwrap()
    }

    fn set_status(&self, status: ChannelStatus) {
        *self.status.write().unwrap() = status;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_confirm_mode(&self) -> bool {
        self.confirm_mode.load(Ordering::SeqCst)
    }

    pub fn consumers_count(&self) -> usize {
        self.consumers.lock().unwrap().len()
    }

    pub fn qos(&self) -> Arc<QosLimiter> {
        Arc::clone(&self.qos)
    }

    pub(crate) fn metrics(&self) -> &BrokerMetrics {
        &self.metrics
    }

    /// Strictly monotonic per channel, starts at 1, never reused.
    pub fn next_delivery_tag(&self) -> DeliveryTag {
        self.delivery_tag.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_confirm_delivery_tag(&self) -> DeliveryTag {
        self.confirm_delivery_tag.fetch_add(1, Ordering::SeqCst) + 1
    }

    ////////////////////////////////////////////////////////////////////////
    // frame dispatch

    async fn handle_frame(self: &Arc<Self>, frame: Frame) -> Result<(), AmqpError> {
        if self.status() == ChannelStatus::Closing {
            // waiting for close-ok, everything else is discarded
            match &frame.payload {
                FramePayload::Method(method) if is_close_handshake(method) => {}
                _ => return Ok(()),
            }
        }
        match frame.payload {
            FramePayload::Method(method) => self.handle_method(method).await,
            FramePayload::Header(header) => self.handle_content_header(header).await,
            FramePayload::Body(body) => self.handle_content_body(body).await,
            FramePayload::Heartbeat => Ok(()),
        }
    }

    async fn handle_method(self: &Arc<Self>, method: Method) -> Result<(), AmqpError> {
        debug!(method = method.name(), "incoming method");

        // between basic.publish and the end of its body the only legal
        // frames are header and body
        if self.current_message.lock().unwrap().is_some() {
            return Err(AmqpError::connection(
                reply_code::FRAME_ERROR,
                "unexpected method frame during content transfer",
                method.class_id(),
                method.method_id(),
            ));
        }

        if self.status() == ChannelStatus::New
            && !matches!(method, Method::Channel(ChannelMethod::Open))
        {
            return Err(AmqpError::connection(
                reply_code::CHANNEL_ERROR,
                format!("expected channel.open on channel {}", self.id),
                method.class_id(),
                method.method_id(),
            ));
        }

        match method {
            Method::Connection(method) => self.connection_route(method).await,
            Method::Channel(method) => self.channel_route(method).await,
            Method::Basic(method) => self.basic_route(method).await,
            Method::Exchange(method) => self.exchange_route(method).await,
            Method::Queue(method) => self.queue_route(method).await,
            Method::Confirm(method) => self.confirm_route(method).await,
            Method::Tx(method) => self.tx_route(method),
        }
    }

    async fn connection_route(self: &Arc<Self>, method: ConnectionMethod) -> Result<(), AmqpError> {
        if self.id != 0 {
            return Err(AmqpError::connection(
                reply_code::COMMAND_INVALID,
                format!("connection class method on channel {}", self.id),
                CLASS_CONNECTION,
                method.method_id(),
            ));
        }
        match method {
            ConnectionMethod::Close(close) => {
                info!(
                    reply_code = close.reply_code,
                    reply_text = %close.reply_text,
                    "connection close requested by client"
                );
                if let Some(conn) = self.conn.upgrade() {
                    conn.close().await;
                }
                self.send_method(Method::Connection(ConnectionMethod::CloseOk))
                    .await;
                Ok(())
            }
            ConnectionMethod::CloseOk => {
                // the client acknowledged the connection.close we sent
                if let Some(conn) = self.conn.upgrade() {
                    conn.close().await;
                }
                Ok(())
            }
        }
    }

    async fn channel_route(self: &Arc<Self>, method: ChannelMethod) -> Result<(), AmqpError> {
        match method {
            ChannelMethod::Open => {
                if self.status() != ChannelStatus::New {
                    return Err(AmqpError::connection(
                        reply_code::CHANNEL_ERROR,
                        format!("channel {} is already open", self.id),
                        CLASS_CHANNEL,
                        amqp_proto::method::channel::METHOD_OPEN,
                    ));
                }
                self.set_status(ChannelStatus::Open);
                self.send_method(Method::Channel(ChannelMethod::OpenOk))
                    .await;
                Ok(())
            }
            ChannelMethod::Flow(flow) => {
                self.change_flow(flow.active);
                self.send_method(ChannelFlowOk {
                    active: flow.active,
                })
                .await;
                Ok(())
            }
            ChannelMethod::Close(close) => {
                info!(reply_code = close.reply_code, "channel close requested by client");
                self.close().await;
                self.send_method(Method::Channel(ChannelMethod::CloseOk))
                    .await;
                Ok(())
            }
            ChannelMethod::CloseOk => {
                // the client acknowledged the channel.close we sent
                self.close().await;
                Ok(())
            }
            ChannelMethod::OpenOk | ChannelMethod::FlowOk(_) => Err(AmqpError::connection(
                reply_code::COMMAND_INVALID,
                "unexpected reply method from client",
                CLASS_CHANNEL,
                method.method_id(),
            )),
        }
    }

    async fn basic_route(self: &Arc<Self>, method: BasicMethod) -> Result<(), AmqpError> {
        match method {
            BasicMethod::Qos(qos) => self.handle_qos(qos).await,
            BasicMethod::Consume(consume) => self.handle_consume(consume).await,
            BasicMethod::Cancel(cancel) => self.handle_cancel(cancel).await,
            BasicMethod::Publish(publish) => self.handle_publish(publish),
            BasicMethod::Ack(ack) => self.handle_ack(ack).await,
            BasicMethod::Nack(nack) => {
                self.handle_reject(nack.delivery_tag, nack.multiple, nack.requeue, basic::METHOD_NACK)
                    .await
            }
            BasicMethod::Reject(reject) => {
                self.handle_reject(reject.delivery_tag, false, reject.requeue, basic::METHOD_REJECT)
                    .await
            }
            BasicMethod::Get(get) => self.handle_get(get).await,
            BasicMethod::Recover(recover) => self.handle_recover(recover.requeue, true).await,
            BasicMethod::RecoverAsync(recover) => self.handle_recover(recover.requeue, false).await,
            other => Err(AmqpError::connection(
                reply_code::COMMAND_INVALID,
                format!("unexpected method {}", other.name()),
                CLASS_BASIC,
                other.method_id(),
            )),
        }
    }

    async fn confirm_route(self: &Arc<Self>, method: ConfirmMethod) -> Result<(), AmqpError> {
        match method {
            ConfirmMethod::Select(select) => {
                if !self.confirm_mode.swap(true, Ordering::SeqCst) {
                    self.start_confirm_task();
                }
                if !select.no_wait {
                    self.send_method(Method::Confirm(ConfirmMethod::SelectOk))
                        .await;
                }
                Ok(())
            }
            ConfirmMethod::SelectOk => Err(AmqpError::connection(
                reply_code::COMMAND_INVALID,
                "unexpected reply method from client",
                CLASS_CONFIRM,
                method.method_id(),
            )),
        }
    }

    fn tx_route(&self, method: TxMethod) -> Result<(), AmqpError> {
        Err(AmqpError::channel(
            reply_code::NOT_IMPLEMENTED,
            "transactions are not implemented",
            CLASS_TX,
            method.method_id(),
        ))
    }

    ////////////////////////////////////////////////////////////////////////
    // content assembly and routing

    fn handle_publish(&self, method: BasicPublish) -> Result<(), AmqpError> {
        if method.immediate {
            return Err(AmqpError::channel(
                reply_code::NOT_IMPLEMENTED,
                "immediate publishes are not implemented",
                CLASS_BASIC,
                basic::METHOD_PUBLISH,
            ));
        }
        let mut message = Message::new(
            method.exchange,
            method.routing_key,
            method.mandatory,
            method.immediate,
        );
        if self.is_confirm_mode() {
            message.confirm_meta = ConfirmMeta::with_tag(self.next_confirm_delivery_tag());
        }
        *self.current_message.lock().unwrap() = Some(message);
        Ok(())
    }

    async fn handle_content_header(&self, header: ContentHeader) -> Result<(), AmqpError> {
        let completed = {
            let mut slot = self.current_message.lock().unwrap();
            let message = slot.as_mut().ok_or_else(|| {
                AmqpError::connection(reply_code::FRAME_ERROR, "unexpected content header frame", 0, 0)
            })?;
            if message.header.is_some() {
                return Err(AmqpError::connection(
                    reply_code::FRAME_ERROR,
                    "unexpected content header frame - header already exists",
                    0,
                    0,
                ));
            }
            message.header = Some(header);
            // a zero-size body never produces body frames
            if message.is_complete() {
                slot.take()
            } else {
                None
            }
        };
        if let Some(message) = completed {
            self.route_message(message).await?;
        }
        Ok(())
    }

    async fn handle_content_body(&self, body: ContentBody) -> Result<(), AmqpError> {
        let completed = {
            let mut slot = self.current_message.lock().unwrap();
            let message = slot.as_mut().ok_or_else(|| {
                AmqpError::connection(reply_code::FRAME_ERROR, "unexpected content body frame", 0, 0)
            })?;
            if message.header.is_none() {
                return Err(AmqpError::connection(
                    reply_code::FRAME_ERROR,
                    "unexpected content body frame - no header yet",
                    0,
                    0,
                ));
            }
            message.append(body.inner);
            if message.is_complete() {
                slot.take()
            } else {
                None
            }
        };
        if let Some(message) = completed {
            self.route_message(message).await?;
        }
        Ok(())
    }

    async fn route_message(&self, mut message: Message) -> Result<(), AmqpError> {
        let Some(exchange) = self.vhost.get_exchange(&message.exchange) else {
            return self.unrouted(message).await;
        };
        let matched = exchange.matched_queues(&message);
        if matched.is_empty() {
            return self.unrouted(message).await;
        }

        self.metrics.publish.inc(1);
        message.confirm_meta.expected_confirms = matched.len();
        let message = Arc::new(message);
        for queue_name in &matched {
            // fresh lookup per push, queues may be deleted concurrently
            let Some(queue) = self.vhost.get_queue(queue_name) else {
                continue;
            };
            queue.push(Arc::clone(&message)).await;
            self.metrics.total.inc(1);
            self.metrics.ready.inc(1);
        }

        if message.confirm_meta.can_confirm && !message.is_persistent() {
            self.add_confirm(message.confirm_meta.clone());
        }
        Ok(())
    }

    async fn unrouted(&self, message: Message) -> Result<(), AmqpError> {
        if message.mandatory {
            let ret = BasicReturn {
                reply_code: reply_code::NO_CONSUMERS,
                reply_text: "No route".to_owned(),
                exchange: message.exchange.clone(),
                routing_key: message.routing_key.clone(),
            };
            self.send_content(ret.into(), &message).await;
        } else if !message.is_persistent() {
            self.add_confirm(message.confirm_meta.clone());
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // publisher confirms

    fn add_confirm(&self, meta: ConfirmMeta) {
        if !self.is_confirm_mode() || !meta.can_confirm {
            return;
        }
        let mut queue = self.confirm_queue.lock().unwrap();
        if self.status() == ChannelStatus::Closed {
            return;
        }
        queue.push(meta);
    }

    /// Drains the confirm buffer on a fixed tick, one `basic.ack` per
    /// entry. The swap happens under the lock, the sends after it.
    fn start_confirm_task(self: &Arc<Self>) {
        let channel = Arc::clone(self);
        let span = tracing::info_span!("confirm_drain", conn_id = self.conn_id, channel_id = self.id);
        tokio::spawn(
            async move {
                let mut tick = tokio::time::interval(channel.config.confirm_tick());
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if channel.status() == ChannelStatus::Closed {
                                break;
                            }
                            let pending = std::mem::take(&mut *channel.confirm_queue.lock().unwrap());
                            for meta in pending {
                                channel
                                    .send_method(BasicAck {
                                        delivery_tag: meta.delivery_tag,
                                        multiple: false,
                                    })
                                    .await;
                                channel.metrics.confirm.inc(1);
                            }
                        }
                        _ = channel.closed.notified() => break,
                    }
                }
                trace!("confirm drain task stopped");
            }
            .instrument(span),
        );
    }

    ////////////////////////////////////////////////////////////////////////
    // consumers

    async fn handle_qos(&self, method: BasicQos) -> Result<(), AmqpError> {
        self.update_qos(method.prefetch_count, method.prefetch_size, method.global);
        self.send_method(Method::Basic(BasicMethod::QosOk)).await;
        Ok(())
    }

    fn update_qos(&self, prefetch_count: u16, prefetch_size: u32, global: bool) {
        match self.proto {
            ProtoVersion::Amqp091 => {
                if global {
                    self.conn_qos.update(prefetch_count, prefetch_size);
                } else {
                    self.qos.update(prefetch_count, prefetch_size);
                }
            }
            ProtoVersion::Rabbit => {
                if global {
                    self.qos.update(prefetch_count, prefetch_size);
                } else {
                    self.consumer_qos.update(prefetch_count, prefetch_size);
                }
            }
        }
    }

    async fn handle_consume(self: &Arc<Self>, method: BasicConsume) -> Result<(), AmqpError> {
        let consumer = self.add_consumer(&method)?;
        if !method.no_wait {
            self.send_method(BasicConsumeOk {
                consumer_tag: consumer.tag().to_owned(),
            })
            .await;
        }
        consumer.consume();
        Ok(())
    }

    fn add_consumer(self: &Arc<Self>, method: &BasicConsume) -> Result<Arc<Consumer>, AmqpError> {
        let mut consumers = self.consumers.lock().unwrap();

        let queue = self.get_queue_with_error(&method.queue, CLASS_BASIC, basic::METHOD_CONSUME)?;

        let qos = match self.proto {
            ProtoVersion::Amqp091 => vec![Arc::clone(&self.qos), Arc::clone(&self.conn_qos)],
            // consumers pin a snapshot of the channel template; later
            // basic.qos calls only affect consumers registered after them
            ProtoVersion::Rabbit => {
                vec![Arc::clone(&self.qos), Arc::new(self.consumer_qos.snapshot())]
            }
        };

        let tag = if method.consumer_tag.is_empty() {
            self.generate_consumer_tag()
        } else {
            method.consumer_tag.clone()
        };
        if consumers.contains_key(&tag) {
            return Err(AmqpError::channel(
                reply_code::NOT_ALLOWED,
                format!("Consumer with tag '{}' already exists", tag),
                CLASS_BASIC,
                basic::METHOD_CONSUME,
            ));
        }

        let consumer = Consumer::new(tag.clone(), method.no_ack, self, Arc::clone(&queue), qos);
        if let Err(err) =
            queue.add_consumer(Arc::clone(&consumer) as Arc<dyn QueueConsumer>, method.exclusive)
        {
            consumer.stop();
            return Err(AmqpError::channel(
                reply_code::ACCESS_REFUSED,
                err.to_string(),
                CLASS_BASIC,
                basic::METHOD_CONSUME,
            ));
        }
        consumers.insert(tag, Arc::clone(&consumer));

        Ok(consumer)
    }

    async fn handle_cancel(&self, method: BasicCancel) -> Result<(), AmqpError> {
        self.remove_consumer(&method.consumer_tag);
        if !method.no_wait {
            self.send_method(BasicCancelOk {
                consumer_tag: method.consumer_tag,
            })
            .await;
        }
        Ok(())
    }

    fn remove_consumer(&self, tag: &str) {
        let mut consumers = self.consumers.lock().unwrap();
        if let Some(consumer) = consumers.remove(tag) {
            consumer.stop();
        }
    }

    fn generate_consumer_tag(&self) -> String {
        format!(
            "ctag-{}.{}",
            self.id,
            self.name_seq.fetch_add(1, Ordering::Relaxed) + 1
        )
    }

    fn generate_queue_name(&self) -> String {
        format!(
            "amq.gen-{}.{}",
            self.conn_id,
            self.name_seq.fetch_add(1, Ordering::Relaxed) + 1
        )
    }

    /// Idempotent; pausing keeps in-flight deliveries intact.
    fn change_flow(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) == active {
            return;
        }
        debug!(active, "channel flow changed");
        let consumers = self.consumers.lock().unwrap();
        if active {
            for consumer in consumers.values() {
                consumer.unpause();
                consumer.consume();
            }
        } else {
            for consumer in consumers.values() {
                consumer.pause();
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // unacked ledger

    pub(crate) async fn add_unacked_message(
        &self,
        delivery_tag: DeliveryTag,
        consumer_tag: &str,
        queue: &str,
        message: Arc<Message>,
    ) {
        let mut unacked = self.unacked.lock().await;
        unacked.insert(
            delivery_tag,
            UnackedMessage {
                consumer_tag: consumer_tag.to_owned(),
                queue: queue.to_owned(),
                message,
            },
        );
        self.metrics.unacked.inc(1);
        self.metrics.ready.dec(1);
    }

    async fn handle_ack(&self, method: BasicAck) -> Result<(), AmqpError> {
        let mut unacked = self.unacked.lock().await;

        if method.multiple {
            // a zero tag selects everything outstanding; acks commute, so
            // no ordering is imposed here
            let tags: Vec<DeliveryTag> = unacked
                .keys()
                .filter(|tag| method.delivery_tag == 0 || **tag <= method.delivery_tag)
                .copied()
                .collect();
            for tag in tags {
                if let Some(entry) = unacked.remove(&tag) {
                    self.ack_msg(entry).await;
                }
            }
            return Ok(());
        }

        let Some(entry) = unacked.remove(&method.delivery_tag) else {
            return Err(AmqpError::channel(
                reply_code::PRECONDITION_FAILED,
                format!("Delivery tag [{}] not found", method.delivery_tag),
                CLASS_BASIC,
                basic::METHOD_ACK,
            ));
        };
        self.ack_msg(entry).await;
        Ok(())
    }

    async fn ack_msg(&self, entry: UnackedMessage) {
        if let Some(queue) = self.vhost.get_queue(&entry.queue) {
            queue.ack_msg(Arc::clone(&entry.message)).await;
            self.metrics.acknowledge.inc(1);
            self.metrics.total.dec(1);
            self.metrics.unacked.dec(1);
        }
        self.release_qos_and_wake(&entry);
    }

    async fn handle_reject(
        &self,
        delivery_tag: DeliveryTag,
        multiple: bool,
        requeue: bool,
        method_id: MethodId,
    ) -> Result<(), AmqpError> {
        let mut unacked = self.unacked.lock().await;

        if multiple {
            let mut tags: Vec<DeliveryTag> = unacked
                .keys()
                .filter(|tag| delivery_tag == 0 || **tag <= delivery_tag)
                .copied()
                .collect();
            // latest first, the requeue order matters to the queue
            tags.sort_unstable_by(|a, b| b.cmp(a));
            for tag in tags {
                if let Some(entry) = unacked.remove(&tag) {
                    self.reject_msg(entry, requeue).await;
                }
            }
            return Ok(());
        }

        let Some(entry) = unacked.remove(&delivery_tag) else {
            return Err(AmqpError::channel(
                reply_code::PRECONDITION_FAILED,
                format!("Delivery tag [{}] not found", delivery_tag),
                CLASS_BASIC,
                method_id,
            ));
        };
        self.reject_msg(entry, requeue).await;
        Ok(())
    }

    async fn reject_msg(&self, entry: UnackedMessage, requeue: bool) {
        if let Some(queue) = self.vhost.get_queue(&entry.queue) {
            if requeue {
                queue.requeue(Arc::clone(&entry.message)).await;
                self.metrics.ready.inc(1);
            } else {
                // a discarded reject is an ack as far as the queue cares
                queue.ack_msg(Arc::clone(&entry.message)).await;
            }
            self.metrics.unacked.dec(1);
        }
        self.release_qos_and_wake(&entry);
    }

    fn release_qos_and_wake(&self, entry: &UnackedMessage) {
        let consumers = self.consumers.lock().unwrap();
        if let Some(consumer) = consumers.get(&entry.consumer_tag) {
            // release before waking, a blocked pump must see the freed budget
            for qos in consumer.qos() {
                qos.dec(1, entry.message.body_size);
            }
            consumer.consume();
        } else {
            self.qos.dec(1, entry.message.body_size);
            self.conn_qos.dec(1, entry.message.body_size);
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // direct fetch and recovery

    async fn handle_get(self: &Arc<Self>, method: BasicGet) -> Result<(), AmqpError> {
        let queue = self.get_queue_with_error(&method.queue, CLASS_BASIC, basic::METHOD_GET)?;
        self.check_queue_lock(queue.as_ref(), CLASS_BASIC, basic::METHOD_GET)?;

        match queue.pop().await {
            Some(message) => {
                let delivery_tag = self.next_delivery_tag();
                if method.no_ack {
                    self.metrics.total.dec(1);
                    self.metrics.ready.dec(1);
                    queue.ack_msg(Arc::clone(&message)).await;
                } else {
                    // direct fetches carry no consumer tag in the ledger
                    self.add_unacked_message(delivery_tag, "", &method.queue, Arc::clone(&message))
                        .await;
                }
                let get_ok = BasicGetOk {
                    delivery_tag,
                    redelivered: false,
                    exchange: message.exchange.clone(),
                    routing_key: message.routing_key.clone(),
                    message_count: queue.length() as u32,
                };
                self.send_content(get_ok.into(), &message).await;
            }
            None => {
                self.send_method(Method::Basic(BasicMethod::GetEmpty))
                    .await;
            }
        }
        Ok(())
    }

    async fn handle_recover(&self, requeue: bool, send_ok: bool) -> Result<(), AmqpError> {
        if !requeue {
            return Err(AmqpError::channel(
                reply_code::NOT_IMPLEMENTED,
                "recover without requeue is not implemented",
                CLASS_BASIC,
                basic::METHOD_RECOVER,
            ));
        }
        self.handle_reject(0, true, true, basic::METHOD_RECOVER).await?;
        if send_ok {
            self.send_method(Method::Basic(BasicMethod::RecoverOk))
                .await;
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // exchange and queue classes

    async fn exchange_route(&self, method: ExchangeMethod) -> Result<(), AmqpError> {
        match method {
            ExchangeMethod::Declare(declare) => self.handle_exchange_declare(declare).await,
            ExchangeMethod::Delete(_) => Err(AmqpError::channel(
                reply_code::NOT_IMPLEMENTED,
                "exchange.delete is not implemented",
                CLASS_EXCHANGE,
                exchange_method::METHOD_DELETE,
            )),
            other => Err(AmqpError::connection(
                reply_code::COMMAND_INVALID,
                "unexpected reply method from client",
                CLASS_EXCHANGE,
                other.method_id(),
            )),
        }
    }

    async fn handle_exchange_declare(&self, method: ExchangeDeclare) -> Result<(), AmqpError> {
        let Some(kind) = ExchangeKind::from_alias(&method.kind) else {
            return Err(AmqpError::connection(
                reply_code::COMMAND_INVALID,
                format!("invalid exchange type '{}'", method.kind),
                CLASS_EXCHANGE,
                exchange_method::METHOD_DECLARE,
            ));
        };

        match self.vhost.get_exchange(&method.exchange) {
            Some(existing) => {
                if existing.kind() != kind {
                    return Err(AmqpError::channel(
                        reply_code::PRECONDITION_FAILED,
                        format!(
                            "exchange '{}' is already declared as type '{}'",
                            method.exchange,
                            existing.kind()
                        ),
                        CLASS_EXCHANGE,
                        exchange_method::METHOD_DECLARE,
                    ));
                }
            }
            None => {
                if method.passive {
                    return Err(AmqpError::channel(
                        reply_code::NOT_FOUND,
                        format!("exchange '{}' not found", method.exchange),
                        CLASS_EXCHANGE,
                        exchange_method::METHOD_DECLARE,
                    ));
                }
                if method.exchange.starts_with("amq.") {
                    return Err(AmqpError::channel(
                        reply_code::ACCESS_REFUSED,
                        format!(
                            "exchange name '{}' contains reserved prefix 'amq.'",
                            method.exchange
                        ),
                        CLASS_EXCHANGE,
                        exchange_method::METHOD_DECLARE,
                    ));
                }
                self.vhost.declare_exchange(
                    &method.exchange,
                    kind,
                    method.durable,
                    method.auto_delete,
                    method.internal,
                );
            }
        }

        if !method.no_wait {
            self.send_method(Method::Exchange(ExchangeMethod::DeclareOk))
                .await;
        }
        Ok(())
    }

    async fn queue_route(&self, method: QueueMethod) -> Result<(), AmqpError> {
        match method {
            QueueMethod::Declare(declare) => self.handle_queue_declare(declare).await,
            QueueMethod::Bind(bind) => self.handle_queue_bind(bind).await,
            QueueMethod::Unbind(unbind) => self.handle_queue_unbind(unbind).await,
            QueueMethod::Purge(purge) => self.handle_queue_purge(purge).await,
            QueueMethod::Delete(delete) => self.handle_queue_delete(delete).await,
            other => Err(AmqpError::connection(
                reply_code::COMMAND_INVALID,
                "unexpected reply method from client",
                CLASS_QUEUE,
                other.method_id(),
            )),
        }
    }

    async fn handle_queue_declare(&self, method: QueueDeclare) -> Result<(), AmqpError> {
        if method.passive {
            let queue =
                self.get_queue_with_error(&method.queue, CLASS_QUEUE, queue_method::METHOD_DECLARE)?;
            self.check_queue_lock(queue.as_ref(), CLASS_QUEUE, queue_method::METHOD_DECLARE)?;
            if !method.no_wait {
                self.send_method(QueueDeclareOk {
                    queue: method.queue,
                    message_count: queue.length() as u32,
                    consumer_count: queue.consumer_count(),
                })
                .await;
            }
            return Ok(());
        }

        let name = if method.queue.is_empty() {
            self.generate_queue_name()
        } else {
            method.queue.clone()
        };
        let queue = match self.vhost.get_queue(&name) {
            Some(existing) => {
                self.check_queue_lock(existing.as_ref(), CLASS_QUEUE, queue_method::METHOD_DECLARE)?;
                existing
            }
            None => self.vhost.declare_queue(
                &name,
                self.conn_id,
                method.exclusive,
                method.auto_delete,
                method.durable,
            ),
        };

        if !method.no_wait {
            self.send_method(QueueDeclareOk {
                queue: name,
                message_count: queue.length() as u32,
                consumer_count: queue.consumer_count(),
            })
            .await;
        }
        Ok(())
    }

    async fn handle_queue_bind(&self, method: QueueBind) -> Result<(), AmqpError> {
        let queue = self.get_queue_with_error(&method.queue, CLASS_QUEUE, queue_method::METHOD_BIND)?;
        self.check_queue_lock(queue.as_ref(), CLASS_QUEUE, queue_method::METHOD_BIND)?;
        let exchange =
            self.get_exchange_with_error(&method.exchange, CLASS_QUEUE, queue_method::METHOD_BIND)?;

        exchange.append_binding(Binding::new(
            method.queue,
            method.exchange,
            method.routing_key,
            method.arguments,
        ));

        if !method.no_wait {
            self.send_method(Method::Queue(QueueMethod::BindOk)).await;
        }
        Ok(())
    }

    async fn handle_queue_unbind(&self, method: QueueUnbind) -> Result<(), AmqpError> {
        let queue =
            self.get_queue_with_error(&method.queue, CLASS_QUEUE, queue_method::METHOD_UNBIND)?;
        self.check_queue_lock(queue.as_ref(), CLASS_QUEUE, queue_method::METHOD_UNBIND)?;
        let exchange =
            self.get_exchange_with_error(&method.exchange, CLASS_QUEUE, queue_method::METHOD_UNBIND)?;

        exchange.remove_binding(&method.queue, &method.routing_key);
        self.send_method(Method::Queue(QueueMethod::UnbindOk)).await;
        Ok(())
    }

    async fn handle_queue_purge(&self, method: QueuePurge) -> Result<(), AmqpError> {
        let queue =
            self.get_queue_with_error(&method.queue, CLASS_QUEUE, queue_method::METHOD_PURGE)?;
        self.check_queue_lock(queue.as_ref(), CLASS_QUEUE, queue_method::METHOD_PURGE)?;

        let purged = queue.purge().await;
        if !method.no_wait {
            self.send_method(QueuePurgeOk {
                message_count: purged as u32,
            })
            .await;
        }
        Ok(())
    }

    async fn handle_queue_delete(&self, method: QueueDelete) -> Result<(), AmqpError> {
        let queue =
            self.get_queue_with_error(&method.queue, CLASS_QUEUE, queue_method::METHOD_DELETE)?;
        self.check_queue_lock(queue.as_ref(), CLASS_QUEUE, queue_method::METHOD_DELETE)?;

        match self
            .vhost
            .delete_queue(&method.queue, method.if_unused, method.if_empty)
            .await
        {
            Ok(length) => {
                if !method.no_wait {
                    self.send_method(QueueDeleteOk {
                        message_count: length as u32,
                    })
                    .await;
                }
                Ok(())
            }
            Err(err) => Err(AmqpError::channel(
                reply_code::PRECONDITION_FAILED,
                err.to_string(),
                CLASS_QUEUE,
                queue_method::METHOD_DELETE,
            )),
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // lookups

    fn get_exchange_with_error(
        &self,
        name: &str,
        class_id: u16,
        method_id: MethodId,
    ) -> Result<Arc<dyn AmqpExchange>, AmqpError> {
        self.vhost.get_exchange(name).ok_or_else(|| {
            AmqpError::channel(
                reply_code::NOT_FOUND,
                format!("exchange '{}' not found", name),
                class_id,
                method_id,
            )
        })
    }

    fn get_queue_with_error(
        &self,
        name: &str,
        class_id: u16,
        method_id: MethodId,
    ) -> Result<Arc<dyn AmqpQueue>, AmqpError> {
        match self.vhost.get_queue(name) {
            Some(queue) if queue.is_active() => Ok(queue),
            _ => Err(AmqpError::channel(
                reply_code::NOT_FOUND,
                format!("queue '{}' not found", name),
                class_id,
                method_id,
            )),
        }
    }

    fn check_queue_lock(
        &self,
        queue: &dyn AmqpQueue,
        class_id: u16,
        method_id: MethodId,
    ) -> Result<(), AmqpError> {
        if queue.is_exclusive() && queue.conn_id() != self.conn_id {
            return Err(AmqpError::channel(
                reply_code::RESOURCE_LOCKED,
                format!("queue '{}' is locked to another connection", queue.name()),
                class_id,
                method_id,
            ));
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // outbound

    pub(crate) async fn send_method(&self, method: impl Into<Method>) {
        let method = method.into();
        if self.status() == ChannelStatus::Closed && !is_close_handshake(&method) {
            trace!(method = method.name(), "suppressed on closed channel");
            return;
        }
        debug!(method = method.name(), "outgoing method");
        self.send_frame(Frame::method(self.id, method)).await;
    }

    /// Emit method + header + body fragments, contiguously for this
    /// channel since the single dispatch task drives all content sends.
    pub(crate) async fn send_content(&self, method: Method, message: &Message) {
        if self.status() == ChannelStatus::Closed {
            return;
        }
        let is_deliver = matches!(&method, Method::Basic(BasicMethod::Deliver(_)));
        self.send_method(method).await;

        let Some(header) = message.header.clone() else {
            // assembled messages always carry a header
            return;
        };
        self.send_frame(Frame::header(self.id, header)).await;
        for chunk in &message.body {
            self.send_frame(Frame::body(self.id, ContentBody::new(chunk.clone())))
                .await;
        }

        if is_deliver {
            self.metrics.deliver.inc(1);
        }
    }

    async fn send_frame(&self, frame: Frame) {
        if self.outgoing_tx.send(frame).await.is_err() {
            trace!("outgoing frame sink closed");
        }
    }

    /// Classify a handler failure: channel errors start the channel close
    /// handshake, connection errors surface as `connection.close` on
    /// channel 0 and take the whole connection down.
    pub(crate) async fn send_error(&self, err: AmqpError) {
        error!(reply_code = err.reply_code, reply_text = %err.reply_text, "amqp error");
        match err.scope {
            ErrorScope::Channel => {
                self.set_status(ChannelStatus::Closing);
                self.send_method(ChannelClose {
                    reply_code: err.reply_code,
                    reply_text: err.reply_text,
                    class_id: err.class_id,
                    method_id: err.method_id,
                })
                .await;
            }
            ErrorScope::Connection => {
                if let Some(conn) = self.conn.upgrade() {
                    conn.set_status(ConnectionStatus::Closing);
                    if let Some(zero) = conn.channel(0) {
                        zero.send_method(ConnectionClose {
                            reply_code: err.reply_code,
                            reply_text: err.reply_text,
                            class_id: err.class_id,
                            method_id: err.method_id,
                        })
                        .await;
                    }
                }
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // close

    /// Stop and drop every consumer, requeue all unacked deliveries, then
    /// mark the channel Closed and cancel the confirm drain.
    pub(crate) async fn close(self: &Arc<Self>) {
        if self.status() == ChannelStatus::Closed {
            return;
        }
        {
            let mut consumers = self.consumers.lock().unwrap();
            for (tag, consumer) in consumers.drain() {
                consumer.stop();
                info!(consumer_tag = %tag, "consumer stopped");
            }
        }
        if self.id > 0 {
            let _ = self.handle_reject(0, true, true, basic::METHOD_NACK).await;
        }
        self.set_status(ChannelStatus::Closed);
        self.closed.notify_waiters();
    }
}
