use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tracing::{trace, Instrument};

use amqp_proto::method::BasicDeliver;
use amqp_proto::Message;

use crate::qos::QosLimiter;
use crate::vhost::{AmqpQueue, QueueConsumer};

use super::channel::Channel;

/// A consumer session. The channel registry owns the `Arc`; the pump task
/// holds a second one and reaches the channel through a weak reference,
/// so a dropped channel ends the pump instead of keeping it alive.
pub struct Consumer {
    tag: String,
    queue_name: String,
    no_ack: bool,
    channel: Weak<Channel>,
    queue: Arc<dyn AmqpQueue>,
    qos: Vec<Arc<QosLimiter>>,
    active: AtomicBool,
    stopped: AtomicBool,
    wakeup: Notify,
}

impl Consumer {
    pub(crate) fn new(
        tag: String,
        no_ack: bool,
        channel: &Arc<Channel>,
        queue: Arc<dyn AmqpQueue>,
        qos: Vec<Arc<QosLimiter>>,
    ) -> Arc<Self> {
        let consumer = Arc::new(Self {
            tag,
            queue_name: queue.name().to_owned(),
            no_ack,
            channel: Arc::downgrade(channel),
            queue,
            qos,
            active: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            wakeup: Notify::new(),
        });
        consumer.spawn_pump(channel.id());
        consumer
    }

    pub fn qos(&self) -> &[Arc<QosLimiter>] {
        &self.qos
    }

    pub(crate) fn pause(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub(crate) fn unpause(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.is_stopped()
    }

    fn spawn_pump(self: &Arc<Self>, channel_id: u16) {
        let consumer = Arc::clone(self);
        let span = tracing::info_span!("consumer", channel_id, consumer_tag = %self.tag);
        tokio::spawn(
            async move {
                trace!("consumer pump started");
                loop {
                    consumer.wakeup.notified().await;
                    if consumer.is_stopped() {
                        break;
                    }
                    while consumer.is_ready() {
                        let Some(channel) = consumer.channel.upgrade() else {
                            trace!("channel is gone, consumer pump exits");
                            return;
                        };
                        // no-ack consumers bypass prefetch accounting
                        let message = if consumer.no_ack {
                            consumer.queue.pop().await
                        } else {
                            consumer.queue.pop_qos(&consumer.qos).await
                        };
                        let Some(message) = message else {
                            break;
                        };
                        consumer.deliver(&channel, message).await;
                    }
                    if consumer.is_stopped() {
                        break;
                    }
                }
                trace!("consumer pump stopped");
            }
            .instrument(span),
        );
    }

    async fn deliver(&self, channel: &Arc<Channel>, message: Arc<Message>) {
        let delivery_tag = channel.next_delivery_tag();
        if self.no_ack {
            // popped and delivered, nothing left to track
            channel.metrics().total.dec(1);
            channel.metrics().ready.dec(1);
            self.queue.ack_msg(Arc::clone(&message)).await;
        } else {
            channel
                .add_unacked_message(delivery_tag, &self.tag, &self.queue_name, Arc::clone(&message))
                .await;
        }
        let deliver = BasicDeliver {
            consumer_tag: self.tag.clone(),
            delivery_tag,
            redelivered: false,
            exchange: message.exchange.clone(),
            routing_key: message.routing_key.clone(),
        };
        channel.send_content(deliver.into(), &message).await;
    }
}

impl QueueConsumer for Consumer {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn consume(&self) {
        self.wakeup.notify_one();
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.queue.remove_consumer(&self.tag);
            self.wakeup.notify_one();
        }
    }
}
