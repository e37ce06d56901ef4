use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use amqp_proto::types::{ChannelId, ConnectionId};
use amqp_proto::Frame;

use crate::config::BrokerConfig;
use crate::metrics::BrokerMetrics;
use crate::qos::QosLimiter;
use crate::vhost::VirtualHost;

use super::channel::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closing,
    Closed,
}

struct ChannelSlot {
    channel: Arc<Channel>,
    // the inbound sender lives here, not on the channel, so clearing the
    // map ends the dispatch task
    incoming_tx: mpsc::Sender<Frame>,
}

/// One client connection. Owns its channels; the transport owns the socket
/// and the writer task draining `outgoing_tx`'s receiver half.
pub struct Connection {
    id: ConnectionId,
    vhost: Arc<VirtualHost>,
    config: BrokerConfig,
    metrics: Arc<BrokerMetrics>,
    qos: Arc<QosLimiter>,
    status: RwLock<ConnectionStatus>,
    channels: Mutex<HashMap<ChannelId, ChannelSlot>>,
    outgoing_tx: mpsc::Sender<Frame>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        vhost: Arc<VirtualHost>,
        config: BrokerConfig,
        metrics: Arc<BrokerMetrics>,
        outgoing_tx: mpsc::Sender<Frame>,
    ) -> Arc<Self> {
        let conn = Arc::new(Self {
            id,
            vhost,
            config,
            metrics,
            qos: Arc::new(QosLimiter::default()),
            status: RwLock::new(ConnectionStatus::Open),
            channels: Mutex::new(HashMap::new()),
            outgoing_tx,
        });

        // channel 0 carries the connection-class traffic and is implicitly
        // open once negotiation is done
        conn.spawn_channel(0);
        info!(conn_id = id, "connection started");
        conn
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read().unwrap()
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().unwrap() = status;
    }

    pub(crate) fn vhost(&self) -> &Arc<VirtualHost> {
        &self.vhost
    }

    pub(crate) fn config(&self) -> BrokerConfig {
        self.config
    }

    pub(crate) fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    pub fn qos(&self) -> &Arc<QosLimiter> {
        &self.qos
    }

    pub(crate) fn outgoing(&self) -> mpsc::Sender<Frame> {
        self.outgoing_tx.clone()
    }

    pub fn channel(&self, id: ChannelId) -> Option<Arc<Channel>> {
        self.channels
            .lock()
            .unwrap()
            .get(&id)
            .map(|slot| Arc::clone(&slot.channel))
    }

    pub fn channels_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    fn spawn_channel(self: &Arc<Self>, id: ChannelId) -> mpsc::Sender<Frame> {
        let (channel, incoming_tx) = Channel::new(id, self);
        channel.start();
        self.channels.lock().unwrap().insert(
            id,
            ChannelSlot {
                channel,
                incoming_tx: incoming_tx.clone(),
            },
        );
        incoming_tx
    }

    /// Forward one inbound frame to its channel, creating the channel on
    /// first sight of the id. The per-channel stream has capacity 1, so a
    /// fast publisher is backpressured against dispatch.
    pub async fn route_frame(self: &Arc<Self>, frame: Frame) {
        if self.status() == ConnectionStatus::Closed {
            trace!(conn_id = self.id, "dropping frame on closed connection");
            return;
        }
        let incoming_tx = {
            let channels = self.channels.lock().unwrap();
            channels.get(&frame.channel_id).map(|slot| slot.incoming_tx.clone())
        };
        let incoming_tx = match incoming_tx {
            Some(tx) => tx,
            None => self.spawn_channel(frame.channel_id),
        };
        if incoming_tx.send(frame).await.is_err() {
            trace!(conn_id = self.id, "channel inbound stream is gone");
        }
    }

    /// Tear down every channel (requeueing their unacked deliveries) and
    /// end the dispatch tasks by dropping the inbound senders.
    pub async fn close(self: &Arc<Self>) {
        if self.status() == ConnectionStatus::Closed {
            return;
        }
        self.set_status(ConnectionStatus::Closing);

        let channels: Vec<Arc<Channel>> = self
            .channels
            .lock()
            .unwrap()
            .values()
            .map(|slot| Arc::clone(&slot.channel))
            .collect();
        for channel in channels {
            channel.close().await;
            debug!(conn_id = self.id, channel_id = channel.id(), "channel closed");
        }
        self.channels.lock().unwrap().clear();

        self.set_status(ConnectionStatus::Closed);
        info!(conn_id = self.id, "connection closed");
    }
}
