use bytes::Bytes;

use crate::content::ContentHeader;
use crate::types::DeliveryTag;

/// Confirm bookkeeping attached to every published message.
///
/// The delivery tag is the publisher-visible tag echoed back in
/// `basic.ack`; it is only allocated while the channel is in confirm mode.
/// `expected_confirms` counts the queues that must acknowledge a persistent
/// delivery before the publisher ack may go out.
#[derive(Debug, Clone, Default)]
pub struct ConfirmMeta {
    pub delivery_tag: DeliveryTag,
    pub expected_confirms: usize,
    pub actual_confirms: usize,
    pub can_confirm: bool,
}

impl ConfirmMeta {
    pub fn with_tag(delivery_tag: DeliveryTag) -> Self {
        Self {
            delivery_tag,
            expected_confirms: 0,
            actual_confirms: 0,
            can_confirm: true,
        }
    }
}

/// A logical message, assembled from a `basic.publish` method, one content
/// header and zero or more body fragments.
#[derive(Debug)]
pub struct Message {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
    pub header: Option<ContentHeader>,
    pub body: Vec<Bytes>,
    pub body_size: u64,
    pub confirm_meta: ConfirmMeta,
}

impl Message {
    pub fn new(exchange: String, routing_key: String, mandatory: bool, immediate: bool) -> Self {
        Self {
            exchange,
            routing_key,
            mandatory,
            immediate,
            header: None,
            body: Vec::new(),
            body_size: 0,
            confirm_meta: ConfirmMeta::default(),
        }
    }

    /// Append one body fragment in arrival order.
    pub fn append(&mut self, chunk: Bytes) {
        self.body_size += chunk.len() as u64;
        self.body.push(chunk);
    }

    /// The declared size in the header is authoritative; excess bytes are
    /// not expected.
    pub fn is_complete(&self) -> bool {
        match &self.header {
            Some(header) => self.body_size >= header.body_size,
            None => false,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.header
            .as_ref()
            .map(|header| header.properties.is_persistent())
            .unwrap_or(false)
    }
}
