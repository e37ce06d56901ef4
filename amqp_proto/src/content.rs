use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::method::CLASS_BASIC;
use crate::types::{ClassId, FieldTable};

pub const DELIVERY_MODE_TRANSIENT: u8 = 1;
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Content header payload: class id, weight (always 0) and the declared body
/// size, followed by the property list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentHeader {
    pub class_id: ClassId,
    pub weight: u16,
    pub body_size: u64,
    pub properties: BasicProperties,
}

impl ContentHeader {
    pub fn for_basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: CLASS_BASIC,
            weight: 0,
            body_size,
            properties,
        }
    }
}

/// Properties of the basic content class.
///
/// The two property-flag octets of the wire format are reconstructed by the
/// codec from which options are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub message_type: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    pub fn with_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    pub fn with_content_encoding(&mut self, content_encoding: &str) -> &mut Self {
        self.content_encoding = Some(content_encoding.to_owned());
        self
    }

    pub fn with_headers(&mut self, headers: FieldTable) -> &mut Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_delivery_mode(&mut self, delivery_mode: u8) -> &mut Self {
        self.delivery_mode = Some(delivery_mode);
        self
    }

    pub fn with_priority(&mut self, priority: u8) -> &mut Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_correlation_id(&mut self, correlation_id: &str) -> &mut Self {
        self.correlation_id = Some(correlation_id.to_owned());
        self
    }

    pub fn with_reply_to(&mut self, reply_to: &str) -> &mut Self {
        self.reply_to = Some(reply_to.to_owned());
        self
    }

    pub fn with_expiration(&mut self, expiration: &str) -> &mut Self {
        self.expiration = Some(expiration.to_owned());
        self
    }

    pub fn with_message_id(&mut self, message_id: &str) -> &mut Self {
        self.message_id = Some(message_id.to_owned());
        self
    }

    pub fn with_timestamp(&mut self, timestamp: u64) -> &mut Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_message_type(&mut self, message_type: &str) -> &mut Self {
        self.message_type = Some(message_type.to_owned());
        self
    }

    pub fn with_user_id(&mut self, user_id: &str) -> &mut Self {
        self.user_id = Some(user_id.to_owned());
        self
    }

    pub fn with_app_id(&mut self, app_id: &str) -> &mut Self {
        self.app_id = Some(app_id.to_owned());
        self
    }

    pub fn finish(&mut self) -> Self {
        self.clone()
    }

    pub fn is_persistent(&self) -> bool {
        self.delivery_mode == Some(DELIVERY_MODE_PERSISTENT)
    }
}

/// One content body fragment.
#[derive(Debug, Clone)]
pub struct ContentBody {
    pub inner: Bytes,
}

impl ContentBody {
    pub fn new(inner: Bytes) -> Self {
        Self { inner }
    }
}
