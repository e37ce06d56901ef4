use serde::{Deserialize, Serialize};

use crate::types::{DeliveryTag, FieldTable, MethodId, ReplyCode};

pub const METHOD_QOS: MethodId = 10;
pub const METHOD_QOS_OK: MethodId = 11;
pub const METHOD_CONSUME: MethodId = 20;
pub const METHOD_CONSUME_OK: MethodId = 21;
pub const METHOD_CANCEL: MethodId = 30;
pub const METHOD_CANCEL_OK: MethodId = 31;
pub const METHOD_PUBLISH: MethodId = 40;
pub const METHOD_RETURN: MethodId = 50;
pub const METHOD_DELIVER: MethodId = 60;
pub const METHOD_GET: MethodId = 70;
pub const METHOD_GET_OK: MethodId = 71;
pub const METHOD_GET_EMPTY: MethodId = 72;
pub const METHOD_ACK: MethodId = 80;
pub const METHOD_REJECT: MethodId = 90;
pub const METHOD_RECOVER_ASYNC: MethodId = 100;
pub const METHOD_RECOVER: MethodId = 110;
pub const METHOD_RECOVER_OK: MethodId = 111;
pub const METHOD_NACK: MethodId = 120;

#[derive(Debug, Clone)]
pub enum BasicMethod {
    Qos(BasicQos),
    QosOk,
    Consume(BasicConsume),
    ConsumeOk(BasicConsumeOk),
    Cancel(BasicCancel),
    CancelOk(BasicCancelOk),
    Publish(BasicPublish),
    Return(BasicReturn),
    Deliver(BasicDeliver),
    Get(BasicGet),
    GetOk(BasicGetOk),
    GetEmpty,
    Ack(BasicAck),
    Reject(BasicReject),
    RecoverAsync(BasicRecoverAsync),
    Recover(BasicRecover),
    RecoverOk,
    Nack(BasicNack),
}

/// See [AMQP 0-9-1 Reference](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.qos).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicQos {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub global: bool,
}

/// See [AMQP 0-9-1 Reference](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.consume).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicConsume {
    pub queue: String,
    pub consumer_tag: String,
    pub no_local: bool,
    pub no_ack: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicConsumeOk {
    pub consumer_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicCancel {
    pub consumer_tag: String,
    pub no_wait: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicCancelOk {
    pub consumer_tag: String,
}

/// See [AMQP 0-9-1 Reference](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.publish).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicPublish {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicReturn {
    pub reply_code: ReplyCode,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicDeliver {
    pub consumer_tag: String,
    pub delivery_tag: DeliveryTag,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicGet {
    pub queue: String,
    pub no_ack: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicGetOk {
    pub delivery_tag: DeliveryTag,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub message_count: u32,
}

/// See [AMQP 0-9-1 Reference](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.ack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAck {
    pub delivery_tag: DeliveryTag,
    pub multiple: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicReject {
    pub delivery_tag: DeliveryTag,
    pub requeue: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicRecoverAsync {
    pub requeue: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicRecover {
    pub requeue: bool,
}

/// See [AMQP 0-9-1 Reference](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.nack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicNack {
    pub delivery_tag: DeliveryTag,
    pub multiple: bool,
    pub requeue: bool,
}

impl BasicMethod {
    pub fn method_id(&self) -> MethodId {
        match self {
            BasicMethod::Qos(_) => METHOD_QOS,
            BasicMethod::QosOk => METHOD_QOS_OK,
            BasicMethod::Consume(_) => METHOD_CONSUME,
            BasicMethod::ConsumeOk(_) => METHOD_CONSUME_OK,
            BasicMethod::Cancel(_) => METHOD_CANCEL,
            BasicMethod::CancelOk(_) => METHOD_CANCEL_OK,
            BasicMethod::Publish(_) => METHOD_PUBLISH,
            BasicMethod::Return(_) => METHOD_RETURN,
            BasicMethod::Deliver(_) => METHOD_DELIVER,
            BasicMethod::Get(_) => METHOD_GET,
            BasicMethod::GetOk(_) => METHOD_GET_OK,
            BasicMethod::GetEmpty => METHOD_GET_EMPTY,
            BasicMethod::Ack(_) => METHOD_ACK,
            BasicMethod::Reject(_) => METHOD_REJECT,
            BasicMethod::RecoverAsync(_) => METHOD_RECOVER_ASYNC,
            BasicMethod::Recover(_) => METHOD_RECOVER,
            BasicMethod::RecoverOk => METHOD_RECOVER_OK,
            BasicMethod::Nack(_) => METHOD_NACK,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BasicMethod::Qos(_) => "basic.qos",
            BasicMethod::QosOk => "basic.qos-ok",
            BasicMethod::Consume(_) => "basic.consume",
            BasicMethod::ConsumeOk(_) => "basic.consume-ok",
            BasicMethod::Cancel(_) => "basic.cancel",
            BasicMethod::CancelOk(_) => "basic.cancel-ok",
            BasicMethod::Publish(_) => "basic.publish",
            BasicMethod::Return(_) => "basic.return",
            BasicMethod::Deliver(_) => "basic.deliver",
            BasicMethod::Get(_) => "basic.get",
            BasicMethod::GetOk(_) => "basic.get-ok",
            BasicMethod::GetEmpty => "basic.get-empty",
            BasicMethod::Ack(_) => "basic.ack",
            BasicMethod::Reject(_) => "basic.reject",
            BasicMethod::RecoverAsync(_) => "basic.recover-async",
            BasicMethod::Recover(_) => "basic.recover",
            BasicMethod::RecoverOk => "basic.recover-ok",
            BasicMethod::Nack(_) => "basic.nack",
        }
    }

    pub fn synchronous(&self) -> bool {
        matches!(
            self,
            BasicMethod::Qos(_)
                | BasicMethod::Consume(_)
                | BasicMethod::Cancel(_)
                | BasicMethod::Get(_)
                | BasicMethod::Recover(_)
        )
    }
}
