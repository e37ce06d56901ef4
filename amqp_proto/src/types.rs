//! Domain aliases and field table values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type ChannelId = u16;
pub type ClassId = u16;
pub type MethodId = u16;
pub type DeliveryTag = u64;
pub type ConnectionId = u64;
pub type ReplyCode = u16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimalValue(pub u8, pub u32);

// Variant names follow the wire type tags of the RabbitMQ field table
// dialect. Ref: https://www.rabbitmq.com/amqp-0-9-1-errata.html#section_3
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum FieldValue {
    t(bool),
    b(i8),
    B(u8),
    s(i16),
    u(u16),
    I(i32),
    i(u32),
    l(i64),
    f(f32),
    d(f64),
    D(DecimalValue),
    S(String),
    A(Vec<FieldValue>),
    T(u64),
    F(FieldTable),
    V,
    x(Vec<u8>),
}

pub type FieldTable = HashMap<String, FieldValue>;
