mod common;

use std::time::Duration;

use amqp_proto::method::{
    BasicMethod, BasicPublish, ChannelMethod, ConfirmMethod, ConfirmSelect, ConnectionMethod,
    Method,
};
use amqp_proto::{reply_code, BasicProperties, ContentBody, FramePayload, DELIVERY_MODE_TRANSIENT};
use bytes::Bytes;
use ferromq::vhost::AmqpQueue;

use common::TestBroker;

async fn select_confirm_mode(broker: &mut TestBroker, channel_id: u16) {
    broker
        .send_method(
            channel_id,
            Method::Confirm(ConfirmMethod::Select(ConfirmSelect { no_wait: false })),
        )
        .await;
    let (_, method) = broker.recv_method().await;
    assert!(matches!(
        method,
        Method::Confirm(ConfirmMethod::SelectOk)
    ));
}

#[tokio::test]
async fn publish_routes_to_bound_queue() {
    let mut broker = TestBroker::start();
    let queue = broker.queue("q1");
    broker.bind("amq.direct", "q1", "q1");
    broker.open_channel(1).await;

    broker
        .publish(1, "amq.direct", "q1", false, BasicProperties::default(), b"hello")
        .await;
    broker.expect_no_frame(Duration::from_millis(50)).await;

    assert_eq!(queue.length(), 1);
    assert_eq!(broker.metrics.publish.value(), 1);
    assert_eq!(broker.metrics.total.value(), 1);
    assert_eq!(broker.metrics.ready.value(), 1);
}

#[tokio::test]
async fn body_arrives_reassembled_in_order() {
    let mut broker = TestBroker::start();
    let queue = broker.queue("q1");
    broker.open_channel(1).await;

    // default exchange routes on the queue name
    broker
        .send_method(
            1,
            BasicPublish {
                exchange: String::new(),
                routing_key: "q1".to_owned(),
                mandatory: false,
                immediate: false,
            },
        )
        .await;
    broker
        .send(
            1,
            FramePayload::Header(amqp_proto::ContentHeader::for_basic(
                5,
                BasicProperties::default(),
            )),
        )
        .await;
    broker
        .send(1, FramePayload::Body(ContentBody::new(Bytes::from_static(b"he"))))
        .await;
    broker
        .send(1, FramePayload::Body(ContentBody::new(Bytes::from_static(b"llo"))))
        .await;
    broker.expect_no_frame(Duration::from_millis(50)).await;

    let message = queue.pop().await.expect("message must be routed");
    assert_eq!(message.body_size, 5);
    let flattened: Vec<u8> = message.body.iter().flat_map(|b| b.to_vec()).collect();
    assert_eq!(flattened, b"hello");
}

// A mandatory publish with no route comes back as basic.return, and no
// confirm is emitted even in confirm mode.
#[tokio::test]
async fn mandatory_publish_without_route_is_returned() {
    let mut broker = TestBroker::start();
    broker.open_channel(1).await;
    select_confirm_mode(&mut broker, 1).await;

    broker
        .publish(1, "none", "", true, BasicProperties::default(), b"abc")
        .await;

    let (channel_id, method, header, body) = broker.recv_content().await;
    assert_eq!(channel_id, 1);
    match method {
        Method::Basic(BasicMethod::Return(ret)) => {
            assert_eq!(ret.reply_code, reply_code::NO_CONSUMERS);
            assert_eq!(ret.reply_text, "No route");
            assert_eq!(ret.exchange, "none");
            assert_eq!(ret.routing_key, "");
        }
        other => panic!("expected basic.return, got {}", other.name()),
    }
    assert_eq!(header.body_size, 3);
    assert_eq!(body, b"abc");

    // no publisher ack for a returned mandatory publish
    broker.expect_no_frame(Duration::from_millis(60)).await;
}

// A routed non-persistent publish in confirm mode is acked within two
// drain ticks.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn confirm_mode_acks_routed_publish() {
    let mut broker = TestBroker::start();
    let queue = broker.queue("q1");
    broker.bind("amq.direct", "q1", "q1");
    broker.open_channel(1).await;
    select_confirm_mode(&mut broker, 1).await;

    let properties = BasicProperties::default()
        .with_delivery_mode(DELIVERY_MODE_TRANSIENT)
        .finish();
    broker
        .publish(1, "amq.direct", "q1", false, properties, b"hello")
        .await;

    let (channel_id, method) = broker.recv_method().await;
    assert_eq!(channel_id, 1);
    match method {
        Method::Basic(BasicMethod::Ack(ack)) => {
            assert_eq!(ack.delivery_tag, 1);
            assert!(!ack.multiple);
        }
        other => panic!("expected basic.ack, got {}", other.name()),
    }
    assert_eq!(queue.length(), 1);
    assert_eq!(broker.metrics.confirm.value(), 1);
}

// Boundary: unknown exchange, mandatory=false, confirm mode, non-persistent
// message. Exactly one confirm, no queue side effects.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unroutable_nonmandatory_publish_is_confirmed() {
    let mut broker = TestBroker::start();
    let queue = broker.queue("q1");
    broker.open_channel(1).await;
    select_confirm_mode(&mut broker, 1).await;

    broker
        .publish(1, "nowhere", "x", false, BasicProperties::default(), b"payload")
        .await;

    let (_, method) = broker.recv_method().await;
    match method {
        Method::Basic(BasicMethod::Ack(ack)) => assert_eq!(ack.delivery_tag, 1),
        other => panic!("expected basic.ack, got {}", other.name()),
    }
    broker.expect_no_frame(Duration::from_millis(60)).await;
    assert_eq!(queue.length(), 0);
    assert_eq!(broker.metrics.publish.value(), 0);
}

// Every ConfirmMeta that enters the buffer produces exactly one
// basic.ack towards the client.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_ack_per_confirmed_publish() {
    let mut broker = TestBroker::start();
    broker.queue("q1");
    broker.bind("amq.direct", "q1", "q1");
    broker.open_channel(1).await;
    select_confirm_mode(&mut broker, 1).await;

    for body in [b"a1".as_slice(), b"a2", b"a3"] {
        broker
            .publish(1, "amq.direct", "q1", false, BasicProperties::default(), body)
            .await;
    }

    let mut tags = Vec::new();
    for _ in 0..3 {
        let (_, method) = broker.recv_method().await;
        match method {
            Method::Basic(BasicMethod::Ack(ack)) => tags.push(ack.delivery_tag),
            other => panic!("expected basic.ack, got {}", other.name()),
        }
    }
    tags.sort_unstable();
    assert_eq!(tags, vec![1, 2, 3]);
    broker.expect_no_frame(Duration::from_millis(60)).await;
    assert_eq!(broker.metrics.confirm.value(), 3);
}

#[tokio::test]
async fn zero_size_body_completes_at_the_header() {
    let mut broker = TestBroker::start();
    let queue = broker.queue("q1");
    broker.open_channel(1).await;

    broker
        .publish(1, "", "q1", false, BasicProperties::default(), b"")
        .await;
    broker.expect_no_frame(Duration::from_millis(50)).await;

    assert_eq!(queue.length(), 1);
    assert_eq!(queue.pop().await.unwrap().body_size, 0);
}

// A body frame with no preceding header is a connection-level frame
// error reported on channel 0.
#[tokio::test]
async fn body_without_header_is_a_frame_error() {
    let mut broker = TestBroker::start();
    broker.open_channel(1).await;

    broker
        .send_method(
            1,
            BasicPublish {
                exchange: "amq.direct".to_owned(),
                routing_key: "x".to_owned(),
                mandatory: false,
                immediate: false,
            },
        )
        .await;
    broker
        .send(1, FramePayload::Body(ContentBody::new(Bytes::from_static(b"abc"))))
        .await;

    let (channel_id, method) = broker.recv_method().await;
    assert_eq!(channel_id, 0);
    match method {
        Method::Connection(ConnectionMethod::Close(close)) => {
            assert_eq!(close.reply_code, reply_code::FRAME_ERROR);
            assert_eq!(close.reply_text, "unexpected content body frame - no header yet");
        }
        other => panic!("expected connection.close, got {}", other.name()),
    }
}

#[tokio::test]
async fn second_header_is_a_frame_error() {
    let mut broker = TestBroker::start();
    broker.open_channel(1).await;

    broker
        .send_method(
            1,
            BasicPublish {
                exchange: String::new(),
                routing_key: "q".to_owned(),
                mandatory: false,
                immediate: false,
            },
        )
        .await;
    for _ in 0..2 {
        broker
            .send(
                1,
                FramePayload::Header(amqp_proto::ContentHeader::for_basic(
                    3,
                    BasicProperties::default(),
                )),
            )
            .await;
    }

    let (channel_id, method) = broker.recv_method().await;
    assert_eq!(channel_id, 0);
    match method {
        Method::Connection(ConnectionMethod::Close(close)) => {
            assert_eq!(close.reply_code, reply_code::FRAME_ERROR);
            assert_eq!(
                close.reply_text,
                "unexpected content header frame - header already exists"
            );
        }
        other => panic!("expected connection.close, got {}", other.name()),
    }
}

// Any method frame between basic.publish and the end of its
// body tears the connection down.
#[tokio::test]
async fn method_frame_during_content_transfer_is_a_frame_error() {
    let mut broker = TestBroker::start();
    broker.open_channel(1).await;

    broker
        .send_method(
            1,
            BasicPublish {
                exchange: String::new(),
                routing_key: "q".to_owned(),
                mandatory: false,
                immediate: false,
            },
        )
        .await;
    broker
        .send_method(1, Method::Channel(ChannelMethod::Flow(
            amqp_proto::method::ChannelFlow { active: false },
        )))
        .await;

    let (channel_id, method) = broker.recv_method().await;
    assert_eq!(channel_id, 0);
    match method {
        Method::Connection(ConnectionMethod::Close(close)) => {
            assert_eq!(close.reply_code, reply_code::FRAME_ERROR);
        }
        other => panic!("expected connection.close, got {}", other.name()),
    }
}

#[tokio::test]
async fn immediate_publish_is_refused() {
    let mut broker = TestBroker::start();
    broker.open_channel(1).await;

    broker
        .send_method(
            1,
            BasicPublish {
                exchange: String::new(),
                routing_key: "q".to_owned(),
                mandatory: false,
                immediate: true,
            },
        )
        .await;

    let (channel_id, method) = broker.recv_method().await;
    assert_eq!(channel_id, 1);
    match method {
        Method::Channel(ChannelMethod::Close(close)) => {
            assert_eq!(close.reply_code, reply_code::NOT_IMPLEMENTED);
        }
        other => panic!("expected channel.close, got {}", other.name()),
    }
}
