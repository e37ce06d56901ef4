use crate::content::{ContentBody, ContentHeader};
use crate::method::{ConnectionMethod, Method};
use crate::types::ChannelId;

// Wire frame type octets, owned by the transport codec.
pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEADER: u8 = 2;
pub const FRAME_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;
pub const FRAME_END: u8 = 0xCE;

/// A parsed frame, tagged with the channel it belongs to.
///
/// `close_after` asks the writer to flush and terminate the socket after
/// this frame; `sync` marks methods that expect a reply so the writer may
/// flush eagerly.
#[derive(Debug, Clone)]
pub struct Frame {
    pub channel_id: ChannelId,
    pub payload: FramePayload,
    pub close_after: bool,
    pub sync: bool,
}

#[derive(Debug, Clone)]
pub enum FramePayload {
    Method(Method),
    Header(ContentHeader),
    Body(ContentBody),
    Heartbeat,
}

impl Frame {
    pub fn method(channel_id: ChannelId, method: Method) -> Self {
        let close_after = matches!(method, Method::Connection(ConnectionMethod::CloseOk));
        let sync = method.synchronous();
        Self {
            channel_id,
            payload: FramePayload::Method(method),
            close_after,
            sync,
        }
    }

    pub fn header(channel_id: ChannelId, header: ContentHeader) -> Self {
        Self {
            channel_id,
            payload: FramePayload::Header(header),
            close_after: false,
            sync: false,
        }
    }

    pub fn body(channel_id: ChannelId, body: ContentBody) -> Self {
        Self {
            channel_id,
            payload: FramePayload::Body(body),
            close_after: false,
            sync: false,
        }
    }

    pub fn heartbeat(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            payload: FramePayload::Heartbeat,
            close_after: false,
            sync: false,
        }
    }

    pub fn frame_type(&self) -> u8 {
        match self.payload {
            FramePayload::Method(_) => FRAME_METHOD,
            FramePayload::Header(_) => FRAME_HEADER,
            FramePayload::Body(_) => FRAME_BODY,
            FramePayload::Heartbeat => FRAME_HEARTBEAT,
        }
    }
}
