//! Message envelope exchanged between transport peers

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::{CompressionKind, FrameError, FrameHeader, PROTOCOL_VERSION};
use crate::request::RpcRequest;
use crate::response::RpcResponse;

/// Heartbeat body sent by the client
pub const PING: &str = "ping";
/// Heartbeat body answered by the server
pub const PONG: &str = "pong";

/// Kind of message carried in a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Request,
    Response,
    HeartbeatPing,
    HeartbeatPong,
}

impl MessageType {
    /// Wire code of this message type
    pub fn code(&self) -> u8 {
        match self {
            MessageType::Request => 1,
            MessageType::Response => 2,
            MessageType::HeartbeatPing => 3,
            MessageType::HeartbeatPong => 4,
        }
    }

    /// Parse a wire code
    pub fn from_code(code: u8) -> Result<Self, FrameError> {
        match code {
            1 => Ok(MessageType::Request),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::HeartbeatPing),
            4 => Ok(MessageType::HeartbeatPong),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

/// Payload of a message, before serialization
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum MessageBody {
    Request(RpcRequest),
    Response(RpcResponse),
    Heartbeat(String),
}

/// RpcMessage is the envelope handed to the transport
///
/// `request_id` pairs one response with exactly one in-flight request.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcMessage {
    pub message_type: MessageType,
    pub codec: u8,
    pub compression: CompressionKind,
    pub request_id: u64,
    pub body: MessageBody,
}

impl RpcMessage {
    /// Wrap a request
    pub fn request(codec: u8, request_id: u64, request: RpcRequest) -> Self {
        Self {
            message_type: MessageType::Request,
            codec,
            compression: CompressionKind::None,
            request_id,
            body: MessageBody::Request(request),
        }
    }

    /// Wrap a response to the request with the given correlation id
    pub fn response(codec: u8, request_id: u64, response: RpcResponse) -> Self {
        Self {
            message_type: MessageType::Response,
            codec,
            compression: CompressionKind::None,
            request_id,
            body: MessageBody::Response(response),
        }
    }

    /// Heartbeat ping
    pub fn ping(codec: u8, request_id: u64) -> Self {
        Self {
            message_type: MessageType::HeartbeatPing,
            codec,
            compression: CompressionKind::None,
            request_id,
            body: MessageBody::Heartbeat(PING.to_string()),
        }
    }

    /// Heartbeat pong answering `ping`
    pub fn pong(ping: &RpcMessage) -> Self {
        Self {
            message_type: MessageType::HeartbeatPong,
            codec: ping.codec,
            compression: ping.compression,
            request_id: ping.request_id,
            body: MessageBody::Heartbeat(PONG.to_string()),
        }
    }

    /// Frame header describing this message
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            version: PROTOCOL_VERSION,
            message_type: self.message_type,
            codec: self.codec,
            compression: self.compression,
            request_id: self.request_id,
        }
    }
}

/// Allocates correlation ids for outgoing messages
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused correlation id
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ServiceIdentity;

    #[test]
    fn test_message_type_codes() {
        for kind in [
            MessageType::Request,
            MessageType::Response,
            MessageType::HeartbeatPing,
            MessageType::HeartbeatPong,
        ] {
            assert_eq!(MessageType::from_code(kind.code()).unwrap(), kind);
        }
        assert!(matches!(
            MessageType::from_code(9),
            Err(FrameError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn test_pong_echoes_ping() {
        let ping = RpcMessage::ping(1, 42);
        let pong = RpcMessage::pong(&ping);
        assert_eq!(pong.request_id, 42);
        assert_eq!(pong.message_type, MessageType::HeartbeatPong);
        assert_eq!(pong.body, MessageBody::Heartbeat(PONG.to_string()));
    }

    #[test]
    fn test_response_pairs_with_request() {
        let ids = RequestIdGenerator::new();
        let identity = ServiceIdentity::new("OrderService", "", "v1");
        let request = RpcMessage::request(1, ids.next_id(), RpcRequest::new(&identity, "get"));
        let response = RpcMessage::response(
            1,
            request.request_id,
            RpcResponse::fail(crate::ResponseCode::Fail),
        );

        assert_eq!(request.header().request_id, response.header().request_id);
        assert_ne!(ids.next_id(), request.request_id);
    }
}
