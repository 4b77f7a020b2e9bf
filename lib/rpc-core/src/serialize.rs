//! Message body serializers
//!
//! Serializers are resolved through the capability registry by name
//! (`json`, `msgpack`). Each one reports the codec id written into the
//! frame header so the receiving side can check it decodes with the same
//! codec.

use bytes::{BufMut, BytesMut};
use rpc_api::frame::HEAD_LENGTH;
use rpc_api::{FrameHeader, MessageBody, RpcMessage};
use std::sync::Arc;
use tracing::error;

use crate::extension::{Capability, ExtensionTable};
use crate::{Result, RpcError};

/// Type name of the JSON serializer
pub const JSON_SERIALIZER: &str = "rpc.serialize.JsonSerializer";
/// Type name of the MessagePack serializer
pub const MESSAGE_PACK_SERIALIZER: &str = "rpc.serialize.MessagePackSerializer";

/// Converts message bodies to and from bytes
pub trait Serializer: Send + Sync {
    /// Codec id carried in the frame header
    fn codec(&self) -> u8;

    fn serialize(&self, body: &MessageBody) -> Result<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> Result<MessageBody>;
}

impl Capability for dyn Serializer {
    const TYPE_NAME: &'static str = "rpc.serialize.Serializer";
}

/// Declare the serializer capability and register the built-in serializers
pub fn register_builtin(table: &mut ExtensionTable) {
    table
        .declare::<dyn Serializer>()
        .register::<JsonSerializer, dyn Serializer>(JSON_SERIALIZER, JsonSerializer::default, |s| s)
        .register::<MessagePackSerializer, dyn Serializer>(
            MESSAGE_PACK_SERIALIZER,
            MessagePackSerializer::default,
            |s| s,
        )
        .embed::<dyn Serializer>(include_str!(
            "../resources/META-INF/extensions/rpc.serialize.Serializer"
        ));
}

/// serde_json backed serializer
#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn codec(&self) -> u8 {
        1
    }

    fn serialize(&self, body: &MessageBody) -> Result<Vec<u8>> {
        serde_json::to_vec(body).map_err(|e| {
            error!("Serialization failed: {}", e);
            RpcError::Serialization(e.to_string())
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<MessageBody> {
        serde_json::from_slice(bytes).map_err(|e| {
            error!("Deserialization failed: {}", e);
            RpcError::Serialization(e.to_string())
        })
    }
}

/// rmp-serde backed serializer
#[derive(Debug, Default)]
pub struct MessagePackSerializer;

impl Serializer for MessagePackSerializer {
    fn codec(&self) -> u8 {
        2
    }

    fn serialize(&self, body: &MessageBody) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(body).map_err(|e| {
            error!("Serialization failed: {}", e);
            RpcError::Serialization(e.to_string())
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<MessageBody> {
        rmp_serde::from_slice(bytes).map_err(|e| {
            error!("Deserialization failed: {}", e);
            RpcError::Serialization(e.to_string())
        })
    }
}

/// Write header and serialized body of `message`
pub fn encode_frame(message: &RpcMessage, serializer: &Arc<dyn Serializer>) -> Result<BytesMut> {
    if message.codec != serializer.codec() {
        return Err(RpcError::Serialization(format!(
            "message codec {} does not match serializer codec {}",
            message.codec,
            serializer.codec()
        )));
    }

    let payload = serializer.serialize(&message.body)?;
    FrameHeader::check_payload_len(payload.len())?;

    let mut buf = BytesMut::with_capacity(HEAD_LENGTH + payload.len());
    message.header().encode(&mut buf);
    buf.put_slice(&payload);
    Ok(buf)
}

/// Read a frame produced by [`encode_frame`]
pub fn decode_frame(frame: &[u8], serializer: &Arc<dyn Serializer>) -> Result<RpcMessage> {
    let mut buf = frame;
    let header = FrameHeader::decode(&mut buf)?;
    FrameHeader::check_payload_len(buf.len())?;

    if header.codec != serializer.codec() {
        return Err(RpcError::Serialization(format!(
            "frame codec {} does not match serializer codec {}",
            header.codec,
            serializer.codec()
        )));
    }

    Ok(RpcMessage {
        message_type: header.message_type,
        codec: header.codec,
        compression: header.compression,
        request_id: header.request_id,
        body: serializer.deserialize(buf)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExtensionLoader;
    use rpc_api::{RpcRequest, ServiceIdentity};
    use serde_json::json;

    fn loader() -> ExtensionLoader {
        let mut table = ExtensionTable::new();
        register_builtin(&mut table);
        ExtensionLoader::new(table)
    }

    fn request_message(codec: u8) -> RpcMessage {
        let identity = ServiceIdentity::new("OrderService", "", "v1");
        let request = RpcRequest::new(&identity, "placeOrder")
            .with_parameter("java.lang.String", json!("sku-1"))
            .with_parameter("java.util.Map", json!({"qty": 2, "gift": false}));
        RpcMessage::request(codec, 7, request)
    }

    #[test]
    fn test_builtin_serializers_resolve_by_name() {
        let loader = loader();
        assert_eq!(loader.resolve::<dyn Serializer>("json").unwrap().codec(), 1);
        assert_eq!(loader.resolve::<dyn Serializer>("msgpack").unwrap().codec(), 2);
        assert!(matches!(
            loader.resolve::<dyn Serializer>("kryo"),
            Err(RpcError::ExtensionNotFound { .. })
        ));
    }

    #[test]
    fn test_frame_with_each_serializer() {
        let loader = loader();
        for name in ["json", "msgpack"] {
            let serializer = loader.resolve::<dyn Serializer>(name).unwrap();
            let message = request_message(serializer.codec());

            let frame = encode_frame(&message, &serializer).unwrap();
            assert_eq!(&frame[0..4], b"grpc");
            assert_eq!(frame[6], serializer.codec());

            let decoded = decode_frame(&frame, &serializer).unwrap();
            assert_eq!(decoded, message, "serializer {}", name);
        }
    }

    #[test]
    fn test_codec_mismatch_is_rejected() {
        let loader = loader();
        let json = loader.resolve::<dyn Serializer>("json").unwrap();
        let msgpack = loader.resolve::<dyn Serializer>("msgpack").unwrap();

        assert!(matches!(
            encode_frame(&request_message(2), &json),
            Err(RpcError::Serialization(_))
        ));

        let frame = encode_frame(&request_message(1), &json).unwrap();
        assert!(matches!(
            decode_frame(&frame, &msgpack),
            Err(RpcError::Serialization(_))
        ));
    }

    #[test]
    fn test_garbage_payload() {
        let serializer: Arc<dyn Serializer> = Arc::new(JsonSerializer);
        assert!(matches!(
            serializer.deserialize(b"{not json"),
            Err(RpcError::Serialization(_))
        ));
    }
}
