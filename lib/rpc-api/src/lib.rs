//! RPC protocol types shared by providers and consumers
//!
//! This library defines the data model of the framework:
//! - ServiceIdentity: the (interface, group, version) discovery key
//! - RpcRequest / RpcResponse: call and result payloads
//! - RpcMessage: the envelope paired by correlation id
//! - FrameHeader: the fixed 16-byte wire header handed to the transport

pub mod frame;
pub mod identity;
pub mod message;
pub mod request;
pub mod response;

pub use frame::{CompressionKind, FrameError, FrameHeader};
pub use identity::ServiceIdentity;
pub use message::{MessageBody, MessageType, RpcMessage};
pub use request::RpcRequest;
pub use response::{ResponseCode, RpcResponse};
