//! Fixed 16-byte frame header
//!
//! Layout: magic (4) | version (1) | message type (1) | codec (1) |
//! compression (1) | correlation id (8, big endian). The payload that
//! follows is framed by the transport and may not exceed
//! [`MAX_FRAME_LENGTH`].

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::message::MessageType;

/// Marker identifying a frame of this protocol
pub const MAGIC_NUMBER: [u8; 4] = *b"grpc";
/// Current protocol version
pub const PROTOCOL_VERSION: u8 = 1;
/// Length of the fixed header
pub const HEAD_LENGTH: usize = 16;
/// Largest payload accepted after the header (8 MiB)
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: {0} bytes")]
    Truncated(usize),

    #[error("Unknown magic number: {0:?}")]
    BadMagic([u8; 4]),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Unknown compression id: {0}")]
    UnknownCompression(u8),

    #[error("Payload of {0} bytes exceeds the maximum frame length")]
    PayloadTooLarge(usize),
}

/// Compression applied to the payload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionKind {
    #[default]
    None,
    Gzip,
}

impl CompressionKind {
    pub fn code(&self) -> u8 {
        match self {
            CompressionKind::None => 0,
            CompressionKind::Gzip => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, FrameError> {
        match code {
            0 => Ok(CompressionKind::None),
            1 => Ok(CompressionKind::Gzip),
            other => Err(FrameError::UnknownCompression(other)),
        }
    }
}

/// Decoded frame header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub message_type: MessageType,
    pub codec: u8,
    pub compression: CompressionKind,
    pub request_id: u64,
}

impl FrameHeader {
    /// Write the header into `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&MAGIC_NUMBER);
        buf.put_u8(self.version);
        buf.put_u8(self.message_type.code());
        buf.put_u8(self.codec);
        buf.put_u8(self.compression.code());
        buf.put_u64(self.request_id);
    }

    /// Read a header from the front of `buf`, advancing it by [`HEAD_LENGTH`]
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, FrameError> {
        if buf.remaining() < HEAD_LENGTH {
            return Err(FrameError::Truncated(buf.remaining()));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC_NUMBER {
            return Err(FrameError::BadMagic(magic));
        }

        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }

        let message_type = MessageType::from_code(buf.get_u8())?;
        let codec = buf.get_u8();
        let compression = CompressionKind::from_code(buf.get_u8())?;
        let request_id = buf.get_u64();

        Ok(Self {
            version,
            message_type,
            codec,
            compression,
            request_id,
        })
    }

    /// Check that a payload fits in a single frame
    pub fn check_payload_len(len: usize) -> Result<(), FrameError> {
        if len > MAX_FRAME_LENGTH {
            return Err(FrameError::PayloadTooLarge(len));
        }
        Ok(())
    }
}
