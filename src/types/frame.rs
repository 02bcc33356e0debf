//! Decoded wire frames

use bytes::Bytes;

use super::ByteCode;

/// One decoded unit of the inbound protocol.
///
/// Frames are consumed by the dispatch call that receives them; the payload is a
/// cheap reference-counted slice of the read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Tag the frame was opened with
    pub byte_code: ByteCode,

    /// Payload bytes, exactly as many as the length prefix declared
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(byte_code: ByteCode, payload: impl Into<Bytes>) -> Self {
        Self { byte_code, payload: payload.into() }
    }
}
