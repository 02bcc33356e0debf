//! Length-prefixed frame decoding and encoding

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::types::{ByteCode, Frame, Sample};
use crate::{BridgeError, Result};

/// Largest payload accepted unless configured otherwise.
pub const DEFAULT_MAX_PAYLOAD: usize = u16::MAX as usize;

/// Codec for the tagged, length-prefixed device protocol.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self { max_payload: DEFAULT_MAX_PAYLOAD }
    }
}

impl FrameCodec {
    /// Create a codec accepting any length the prefixes can express.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec that rejects declared lengths above `max_payload`.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Largest declared payload length this codec accepts.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Largest payload that can be written with `byte_code`.
    fn encodable_len(&self, byte_code: ByteCode) -> usize {
        byte_code.layout().prefix.max_len().min(self.max_payload)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(&tag) = src.first() else {
            return Ok(None);
        };

        let byte_code = ByteCode::from_tag(tag)
            .ok_or_else(|| BridgeError::malformed_frame(tag, "unknown byte-code tag"))?;
        let layout = byte_code.layout();
        let header_len = layout.header_len();

        if src.len() < header_len {
            src.reserve(header_len - src.len());
            return Ok(None);
        }

        let len = layout.prefix.read(&src[1..header_len]);
        if len == 0 {
            return Err(BridgeError::malformed_frame(tag, "declared payload length is zero"));
        }
        if len > self.max_payload {
            return Err(BridgeError::malformed_frame(
                tag,
                format!("declared payload length {} exceeds limit {}", len, self.max_payload),
            ));
        }

        let total = header_len + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let payload = src.split_to(len).freeze();
        trace!(tag = byte_code.name(), len, "Decoded frame");

        Ok(Some(Frame::new(byte_code, payload)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = BridgeError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let layout = frame.byte_code.layout();
        let len = frame.payload.len();
        let limit = self.encodable_len(frame.byte_code);

        if len == 0 || len > limit {
            return Err(BridgeError::encode(format!(
                "{} frame payload must be 1..={} bytes, got {}",
                frame.byte_code, limit, len
            )));
        }

        dst.reserve(layout.header_len() + len);
        dst.put_u8(frame.byte_code.tag());
        layout.prefix.write(len, dst);
        dst.extend_from_slice(&frame.payload);

        Ok(())
    }
}

/// Build the outbound frame for an inlet sample, checking it fits `byte_code`.
///
/// The check is done before the frame reaches the sink so an oversized sample
/// is dropped on its own without touching the write buffer.
pub fn outbound_frame(codec: &FrameCodec, byte_code: ByteCode, sample: &Sample) -> Result<Frame> {
    let len = sample.value.len();
    let limit = codec.encodable_len(byte_code);
    if len == 0 || len > limit {
        return Err(BridgeError::encode(format!(
            "inlet '{}' sample of {} bytes does not fit a {} frame (1..={})",
            sample.stream_name, len, byte_code, limit
        )));
    }
    Ok(Frame::new(byte_code, sample.value.clone().into_bytes()))
}
