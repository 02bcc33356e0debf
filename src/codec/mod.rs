//! Frame codec for the device byte stream.
//!
//! [`FrameCodec`] implements [`tokio_util::codec::Decoder`] for inbound frames and
//! [`tokio_util::codec::Encoder`] for outbound (inlet) frames. Both directions read
//! the layout from [`ByteCode::layout`](crate::ByteCode::layout).
//!
//! ## Partial reads
//!
//! The decoder never consumes bytes from an incomplete frame. When the buffer
//! holds fewer bytes than the next frame needs it returns `Ok(None)`, reserves the
//! missing capacity and waits; the framed reader calls it again once more bytes
//! have been appended. Splitting a valid stream at arbitrary read boundaries
//! therefore yields exactly the frames the unsplit stream yields.
//!
//! ## Usage Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use holo_bridge::{ByteCode, codec::FrameCodec};
//! use tokio_util::codec::Decoder;
//!
//! let mut codec = FrameCodec::new();
//! let mut buf = BytesMut::from(&[0x02, 5, b'H', b'E'][..]);
//!
//! // Only part of the payload has arrived
//! assert!(codec.decode(&mut buf).unwrap().is_none());
//!
//! buf.extend_from_slice(b"LLO");
//! let frame = codec.decode(&mut buf).unwrap().unwrap();
//! assert_eq!(frame.byte_code, ByteCode::Char);
//! assert_eq!(&frame.payload[..], b"HELLO");
//! ```

mod frame_codec;

pub use frame_codec::{DEFAULT_MAX_PAYLOAD, FrameCodec, outbound_frame};
