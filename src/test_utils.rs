//! Wire-frame builders and fixtures shared by unit tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{EVENT_STREAM, TRACKING_STREAM};
use crate::outlet::{Outlet, OutletConfig, OutletInfo};
use crate::types::ByteCode;

/// Encode one frame exactly as the device puts it on the wire.
///
/// Panics if `payload` does not fit the byte-code's length prefix.
pub fn frame_bytes(byte_code: ByteCode, payload: &[u8]) -> Vec<u8> {
    let prefix = byte_code.layout().prefix;
    assert!(payload.len() <= prefix.max_len(), "payload too long for {}", byte_code);

    let mut buf = BytesMut::with_capacity(byte_code.layout().header_len() + payload.len());
    buf.extend_from_slice(&[byte_code.tag()]);
    prefix.write(payload.len(), &mut buf);
    buf.extend_from_slice(payload);
    buf.to_vec()
}

/// A `Char` (event) frame carrying `text`.
pub fn char_frame(text: &str) -> Vec<u8> {
    frame_bytes(ByteCode::Char, text.as_bytes())
}

/// A `Short` (tracking) frame carrying `text`.
pub fn short_frame(text: &str) -> Vec<u8> {
    frame_bytes(ByteCode::Short, text.as_bytes())
}

/// `count` frames alternating between tracking records and events.
pub fn mixed_stream(count: usize) -> Vec<u8> {
    let mut wire = Vec::new();
    for i in 0..count {
        if i % 4 == 3 {
            wire.extend_from_slice(&char_frame(&format!("Grab; cube_{}", i)));
        } else {
            let record = format!(
                "head;{:.3},{:.3},{:.3};rhand;{:.3},{:.3},{:.3}",
                i as f64 * 0.001,
                1.6,
                0.2,
                0.3,
                1.1,
                i as f64 * 0.002
            );
            wire.extend_from_slice(&short_frame(&record));
        }
    }
    wire
}

/// The default event outlet.
pub fn event_outlet() -> Arc<Outlet> {
    Arc::new(Outlet::new(
        EVENT_STREAM,
        OutletInfo::irregular("Event_stream", "Event_Stream", "HL_Events"),
        OutletConfig::default(),
    ))
}

/// The default tracking outlet.
pub fn tracking_outlet() -> Arc<Outlet> {
    Arc::new(Outlet::new(
        TRACKING_STREAM,
        OutletInfo::irregular(TRACKING_STREAM, "object_tracking_stream", "HL_tracking_Data"),
        OutletConfig::default(),
    ))
}

/// Poll `condition` until it holds. Panics after five seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_match_documented_layout() {
        assert_eq!(char_frame("HELLO"), vec![0x02, 5, b'H', b'E', b'L', b'L', b'O']);
        assert_eq!(short_frame("ok"), vec![0x01, 2, 0, b'o', b'k']);
    }

    #[test]
    #[should_panic(expected = "payload too long")]
    fn oversized_char_payload_panics() {
        char_frame(&"x".repeat(256));
    }
}
