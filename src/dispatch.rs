//! Static routing from byte-code to decode function and outlet.
//!
//! The table is built once at startup and shared read-only by every session.
//! A route's decode function is total over any payload the codec can produce;
//! content it cannot parse becomes [`BridgeError::InvalidPayload`], which costs
//! one sample and nothing else.

use std::collections::BTreeMap;

use crate::types::{ByteCode, Frame, Sample};
use crate::{BridgeError, Result};

/// Outlet key for continuous head and hand tracking records.
pub const TRACKING_STREAM: &str = "HL_tracking_stream";

/// Outlet key for discrete interaction events.
pub const EVENT_STREAM: &str = "event_stream";

/// Turns a frame payload into the sample's string value.
pub type DecodeFn = fn(&Frame) -> Result<String>;

/// Where frames of one byte-code go.
#[derive(Clone)]
pub struct Route {
    pub decode: DecodeFn,
    pub outlet: String,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("outlet", &self.outlet).finish_non_exhaustive()
    }
}

/// Immutable byte-code → route mapping.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    routes: BTreeMap<ByteCode, Route>,
}

impl Default for DispatchTable {
    /// Tracking records on `Short`, events on `Char`.
    fn default() -> Self {
        Self::from_routes([
            (ByteCode::Short, TRACKING_STREAM.to_string()),
            (ByteCode::Char, EVENT_STREAM.to_string()),
        ])
    }
}

impl DispatchTable {
    /// Build a table from explicit routes.
    pub fn new(routes: impl IntoIterator<Item = (ByteCode, Route)>) -> Self {
        Self { routes: routes.into_iter().collect() }
    }

    /// Build a table routing each byte-code's UTF-8 text to an outlet key.
    pub fn from_routes(routes: impl IntoIterator<Item = (ByteCode, String)>) -> Self {
        Self::new(
            routes.into_iter().map(|(code, outlet)| (code, Route { decode: decode_text, outlet })),
        )
    }

    /// Route registered for `byte_code`, if any.
    pub fn route(&self, byte_code: ByteCode) -> Option<&Route> {
        self.routes.get(&byte_code)
    }

    /// Outlet keys this table can produce, in byte-code order.
    pub fn outlet_names(&self) -> impl Iterator<Item = &str> {
        self.routes.values().map(|route| route.outlet.as_str())
    }

    /// Decode `frame` into a sample addressed to its route's outlet.
    pub fn dispatch(&self, frame: &Frame, timestamp: f64) -> Result<Sample> {
        let route = self
            .route(frame.byte_code)
            .ok_or_else(|| BridgeError::unknown_destination(frame.byte_code.name()))?;
        let value = (route.decode)(frame)?;
        Ok(Sample::new(route.outlet.clone(), timestamp, value))
    }
}

/// Decode a payload as UTF-8 text.
pub fn decode_text(frame: &Frame) -> Result<String> {
    std::str::from_utf8(&frame.payload)
        .map(str::to_owned)
        .map_err(|e| BridgeError::invalid_payload(frame.byte_code.name(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_routes_tracking_and_events() {
        let table = DispatchTable::default();
        assert_eq!(table.route(ByteCode::Short).unwrap().outlet, TRACKING_STREAM);
        assert_eq!(table.route(ByteCode::Char).unwrap().outlet, EVENT_STREAM);
        assert_eq!(table.outlet_names().collect::<Vec<_>>(), vec![TRACKING_STREAM, EVENT_STREAM]);
    }

    #[test]
    fn char_frame_becomes_event_sample() {
        let table = DispatchTable::default();
        let frame = Frame::new(ByteCode::Char, &b"HELLO"[..]);
        let sample = table.dispatch(&frame, 12.5).unwrap();

        assert_eq!(sample.stream_name, EVENT_STREAM);
        assert_eq!(sample.value, "HELLO");
        assert_eq!(sample.timestamp, 12.5);
    }

    #[test]
    fn invalid_utf8_is_invalid_payload() {
        let table = DispatchTable::default();
        let frame = Frame::new(ByteCode::Short, vec![0xff, 0xfe, 0xfd]);
        let err = table.dispatch(&frame, 0.0).unwrap_err();

        assert!(matches!(err, BridgeError::InvalidPayload { byte_code: "short", .. }));
        assert!(err.is_sample_level());
    }

    #[test]
    fn unrouted_byte_code_is_unknown_destination() {
        let table = DispatchTable::from_routes([(ByteCode::Short, TRACKING_STREAM.to_string())]);
        let frame = Frame::new(ByteCode::Char, &b"Grab; cube"[..]);
        let err = table.dispatch(&frame, 0.0).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownDestination { .. }));
    }

    #[test]
    fn custom_decode_function_is_used() {
        fn shout(frame: &Frame) -> Result<String> {
            decode_text(frame).map(|text| text.to_uppercase())
        }

        let table = DispatchTable::new([(
            ByteCode::Char,
            Route { decode: shout, outlet: EVENT_STREAM.to_string() },
        )]);
        let sample = table.dispatch(&Frame::new(ByteCode::Char, &b"ping"[..]), 0.0).unwrap();
        assert_eq!(sample.value, "PING");
    }
}
