//! Timestamped samples routed to outlets

/// A single string-encoded sample on its way to (or from) a named stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Outlet or inlet key the sample belongs to
    pub stream_name: String,

    /// Seconds on the bridge's local clock
    pub timestamp: f64,

    /// Payload text
    pub value: String,
}

impl Sample {
    /// Create a new sample
    pub fn new(stream_name: impl Into<String>, timestamp: f64, value: impl Into<String>) -> Self {
        Self { stream_name: stream_name.into(), timestamp, value: value.into() }
    }
}
