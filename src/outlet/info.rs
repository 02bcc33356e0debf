//! Outlet metadata and buffering configuration

use serde::{Deserialize, Serialize};

/// Declared sampling rate of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NominalRate {
    /// Samples arrive whenever the device sends them
    #[default]
    Irregular,

    /// Samples arrive at a fixed rate in Hz
    Regular(f64),
}

/// Descriptive metadata consumers use to find and label a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletInfo {
    /// Display name, including any deployment prefix
    pub name: String,

    /// Content type, e.g. `object_tracking_stream`
    pub content_type: String,

    /// Stable identifier that survives bridge restarts
    pub source_id: String,

    pub channel_count: u32,

    /// Channel value format; the bridge only produces strings
    pub channel_format: String,

    pub nominal_rate: NominalRate,
}

impl OutletInfo {
    /// Metadata for a single-channel, irregular-rate string stream.
    pub fn irregular(
        name: impl Into<String>,
        content_type: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            source_id: source_id.into(),
            channel_count: 1,
            channel_format: "string".to_string(),
            nominal_rate: NominalRate::Irregular,
        }
    }

    /// Append a deployment prefix to the display name so several bridges can be
    /// told apart by a recorder.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.name = format!("{} {}", self.name, prefix);
        }
        self
    }
}

/// Buffering policy for one outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletConfig {
    /// Samples per flush to consumers
    pub chunk_size: usize,

    /// Retained samples before the oldest is evicted
    pub max_buffered: usize,
}

impl Default for OutletConfig {
    /// One sample per chunk, an hour of backlog at one sample per second.
    fn default() -> Self {
        Self { chunk_size: 1, max_buffered: 3600 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_appended_to_display_name() {
        let info = OutletInfo::irregular("Event_stream", "Event_Stream", "HL_Events").with_prefix("P07");
        assert_eq!(info.name, "Event_stream P07");
        assert_eq!(info.source_id, "HL_Events");

        let unprefixed = OutletInfo::irregular("Event_stream", "Event_Stream", "HL_Events").with_prefix("");
        assert_eq!(unprefixed.name, "Event_stream");
    }

    #[test]
    fn irregular_streams_are_single_string_channel() {
        let info = OutletInfo::irregular("HL_tracking_stream", "object_tracking_stream", "HL_tracking_Data");
        assert_eq!(info.channel_count, 1);
        assert_eq!(info.channel_format, "string");
        assert_eq!(info.nominal_rate, NominalRate::Irregular);
    }
}
