//! Error types for the bridge.
//!
//! Every failure the bridge can observe is one variant of [`BridgeError`]. The
//! variants are grouped by how far their damage is allowed to reach:
//!
//! - **Sample level**: [`BridgeError::InvalidPayload`], [`BridgeError::UnknownDestination`]
//!   and [`BridgeError::Encode`] drop exactly one sample. The session keeps going.
//! - **Session level**: [`BridgeError::MalformedFrame`] and [`BridgeError::ConnectionLost`]
//!   close the current connection. The supervisor accepts the next one.
//! - **Supervisor level**: [`BridgeError::SupervisorFault`] escapes `run()` and is
//!   retried forever by the restart loop.
//! - **Startup**: [`BridgeError::Config`] is raised while loading settings.
//!
//! ## Classification
//!
//! ```rust
//! use holo_bridge::BridgeError;
//!
//! let error = BridgeError::unknown_destination("gaze_stream");
//! assert!(error.is_sample_level());
//! assert!(!error.is_session_fatal());
//!
//! let error = BridgeError::malformed_frame(0x7F, "unknown byte-code tag");
//! assert!(error.is_session_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Malformed frame (tag {tag:#04x}): {reason}")]
    MalformedFrame { tag: u8, reason: String },

    #[error("Invalid payload for {byte_code} frame: {details}")]
    InvalidPayload { byte_code: &'static str, details: String },

    #[error("No outlet named '{stream_name}' is configured")]
    UnknownDestination { stream_name: String },

    #[error("Connection lost: {reason}")]
    ConnectionLost {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Supervisor fault: {reason}")]
    SupervisorFault {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cannot encode outbound frame: {details}")]
    Encode { details: String },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },
}

impl BridgeError {
    /// Whether this error ends the connection it was observed on.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, BridgeError::MalformedFrame { .. } | BridgeError::ConnectionLost { .. })
    }

    /// Whether this error only costs a single sample.
    pub fn is_sample_level(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidPayload { .. }
                | BridgeError::UnknownDestination { .. }
                | BridgeError::Encode { .. }
        )
    }

    /// Returns whether the failing operation is worth retrying as a whole.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::ConnectionLost { .. } => true,
            BridgeError::SupervisorFault { .. } => true,
            BridgeError::MalformedFrame { .. } => true,
            BridgeError::InvalidPayload { .. } => false,
            BridgeError::UnknownDestination { .. } => false,
            BridgeError::Encode { .. } => false,
            BridgeError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::MalformedFrame { .. } => vec![
                "Check that the device build uses the same byte-code table",
                "Verify the length prefix width for each byte-code",
                "Reconnect the device to resynchronise framing",
            ],
            BridgeError::InvalidPayload { .. } => vec![
                "Ensure the device sends UTF-8 encoded text",
                "Inspect the dropped sample in the bridge log",
            ],
            BridgeError::UnknownDestination { .. } => vec![
                "Add an outlet with this key to the bridge settings",
                "Check the routes section of the bridge settings",
            ],
            BridgeError::ConnectionLost { .. } => vec![
                "Check the network link between device and bridge",
                "Reconnect the device; the bridge keeps accepting",
            ],
            BridgeError::SupervisorFault { .. } => vec![
                "Check that the configured port is free",
                "Verify the host address belongs to this machine",
                "The restart loop retries automatically",
            ],
            BridgeError::Encode { .. } => vec![
                "Shorten the inlet sample or route it to a wider byte-code",
            ],
            BridgeError::Config { .. } => vec![
                "Check the YAML syntax of the settings file",
                "Compare field names against the documented defaults",
            ],
        }
    }

    /// Helper constructor for framing errors.
    pub fn malformed_frame(tag: u8, reason: impl Into<String>) -> Self {
        BridgeError::MalformedFrame { tag, reason: reason.into() }
    }

    /// Helper constructor for payload decode errors.
    pub fn invalid_payload(byte_code: &'static str, details: impl Into<String>) -> Self {
        BridgeError::InvalidPayload { byte_code, details: details.into() }
    }

    /// Helper constructor for samples addressed to a missing outlet.
    pub fn unknown_destination(stream_name: impl Into<String>) -> Self {
        BridgeError::UnknownDestination { stream_name: stream_name.into() }
    }

    /// Helper constructor for connection errors.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        BridgeError::ConnectionLost { reason: reason.into(), source: None }
    }

    /// Helper constructor for supervisor faults.
    pub fn supervisor_fault(reason: impl Into<String>) -> Self {
        BridgeError::SupervisorFault { reason: reason.into(), source: None }
    }

    /// Helper constructor for supervisor faults with source.
    pub fn supervisor_fault_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::SupervisorFault { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for outbound encode errors.
    pub fn encode(details: impl Into<String>) -> Self {
        BridgeError::Encode { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        BridgeError::Config { context: context.into(), details: details.into() }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::ConnectionLost { reason: err.to_string(), source: Some(err) }
    }
}
