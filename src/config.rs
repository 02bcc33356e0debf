//! Bridge settings loaded from YAML.
//!
//! Every field has a default, so an empty document (or no file at all) gives the
//! standard two-outlet deployment listening on `0.0.0.0:10000`:
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 10000
//! read_timeout_ms: 50
//! max_payload: 65535
//! session_policy: sequential
//! outlet_prefix: ""
//! outlets:
//!   - key: HL_tracking_stream
//!     name: HL_tracking_stream
//!     content_type: object_tracking_stream
//!     source_id: HL_tracking_Data
//!     nominal_rate: irregular
//!     chunk_size: 1
//!     max_buffered: 3600
//!   - key: event_stream
//!     name: Event_stream
//!     content_type: Event_Stream
//!     source_id: HL_Events
//!     nominal_rate: irregular
//!     chunk_size: 1
//!     max_buffered: 3600
//! routes:
//!   short: HL_tracking_stream
//!   char: event_stream
//! inlets: []
//! restart:
//!   initial_backoff_ms: 50
//!   max_backoff_ms: 5000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::dispatch::{DispatchTable, EVENT_STREAM, TRACKING_STREAM};
use crate::inlet::{ChannelInlet, DEFAULT_INLET_CAPACITY};
use crate::outlet::{NominalRate, Outlet, OutletConfig, OutletInfo};
use crate::restart::RestartPolicy;
use crate::supervisor::SessionPolicy;
use crate::types::ByteCode;
use crate::{BridgeError, Result};

/// Top-level bridge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub host: String,
    pub port: u16,

    /// Longest single wait for inbound bytes before inlets are serviced
    pub read_timeout_ms: u64,

    /// Largest declared payload length the decoder accepts
    pub max_payload: usize,

    pub session_policy: SessionPolicy,

    /// Appended to every outlet display name
    pub outlet_prefix: String,

    pub outlets: Vec<OutletSettings>,
    pub routes: BTreeMap<ByteCode, String>,
    pub inlets: Vec<InletSettings>,
    pub restart: RestartPolicy,
}

/// One outlet as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletSettings {
    /// Routing key samples are addressed by
    pub key: String,
    pub name: String,
    pub content_type: String,
    pub source_id: String,
    #[serde(default)]
    pub nominal_rate: NominalRate,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_buffered")]
    pub max_buffered: usize,
}

/// One inlet as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InletSettings {
    pub name: String,
    pub byte_code: ByteCode,
    #[serde(default = "default_inlet_capacity")]
    pub capacity: usize,
}

fn default_chunk_size() -> usize {
    OutletConfig::default().chunk_size
}

fn default_max_buffered() -> usize {
    OutletConfig::default().max_buffered
}

fn default_inlet_capacity() -> usize {
    DEFAULT_INLET_CAPACITY
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
            read_timeout_ms: 50,
            max_payload: crate::codec::DEFAULT_MAX_PAYLOAD,
            session_policy: SessionPolicy::Sequential,
            outlet_prefix: String::new(),
            outlets: vec![
                OutletSettings::irregular(
                    TRACKING_STREAM,
                    "HL_tracking_stream",
                    "object_tracking_stream",
                    "HL_tracking_Data",
                ),
                OutletSettings::irregular(EVENT_STREAM, "Event_stream", "Event_Stream", "HL_Events"),
            ],
            routes: BTreeMap::from([
                (ByteCode::Short, TRACKING_STREAM.to_string()),
                (ByteCode::Char, EVENT_STREAM.to_string()),
            ]),
            inlets: Vec::new(),
            restart: RestartPolicy::default(),
        }
    }
}

impl OutletSettings {
    pub fn irregular(key: &str, name: &str, content_type: &str, source_id: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            source_id: source_id.to_string(),
            nominal_rate: NominalRate::Irregular,
            chunk_size: default_chunk_size(),
            max_buffered: default_max_buffered(),
        }
    }
}

impl BridgeSettings {
    /// Parse and validate settings from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document means "all defaults"
        let settings: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)
                .map_err(|e| BridgeError::config("settings YAML", e.to_string()))?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::config(path.display().to_string(), e.to_string()))?;
        debug!(path = %path.display(), "Loaded settings file");
        Self::from_yaml_str(&yaml)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload == 0 {
            return Err(BridgeError::config("max_payload", "must be at least 1"));
        }
        if self.read_timeout_ms == 0 {
            return Err(BridgeError::config("read_timeout_ms", "must be at least 1"));
        }

        let mut keys = HashSet::new();
        for outlet in &self.outlets {
            if outlet.key.is_empty() {
                return Err(BridgeError::config("outlets", "outlet key must not be empty"));
            }
            if !keys.insert(outlet.key.as_str()) {
                return Err(BridgeError::config("outlets", format!("duplicate outlet key '{}'", outlet.key)));
            }
            if outlet.chunk_size == 0 || outlet.max_buffered == 0 {
                return Err(BridgeError::config(
                    format!("outlets.{}", outlet.key),
                    "chunk_size and max_buffered must be at least 1",
                ));
            }
        }

        for (byte_code, key) in &self.routes {
            if !keys.contains(key.as_str()) {
                return Err(BridgeError::config(
                    format!("routes.{}", byte_code),
                    format!("no outlet with key '{}'", key),
                ));
            }
        }

        let mut inlet_names = HashSet::new();
        for inlet in &self.inlets {
            if inlet.name.is_empty() {
                return Err(BridgeError::config("inlets", "inlet name must not be empty"));
            }
            if !inlet_names.insert(inlet.name.as_str()) {
                return Err(BridgeError::config("inlets", format!("duplicate inlet name '{}'", inlet.name)));
            }
        }

        Ok(())
    }

    /// Construct every configured outlet. Call once per process.
    pub fn build_outlets(&self) -> Vec<Arc<Outlet>> {
        self.outlets
            .iter()
            .map(|outlet| {
                let mut info = OutletInfo::irregular(&outlet.name, &outlet.content_type, &outlet.source_id)
                    .with_prefix(&self.outlet_prefix);
                info.nominal_rate = outlet.nominal_rate;
                let config = OutletConfig { chunk_size: outlet.chunk_size, max_buffered: outlet.max_buffered };
                Arc::new(Outlet::new(outlet.key.clone(), info, config))
            })
            .collect()
    }

    /// Construct every configured inlet. Call once per process.
    pub fn build_inlets(&self) -> Vec<Arc<ChannelInlet>> {
        self.inlets
            .iter()
            .map(|inlet| Arc::new(ChannelInlet::new(inlet.name.clone(), inlet.byte_code, inlet.capacity)))
            .collect()
    }

    pub fn dispatch_table(&self) -> DispatchTable {
        DispatchTable::from_routes(self.routes.iter().map(|(code, key)| (*code, key.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inlet::InletSource;

    #[test]
    fn empty_document_is_default_deployment() {
        let settings = BridgeSettings::from_yaml_str("").unwrap();
        assert_eq!(settings, BridgeSettings::default());

        let outlets = settings.build_outlets();
        let keys: Vec<_> = outlets.iter().map(|o| o.key()).collect();
        assert_eq!(keys, vec![TRACKING_STREAM, EVENT_STREAM]);
        assert!(outlets.iter().all(|o| o.config() == OutletConfig { chunk_size: 1, max_buffered: 3600 }));
        assert!(settings.build_inlets().is_empty());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let settings = BridgeSettings::from_yaml_str(
            r#"
port: 11000
outlet_prefix: P07
session_policy: concurrent
inlets:
  - name: goal_commands
    byte_code: char
"#,
        )
        .unwrap();

        assert_eq!(settings.port, 11000);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.session_policy, SessionPolicy::Concurrent);
        assert_eq!(settings.routes.len(), 2);

        let outlets = settings.build_outlets();
        assert_eq!(outlets[1].info().name, "Event_stream P07");

        let inlets = settings.build_inlets();
        assert_eq!(inlets.len(), 1);
        assert_eq!(inlets[0].name(), "goal_commands");
        assert_eq!(inlets[0].byte_code(), ByteCode::Char);
        assert_eq!(settings.inlets[0].capacity, DEFAULT_INLET_CAPACITY);
    }

    #[test]
    fn custom_outlets_and_routes() {
        let settings = BridgeSettings::from_yaml_str(
            r#"
outlets:
  - key: gaze
    name: Gaze_stream
    content_type: gaze
    source_id: HL_gaze
    chunk_size: 4
    max_buffered: 100
routes:
  short: gaze
"#,
        )
        .unwrap();

        let outlets = settings.build_outlets();
        assert_eq!(outlets.len(), 1);
        assert_eq!(outlets[0].config(), OutletConfig { chunk_size: 4, max_buffered: 100 });

        let table = settings.dispatch_table();
        assert_eq!(table.route(ByteCode::Short).unwrap().outlet, "gaze");
        assert!(table.route(ByteCode::Char).is_none());
    }

    #[test]
    fn route_to_missing_outlet_is_rejected() {
        let error = BridgeSettings::from_yaml_str("routes:\n  char: nowhere\n").unwrap_err();
        assert!(matches!(error, BridgeError::Config { .. }));
        assert!(error.to_string().contains("nowhere"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let duplicate = BridgeSettings {
            outlets: vec![
                OutletSettings::irregular("a", "A", "t", "s"),
                OutletSettings::irregular("a", "A", "t", "s"),
            ],
            routes: BTreeMap::new(),
            ..BridgeSettings::default()
        };
        assert!(duplicate.validate().is_err());

        let mut zero_chunk = BridgeSettings::default();
        zero_chunk.outlets[0].chunk_size = 0;
        assert!(zero_chunk.validate().is_err());

        let zero_payload = BridgeSettings { max_payload: 0, ..BridgeSettings::default() };
        assert!(zero_payload.validate().is_err());

        let empty_key = BridgeSettings {
            outlets: vec![OutletSettings::irregular("", "A", "t", "s")],
            routes: BTreeMap::new(),
            ..BridgeSettings::default()
        };
        assert!(empty_key.validate().is_err());
    }

    #[test]
    fn unknown_byte_code_in_routes_fails_to_parse() {
        let error = BridgeSettings::from_yaml_str("routes:\n  float: event_stream\n").unwrap_err();
        assert!(matches!(error, BridgeError::Config { .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let error = BridgeSettings::load("/nonexistent/holo-bridge.yaml").unwrap_err();
        assert!(error.to_string().contains("holo-bridge.yaml"));
    }

    #[test]
    fn settings_round_trip_through_yaml() {
        let yaml = serde_yaml_ng::to_string(&BridgeSettings::default()).unwrap();
        assert_eq!(BridgeSettings::from_yaml_str(&yaml).unwrap(), BridgeSettings::default());
    }
}
