//! Named, buffered, broadcast output streams.
//!
//! An outlet accepts samples from the session through [`OutletSink::publish`] and
//! hands them to any number of [`OutletConsumer`]s. Every consumer sees every
//! retained sample in publish order; delivery is broadcast, not work-stealing.
//!
//! ## Buffering
//!
//! - Samples become visible to consumers one chunk at a time: after `chunk_size`
//!   publishes, or on an explicit [`Outlet::flush`].
//! - At most `max_buffered` samples are retained. Publishing into a full outlet
//!   evicts the oldest sample and increments [`Outlet::overflow`]; it never blocks
//!   and never fails.
//! - A consumer that falls behind the retained window skips the evicted prefix
//!   and records the gap in [`OutletConsumer::lagged`].
//!
//! ## Usage Example
//!
//! ```rust
//! use holo_bridge::outlet::{Outlet, OutletConfig, OutletInfo, OutletSink};
//! use holo_bridge::Sample;
//! use std::sync::Arc;
//!
//! let outlet = Arc::new(Outlet::new(
//!     "event_stream",
//!     OutletInfo::irregular("Event_stream", "Event_Stream", "HL_Events"),
//!     OutletConfig { chunk_size: 1, max_buffered: 3600 },
//! ));
//! let mut consumer = outlet.subscribe();
//!
//! outlet.publish(Sample::new("event_stream", 0.5, "Grab; cube_1"));
//!
//! let batch = consumer.try_pull();
//! assert_eq!(batch.len(), 1);
//! assert_eq!(batch[0].value, "Grab; cube_1");
//! ```

mod buffered;
mod consumer;
mod info;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use buffered::Outlet;
pub use consumer::OutletConsumer;
pub use info::{NominalRate, OutletConfig, OutletInfo};

use crate::types::Sample;

/// Publish side of an outlet, as seen by the session.
///
/// Implementations serialise their own writes, so one sink may be shared by
/// concurrent sessions.
pub trait OutletSink: Send + Sync {
    /// Key samples are routed by.
    fn name(&self) -> &str;

    /// Enqueue a sample. Must not block and must not fail.
    fn publish(&self, sample: Sample);

    /// Make any partially filled chunk visible to consumers.
    fn flush(&self) {}
}

/// Fixed mapping from outlet key to sink.
///
/// Built once at process start and shared by every session and every restart of
/// the supervisor; the sinks it holds are never recreated.
#[derive(Clone, Default)]
pub struct OutletMap {
    sinks: BTreeMap<String, Arc<dyn OutletSink>>,
}

impl OutletMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a set of buffered outlets by key.
    pub fn from_outlets(outlets: &[Arc<Outlet>]) -> Self {
        outlets.iter().map(|outlet| Arc::clone(outlet) as Arc<dyn OutletSink>).collect()
    }

    /// Register a sink under its own name, replacing any previous one.
    pub fn insert(&mut self, sink: Arc<dyn OutletSink>) {
        self.sinks.insert(sink.name().to_string(), sink);
    }

    /// Builder form of [`Self::insert`].
    pub fn with(mut self, sink: Arc<dyn OutletSink>) -> Self {
        self.insert(sink);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn OutletSink>> {
        self.sinks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sinks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Flush every sink.
    pub fn flush_all(&self) {
        for sink in self.sinks.values() {
            sink.flush();
        }
    }
}

impl std::fmt::Debug for OutletMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.sinks.keys()).finish()
    }
}

impl FromIterator<Arc<dyn OutletSink>> for OutletMap {
    fn from_iter<I: IntoIterator<Item = Arc<dyn OutletSink>>>(iter: I) -> Self {
        let mut map = Self::new();
        for sink in iter {
            map.insert(sink);
        }
        map
    }
}
