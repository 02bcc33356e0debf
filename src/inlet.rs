//! Externally produced samples forwarded back to the device.
//!
//! An [`InletSource`] is polled by the session once per loop iteration. Polling
//! never blocks; whatever is ready is encoded with the inlet's byte-code and
//! written to the device socket. Deployments without inlets pay nothing: the
//! session skips forwarding entirely when the [`InletMap`] is empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use crate::clock::local_clock;
use crate::types::{ByteCode, Sample};

/// Default number of samples an inlet holds before producers are refused.
pub const DEFAULT_INLET_CAPACITY: usize = 256;

/// Samples drained from one inlet per session iteration.
pub const DRAIN_BUDGET: usize = 64;

/// Source of samples destined for the device.
pub trait InletSource: Send + Sync {
    /// Inlet key, used for logging and as the sample's stream name.
    fn name(&self) -> &str;

    /// Byte-code the samples are framed with on the way out.
    fn byte_code(&self) -> ByteCode;

    /// Next ready sample, if any. Must not block.
    fn poll(&self) -> Option<Sample>;
}

/// Inlet backed by a bounded channel.
pub struct ChannelInlet {
    name: String,
    byte_code: ByteCode,
    tx: mpsc::Sender<Sample>,
    rx: Mutex<mpsc::Receiver<Sample>>,
    refused: Arc<AtomicU64>,
}

impl ChannelInlet {
    pub fn new(name: impl Into<String>, byte_code: ByteCode, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            name: name.into(),
            byte_code,
            tx,
            rx: Mutex::new(rx),
            refused: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Producer handle. Handles can be cloned and moved to other tasks.
    pub fn handle(&self) -> InletHandle {
        InletHandle { name: self.name.clone(), tx: self.tx.clone(), refused: Arc::clone(&self.refused) }
    }

    /// Samples producers could not enqueue because the inlet was full.
    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }
}

impl InletSource for ChannelInlet {
    fn name(&self) -> &str {
        &self.name
    }

    fn byte_code(&self) -> ByteCode {
        self.byte_code
    }

    fn poll(&self) -> Option<Sample> {
        let mut rx = self.rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rx.try_recv().ok()
    }
}

impl std::fmt::Debug for ChannelInlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelInlet")
            .field("name", &self.name)
            .field("byte_code", &self.byte_code)
            .field("refused", &self.refused())
            .finish_non_exhaustive()
    }
}

/// Producer side of a [`ChannelInlet`].
#[derive(Debug, Clone)]
pub struct InletHandle {
    name: String,
    tx: mpsc::Sender<Sample>,
    refused: Arc<AtomicU64>,
}

impl InletHandle {
    /// Queue `value` for the device, stamped with the local clock.
    ///
    /// Returns `false` without waiting if the inlet is full.
    pub fn push(&self, value: impl Into<String>) -> bool {
        let sample = Sample::new(self.name.clone(), local_clock(), value);
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(e) => {
                self.refused.fetch_add(1, Ordering::Relaxed);
                debug!(inlet = %self.name, "Inlet refused sample: {}", e);
                false
            }
        }
    }
}

/// Fixed set of inlets, possibly empty.
#[derive(Clone, Default)]
pub struct InletMap {
    sources: Vec<Arc<dyn InletSource>>,
}

impl InletMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a set of channel inlets.
    pub fn from_channels(inlets: &[Arc<ChannelInlet>]) -> Self {
        inlets.iter().map(|inlet| Arc::clone(inlet) as Arc<dyn InletSource>).collect()
    }

    /// Register a source. A later source with the same name replaces the earlier one.
    pub fn insert(&mut self, source: Arc<dyn InletSource>) {
        self.sources.retain(|existing| existing.name() != source.name());
        self.sources.push(source);
    }

    pub fn with(mut self, source: Arc<dyn InletSource>) -> Self {
        self.insert(source);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|source| source.name())
    }

    /// Collect ready samples from every inlet, at most [`DRAIN_BUDGET`] each.
    pub fn drain_ready(&self) -> Vec<(ByteCode, Sample)> {
        let mut ready = Vec::new();
        for source in &self.sources {
            let byte_code = source.byte_code();
            for _ in 0..DRAIN_BUDGET {
                match source.poll() {
                    Some(sample) => ready.push((byte_code, sample)),
                    None => break,
                }
            }
        }
        ready
    }
}

impl FromIterator<Arc<dyn InletSource>> for InletMap {
    fn from_iter<I: IntoIterator<Item = Arc<dyn InletSource>>>(iter: I) -> Self {
        let mut map = Self::new();
        for source in iter {
            map.insert(source);
        }
        map
    }
}

impl std::fmt::Debug for InletMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
