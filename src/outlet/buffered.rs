//! Bounded drop-oldest outlet

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, trace};

use super::consumer::OutletConsumer;
use super::{OutletConfig, OutletInfo, OutletSink};
use crate::types::Sample;

/// Publication state broadcast to consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Head {
    /// Samples with a sequence number below this are visible
    pub flushed: u64,
    pub closed: bool,
}

/// Retained samples, addressed by a monotonically increasing sequence number.
#[derive(Debug, Default)]
pub(crate) struct Backlog {
    pub samples: VecDeque<Sample>,
    /// Sequence number of `samples.front()`
    pub first_seq: u64,
    /// Sequence number the next publish receives
    pub next_seq: u64,
    pub flushed: u64,
}

impl Backlog {
    /// Clone the visible samples in `[from, flushed)`, clamped to what is retained.
    pub fn visible_from(&self, from: u64) -> (u64, Vec<Sample>) {
        let start = from.max(self.first_seq);
        if self.flushed <= start {
            return (start, Vec::new());
        }
        let offset = (start - self.first_seq) as usize;
        let count = (self.flushed - start) as usize;
        (start, self.samples.iter().skip(offset).take(count).cloned().collect())
    }
}

/// A named outlet with a bounded backlog and broadcast delivery.
///
/// Outlets are created once and shared behind an [`Arc`]; the session only ever
/// touches them through [`OutletSink`].
pub struct Outlet {
    key: String,
    info: OutletInfo,
    config: OutletConfig,
    backlog: Mutex<Backlog>,
    head: watch::Sender<Head>,
    overflow: AtomicU64,
    closed: AtomicBool,
}

impl Outlet {
    /// Create an outlet routed by `key`.
    ///
    /// Zero values in `config` are raised to one.
    pub fn new(key: impl Into<String>, info: OutletInfo, config: OutletConfig) -> Self {
        let config = OutletConfig {
            chunk_size: config.chunk_size.max(1),
            max_buffered: config.max_buffered.max(1),
        };
        let (head, _) = watch::channel(Head::default());
        let key = key.into();

        debug!(
            outlet = %key,
            display_name = %info.name,
            chunk_size = config.chunk_size,
            max_buffered = config.max_buffered,
            "Created outlet"
        );

        Self {
            key,
            info,
            config,
            backlog: Mutex::new(Backlog {
                samples: VecDeque::with_capacity(config.max_buffered),
                ..Backlog::default()
            }),
            head,
            overflow: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn info(&self) -> &OutletInfo {
        &self.info
    }

    pub fn config(&self) -> OutletConfig {
        self.config
    }

    /// Samples evicted to make room since the outlet was created.
    pub fn overflow(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Samples currently retained, flushed or not.
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach a new consumer positioned at the oldest retained sample.
    pub fn subscribe(self: &Arc<Self>) -> OutletConsumer {
        let cursor = self.lock().first_seq;
        OutletConsumer::new(Arc::clone(self), cursor, self.head.subscribe())
    }

    /// Enqueue a sample, evicting the oldest one if the backlog is full.
    pub fn publish(&self, sample: Sample) {
        let flushed = {
            let mut backlog = self.lock();
            // Checked under the lock so `close` cannot slip between check and push
            if self.closed.load(Ordering::Acquire) {
                trace!(outlet = %self.key, "Outlet closed, dropping sample");
                return;
            }
            if backlog.samples.len() >= self.config.max_buffered {
                backlog.samples.pop_front();
                backlog.first_seq += 1;
                self.overflow.fetch_add(1, Ordering::Relaxed);
            }
            backlog.samples.push_back(sample);
            backlog.next_seq += 1;

            if backlog.next_seq - backlog.flushed >= self.config.chunk_size as u64 {
                backlog.flushed = backlog.next_seq;
                Some(backlog.flushed)
            } else {
                None
            }
        };

        if let Some(flushed) = flushed {
            self.announce(flushed);
        }
    }

    /// Make every published sample visible, even a partially filled chunk.
    pub fn flush(&self) {
        let flushed = {
            let mut backlog = self.lock();
            if backlog.flushed == backlog.next_seq {
                return;
            }
            backlog.flushed = backlog.next_seq;
            backlog.flushed
        };
        self.announce(flushed);
    }

    /// Flush and stop accepting samples. Consumers end once they have drained.
    pub fn close(&self) {
        {
            let _backlog = self.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.flush();
        self.head.send_modify(|head| head.closed = true);
        debug!(outlet = %self.key, overflow = self.overflow(), "Closed outlet");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Backlog> {
        self.backlog.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn announce(&self, flushed: u64) {
        // Concurrent publishers may announce out of order; only move forward.
        self.head.send_if_modified(|head| {
            if flushed > head.flushed {
                head.flushed = flushed;
                true
            } else {
                false
            }
        });
    }
}

impl OutletSink for Outlet {
    fn name(&self) -> &str {
        &self.key
    }

    fn publish(&self, sample: Sample) {
        Outlet::publish(self, sample);
    }

    fn flush(&self) {
        Outlet::flush(self);
    }
}

impl std::fmt::Debug for Outlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outlet")
            .field("key", &self.key)
            .field("info", &self.info)
            .field("config", &self.config)
            .field("overflow", &self.overflow())
            .finish_non_exhaustive()
    }
}
