//! Protocol bridge from a mixed-reality device's TCP feed to buffered,
//! timestamped, multi-consumer sample streams.
//!
//! The device opens a TCP connection and writes a continuous sequence of tagged
//! binary frames (head/hand tracking records and interaction events). The bridge
//! decodes them, stamps each one with the local clock, routes it by byte-code to
//! a named outlet and lets any number of recorders consume every outlet
//! independently. Samples produced by external tools can flow the other way
//! through inlets.
//!
//! # Architecture
//!
//! ```text
//! device ──TCP──▶ FrameCodec ──Frame──▶ DispatchTable ──Sample──▶ Outlet ──▶ consumers
//!    ▲                                                                   ▲
//!    └──────────── FrameCodec ◀──Sample── InletMap ◀── producers         │
//!                                                                        │
//!   Session: one connection            Bridge: accept loop    restart::supervise
//! ```
//!
//! - **Frame decoding** ([`codec`]) tolerates arbitrary read fragmentation.
//! - **Dispatch** ([`dispatch`]) is a static byte-code → outlet table.
//! - **Outlets** ([`outlet`]) buffer with a bounded drop-oldest backlog and
//!   broadcast to every subscriber.
//! - **Sessions** ([`session`]) drop bad samples, close on bad framing.
//! - **The supervisor** ([`supervisor`]) goes back to `accept` after every
//!   session; the **restart loop** ([`restart`]) re-runs it after a listener
//!   failure. Outlets are created once and survive both.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use holo_bridge::{Bridge, BridgeSettings, InletMap, OutletMap};
//! use holo_bridge::dispatch::EVENT_STREAM;
//!
//! #[tokio::main]
//! async fn main() -> holo_bridge::Result<()> {
//!     let settings = BridgeSettings::default();
//!     let outlets = settings.build_outlets();
//!
//!     let events = outlets.iter().find(|o| o.key() == EVENT_STREAM).unwrap();
//!     let mut consumer = events.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(batch) = consumer.pull().await {
//!             for sample in batch {
//!                 println!("{:.3} {}", sample.timestamp, sample.value);
//!             }
//!         }
//!     });
//!
//!     let bridge = Bridge::from_settings(&settings, OutletMap::from_outlets(&outlets), InletMap::new())?;
//!     bridge.run().await
//! }
//! ```

// Core types and error handling
pub mod clock;
mod error;
pub mod metrics;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire format and routing
pub mod codec;
pub mod dispatch;

// Stream endpoints
pub mod inlet;
pub mod outlet;

// Connection handling
pub mod restart;
pub mod session;
pub mod supervisor;

pub mod config;

// Core exports
pub use error::*;
pub use types::*;

pub use clock::local_clock;
pub use config::BridgeSettings;
pub use dispatch::DispatchTable;
pub use inlet::{ChannelInlet, InletHandle, InletMap, InletSource};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use outlet::{Outlet, OutletConsumer, OutletMap, OutletSink};
pub use restart::RestartPolicy;
pub use session::{Session, SessionEnd, SessionReport, SessionState};
pub use supervisor::{Bridge, SessionPolicy};
