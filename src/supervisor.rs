//! Listening socket and accept loop.
//!
//! [`Bridge`] owns the fixed outlet and inlet mappings for the lifetime of the
//! process. [`Bridge::run`] binds the listener and serves device connections one
//! after another; when a session ends for any reason the loop goes straight back
//! to `accept`. Only a failure of the listener itself escapes as
//! [`BridgeError::SupervisorFault`], for the restart loop in [`crate::restart`]
//! to handle.
//!
//! ```rust,no_run
//! use holo_bridge::{Bridge, BridgeSettings, InletMap, OutletMap};
//!
//! # async fn example() -> holo_bridge::Result<()> {
//! let settings = BridgeSettings::default();
//! let outlets = settings.build_outlets();
//! let inlets = settings.build_inlets();
//! let bridge = Bridge::from_settings(
//!     &settings,
//!     OutletMap::from_outlets(&outlets),
//!     InletMap::from_channels(&inlets),
//! )?;
//! bridge.run().await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::FrameCodec;
use crate::config::BridgeSettings;
use crate::dispatch::DispatchTable;
use crate::inlet::InletMap;
use crate::metrics::BridgeMetrics;
use crate::outlet::OutletMap;
use crate::session::{Session, SessionContext, SessionEnd, SessionReport};
use crate::{BridgeError, Result};

/// Consecutive accept failures tolerated before the listener is given up.
const MAX_ACCEPT_ERRORS: u32 = 10;

/// How accepted connections are served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// One device at a time; the next connection waits in the listen backlog
    #[default]
    Sequential,

    /// Every connection gets its own task; outlets serialise the publishers
    Concurrent,
}

/// The bridge supervisor.
#[derive(Debug)]
pub struct Bridge {
    host: String,
    port: u16,
    policy: SessionPolicy,
    ctx: Arc<SessionContext>,
}

impl Bridge {
    /// A bridge with the default dispatch table, codec and read timeout.
    pub fn new(host: impl Into<String>, port: u16, outlets: OutletMap, inlets: InletMap) -> Self {
        Self {
            host: host.into(),
            port,
            policy: SessionPolicy::default(),
            ctx: Arc::new(SessionContext::new(outlets, inlets, DispatchTable::default())),
        }
    }

    /// Build a bridge from validated settings around already-constructed mappings.
    pub fn from_settings(settings: &BridgeSettings, outlets: OutletMap, inlets: InletMap) -> Result<Self> {
        settings.validate()?;

        let dispatch = settings.dispatch_table();
        for key in dispatch.outlet_names() {
            if !outlets.contains(key) {
                warn!(outlet = %key, "Route targets an outlet missing from the mapping; its samples will be dropped");
            }
        }

        Ok(Self::new(settings.host.clone(), settings.port, outlets, inlets)
            .with_policy(settings.session_policy)
            .with_dispatch(dispatch)
            .with_codec(FrameCodec::with_max_payload(settings.max_payload))
            .with_read_timeout(Duration::from_millis(settings.read_timeout_ms)))
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchTable) -> Self {
        self.context_mut().dispatch = dispatch;
        self
    }

    pub fn with_codec(mut self, codec: FrameCodec) -> Self {
        self.context_mut().codec = codec;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.context_mut().read_timeout = read_timeout;
        self
    }

    /// Share counters with another component, e.g. the restart loop.
    pub fn with_metrics(mut self, metrics: Arc<BridgeMetrics>) -> Self {
        self.context_mut().metrics = metrics;
        self
    }

    fn context_mut(&mut self) -> &mut SessionContext {
        Arc::make_mut(&mut self.ctx)
    }

    pub fn outlets(&self) -> &OutletMap {
        &self.ctx.outlets
    }

    pub fn inlets(&self) -> &InletMap {
        &self.ctx.inlets
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.ctx.metrics)
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// `host:port` the bridge binds to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Serve until the listener fails. Never returns `Ok`.
    pub async fn run(&self) -> Result<()> {
        self.run_until(CancellationToken::new()).await
    }

    /// Serve until `stop` is cancelled (`Ok`) or the listener fails (`Err`).
    pub async fn run_until(&self, stop: CancellationToken) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, stop).await
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.address();
        TcpListener::bind(&address).await.map_err(|e| {
            BridgeError::supervisor_fault_with_source(format!("cannot bind {}", address), Box::new(e))
        })
    }

    /// Run the accept loop on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener, stop: CancellationToken) -> Result<()> {
        match listener.local_addr() {
            Ok(addr) => info!(%addr, policy = ?self.policy, outlets = ?self.ctx.outlets, "Bridge listening"),
            Err(e) => warn!("Bridge listening on unknown address: {}", e),
        }

        let mut sessions = JoinSet::new();
        let mut accept_errors = 0u32;

        let outcome = loop {
            let accepted = tokio::select! {
                _ = stop.cancelled() => {
                    info!("Bridge stop requested");
                    break Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => {
                    accept_errors = 0;
                    accepted
                }
                Err(e) => {
                    accept_errors += 1;
                    warn!("Accept failed ({}/{}): {}", accept_errors, MAX_ACCEPT_ERRORS, e);
                    if accept_errors >= MAX_ACCEPT_ERRORS {
                        break Err(BridgeError::supervisor_fault_with_source(
                            "listener keeps failing to accept",
                            Box::new(e),
                        ));
                    }
                    // Exponential backoff: 50ms, 100ms, 200ms, ...
                    let backoff = Duration::from_millis(50 * (1 << accept_errors.min(5)));
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            BridgeMetrics::bump(&self.ctx.metrics.sessions_accepted);
            let session = self.open_session(stream, peer.to_string());

            match self.policy {
                SessionPolicy::Sequential => {
                    let mut session = session;
                    tokio::select! {
                        _ = stop.cancelled() => {
                            info!(peer = %peer, "Bridge stop requested during session");
                            break Ok(());
                        }
                        report = session.run() => log_report(&report),
                    }
                }
                SessionPolicy::Concurrent => {
                    let mut session = session;
                    sessions.spawn(async move { session.run().await });
                    while let Some(joined) = sessions.try_join_next() {
                        reap(joined);
                    }
                }
            }
        };

        if !sessions.is_empty() {
            debug!(active = sessions.len(), "Aborting active sessions");
            sessions.shutdown().await;
        }
        self.ctx.outlets.flush_all();
        outcome
    }

    fn open_session(&self, stream: TcpStream, peer: String) -> Session<TcpStream> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, "Could not disable Nagle: {}", e);
        }
        Session::new(stream, peer, Arc::clone(&self.ctx))
    }
}

fn log_report(report: &SessionReport) {
    debug!(
        peer = %report.peer,
        frames = report.frames,
        published = report.published,
        dropped = report.dropped,
        forwarded = report.forwarded,
        frame_bytes = report.frame_bytes,
        duration_ms = report.duration.as_millis() as u64,
        clean = matches!(report.end, SessionEnd::Clean),
        "Session report"
    );
}

fn reap(joined: std::result::Result<SessionReport, tokio::task::JoinError>) {
    match joined {
        Ok(report) => log_report(&report),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("Session task failed: {}", e),
    }
}
