//! One device connection from accept to close.
//!
//! A [`Session`] owns the connection's framed transport and runs the read loop:
//!
//! ```text
//! AwaitingBytes ──bytes──▶ Decoding ──frame──▶ Dispatching ──▶ AwaitingBytes
//!       │                      │
//!       ├── peer closed ──▶ ClosedClean
//!       └── I/O error / malformed frame ──▶ ClosedError
//! ```
//!
//! Sample-level failures (undecodable payload, unknown outlet) are logged,
//! counted and dropped; the decode position is unaffected, so the next frame is
//! read normally. Session-level failures end the loop and hand control back to
//! the supervisor, which accepts the next connection.
//!
//! When inlets are configured the read wait is bounded by the read timeout, so
//! outbound forwarding runs at least once per timeout even on a silent link.
//! Writes get the same bound. Frames a stalled device has not accepted stay
//! queued in order, and later iterations only poll the transport without
//! waiting until it drains, so the read side keeps its latency.

use futures::{FutureExt, SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::clock::local_clock;
use crate::codec::{FrameCodec, outbound_frame};
use crate::dispatch::DispatchTable;
use crate::inlet::InletMap;
use crate::metrics::BridgeMetrics;
use crate::outlet::OutletMap;
use crate::types::Frame;
use crate::{BridgeError, Result};

/// Default bound on a single wait for inbound bytes.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Everything a session needs that outlives it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub outlets: OutletMap,
    pub inlets: InletMap,
    pub dispatch: DispatchTable,
    pub metrics: Arc<BridgeMetrics>,
    pub codec: FrameCodec,
    pub read_timeout: Duration,
}

impl SessionContext {
    pub fn new(outlets: OutletMap, inlets: InletMap, dispatch: DispatchTable) -> Self {
        Self {
            outlets,
            inlets,
            dispatch,
            metrics: Arc::new(BridgeMetrics::new()),
            codec: FrameCodec::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Where a session is in its read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingBytes,
    Decoding,
    Dispatching,
    ClosedClean,
    ClosedError,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::ClosedClean | SessionState::ClosedError)
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the connection
    Clean,
    /// An I/O error or unrecoverable framing error
    Error(BridgeError),
}

/// Summary returned when a session ends.
#[derive(Debug)]
pub struct SessionReport {
    pub peer: String,
    pub end: SessionEnd,
    pub frames: u64,
    pub published: u64,
    pub dropped: u64,
    pub forwarded: u64,
    /// Header plus payload bytes of every decoded frame
    pub frame_bytes: u64,
    pub duration: Duration,
}

impl SessionReport {
    pub fn is_clean(&self) -> bool {
        matches!(self.end, SessionEnd::Clean)
    }
}

/// Read loop for one accepted connection.
pub struct Session<S> {
    framed: Framed<S, FrameCodec>,
    peer: String,
    ctx: Arc<SessionContext>,
    state: SessionState,
    frames: u64,
    published: u64,
    dropped: u64,
    forwarded: u64,
    frame_bytes: u64,
    /// Inlet frames not yet accepted by the transport, oldest first
    outbound: VecDeque<Frame>,
    /// Frames have been handed to the transport but not flushed
    unflushed: bool,
    /// The last bounded write timed out
    write_stalled: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: S, peer: impl Into<String>, ctx: Arc<SessionContext>) -> Self {
        Self {
            framed: Framed::new(io, ctx.codec),
            peer: peer.into(),
            ctx,
            state: SessionState::AwaitingBytes,
            frames: 0,
            published: 0,
            dropped: 0,
            forwarded: 0,
            frame_bytes: 0,
            outbound: VecDeque::new(),
            unflushed: false,
            write_stalled: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve the connection until the peer closes it or it fails.
    ///
    /// Never returns an error: the outcome is in [`SessionReport::end`].
    pub async fn run(&mut self) -> SessionReport {
        let started = Instant::now();
        info!(peer = %self.peer, "Session started");

        let end = loop {
            match self.next_frame().await {
                Ok(Some(Some(frame))) => self.dispatch(frame),
                Ok(Some(None)) => {}
                Ok(None) => break SessionEnd::Clean,
                Err(e) => break SessionEnd::Error(e),
            }

            if let Err(e) = self.forward_inlets().await {
                break SessionEnd::Error(e);
            }
        };

        // Nothing published during this session may wait for a later one
        self.ctx.outlets.flush_all();

        let report = self.finish(end, started.elapsed());
        match &report.end {
            SessionEnd::Clean => info!(
                peer = %report.peer,
                frames = report.frames,
                dropped = report.dropped,
                "Session closed by peer"
            ),
            SessionEnd::Error(e) => warn!(
                peer = %report.peer,
                frames = report.frames,
                dropped = report.dropped,
                error = %e,
                "Session closed on error"
            ),
        }
        report
    }

    /// Wait for the next frame.
    ///
    /// - `Ok(Some(Some(frame)))` - a frame was decoded
    /// - `Ok(Some(None))` - the read timeout elapsed with no complete frame
    /// - `Ok(None)` - the peer closed the connection
    async fn next_frame(&mut self) -> Result<Option<Option<Frame>>> {
        self.transition(SessionState::AwaitingBytes);

        let next = if self.ctx.inlets.is_empty() {
            self.framed.next().await
        } else {
            match tokio::time::timeout(self.ctx.read_timeout, self.framed.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(Some(None)),
            }
        };

        match next {
            Some(Ok(frame)) => {
                self.transition(SessionState::Decoding);
                Ok(Some(Some(frame)))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        self.transition(SessionState::Dispatching);
        self.frames += 1;
        self.frame_bytes += (frame.byte_code.layout().header_len() + frame.payload.len()) as u64;
        BridgeMetrics::bump(&self.ctx.metrics.frames_decoded);

        let ctx = &self.ctx;
        let outcome = ctx.dispatch.dispatch(&frame, local_clock()).and_then(|sample| {
            let sink = ctx
                .outlets
                .get(&sample.stream_name)
                .ok_or_else(|| BridgeError::unknown_destination(sample.stream_name.clone()))?;
            trace!(outlet = %sample.stream_name, len = sample.value.len(), "Publishing sample");
            sink.publish(sample);
            Ok(())
        });

        match outcome {
            Ok(()) => {
                self.published += 1;
                BridgeMetrics::bump(&self.ctx.metrics.samples_published);
            }
            Err(e) => {
                self.dropped += 1;
                BridgeMetrics::bump(&self.ctx.metrics.samples_dropped);
                warn!(peer = %self.peer, tag = frame.byte_code.name(), error = %e, "Dropped sample");
            }
        }
    }

    async fn forward_inlets(&mut self) -> Result<()> {
        if self.ctx.inlets.is_empty() {
            return Ok(());
        }

        // Leave samples in the inlets while the device is behind
        if self.outbound.is_empty() {
            self.queue_inlets();
        }
        if self.outbound.is_empty() && !self.unflushed {
            return Ok(());
        }

        if self.write_stalled {
            // Poll once without waiting; progress made here is kept
            let polled = self.write_outbound().now_or_never();
            match polled {
                Some(result) => {
                    self.write_stalled = false;
                    debug!(peer = %self.peer, "Device is reading again");
                    result
                }
                None => Ok(()),
            }
        } else {
            let read_timeout = self.ctx.read_timeout;
            let written = tokio::time::timeout(read_timeout, self.write_outbound()).await;
            match written {
                Ok(result) => result,
                Err(_) => {
                    self.write_stalled = true;
                    warn!(
                        peer = %self.peer,
                        pending = self.outbound.len(),
                        "Device is not reading; deferring inlet frames"
                    );
                    Ok(())
                }
            }
        }
    }

    /// Encode ready inlet samples onto the outbound queue.
    fn queue_inlets(&mut self) {
        for (byte_code, sample) in self.ctx.inlets.drain_ready() {
            match outbound_frame(&self.ctx.codec, byte_code, &sample) {
                Ok(frame) => self.outbound.push_back(frame),
                Err(e) => {
                    BridgeMetrics::bump(&self.ctx.metrics.inlet_dropped);
                    warn!(peer = %self.peer, inlet = %sample.stream_name, error = %e, "Dropped inlet sample");
                }
            }
        }
    }

    /// Hand queued frames to the transport and flush.
    ///
    /// Safe to cancel at any await: a frame leaves the queue only once the
    /// transport has taken it, and taken bytes stay in the write buffer.
    async fn write_outbound(&mut self) -> Result<()> {
        while let Some(frame) = self.outbound.front().cloned() {
            self.framed.feed(frame).await?;
            self.outbound.pop_front();
            self.unflushed = true;
            self.forwarded += 1;
            BridgeMetrics::bump(&self.ctx.metrics.inlet_forwarded);
        }
        if self.unflushed {
            self.framed.flush().await?;
            self.unflushed = false;
            trace!(peer = %self.peer, forwarded = self.forwarded, "Flushed inlet frames");
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(peer = %self.peer, from = ?self.state, to = ?next, "Session state");
            self.state = next;
        }
    }

    fn finish(&mut self, end: SessionEnd, duration: Duration) -> SessionReport {
        let terminal = match end {
            SessionEnd::Clean => {
                BridgeMetrics::bump(&self.ctx.metrics.sessions_closed_clean);
                SessionState::ClosedClean
            }
            SessionEnd::Error(_) => {
                BridgeMetrics::bump(&self.ctx.metrics.sessions_closed_error);
                SessionState::ClosedError
            }
        };
        self.transition(terminal);
        debug!(peer = %self.peer, state = ?self.state, "Session finished");

        SessionReport {
            peer: self.peer.clone(),
            end,
            frames: self.frames,
            published: self.published,
            dropped: self.dropped,
            forwarded: self.forwarded,
            frame_bytes: self.frame_bytes,
            duration,
        }
    }
}
