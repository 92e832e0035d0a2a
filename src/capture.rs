//! The capture loop: connect, fill the buffer by elapsed time, drain.
//!
//! ```text
//! Connecting ──ok──▶ Capturing ──window elapsed / closed / interrupt──▶ Draining ──▶ Done
//!      │                 │
//!      └──────fail───────┴──transport error / fatal parse──▶ Aborted
//! ```
//!
//! The loop is single-threaded and polls for termination: it checks the
//! clock and the stop signal after every read instead of being preempted.
//! The source is held in a [`Session`], so it is released on every exit
//! path including the aborted ones.
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::book::parse_snapshot;
use crate::buffer::DepthBuffer;
use crate::error::{CaptureError, ParseError, SourceError};
use crate::source::{Session, SnapshotSource};

/// Monotonic time as an offset from some fixed origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Virtual time set by whoever replays recorded events.
#[derive(Debug, Clone, Default)]
pub struct ReplayClock(Rc<Cell<Duration>>);

impl ReplayClock {
    pub fn set(&self, at: Duration) {
        self.0.set(at);
    }
}

impl Clock for ReplayClock {
    fn now(&self) -> Duration {
        self.0.get()
    }
}

/// Length of a capture and the width of one buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    pub duration: Duration,
    pub unit: Duration,
}

impl CaptureWindow {
    pub fn new(duration: Duration, unit: Duration) -> Self {
        Self { duration, unit }
    }

    pub fn seconds(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs), Duration::from_secs(1))
    }

    /// Slots needed to cover the window, rounding a partial unit up.
    pub fn capacity(&self) -> usize {
        let unit = self.unit.as_nanos().max(1);
        self.duration.as_nanos().div_ceil(unit) as usize
    }

    /// Whole units in `elapsed`.
    pub fn index_of(&self, elapsed: Duration) -> usize {
        (elapsed.as_nanos() / self.unit.as_nanos().max(1)) as usize
    }
}

/// What to do with a payload that fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ParsePolicy {
    /// Log, drop the payload, keep capturing.
    #[default]
    Skip,
    /// Abort the whole run.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Connecting,
    Capturing,
    Draining,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    WindowElapsed,
    SourceClosed,
    Interrupted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub received: u64,
    pub written: u64,
    pub overwritten: u64,
    pub dropped: u64,
    pub transient: u64,
    pub late: u64,
}

#[derive(Debug)]
pub struct CaptureReport {
    pub buffer: DepthBuffer,
    pub stats: CaptureStats,
    pub end: EndReason,
}

pub struct CaptureLoop<C: Clock> {
    window: CaptureWindow,
    policy: ParsePolicy,
    clock: C,
    stop: Option<Receiver<()>>,
    state: CaptureState,
}

impl<C: Clock> CaptureLoop<C> {
    pub fn new(window: CaptureWindow, policy: ParsePolicy, clock: C) -> Self {
        Self { window, policy, clock, stop: None, state: CaptureState::Connecting }
    }

    /// Any message (or disconnect) on `stop` ends the capture like a close.
    pub fn with_stop_signal(mut self, stop: Receiver<()>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Run one capture. `connect` acquires the source; its failure aborts
    /// before anything is buffered.
    pub fn run<S, F>(&mut self, connect: F) -> Result<CaptureReport, CaptureError>
    where
        S: SnapshotSource,
        F: FnOnce() -> Result<S, CaptureError>,
    {
        self.state = CaptureState::Connecting;
        let mut session = match connect() {
            Ok(source) => Session::open(source),
            Err(e) => {
                self.state = CaptureState::Aborted;
                return Err(e);
            }
        };

        match self.capture(&mut session) {
            Ok((buffer, stats, end)) => {
                self.state = CaptureState::Draining;
                session.release();
                self.state = CaptureState::Done;
                tracing::info!(
                    ?end,
                    snapshots = buffer.snapshot_count(),
                    capacity = buffer.capacity(),
                    ?stats,
                    "capture finished"
                );
                Ok(CaptureReport { buffer, stats, end })
            }
            Err(e) => {
                self.state = CaptureState::Aborted;
                session.release();
                tracing::error!("capture aborted: {e}");
                Err(e)
            }
        }
    }

    fn capture<S: SnapshotSource>(
        &mut self,
        session: &mut Session<S>,
    ) -> Result<(DepthBuffer, CaptureStats, EndReason), CaptureError> {
        self.state = CaptureState::Capturing;
        let window = self.window;
        let mut buffer = DepthBuffer::with_capacity(window.capacity());
        let mut stats = CaptureStats::default();
        let start = self.clock.now();
        tracing::info!(duration = ?window.duration, capacity = buffer.capacity(), "capture started");

        let end = loop {
            match session.next() {
                Ok(payload) => {
                    stats.received += 1;
                    let elapsed = self.clock.now().saturating_sub(start);
                    if elapsed >= window.duration {
                        stats.late += 1;
                        break EndReason::WindowElapsed;
                    }
                    let index = window.index_of(elapsed);
                    match parse_snapshot(&payload) {
                        Ok(snapshot) => match buffer.write(index, snapshot) {
                            Ok(replaced) => {
                                stats.written += 1;
                                if replaced {
                                    stats.overwritten += 1;
                                    tracing::debug!(index, "slot overwritten");
                                }
                                tracing::trace!(index, "snapshot stored");
                            }
                            Err(e) => {
                                stats.late += 1;
                                tracing::warn!("dropping snapshot: {e}");
                            }
                        },
                        Err(e) => self.on_parse_error(index, e, &mut stats)?,
                    }
                }
                Err(SourceError::Closed) => break EndReason::SourceClosed,
                Err(SourceError::Transient(e)) => {
                    stats.transient += 1;
                    tracing::warn!("skipping tick: {e}");
                }
                Err(SourceError::Transport(e)) => return Err(CaptureError::Transport(e)),
            }

            if self.clock.now().saturating_sub(start) >= window.duration {
                break EndReason::WindowElapsed;
            }
            if self.stop_requested() {
                break EndReason::Interrupted;
            }
        };
        Ok((buffer, stats, end))
    }

    fn on_parse_error(&self, index: usize, e: ParseError, stats: &mut CaptureStats) -> Result<(), CaptureError> {
        match self.policy {
            ParsePolicy::Skip => {
                stats.dropped += 1;
                tracing::warn!(index, "dropping payload: {e}");
                Ok(())
            }
            ParsePolicy::Abort => Err(e.into()),
        }
    }

    fn stop_requested(&self) -> bool {
        use crossbeam_channel::TryRecvError;
        match &self.stop {
            Some(rx) => !matches!(rx.try_recv(), Err(TryRecvError::Empty)),
            None => false,
        }
    }
}
