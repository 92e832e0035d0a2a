//! Journal-backed sources: record what a live feed returns, play it back later.
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use super::{RawPayload, SnapshotSource};
use crate::capture::ReplayClock;
use crate::error::{JournalError, SourceError};
use crate::record::{read_journal, EventKind, EventRecord, Journal, JournalWriter};

/// Plays recorded events back in order, moving `clock` to each event's
/// recorded elapsed time before returning it. Runs out as [`SourceError::Closed`].
pub struct ReplaySource {
    events: VecDeque<EventRecord>,
    clock: ReplayClock,
}

impl ReplaySource {
    pub fn new(events: impl IntoIterator<Item = EventRecord>, clock: ReplayClock) -> Self {
        Self { events: events.into_iter().collect(), clock }
    }

    /// Open a journal file. The returned [`Journal`] carries the header and
    /// trailer; its events have been moved into the source.
    pub fn open(path: &Path, clock: ReplayClock) -> Result<(Journal, Self), JournalError> {
        let mut journal = read_journal(path)?;
        let events = std::mem::take(&mut journal.events);
        tracing::info!(
            path = %path.display(),
            events = events.len(),
            symbol = %journal.header.symbol,
            trailer = ?journal.trailer,
            "replaying journal"
        );
        Ok((journal, Self::new(events, clock)))
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl SnapshotSource for ReplaySource {
    fn next(&mut self) -> Result<RawPayload, SourceError> {
        let Some(ev) = self.events.pop_front() else {
            return Err(SourceError::Closed);
        };
        self.clock.set(ev.elapsed());
        match ev.kind {
            EventKind::Payload(body) => Ok(body),
            EventKind::Transient(reason) => Err(SourceError::Transient(reason)),
            EventKind::Closed => Err(SourceError::Closed),
        }
    }
}

/// Tees every result of the inner source into a journal.
///
/// Transport failures are not journaled; they end the capture and the
/// journal simply stops there. Elapsed times count from the first `next()`
/// call, which the capture loop makes right after taking its own start time.
pub struct RecordingSource<S> {
    inner: S,
    journal: JournalWriter,
    origin: Option<Instant>,
}

impl<S: SnapshotSource> RecordingSource<S> {
    pub fn new(inner: S, journal: JournalWriter) -> Self {
        Self { inner, journal, origin: None }
    }

    fn log(&mut self, elapsed: Duration, kind: EventKind) {
        if let Err(e) = self.journal.append(elapsed, kind) {
            tracing::warn!("journal append failed: {e}");
        }
    }
}

impl<S: SnapshotSource> SnapshotSource for RecordingSource<S> {
    fn next(&mut self) -> Result<RawPayload, SourceError> {
        let origin = *self.origin.get_or_insert_with(Instant::now);
        let res = self.inner.next();
        let elapsed = origin.elapsed();
        match &res {
            Ok(body) => self.log(elapsed, EventKind::Payload(body.clone())),
            Err(SourceError::Transient(reason)) => self.log(elapsed, EventKind::Transient(reason.clone())),
            Err(SourceError::Closed) => self.log(elapsed, EventKind::Closed),
            Err(SourceError::Transport(_)) => {}
        }
        res
    }

    fn release(&mut self) {
        self.inner.release();
        match self.journal.finish() {
            Ok(t) if t.lost > 0 => tracing::error!(lost = t.lost, written = t.written, "journal is incomplete"),
            Ok(t) => tracing::info!(events = t.written, "journal finished"),
            Err(e) => tracing::error!("journal trailer not written: {e}"),
        }
    }
}
