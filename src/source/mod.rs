//! Where raw depth payloads come from.
//!
//! Every transport is reduced to [`SnapshotSource::next`], so the capture loop
//! never knows whether it is reading a push stream, polling an endpoint, or
//! replaying a journal.
//!
//! - [`stream::StreamSource`]: websocket subscription, one read per call
//! - [`poll::PollSource`]: REST request on a fixed tick
//! - [`replay::ReplaySource`]: recorded events driving a virtual clock
//! - [`replay::RecordingSource`]: wraps any source and journals what it returns
use crate::error::SourceError;

pub mod poll;
pub mod replay;
pub mod stream;

pub type RawPayload = String;

pub trait SnapshotSource {
    /// Block until the next payload is available, or report why there is none.
    fn next(&mut self) -> Result<RawPayload, SourceError>;

    /// Release the network session. Called exactly once by [`Session`].
    fn release(&mut self) {}
}

impl<S: SnapshotSource + ?Sized> SnapshotSource for Box<S> {
    fn next(&mut self) -> Result<RawPayload, SourceError> {
        (**self).next()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Owns an open source and releases it exactly once, on [`Session::release`]
/// or on drop, whichever comes first.
pub struct Session<S: SnapshotSource> {
    source: S,
    open: bool,
}

impl<S: SnapshotSource> Session<S> {
    pub fn open(source: S) -> Self {
        Self { source, open: true }
    }

    pub fn next(&mut self) -> Result<RawPayload, SourceError> {
        if !self.open {
            return Err(SourceError::Closed);
        }
        self.source.next()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn release(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            self.source.release();
        }
    }
}

impl<S: SnapshotSource> Drop for Session<S> {
    fn drop(&mut self) {
        self.release();
    }
}
