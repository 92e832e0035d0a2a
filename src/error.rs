//! Error taxonomy shared by the capture pipeline.
use thiserror::Error;

/// Which side of the book a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Failure to turn a raw payload into a [`crate::book::DepthSnapshot`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid {field} at {side} level {level}: {token:?}")]
    InvalidNumericField {
        side: Side,
        level: usize,
        field: &'static str,
        token: String,
    },
}

/// Signals returned by [`crate::source::SnapshotSource::next`] instead of a payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Peer ended the session gracefully. Not a failure.
    #[error("feed closed the session")]
    Closed,

    /// One poll attempt failed; the tick is skipped.
    #[error("transient request failure: {0}")]
    Transient(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("slot {index} out of range for capacity {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },
}

/// Any failure to create or write the output table.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("cannot write table: {0}")]
    SinkWrite(#[from] std::io::Error),
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        Self::SinkWrite(e.into())
    }
}

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("journal i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal encoding: {0}")]
    Codec(#[from] bincode::Error),

    #[error("CRC mismatch at frame {frame}: file={stored:#x}, calc={computed:#x}")]
    Crc { frame: usize, stored: u32, computed: u32 },

    #[error("journal does not start with a header frame")]
    MissingHeader,
}

/// Reasons a capture run ends in the aborted state.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("cannot connect to feed: {0}")]
    Connection(String),

    #[error("feed transport failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}
