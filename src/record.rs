//! Raw payload journal: on-disk schema and framing.
//!
//! A journal is a sequence of frames, each `[len:u32 LE][crc32:u32 LE][bincode]`.
//! The first frame is always a [`FileHeader`]; every following frame is one
//! [`EventRecord`] describing what the feed returned for one `next()` call.
//! A cleanly finished journal ends with a [`JournalTrailer`].
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use crate::error::JournalError;

pub const JOURNAL_VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: u16,
    pub created_unix_ns: u128,
    pub symbol: String,
    pub mode: String,
    pub window_secs: u64,
    pub unit_ms: u64,
}

impl FileHeader {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn unit(&self) -> Duration {
        Duration::from_millis(self.unit_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Payload(String),
    Transient(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub recv_unix_ns: u128,
    /// Time since the session was opened.
    pub elapsed_ns: u64,
    pub kind: EventKind,
}

impl EventRecord {
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns)
    }
}

/// Written when the recording session is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalTrailer {
    pub written: u64,
    /// Events whose frame could not be written.
    pub lost: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordFrame {
    Header(FileHeader),
    Event(EventRecord),
    Trailer(JournalTrailer),
}

/// A journal as read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Journal {
    pub header: FileHeader,
    pub events: Vec<EventRecord>,
    /// `None` when the recorder never finished the file.
    pub trailer: Option<JournalTrailer>,
}

impl Journal {
    /// True when the trailer is present and accounts for every event.
    pub fn is_complete(&self) -> bool {
        self.trailer
            .is_some_and(|t| t.lost == 0 && t.written == self.events.len() as u64)
    }
}

pub fn write_frame<W: Write>(w: &mut W, frame: &RecordFrame) -> Result<(), JournalError> {
    let payload = bincode::serialize(frame)?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let len = payload.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read the next frame, `None` at a clean end of file.
///
/// `frame` is only used to label CRC errors.
pub fn read_frame<R: Read>(r: &mut R, frame: usize) -> Result<Option<RecordFrame>, JournalError> {
    let len = match read_u32(r) {
        Ok(v) => v as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let stored = read_u32(r)?;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let computed = hasher.finalize();
    if computed != stored {
        return Err(JournalError::Crc { frame, stored, computed });
    }
    Ok(Some(bincode::deserialize(&payload)?))
}

/// Appends events to a journal file, flushing on drop.
pub struct JournalWriter {
    w: BufWriter<File>,
    seq: u64,
    lost: u64,
    finished: bool,
}

impl JournalWriter {
    pub fn create(path: &Path, header: FileHeader) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        let mut w = BufWriter::with_capacity(1 << 16, file);
        write_frame(&mut w, &RecordFrame::Header(header))?;
        Ok(Self { w, seq: 0, lost: 0, finished: false })
    }

    /// A failed append is counted as lost and reported in the trailer.
    pub fn append(&mut self, elapsed: Duration, kind: EventKind) -> Result<(), JournalError> {
        let ev = EventRecord {
            seq: self.seq,
            recv_unix_ns: now_unix_ns(),
            elapsed_ns: elapsed.as_nanos() as u64,
            kind,
        };
        self.seq += 1;
        write_frame(&mut self.w, &RecordFrame::Event(ev)).inspect_err(|_| self.lost += 1)
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn flush(&mut self) -> Result<(), JournalError> {
        self.w.flush()?;
        Ok(())
    }

    /// Write the trailer and flush. Later calls do nothing.
    pub fn finish(&mut self) -> Result<JournalTrailer, JournalError> {
        let trailer = JournalTrailer { written: self.seq - self.lost, lost: self.lost };
        if !self.finished {
            self.finished = true;
            write_frame(&mut self.w, &RecordFrame::Trailer(trailer))?;
            self.flush()?;
        }
        Ok(trailer)
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.w.flush() {
            tracing::warn!("journal flush failed: {e}");
        }
    }
}

/// Load a whole journal, checking every CRC.
pub fn read_journal(path: &Path) -> Result<Journal, JournalError> {
    let mut r = BufReader::new(File::open(path)?);
    let header = match read_frame(&mut r, 0)? {
        Some(RecordFrame::Header(h)) => h,
        _ => return Err(JournalError::MissingHeader),
    };
    let mut events = Vec::new();
    let mut trailer = None;
    let mut frame = 1;
    while let Some(fr) = read_frame(&mut r, frame)? {
        match fr {
            RecordFrame::Event(ev) => events.push(ev),
            RecordFrame::Trailer(t) => trailer = Some(t),
            RecordFrame::Header(_) => tracing::warn!(frame, "ignoring repeated header frame"),
        }
        frame += 1;
    }
    Ok(Journal { header, events, trailer })
}

pub fn now_unix_ns() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}
