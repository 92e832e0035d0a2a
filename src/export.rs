//! Fixed 40-column CSV export of a [`DepthBuffer`].
//!
//! Columns are `BidPrice1, BidVolume1, ..., BidPrice10, BidVolume10` followed
//! by the same twenty for asks. One row per buffer slot, gaps included.
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;

use crate::book::{DepthSnapshot, PriceLevel, DEPTH_LEVELS};
use crate::buffer::DepthBuffer;
use crate::error::ExportError;

pub const COLUMN_COUNT: usize = 4 * DEPTH_LEVELS;
pub const DEFAULT_PRECISION: usize = 2;

pub static COLUMNS: Lazy<Vec<String>> = Lazy::new(|| {
    let mut columns = vec![String::new(); COLUMN_COUNT];
    for i in 0..DEPTH_LEVELS {
        columns[2 * i] = format!("BidPrice{}", i + 1);
        columns[2 * i + 1] = format!("BidVolume{}", i + 1);
        columns[2 * DEPTH_LEVELS + 2 * i] = format!("AskPrice{}", i + 1);
        columns[2 * DEPTH_LEVELS + 2 * i + 1] = format!("AskVolume{}", i + 1);
    }
    columns
});

#[derive(Debug, Clone, Copy)]
pub struct TableExporter {
    precision: usize,
}

impl Default for TableExporter {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION)
    }
}

impl TableExporter {
    /// `precision` is the number of decimal digits written for every field.
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn export<W: Write>(&self, buffer: &DepthBuffer, sink: W) -> Result<(), ExportError> {
        let mut w = csv::Writer::from_writer(sink);
        w.write_record(COLUMNS.iter())?;
        let mut row = Vec::with_capacity(COLUMN_COUNT);
        for snapshot in buffer.rows() {
            row.clear();
            self.fill_row(&snapshot, &mut row);
            w.write_record(&row)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Write to `path`, creating parent directories and replacing any file there.
    pub fn export_to_path(&self, buffer: &DepthBuffer, path: &Path) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        self.export(buffer, BufWriter::with_capacity(1 << 20, file))?;
        tracing::info!(path = %path.display(), rows = buffer.capacity(), "table written");
        Ok(())
    }

    fn fill_row(&self, s: &DepthSnapshot, row: &mut Vec<String>) {
        for side in [&s.bids, &s.asks] {
            for level in side {
                row.push(format!("{:.*}", self.precision, level.price));
                row.push(format!("{:.*}", self.precision, level.volume));
            }
        }
    }
}

/// Read an exported table back into snapshots, one per data row.
pub fn read_table<R: Read>(reader: R) -> Result<Vec<DepthSnapshot>> {
    let mut r = csv::Reader::from_reader(reader);
    let headers = r.headers().context("read table header")?;
    if headers.iter().ne(COLUMNS.iter().map(String::as_str)) {
        bail!("unexpected table header: {:?}", headers);
    }
    let mut out = Vec::new();
    for (n, record) in r.records().enumerate() {
        let record = record.with_context(|| format!("read row {n}"))?;
        let field = |i: usize| -> Result<f32> {
            record[i].parse::<f32>().with_context(|| format!("row {n} column {}", COLUMNS[i]))
        };
        let mut snapshot = DepthSnapshot::default();
        for i in 0..DEPTH_LEVELS {
            snapshot.bids[i] = PriceLevel::new(field(2 * i)?, field(2 * i + 1)?);
            let a = 2 * DEPTH_LEVELS + 2 * i;
            snapshot.asks[i] = PriceLevel::new(field(a)?, field(a + 1)?);
        }
        out.push(snapshot);
    }
    Ok(out)
}
