use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use depth_recorder::capture::{CaptureLoop, CaptureWindow, ParsePolicy, ReplayClock};
use depth_recorder::error::CaptureError;
use depth_recorder::export::TableExporter;
use depth_recorder::source::replay::ReplaySource;

#[derive(Debug, Parser)]
#[command(about = "Replay a raw depth journal and rebuild its CSV table")]
struct Args {
    /// Journal recorded with --journal
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Output CSV path; defaults to the input path with a .csv extension
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,

    /// Decimal digits written per numeric field
    #[arg(long, default_value_t = 2)]
    precision: usize,

    /// What to do with a payload that fails to parse
    #[arg(long, value_enum, default_value_t = ParsePolicy::Skip)]
    on_parse_error: ParsePolicy,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let clock = ReplayClock::default();
    let (journal, source) =
        ReplaySource::open(&args.input, clock.clone()).with_context(|| format!("open {:?}", args.input))?;
    let header = &journal.header;
    eprintln!(
        "Journal: v{} {} ({}) window={}s created={}ns",
        header.version, header.symbol, header.mode, header.window_secs, header.created_unix_ns
    );
    match journal.trailer {
        None => eprintln!("WARNING: journal has no trailer; the recorder did not finish it."),
        Some(t) if t.lost > 0 => eprintln!("WARNING: journal is incomplete: {} events lost while recording.", t.lost),
        Some(t) if t.written != source.remaining() as u64 => eprintln!(
            "WARNING: journal trailer lists {} events but {} were read.",
            t.written,
            source.remaining()
        ),
        Some(_) => {}
    }

    let window = CaptureWindow::new(header.window(), header.unit());
    let report = CaptureLoop::new(window, args.on_parse_error, clock)
        .run(|| Ok::<_, CaptureError>(source))
        .context("replay")?;

    let out = args.out.unwrap_or_else(|| args.input.with_extension("csv"));
    TableExporter::new(args.precision)
        .export_to_path(&report.buffer, &out)
        .with_context(|| format!("write {}", out.display()))?;
    eprintln!(
        "Replayed {} payloads into {} of {} rows ({:?}).",
        report.stats.received,
        report.buffer.snapshot_count(),
        report.buffer.capacity(),
        report.end
    );
    Ok(())
}
