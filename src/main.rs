use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use depth_recorder::capture::{CaptureLoop, MonotonicClock, ParsePolicy};
use depth_recorder::config::{self, CaptureConfig, FeedMode, WindowPreset};
use depth_recorder::error::CaptureError;
use depth_recorder::export::TableExporter;
use depth_recorder::record::{now_unix_ns, FileHeader, JournalWriter, JOURNAL_VERSION};
use depth_recorder::source::poll::PollSource;
use depth_recorder::source::replay::RecordingSource;
use depth_recorder::source::stream::StreamSource;
use depth_recorder::source::SnapshotSource;

#[derive(Debug, Parser)]
#[command(version, about = "Top-10 order book depth recorder")]
struct Args {
    /// Trading pair (e.g., btcusdt)
    #[arg(long, env = "SYMBOL", default_value = config::DEFAULT_SYMBOL)]
    symbol: String,

    /// How snapshots are obtained
    #[arg(long, env = "FEED_MODE", value_enum, default_value_t = FeedMode::Stream)]
    mode: FeedMode,

    /// Capture window length
    #[arg(long, env = "WINDOW", value_enum, default_value_t = WindowPreset::Day)]
    window: WindowPreset,

    /// Explicit window length in seconds; overrides --window
    #[arg(long, env = "DURATION_SECS")]
    duration_secs: Option<u64>,

    /// Decimal digits written per numeric field
    #[arg(long, env = "PRECISION", default_value_t = 2)]
    precision: usize,

    /// What to do with a payload that fails to parse
    #[arg(long, value_enum, default_value_t = ParsePolicy::Skip)]
    on_parse_error: ParsePolicy,

    /// Poll interval in milliseconds (poll mode)
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Give up on a stalled read or request after this many seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Websocket base URL (stream mode)
    #[arg(long, env = "STREAM_URL", default_value = config::DEFAULT_STREAM_URL)]
    stream_url: String,

    /// REST depth endpoint (poll mode)
    #[arg(long, env = "REST_URL", default_value = config::DEFAULT_REST_URL)]
    rest_url: String,

    /// Output CSV path; defaults to data/SYMBOL_YYYY-MM-DD[_HH].csv
    #[arg(long, env = "OUT_FILE")]
    out: Option<PathBuf>,

    /// Also journal every raw payload here for later replay
    #[arg(long, env = "JOURNAL_FILE")]
    journal: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> CaptureConfig {
        CaptureConfig {
            symbol: self.symbol,
            mode: self.mode,
            preset: self.window,
            duration: self.duration_secs.map(Duration::from_secs),
            precision: self.precision,
            policy: self.on_parse_error,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            stream_url: self.stream_url,
            rest_url: self.rest_url,
            out: self.out,
            journal: self.journal,
        }
    }
}

fn connect(cfg: &CaptureConfig) -> Result<Box<dyn SnapshotSource>, CaptureError> {
    let source: Box<dyn SnapshotSource> = match cfg.mode {
        FeedMode::Stream => {
            let url = StreamSource::endpoint(&cfg.stream_url, &cfg.symbol)?;
            Box::new(StreamSource::connect(&url, cfg.timeout)?)
        }
        FeedMode::Poll => {
            let url = PollSource::endpoint(&cfg.rest_url, &cfg.symbol)?;
            Box::new(PollSource::connect(url, cfg.poll_interval, cfg.timeout)?)
        }
    };
    let Some(path) = &cfg.journal else {
        return Ok(source);
    };
    let window = cfg.window();
    let header = FileHeader {
        version: JOURNAL_VERSION,
        created_unix_ns: now_unix_ns(),
        symbol: cfg.symbol.to_lowercase(),
        mode: cfg.mode.as_str().to_string(),
        window_secs: window.duration.as_secs(),
        unit_ms: window.unit.as_millis() as u64,
    };
    let journal = JournalWriter::create(path, header)?;
    tracing::info!(path = %path.display(), "journaling raw payloads");
    Ok(Box::new(RecordingSource::new(source, journal)))
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = Args::parse().into_config();
    let out_path = cfg.output_path(config::local_now());
    tracing::info!(symbol = %cfg.symbol, mode = cfg.mode.as_str(), out = %out_path.display(), "depth recorder starting");

    let mut capture = CaptureLoop::new(cfg.window(), cfg.policy, MonotonicClock::new());
    // Ctrl+C drains and exports what was captured so far
    let (stop_tx, stop_rx) = bounded::<()>(1);
    match ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    }) {
        Ok(()) => capture = capture.with_stop_signal(stop_rx),
        Err(e) => tracing::warn!("Ctrl+C handler not installed: {e}"),
    }

    let report = capture.run(|| connect(&cfg)).context("depth capture")?;

    TableExporter::new(cfg.precision)
        .export_to_path(&report.buffer, &out_path)
        .with_context(|| format!("write {}", out_path.display()))?;
    Ok(())
}
