//! Capture settings and output naming.
use std::path::PathBuf;
use std::time::Duration;

use time::macros::format_description;
use time::OffsetDateTime;

use crate::capture::{CaptureWindow, ParsePolicy};
use crate::export::DEFAULT_PRECISION;

pub const DEFAULT_SYMBOL: &str = "btcusdt";
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.us:9443/ws";
pub const DEFAULT_REST_URL: &str = "https://api.binance.us/api/v3/depth";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FeedMode {
    /// Websocket push subscription
    #[default]
    Stream,
    /// REST request once per poll interval
    Poll,
}

impl FeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Stream => "stream",
            FeedMode::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum WindowPreset {
    #[default]
    Day,
    Hour,
}

impl WindowPreset {
    pub fn duration(&self) -> Duration {
        match self {
            WindowPreset::Day => Duration::from_secs(24 * 60 * 60),
            WindowPreset::Hour => Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub symbol: String,
    pub mode: FeedMode,
    pub preset: WindowPreset,
    /// Overrides the preset's length when set.
    pub duration: Option<Duration>,
    pub precision: usize,
    pub policy: ParsePolicy,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub stream_url: String,
    pub rest_url: String,
    pub out: Option<PathBuf>,
    pub journal: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            mode: FeedMode::Stream,
            preset: WindowPreset::Day,
            duration: None,
            precision: DEFAULT_PRECISION,
            policy: ParsePolicy::Skip,
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
            out: None,
            journal: None,
        }
    }
}

impl CaptureConfig {
    /// Slots are one second wide in both modes.
    pub fn window(&self) -> CaptureWindow {
        CaptureWindow::new(self.duration.unwrap_or_else(|| self.preset.duration()), Duration::from_secs(1))
    }

    /// `--out` if given, otherwise `data/<symbol>_<date>[_<hour>].csv`.
    pub fn output_path(&self, started: OffsetDateTime) -> PathBuf {
        if let Some(p) = &self.out {
            return p.clone();
        }
        let stamp = match self.preset {
            WindowPreset::Day => started.format(format_description!("[year]-[month]-[day]")),
            WindowPreset::Hour => started.format(format_description!("[year]-[month]-[day]_[hour]")),
        }
        .unwrap_or_else(|_| started.unix_timestamp().to_string());
        PathBuf::from("data").join(format!("{}_{}.csv", self.symbol.to_lowercase(), stamp))
    }
}

/// Local wall-clock time, UTC when the local offset is unknown.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
