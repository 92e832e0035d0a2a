//! REST depth polling on a fixed interval.
use std::time::{Duration, Instant};

use crossbeam_channel::{tick, Receiver};
use reqwest::blocking::Client;
use url::Url;

use super::{RawPayload, SnapshotSource};
use crate::book::DEPTH_LEVELS;
use crate::error::{CaptureError, SourceError};

pub struct PollSource {
    client: Client,
    url: Url,
    ticker: Receiver<Instant>,
}

impl PollSource {
    /// Depth endpoint for `symbol`, e.g. `<base>?symbol=BTCUSDT&limit=10`.
    pub fn endpoint(base: &str, symbol: &str) -> Result<Url, CaptureError> {
        let limit = DEPTH_LEVELS.to_string();
        Url::parse_with_params(base, &[("symbol", symbol.to_uppercase().as_str()), ("limit", limit.as_str())])
            .map_err(|e| CaptureError::Connection(format!("bad rest url {base}: {e}")))
    }

    /// Build the client and probe the endpoint once; a failed probe means
    /// there is nothing to capture from.
    pub fn connect(url: Url, interval: Duration, timeout: Duration) -> Result<Self, CaptureError> {
        tracing::info!(%url, ?interval, "polling depth endpoint");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptureError::Connection(e.to_string()))?;
        let source = Self { client, url, ticker: tick(interval) };
        source.fetch().map_err(|e| CaptureError::Connection(format!("probe failed: {e}")))?;
        Ok(source)
    }

    fn fetch(&self) -> Result<RawPayload, SourceError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| SourceError::Transient(e.to_string()))?;
        response.text().map_err(|e| SourceError::Transient(e.to_string()))
    }
}

impl SnapshotSource for PollSource {
    fn next(&mut self) -> Result<RawPayload, SourceError> {
        self.ticker
            .recv()
            .map_err(|_| SourceError::Transport("poll ticker stopped".into()))?;
        self.fetch()
    }

    fn release(&mut self) {
        tracing::info!("depth polling released");
    }
}
