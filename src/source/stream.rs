//! Websocket depth subscription (`<symbol>@depth10`).
use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;

use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::{RawPayload, SnapshotSource};
use crate::book::DEPTH_LEVELS;
use crate::error::{CaptureError, SourceError};

pub struct StreamSource {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl StreamSource {
    /// Stream endpoint for `symbol`, e.g. `<base>/btcusdt@depth10`.
    pub fn endpoint(base: &str, symbol: &str) -> Result<Url, CaptureError> {
        let url = format!(
            "{}/{}@depth{}",
            base.trim_end_matches('/'),
            symbol.to_lowercase(),
            DEPTH_LEVELS
        );
        Url::parse(&url).map_err(|e| CaptureError::Connection(format!("bad stream url {url}: {e}")))
    }

    /// Open the subscription. A read that waits longer than `timeout` fails
    /// the capture as stalled.
    pub fn connect(url: &Url, timeout: Duration) -> Result<Self, CaptureError> {
        tracing::info!(%url, "connecting to depth stream");
        let (socket, response) = tungstenite::connect(url.as_str())
            .map_err(|e| CaptureError::Connection(format!("{url}: {e}")))?;
        tracing::debug!(status = %response.status(), "stream handshake complete");

        let tcp = match socket.get_ref() {
            MaybeTlsStream::Plain(s) => Some(s),
            MaybeTlsStream::NativeTls(s) => Some(s.get_ref()),
            _ => None,
        };
        if let Some(tcp) = tcp {
            tcp.set_read_timeout(Some(timeout))
                .map_err(|e| CaptureError::Connection(format!("set read timeout: {e}")))?;
        }
        Ok(Self { socket })
    }
}

impl SnapshotSource for StreamSource {
    fn next(&mut self) -> Result<RawPayload, SourceError> {
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => return Ok(text),
                Ok(Message::Binary(bytes)) => {
                    return String::from_utf8(bytes)
                        .map_err(|e| SourceError::Transport(format!("non-utf8 binary frame: {e}")));
                }
                Ok(Message::Close(Some(f))) if f.code != CloseCode::Normal => {
                    return Err(SourceError::Transport(format!("closed with {}: {}", f.code, f.reason)));
                }
                Ok(Message::Close(_)) => return Err(SourceError::Closed),
                // pings are answered by tungstenite on the next read
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(SourceError::Closed);
                }
                Err(tungstenite::Error::Io(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(SourceError::Transport("stream read stalled".into()));
                }
                Err(e) => return Err(SourceError::Transport(e.to_string())),
            }
        }
    }

    fn release(&mut self) {
        if let Err(e) = self.socket.close(None) {
            tracing::debug!("close handshake: {e}");
        }
        let _ = self.socket.flush();
        tracing::info!("depth stream released");
    }
}
