//! Event feed over a long-lived HTTP GET

use std::io::{BufRead, BufReader};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{EventFeed, Transport};
use crate::config::{AuthConfig, ConnectionConfig};
use crate::error::TransportError;
use crate::stream::{FeedFormat, decode_feed};

/// Lines buffered between the reader thread and the driver
const FEED_CHANNEL_CAPACITY: usize = 256;

/// Reads an SSE or NDJSON body with `ureq` on a blocking thread.
/// Lines are handed to the async side and decoded there.
pub struct HttpTransport {
    url: String,
    format: FeedFormat,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, format: FeedFormat) -> Self {
        Self {
            url: url.into(),
            format,
            token: None,
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    /// Build from the `[connection]` and `[auth]` sections.
    /// Returns `None` when no feed URL is configured.
    pub fn from_config(connection: &ConnectionConfig, auth: &AuthConfig) -> Option<Self> {
        let url = connection.url.clone()?;

        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(connection.connect_timeout_ms));
        if connection.read_timeout_ms > 0 {
            builder = builder.timeout_read(Duration::from_millis(connection.read_timeout_ms));
        }

        Some(Self {
            url,
            format: connection.format,
            token: auth.token(),
            agent: builder.build(),
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self) -> Result<EventFeed, TransportError> {
        let mut request = self
            .agent
            .get(&self.url)
            .set("Accept", self.format.accept());
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }

        let format = self.format;
        let (open_tx, open_rx) = oneshot::channel();
        let (line_tx, line_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);

        tokio::task::spawn_blocking(move || {
            let response = match request.call() {
                Ok(response) => response,
                Err(ureq::Error::Status(401 | 403, _)) => {
                    let _ = open_tx.send(Err(TransportError::Unauthorized));
                    return;
                }
                Err(ureq::Error::Status(code, _)) => {
                    let _ = open_tx.send(Err(TransportError::Status(code)));
                    return;
                }
                Err(e) => {
                    let _ = open_tx.send(Err(TransportError::Http(e.to_string())));
                    return;
                }
            };
            if open_tx.send(Ok(())).is_err() {
                return;
            }

            let mut reader = BufReader::new(response.into_reader());
            loop {
                let mut line = Vec::new();
                let item = match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => Ok(line),
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                // Receiver gone: the driver closed the feed
                if line_tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        });

        open_rx.await.map_err(|_| TransportError::Closed)??;

        let lines = futures::stream::unfold(line_rx, |mut rx| async move {
            rx.recv().await.map(|line| (line, rx))
        });
        Ok(decode_feed(lines, format))
    }

    fn describe(&self) -> String {
        format!("{} ({:?})", self.url, self.format)
    }
}
