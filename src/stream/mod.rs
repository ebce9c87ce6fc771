//! Event feed decoding.
//!
//! Turns raw feed lines (HTTP body, recorded file) into [`AgentEnvelope`]s.
//! Two framings are supported: newline-delimited JSON and server-sent events.
//! SSE framing is handled by `eventsource-stream`. Every line is checked for
//! valid UTF-8 before it reaches either framing.

use std::io;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::domain::AgentEnvelope;
use crate::error::StreamError;

/// One decoded record, or the reason it was skipped
pub type FeedItem = Result<AgentEnvelope, StreamError>;

/// Framing of the event feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    /// One JSON object per line
    Ndjson,
    /// `text/event-stream`, one JSON object per `data:` record
    #[default]
    Sse,
}

impl FeedFormat {
    /// Value for the HTTP `Accept` header
    pub fn accept(&self) -> &'static str {
        match self {
            FeedFormat::Ndjson => "application/x-ndjson",
            FeedFormat::Sse => "text/event-stream",
        }
    }
}

impl std::str::FromStr for FeedFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(FeedFormat::Ndjson),
            "sse" => Ok(FeedFormat::Sse),
            other => Err(format!("Unknown feed format: {}", other)),
        }
    }
}

/// Split an async reader into raw lines, terminators included.
/// The stream ends after the first I/O error.
pub fn read_lines<R>(reader: R) -> BoxStream<'static, io::Result<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    stream::unfold(Some(reader), |reader| async move {
        let mut reader = reader?;
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(line), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// Decode a stream of raw lines.
///
/// A malformed record (bad JSON or invalid UTF-8) yields one `Err` and
/// decoding resumes at the next record. An I/O error is passed through; the
/// feed ends when `lines` does.
pub fn decode_feed<S>(lines: S, format: FeedFormat) -> BoxStream<'static, FeedItem>
where
    S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
{
    let text = lines.map(|line| match line {
        Ok(bytes) => line_to_text(bytes),
        Err(e) => Err(StreamError::Io(e)),
    });

    match format {
        FeedFormat::Ndjson => decode_ndjson(text).boxed(),
        FeedFormat::Sse => decode_sse(text).boxed(),
    }
}

fn line_to_text(bytes: Vec<u8>) -> Result<String, StreamError> {
    String::from_utf8(bytes).map_err(|e| StreamError::Decode {
        message: e.utf8_error().to_string(),
        record: String::from_utf8_lossy(e.as_bytes()).trim().to_string(),
    })
}

fn decode_ndjson<S>(text: S) -> impl Stream<Item = FeedItem>
where
    S: Stream<Item = Result<String, StreamError>>,
{
    text.filter_map(|line| async move {
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(decode_record(trimmed, None))
                }
            }
            Err(e) => Some(Err(e)),
        }
    })
}

fn decode_sse<S>(text: S) -> impl Stream<Item = FeedItem>
where
    S: Stream<Item = Result<String, StreamError>>,
{
    // The framer repeats the last seen id on records that carry none.
    // Only an id that changed belongs to the record itself.
    let mut last_id = String::new();

    text.eventsource().map(move |item| match item {
        Ok(event) => {
            let own_id = (event.id != last_id).then_some(event.id.as_str());
            let decoded = decode_record(&event.data, own_id);
            last_id = event.id;
            decoded
        }
        Err(EventStreamError::Transport(e)) => Err(e),
        Err(e) => Err(StreamError::Decode {
            message: e.to_string(),
            record: String::new(),
        }),
    })
}

/// Decode one JSON record. A numeric transport-level id fills a missing `seq`.
pub fn decode_record(record: &str, id: Option<&str>) -> Result<AgentEnvelope, StreamError> {
    let mut envelope: AgentEnvelope =
        serde_json::from_str(record).map_err(|e| StreamError::Decode {
            message: e.to_string(),
            record: record.to_string(),
        })?;

    if envelope.seq.is_none() {
        envelope.seq = id.and_then(|id| id.trim().parse::<u64>().ok());
    }
    Ok(envelope)
}
