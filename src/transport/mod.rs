//! Event feed transports and the connection driver that runs them.

mod driver;
mod http;

pub use driver::{ConnectionDriver, ConnectionHandle};
pub use http::HttpTransport;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::AgentEnvelope;
use crate::error::{StreamError, TransportError};

/// Decoded events of one open feed. The stream ends when the feed does.
pub type EventFeed = BoxStream<'static, Result<AgentEnvelope, StreamError>>;

/// Something that can open an agent event feed
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the feed. `TransportError::Unauthorized` is not retried.
    async fn open(&self) -> Result<EventFeed, TransportError>;

    /// Short description for logs
    fn describe(&self) -> String;
}
