//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::protocol::ConferenceEvent;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Sink;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Failure reported by the underlying duplex channel
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("conference server unavailable: {0}")]
    Unavailable(String),
    #[error("connection already closed")]
    Closed,
    #[error("{0}")]
    Protocol(String),
}

/// Outbound half of a connection: accepts JSON text frames
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a connection: yields JSON text frames until the peer closes
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// An established duplex connection
pub struct Duplex {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens duplex connections to the conference server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url`, resolving once the connection is open
    async fn connect(&self, url: &str) -> Result<Duplex, TransportError>;
}

/// Per-pattern, append-only event logs
pub trait MessageLog: Send + Sync {
    /// Append an event to a pattern's log
    fn append(&self, pattern: &str, event: ConferenceEvent);

    /// Snapshot of a pattern's log, empty if it was never written
    fn messages(&self, pattern: &str) -> Vec<ConferenceEvent>;

    fn clear(&self, pattern: &str);

    fn clear_all(&self);

    /// Patterns that currently have a log
    fn patterns(&self) -> Vec<String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn connect(&self, url: &str) -> Result<Duplex, TransportError> {
        (**self).connect(url).await
    }
}

impl<T: MessageLog + ?Sized> MessageLog for Arc<T> {
    fn append(&self, pattern: &str, event: ConferenceEvent) {
        (**self).append(pattern, event);
    }

    fn messages(&self, pattern: &str) -> Vec<ConferenceEvent> {
        (**self).messages(pattern)
    }

    fn clear(&self, pattern: &str) {
        (**self).clear(pattern);
    }

    fn clear_all(&self) {
        (**self).clear_all();
    }

    fn patterns(&self) -> Vec<String> {
        (**self).patterns()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

impl TransportError {
    /// Refused/reset connections mean the server is not there; everything else
    /// is a protocol-level failure
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        match &err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            tungstenite::Error::Io(io_err)
                if matches!(
                    io_err.kind(),
                    std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                ) =>
            {
                TransportError::Unavailable(err.to_string())
            }
            _ => TransportError::Protocol(err.to_string()),
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        Self::from_tungstenite(err)
    }
}

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Duplex, TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(TransportError::from)
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::text(text))));

        // A close frame ends the stream; pings, pongs and binary frames are not events
        let stream = read
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::from(e))),
                })
            });

        Ok(Duplex {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}

/// In-process message logs
#[derive(Debug, Default)]
pub struct InMemoryLog {
    logs: RwLock<HashMap<String, Vec<ConferenceEvent>>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageLog for InMemoryLog {
    fn append(&self, pattern: &str, event: ConferenceEvent) {
        self.logs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(pattern.to_string())
            .or_default()
            .push(event);
    }

    fn messages(&self, pattern: &str) -> Vec<ConferenceEvent> {
        self.logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
            .cloned()
            .unwrap_or_default()
    }

    fn clear(&self, pattern: &str) {
        self.logs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), Vec::new());
    }

    fn clear_all(&self) {
        self.logs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self
            .logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        patterns.sort();
        patterns
    }
}
