//! Connection pump
//!
//! Each connection runs in its own task. The task never touches session
//! state: it turns transport activity into epoch-tagged events on the
//! runtime's inbox and writes whatever the runtime hands it.

use super::traits::{Duplex, Transport, TransportError};
use super::Inbound;
use crate::session::{Epoch, Event};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runtime-side handle to a spawned connection task
#[derive(Debug)]
pub struct ConnectionHandle {
    epoch: Epoch,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Spawn a task that connects to `url` and pumps frames for `epoch`
    pub fn spawn<T>(transport: Arc<T>, url: String, epoch: Epoch, inbox: mpsc::Sender<Inbound>) -> Self
    where
        T: Transport + ?Sized + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            pump(transport.as_ref(), &url, epoch, &inbox, outbound_rx, task_cancel).await;
            // Every connection reports closure exactly once
            let _ = inbox.send(Event::ConnectionClosed { epoch }.into()).await;
        });

        Self {
            epoch,
            outbound,
            cancel,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Queue a text frame for sending
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound.send(text).map_err(|_| TransportError::Closed)
    }

    /// Request closure without waiting for it
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn pump<T>(
    transport: &T,
    url: &str,
    epoch: Epoch,
    inbox: &mpsc::Sender<Inbound>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) where
    T: Transport + ?Sized,
{
    tracing::info!(epoch, endpoint = %url, "Connecting");

    let connected = tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!(epoch, "Connection cancelled before open");
            return;
        }
        result = transport.connect(url) => result,
    };

    let Duplex {
        mut sink,
        mut stream,
    } = match connected {
        Ok(duplex) => duplex,
        Err(e) => {
            tracing::error!(epoch, endpoint = %url, error = %e, "Connection failed");
            report_failure(inbox, epoch, &e).await;
            return;
        }
    };

    tracing::info!(epoch, "Connection open");
    if inbox.send(Event::ConnectionOpened { epoch }.into()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::info!(epoch, "Closing connection");
                if let Err(e) = sink.close().await {
                    tracing::debug!(epoch, error = %e, "Close handshake failed");
                }
                break;
            }

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = sink.send(text).await {
                    tracing::error!(epoch, error = %e, "Send failed");
                    report_failure(inbox, epoch, &e).await;
                    break;
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    if inbox.send(Event::FrameReceived { epoch, text }.into()).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(epoch, error = %e, "Connection error");
                    report_failure(inbox, epoch, &e).await;
                    break;
                }
                None => {
                    tracing::info!(epoch, "Connection closed by server");
                    break;
                }
            },
        }
    }
}

async fn report_failure(inbox: &mpsc::Sender<Inbound>, epoch: Epoch, error: &TransportError) {
    let _ = inbox
        .send(
            Event::TransportFailed {
                epoch,
                description: error.to_string(),
            }
            .into(),
        )
        .await;
}
