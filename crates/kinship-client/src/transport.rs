//! WebSocket transport: one writer task draining outbound client events
//! and one reader task decoding server frames.

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use kinship_core::{ClientEvent, ServerEvent};

use crate::error::{ClientError, Result};

const CHANNEL_CAPACITY: usize = 64;

pub struct ChatSocket {
    outbound: mpsc::Sender<ClientEvent>,
    inbound: mpsc::Receiver<ServerEvent>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// `{ws_base}/ws?token=<token>` with the token percent-encoded.
fn socket_url(ws_base: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/ws", ws_base.trim_end_matches('/')))
        .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

impl ChatSocket {
    /// Connect to `{ws_base}/ws` authenticating with `token`.
    /// `ws_base` is e.g. `ws://127.0.0.1:8080`.
    pub async fn connect(ws_base: &str, token: &str) -> Result<Self> {
        let url = socket_url(ws_base, token)?;
        let (stream, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<ClientEvent>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<ServerEvent>(CHANNEL_CAPACITY);

        let writer = tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                let frame = match event.to_frame() {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(event = event.name(), error = %e, "failed to encode client event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::text(frame)).await {
                    debug!(error = %e, "socket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match ServerEvent::from_frame(&text) {
                        Ok(event) => {
                            if in_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping malformed server frame"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "socket read failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound: out_tx,
            inbound: in_rx,
            writer,
            reader,
        })
    }

    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound.send(event).await.map_err(|_| ClientError::Closed)
    }

    /// Next server event, or `None` once the connection is gone. A `None`
    /// means the caller should reconnect and rebuild from a fresh snapshot.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.inbound.recv().await
    }

    pub fn close(self) {
        drop(self.outbound);
        self.reader.abort();
        // Writer exits once the outbound channel is drained and closes the sink.
        drop(self.writer);
    }
}
