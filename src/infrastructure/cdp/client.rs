//! CDP client
//!
//! One WebSocket per browser. Responses are matched to requests by id;
//! events are fanned out on a broadcast channel and every attached page
//! filters them by its own session id.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use super::protocol::{CDPEvent, CDPMessage, CDPRequest, CDPResponse, RequestId, SessionId};
use crate::error::{Error, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const EVENT_BUFFER: usize = 1024;

pub struct CDPClient {
    next_id: AtomicU64,

    /// Requests waiting for a response, keyed by request id
    pending: Arc<DashMap<RequestId, oneshot::Sender<CDPResponse>>>,

    events: broadcast::Sender<CDPEvent>,

    ws_sink: Mutex<WsSink>,

    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CDPClient {
    /// Connect to a DevTools WebSocket endpoint.
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let pending: Arc<DashMap<RequestId, oneshot::Sender<CDPResponse>>> =
            Arc::new(DashMap::new());

        let reader = {
            let pending = Arc::clone(&pending);
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => dispatch(&text, &pending, &events),
                        Ok(Message::Close(_)) => {
                            debug!("DevTools connection closed by browser");
                            break;
                        }
                        Err(e) => {
                            error!("DevTools connection error: {}", e);
                            break;
                        }
                        Ok(_) => {}
                    }
                }
                // Dropping the senders fails every outstanding request.
                pending.clear();
            })
        };

        debug!("Connected to DevTools at {}", ws_url);
        Ok(Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending,
            events,
            ws_sink: Mutex::new(sink),
            reader: std::sync::Mutex::new(Some(reader)),
        }))
    }

    /// Send a command and wait for its result.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&SessionId>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CDPRequest {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.cloned(),
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        trace!("-> {}", json);
        let sent = self.ws_sink.lock().await.send(Message::Text(json)).await;
        if let Err(e) = sent {
            self.pending.remove(&id);
            return Err(e.into());
        }

        let response = rx
            .await
            .map_err(|_| Error::browser(format!("connection closed while waiting for {method}")))?;

        if let Some(error) = response.error {
            return Err(Error::Protocol {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// A receiver for every event sent after this call.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<CDPEvent> {
        self.events.subscribe()
    }

    pub async fn close(&self) -> Result<()> {
        self.ws_sink.lock().await.close().await?;
        Ok(())
    }
}

impl Drop for CDPClient {
    fn drop(&mut self) {
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

fn dispatch(
    text: &str,
    pending: &DashMap<RequestId, oneshot::Sender<CDPResponse>>,
    events: &broadcast::Sender<CDPEvent>,
) {
    trace!("<- {}", text);
    match serde_json::from_str::<CDPMessage>(text) {
        Ok(CDPMessage::Response(response)) => {
            if let Some((_, tx)) = pending.remove(&response.id) {
                let _ = tx.send(response);
            } else {
                warn!("Response for unknown request {}", response.id);
            }
        }
        Ok(CDPMessage::Event(event)) => {
            // No receivers is fine.
            let _ = events.send(event);
        }
        Err(e) => warn!("Unreadable DevTools message: {}", e),
    }
}
