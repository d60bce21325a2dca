//! obs-websocket (v5) binding of the [`Transport`] trait.
//!
//! Only the message framing lives here: the Hello/Identify handshake,
//! requests and batches matched to their responses by request id, and event
//! fan-out through a broadcast channel. Connection lifecycle policy belongs
//! to [`crate::connection::Connection`].

use crate::error::{Error, Result};
use crate::transport::{
    BatchRequest, IdentificationParams, ObsEvent, RequestResponse, RequestStatus, Transport,
    TransportEvent,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type PendingMap = Arc<StdMutex<HashMap<String, oneshot::Sender<Result<Value>>>>>;

/// Protocol opcodes
mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
    pub const REQUEST_BATCH: u8 = 8;
    pub const REQUEST_BATCH_RESPONSE: u8 = 9;
}

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    op: u8,
    d: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hello {
    obs_web_socket_version: Option<String>,
    rpc_version: u32,
    authentication: Option<AuthChallenge>,
}

#[derive(Debug, Deserialize)]
struct AuthChallenge {
    challenge: String,
    salt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Identify {
    rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    authentication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_subscriptions: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identified {
    negotiated_rpc_version: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestResponseFrame {
    request_id: String,
    request_status: RequestStatus,
    #[serde(default)]
    response_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponseFrame {
    request_id: String,
    #[serde(default)]
    results: Vec<Value>,
}

/// Compute the handshake authentication string for a password
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{}{}", password, salt).as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{}{}", secret, challenge).as_bytes()))
}

/// WebSocket transport speaking the obs-websocket v5 protocol
pub struct WsTransport {
    /// Write half of the current socket
    sink: Arc<Mutex<Option<WsSink>>>,

    /// Requests waiting for a response, by request id
    pending: PendingMap,

    /// Event fan-out
    events: broadcast::Sender<TransportEvent>,

    /// Identifies the current socket so a stale reader cannot clobber a newer one
    generation: Arc<AtomicU64>,

    /// Reader task of the current socket
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsTransport")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("pending", &lock(&self.pending).len())
            .finish()
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WsTransport {
    /// Create a disconnected transport
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sink: Arc::new(Mutex::new(None)),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            events,
            generation: Arc::new(AtomicU64::new(0)),
            reader: StdMutex::new(None),
        }
    }

    /// Close the current socket, if any
    pub async fn close(&self) -> Result<()> {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            sink.close().await?;
        }
        Ok(())
    }

    async fn send(&self, opcode: u8, d: Value) -> Result<()> {
        let text = serde_json::to_string(&Envelope { op: opcode, d })
            .map_err(|e| Error::Serialize(e.to_string()))?;
        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| Error::Connection("Not connected".to_string()))?;
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Send a request frame and wait for the matching response payload
    async fn request(&self, opcode: u8, mut d: Value) -> Result<Value> {
        let request_id = Uuid::new_v4().to_string();
        d["requestId"] = Value::String(request_id.clone());

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request_id.clone(), tx);

        if let Err(e) = self.send(opcode, d).await {
            lock(&self.pending).remove(&request_id);
            return Err(e);
        }

        rx.await
            .map_err(|_| Error::Connection("Connection closed before response".to_string()))?
    }

    fn spawn_reader(&self, stream: SplitStream<WsStream>, generation: u64) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let pending = Arc::clone(&self.pending);
        let events = self.events.clone();
        let current = Arc::clone(&self.generation);

        tokio::spawn(async move {
            read_loop(stream, &pending, &events).await;

            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            sink.lock().await.take();
            // Dropping the senders fails every outstanding request
            lock(&pending).clear();
            debug!("WebSocket connection closed");
            let _ = events.send(TransportEvent::ConnectionClosed);
        })
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        address: &str,
        password: Option<&str>,
        params: &IdentificationParams,
    ) -> Result<()> {
        debug!("Connecting to {}", address);
        let (ws, _) = connect_async(address).await?;
        let (mut sink, mut stream) = ws.split();

        let hello: Hello = read_op(&mut stream, op::HELLO).await?;
        trace!(
            "Hello from obs-websocket {:?} (rpc {})",
            hello.obs_web_socket_version,
            hello.rpc_version
        );

        let authentication = match (hello.authentication, password) {
            (Some(auth), Some(password)) => {
                Some(auth_response(password, &auth.salt, &auth.challenge))
            }
            (Some(_), None) => {
                return Err(Error::Config(
                    "Server requires a password but none was given".to_string(),
                ))
            }
            (None, _) => None,
        };

        let identify = Identify {
            rpc_version: params.rpc_version,
            authentication,
            event_subscriptions: params.event_subscriptions,
        };
        let text = serde_json::to_string(&Envelope {
            op: op::IDENTIFY,
            d: serde_json::to_value(&identify).map_err(|e| Error::Serialize(e.to_string()))?,
        })
        .map_err(|e| Error::Serialize(e.to_string()))?;
        sink.send(Message::Text(text.into())).await?;

        let identified: Identified = read_op(&mut stream, op::IDENTIFIED).await?;
        debug!(
            "Identified, negotiated rpc version {}",
            identified.negotiated_rpc_version
        );

        // Retire the previous socket before installing the new one
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        lock(&self.pending).clear();
        *self.sink.lock().await = Some(sink);
        *lock(&self.reader) = Some(self.spawn_reader(stream, generation));

        Ok(())
    }

    async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value> {
        trace!("Request {}", request_type);
        let mut d = json!({ "requestType": request_type });
        if let Some(data) = request_data {
            d["requestData"] = data;
        }
        self.request(op::REQUEST, d).await
    }

    async fn call_batch(&self, requests: Vec<BatchRequest>) -> Result<Vec<RequestResponse>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        trace!("Batch of {} requests", requests.len());
        let d = json!({
            "haltOnFailure": false,
            "executionType": 0,
            "requests": requests,
        });
        let results = self.request(op::REQUEST_BATCH, d).await?;
        Ok(serde_json::from_value(results)?)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read frames until one with the expected opcode arrives
async fn read_op<T: DeserializeOwned>(
    stream: &mut SplitStream<WsStream>,
    expected: u8,
) -> Result<T> {
    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => {
                let envelope: Envelope = serde_json::from_str(text.as_str())?;
                if envelope.op != expected {
                    return Err(Error::Protocol(format!(
                        "Expected opcode {}, got {}",
                        expected, envelope.op
                    )));
                }
                return Ok(serde_json::from_value(envelope.d)?);
            }
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} ({})", f.reason.as_str(), u16::from(f.code)))
                    .unwrap_or_else(|| "no reason".to_string());
                return Err(Error::Connection(format!(
                    "Connection closed during handshake: {}",
                    reason
                )));
            }
            _ => continue,
        }
    }
    Err(Error::Connection(
        "Connection closed during handshake".to_string(),
    ))
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: &PendingMap,
    events: &broadcast::Sender<TransportEvent>,
) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error: {}", e);
                let _ = events.send(TransportEvent::ConnectionError(Arc::new(e.into())));
                break;
            }
        };

        let envelope: Envelope = match serde_json::from_str(text.as_str()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                continue;
            }
        };

        if let Err(e) = dispatch(envelope, pending, events) {
            warn!("Error handling frame: {}", e);
        }
    }
}

fn dispatch(
    envelope: Envelope,
    pending: &PendingMap,
    events: &broadcast::Sender<TransportEvent>,
) -> Result<()> {
    match envelope.op {
        op::EVENT => {
            let event: ObsEvent = serde_json::from_value(envelope.d)?;
            trace!("Event {}", event.event_type);
            let _ = events.send(TransportEvent::Event(event));
        }
        op::REQUEST_RESPONSE => {
            let frame: RequestResponseFrame = serde_json::from_value(envelope.d)?;
            let result = if frame.request_status.result {
                Ok(frame.response_data.unwrap_or(Value::Null))
            } else {
                Err(frame.request_status.to_error())
            };
            if let Some(tx) = lock(pending).remove(&frame.request_id) {
                let _ = tx.send(result);
            }
        }
        op::REQUEST_BATCH_RESPONSE => {
            let frame: BatchResponseFrame = serde_json::from_value(envelope.d)?;
            if let Some(tx) = lock(pending).remove(&frame.request_id) {
                let _ = tx.send(Ok(Value::Array(frame.results)));
            }
        }
        other => debug!("Unhandled opcode: {}", other),
    }
    Ok(())
}
