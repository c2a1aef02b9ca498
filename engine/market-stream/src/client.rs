//! Reconnecting market channel subscription

use crate::config::StreamConfig;
use crate::frames::{decode_frame, InboundFrame};
use futures_util::{SinkExt, Stream, StreamExt};
use metrics::increment_counter;
use portfolio_types::{
    EngineError, EngineResult, ExecutionEvent, InstrumentId, LogicalTimestamp, PriceTick,
};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Events produced by a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The channel is (re)established; `attempt` is 0 for the first connect
    Connected { attempt: u32 },
    /// All ticks of one update frame
    Prices(Vec<PriceTick>),
    Execution(ExecutionEvent),
    /// Execution without an id; holdings changed but the delta is unknown
    UnidentifiedExecution { instrument_id: Option<InstrumentId> },
}

/// Factory for subscriptions to one user's market channel
pub struct StreamClient {
    config: StreamConfig,
    endpoint: Url,
    handshake: String,
    sequence: Arc<AtomicU64>,
}

impl StreamClient {
    pub fn new(config: StreamConfig, user_id: &str) -> EngineResult<Self> {
        let mut endpoint = Url::parse(&config.url)
            .map_err(|e| EngineError::Config(format!("invalid stream url {}: {}", config.url, e)))?;
        endpoint.query_pairs_mut().append_pair("user_id", user_id);

        let handshake = serde_json::json!({ "type": "subscribe", "user_id": user_id }).to_string();

        Ok(Self { config, endpoint, handshake, sequence: Arc::new(AtomicU64::new(0)) })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Start a background connection and return the event sequence
    ///
    /// The subscription reconnects on its own until it is closed or dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, events) = mpsc::channel(self.config.channel_capacity.max(1));
        let task = tokio::spawn(run_subscription(
            self.endpoint.clone(),
            self.handshake.clone(),
            self.config.clone(),
            self.sequence.clone(),
            tx,
        ));
        Subscription { events, task }
    }
}

/// Lazy, restartable sequence of market events
pub struct Subscription {
    events: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Next event, or `None` once the subscription was closed
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Tear down the connection; buffered events can still be drained
    pub fn close(&mut self) {
        self.task.abort();
    }
}

impl Stream for Subscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Disconnect {
    /// The consumer dropped the subscription
    ConsumerGone,
    Lost(String),
}

async fn run_subscription(
    endpoint: Url,
    handshake: String,
    config: StreamConfig,
    sequence: Arc<AtomicU64>,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut backoff = config.initial_backoff();
    let mut attempt: u32 = 0;

    loop {
        info!(
            target: "market_stream",
            "Connecting to {}{} (attempt {})",
            endpoint.host_str().unwrap_or_default(),
            endpoint.path(),
            attempt
        );

        match connect_async(endpoint.as_str()).await {
            Ok((mut socket, _)) => {
                backoff = config.initial_backoff();
                match socket.send(Message::Text(handshake.clone())).await {
                    Ok(()) => {
                        info!(target: "market_stream", "Connected and subscribed");
                        if tx.send(StreamEvent::Connected { attempt }).await.is_err() {
                            return;
                        }
                        match pump(&mut socket, &config, &sequence, &tx).await {
                            Disconnect::ConsumerGone => {
                                let _ = socket.close(None).await;
                                return;
                            }
                            Disconnect::Lost(reason) => {
                                warn!(target: "market_stream", "Connection lost: {}", reason);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(target: "market_stream", "Subscribe handshake failed: {}", e);
                    }
                }
            }
            Err(e) => {
                warn!(target: "market_stream", "Connect failed: {}", e);
            }
        }

        if tx.is_closed() {
            return;
        }
        attempt = attempt.saturating_add(1);
        increment_counter!("market_stream_reconnects_total");
        info!(target: "market_stream", "Reconnecting in {:?}", backoff);
        sleep(backoff).await;
        backoff = (backoff * 2).min(config.max_backoff());
    }
}

async fn pump(
    socket: &mut Socket,
    config: &StreamConfig,
    sequence: &AtomicU64,
    tx: &mpsc::Sender<StreamEvent>,
) -> Disconnect {
    let heartbeat = config.heartbeat_interval();
    let mut ticker = interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if last_pong.elapsed() > config.pong_timeout() {
                    return Disconnect::Lost("pong timeout".into());
                }
                if let Err(e) = socket.send(Message::Ping(Vec::new())).await {
                    return Disconnect::Lost(format!("ping failed: {}", e));
                }
            }
            _ = tx.closed() => return Disconnect::ConsumerGone,
            msg = socket.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            increment_counter!("market_stream_decode_failures_total");
                            warn!(target: "market_stream", "Dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = socket.send(Message::Pong(payload)).await;
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        continue;
                    }
                    Some(Ok(Message::Close(_))) => return Disconnect::Lost("server closed".into()),
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Err(e)) => return Disconnect::Lost(e.to_string()),
                    None => return Disconnect::Lost("stream ended".into()),
                };

                let observed_at = LogicalTimestamp(sequence.fetch_add(1, Ordering::Relaxed) + 1);
                if !forward(&text, observed_at, tx).await {
                    return Disconnect::ConsumerGone;
                }
            }
        }
    }
}

/// Decode one frame and hand its events to the consumer. False when the
/// consumer is gone.
async fn forward(text: &str, observed_at: LogicalTimestamp, tx: &mpsc::Sender<StreamEvent>) -> bool {
    match decode_frame(text, observed_at) {
        Ok(InboundFrame::PriceUpdate(ticks)) => {
            if !ticks.is_empty() && tx.send(StreamEvent::Prices(ticks)).await.is_err() {
                return false;
            }
        }
        Ok(InboundFrame::Execution(event)) => {
            debug!(target: "market_stream", "Execution {} received", event.execution_id);
            if tx.send(StreamEvent::Execution(event)).await.is_err() {
                return false;
            }
        }
        Ok(InboundFrame::UnidentifiedExecution { instrument_id }) => {
            debug!(target: "market_stream", "Execution without id received for {:?}", instrument_id);
            if tx.send(StreamEvent::UnidentifiedExecution { instrument_id }).await.is_err() {
                return false;
            }
        }
        Ok(InboundFrame::Unknown(tag)) => {
            debug!(target: "market_stream", "Ignoring frame with type {:?}", tag);
        }
        Err(e) => {
            increment_counter!("market_stream_decode_failures_total");
            let sample: String = text.chars().take(200).collect();
            warn!(target: "market_stream", "Dropping undecodable frame ({}): {}", e, sample);
        }
    }
    true
}
