//! WebSocket JSON-RPC provider.
//!
//! One connection per provider, owned by two background tasks:
//!
//! - the **send pump** is the only writer. It drains the outbound queue and
//!   sends a keepalive ping every `keepalive_interval`, bounding each write
//!   by `write_timeout`;
//! - the **receive pump** is the only reader. It routes responses to their
//!   waiting caller by id and notifications to their subscription sink.
//!
//! Any fatal I/O error, or [`Provider::stop`], tears the connection down
//! exactly once: every waiting call fails with
//! [`TransportError::ConnectionClosed`], every subscription sink is closed
//! and the provider never reconnects.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use ethwire_core::codec::{self, Envelope, JsonRpcRequest, MessageKind, RpcParam, SubscriptionId};
use ethwire_core::config::WsConfig;
use ethwire_core::error::TransportError;
use ethwire_core::methods::{unsubscribe_method, SUBSCRIPTION_SUFFIX};
use ethwire_core::policy::{RateLimiterConfig, TokenBucket};
use ethwire_core::provider::{NotificationSink, Provider};

use crate::pending::{PendingCalls, PendingSubscription};
use crate::subscriptions::{Delivery, SubscriptionManager};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DISCONNECTED: u8 = 0;
const CONNECTED: u8 = 1;
const DEAD: u8 = 2;

/// Lifecycle of a [`WsProvider`]. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Dead,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            DISCONNECTED => Self::Disconnected,
            CONNECTED => Self::Connected,
            _ => Self::Dead,
        }
    }
}

struct Shared {
    url: String,
    config: WsConfig,
    state: AtomicU8,
    /// Flips to `true` once, on teardown.
    closed: watch::Sender<bool>,
    outbound: OnceLock<mpsc::Sender<Message>>,
    pending: PendingCalls,
    subscriptions: SubscriptionManager,
    /// Serializes `start` calls.
    starting: tokio::sync::Mutex<()>,
}

/// Duplex provider over `ws://` or `wss://`.
pub struct WsProvider {
    shared: Arc<Shared>,
}

impl WsProvider {
    /// Create a provider. Nothing is dialed until [`Provider::start`].
    pub fn new(url: impl Into<String>, config: WsConfig) -> Result<Self, TransportError> {
        let url = url.into();
        let parsed = url::Url::parse(&url)
            .map_err(|e| TransportError::Config(format!("malformed URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(TransportError::Config(format!(
                "unsupported scheme for WebSocket transport: {}",
                parsed.scheme()
            )));
        }
        config.validate()?;

        let (closed, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(Shared {
                url,
                config,
                state: AtomicU8::new(DISCONNECTED),
                closed,
                outbound: OnceLock::new(),
                pending: PendingCalls::new(),
                subscriptions: SubscriptionManager::new(),
                starting: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Create and start a provider.
    pub async fn connect(url: impl Into<String>, config: WsConfig) -> Result<Self, TransportError> {
        let provider = Self::new(url, config)?;
        provider.start().await?;
        Ok(provider)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.len()
    }

    /// Send a call and wait for its response or for teardown.
    async fn roundtrip(
        &self,
        req: JsonRpcRequest,
        subscription: Option<PendingSubscription>,
    ) -> Result<Envelope, TransportError> {
        let shared = &self.shared;
        if shared.state() != ConnectionState::Connected {
            return Err(TransportError::ConnectionClosed);
        }
        let outbound = shared
            .outbound
            .get()
            .ok_or(TransportError::ConnectionClosed)?;
        let frame = serde_json::to_string(&req)?;

        let mut closed = shared.closed.subscribe();
        let reply = shared.pending.register(req.id.clone(), subscription);
        let _registered = shared.pending.cancel_on_drop(req.id.clone());
        let outcome = tokio::select! {
            delivered = async {
                if outbound.send(Message::Text(frame.into())).await.is_err() {
                    return Err(TransportError::ConnectionClosed);
                }
                reply.await.map_err(|_| TransportError::ConnectionClosed)
            } => delivered,
            _ = closed_signal(&mut closed) => Err(TransportError::ConnectionClosed),
        };
        outcome
    }
}

impl Drop for WsProvider {
    fn drop(&mut self) {
        self.shared.teardown("provider dropped");
    }
}

#[async_trait]
impl Provider for WsProvider {
    async fn start(&self) -> Result<(), TransportError> {
        let _starting = self.shared.starting.lock().await;
        match self.shared.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Dead => return Err(TransportError::ConnectionClosed),
            ConnectionState::Disconnected => {}
        }
        let stream = self.shared.dial().await?;
        Shared::launch(&self.shared, stream)
    }

    async fn stop(&self) {
        self.shared.teardown("stopped");
    }

    async fn request(
        &self,
        method: &str,
        params: Vec<RpcParam>,
    ) -> Result<Envelope, TransportError> {
        self.roundtrip(JsonRpcRequest::with_new_id(method, params), None)
            .await
    }

    async fn subscribe(
        &self,
        sink: NotificationSink,
        method: &str,
        event: &str,
        params: Vec<RpcParam>,
    ) -> Result<SubscriptionId, TransportError> {
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(Value::String(event.to_string()));
        args.extend(params);

        let pending = PendingSubscription {
            method: method.to_string(),
            sink,
        };
        let envelope = self
            .roundtrip(JsonRpcRequest::with_new_id(method, args), Some(pending))
            .await?;
        let id = SubscriptionId(envelope.decode_result::<String>()?);

        // the receive pump registered the sink; a teardown racing it may
        // have missed the entry
        if self.shared.state() == ConnectionState::Dead {
            self.shared.subscriptions.remove(&id);
            return Err(TransportError::ConnectionClosed);
        }
        debug!(url = %self.shared.url, subscription = %id, event, "subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<bool, TransportError> {
        let Some(method) = self.shared.subscriptions.remove(id) else {
            return Ok(false);
        };
        let Some(unsubscribe) = unsubscribe_method(&method) else {
            return Ok(true);
        };
        self.request(&unsubscribe, vec![Value::String(id.0.clone())])
            .await?
            .decode_result()
    }

    fn url(&self) -> &str {
        &self.shared.url
    }
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Dial until connected, or once when reconnect is disabled.
    async fn dial(&self) -> Result<WsStream, TransportError> {
        let mut closed = self.closed.subscribe();
        let warnings = TokenBucket::new(RateLimiterConfig::every(
            self.config.dial_warn_interval(),
            1,
        ));
        loop {
            debug!(url = %self.url, "dialing websocket");
            let attempt = tokio::select! {
                attempt = tokio_tungstenite::connect_async(self.url.as_str()) => attempt,
                _ = closed_signal(&mut closed) => return Err(TransportError::ConnectionClosed),
            };
            match attempt {
                Ok((stream, _)) => return Ok(stream),
                Err(e) if !self.config.reconnect => {
                    return Err(TransportError::WebSocket(e.to_string()));
                }
                Err(e) => {
                    if warnings.try_acquire() {
                        warn!(url = %self.url, error = %e, "websocket dial failed, retrying");
                    } else {
                        debug!(url = %self.url, error = %e, "websocket dial failed");
                    }
                }
            }
            tokio::select! {
                _ = time::sleep(self.config.reconnect_delay()) => {}
                _ = closed_signal(&mut closed) => return Err(TransportError::ConnectionClosed),
            }
        }
    }

    /// Spawn both pumps on a fresh connection and mark it connected.
    fn launch(this: &Arc<Self>, stream: WsStream) -> Result<(), TransportError> {
        let (sink, source) = stream.split();
        let (tx, rx) = mpsc::channel(this.config.send_queue_capacity);
        if this.outbound.set(tx).is_err() {
            return Err(TransportError::ConnectionClosed);
        }
        tokio::spawn(send_pump(Arc::clone(this), sink, rx));
        tokio::spawn(receive_pump(Arc::clone(this), source));

        this.state
            .compare_exchange(DISCONNECTED, CONNECTED, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| TransportError::ConnectionClosed)?;
        info!(url = %this.url, "websocket connected");
        Ok(())
    }

    /// Fatal teardown. Only the first caller does any work.
    fn teardown(&self, reason: &str) {
        if self.state.swap(DEAD, Ordering::SeqCst) == DEAD {
            return;
        }
        self.closed.send_replace(true);
        let calls = self.pending.clear();
        let subscriptions = self.subscriptions.clear();
        info!(
            url = %self.url,
            reason,
            failed_calls = calls,
            closed_subscriptions = subscriptions,
            "websocket torn down"
        );
    }

    /// Route one inbound frame.
    fn dispatch(&self, bytes: &[u8]) {
        let envelope = match codec::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(url = %self.url, error = %e, "dropping undecodable frame");
                return;
            }
        };
        match envelope.kind() {
            MessageKind::Response => self.resolve(envelope),
            MessageKind::Notification => self.notify(envelope),
            MessageKind::Unrecognized => {
                warn!(url = %self.url, "dropping unrecognized message");
            }
        }
    }

    fn resolve(&self, envelope: Envelope) {
        let Some(id) = envelope.valid_id() else {
            return;
        };
        let Some(call) = self.pending.take(&id) else {
            debug!(url = %self.url, id = %id, "response for unknown call");
            return;
        };
        if let (Some(sub), Some(Value::String(sub_id))) = (call.subscription, &envelope.result) {
            let id = SubscriptionId(sub_id.clone());
            if self.subscriptions.insert(id.clone(), sub.method, sub.sink) {
                debug!(url = %self.url, subscription = %id, "replaced existing subscription sink");
            }
            // teardown marks Dead before clearing, so an insert that lost
            // the race is caught here
            if self.state() == ConnectionState::Dead {
                self.subscriptions.remove(&id);
            }
        }
        // the caller may have given up already
        let _ = call.reply.send(envelope);
    }

    fn notify(&self, envelope: Envelope) {
        let method = envelope.method.as_deref().unwrap_or_default();
        if !method.ends_with(SUBSCRIPTION_SUFFIX) {
            warn!(url = %self.url, method, "dropping unexpected notification");
            return;
        }
        let notification = match envelope.notification() {
            Ok(n) => n,
            Err(e) => {
                warn!(url = %self.url, error = %e, "dropping malformed notification");
                return;
            }
        };
        let id = SubscriptionId(notification.subscription);
        match self.subscriptions.dispatch(&id, notification.result) {
            Delivery::Delivered => {}
            Delivery::Full => {
                warn!(url = %self.url, subscription = %id, "subscriber lagging, notification dropped");
            }
            Delivery::Closed => {
                debug!(url = %self.url, subscription = %id, "subscriber gone, subscription removed");
            }
            Delivery::Unknown => {
                debug!(url = %self.url, subscription = %id, "notification for unknown subscription");
            }
        }
    }
}

/// Resolves once teardown has happened.
async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn send_pump(
    shared: Arc<Shared>,
    mut sink: SplitSink<WsStream, Message>,
    mut queue: mpsc::Receiver<Message>,
) {
    let mut closed = shared.closed.subscribe();
    let period = shared.config.keepalive_interval();
    let write_timeout = shared.config.write_timeout();
    let mut keepalive = time::interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            _ = closed_signal(&mut closed) => break,
            next = queue.recv() => match next {
                Some(frame) => frame,
                None => break,
            },
            _ = keepalive.tick() => Message::Ping(Vec::new()),
        };
        match time::timeout(write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(url = %shared.url, error = %e, "websocket write failed");
                shared.teardown("write failed");
                return;
            }
            Err(_) => {
                warn!(url = %shared.url, "websocket write deadline exceeded");
                shared.teardown("write deadline exceeded");
                return;
            }
        }
    }
    // sends a close frame
    let _ = time::timeout(write_timeout, sink.close()).await;
}

async fn receive_pump(shared: Arc<Shared>, mut source: SplitStream<WsStream>) {
    let mut closed = shared.closed.subscribe();
    let read_timeout = shared.config.read_timeout();
    loop {
        let next = tokio::select! {
            _ = closed_signal(&mut closed) => return,
            next = next_frame(&mut source, read_timeout) => next,
        };
        match next {
            Ok(Some(Message::Text(text))) => shared.dispatch(text.as_bytes()),
            Ok(Some(Message::Binary(bytes))) => shared.dispatch(&bytes),
            Ok(Some(Message::Close(_))) | Ok(None) => {
                shared.teardown("closed by peer");
                return;
            }
            // ping/pong bookkeeping happens inside tungstenite
            Ok(Some(_)) => {}
            Err(e) => {
                warn!(url = %shared.url, error = %e, "websocket read failed");
                shared.teardown("read failed");
                return;
            }
        }
    }
}

async fn next_frame(
    source: &mut SplitStream<WsStream>,
    read_timeout: Option<Duration>,
) -> Result<Option<Message>, TransportError> {
    let next = match read_timeout {
        Some(limit) => time::timeout(limit, source.next())
            .await
            .map_err(|_| TransportError::WebSocket("read deadline exceeded".into()))?,
        None => source.next().await,
    };
    next.transpose()
        .map_err(|e| TransportError::WebSocket(e.to_string()))
}
