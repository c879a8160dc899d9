//! Single relay connection management
//!
//! A [`Relay`] owns one connection's lifecycle: a run-loop task that drives
//! the transport and reconnects with a fixed delay, an outgoing-queue task
//! that sends while connected, the subscription table, and validation of
//! every inbound frame before it reaches the shared [`MessagePool`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use nostr::FilterSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, Result, TransportError, ValidationError};
use crate::message::{ClientMessage, RelayMessage};
use crate::message_pool::MessagePool;
use crate::subscription::Subscription;
use crate::transport::{FrameSink, Transport, WebSocketOptions, WebSocketTransport};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected yet
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready
    Connected,
    /// Waiting out the reconnect delay after a disconnect
    Reconnecting,
    /// Closed by the application or after too many errors. Terminal.
    Closed,
}

/// What the application may do on a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPolicy {
    pub read: bool,
    pub write: bool,
}

impl RelayPolicy {
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    pub fn write_only() -> Self {
        Self {
            read: false,
            write: true,
        }
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
        }
    }
}

/// Relay connection configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Fixed delay between reconnection attempts
    pub reconnect_delay: Duration,
    /// The relay closes for good once its error count exceeds this
    pub max_errors: u32,
    /// Pause after a failed send before the outgoing queue is retried
    pub queue_retry_delay: Duration,
    /// A send or close that does not finish in time drops the connection
    pub send_timeout: Duration,
    /// TLS and proxy settings used by [`Relay::new`]
    pub websocket: WebSocketOptions,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(2),
            max_errors: 5,
            queue_retry_delay: Duration::from_millis(500),
            send_timeout: Duration::from_secs(10),
            websocket: WebSocketOptions::default(),
        }
    }
}

/// Notifications from the transport, fed to a single dispatcher.
#[derive(Debug)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(TransportError),
    Closed,
}

/// Serializable summary of a relay.
#[derive(Debug, Clone, Serialize)]
pub struct RelayInfo {
    pub url: String,
    pub policy: RelayPolicy,
    pub state: ConnectionState,
    pub subscriptions: Vec<Subscription>,
}

/// Everything guarded by the relay's single lock.
#[derive(Debug, Default)]
struct RelayTable {
    subscriptions: HashMap<String, Subscription>,
    error_count: u32,
    connections: u64,
}

/// State shared between the relay handle and its tasks.
struct RelayShared {
    url: String,
    parsed_url: Url,
    state: watch::Sender<ConnectionState>,
    table: Mutex<RelayTable>,
    sink: AsyncMutex<Option<FrameSink>>,
    /// Fired by the queue worker to drop the live connection
    reset: Mutex<Option<oneshot::Sender<()>>>,
    outgoing: mpsc::UnboundedSender<String>,
    message_pool: Arc<MessagePool>,
}

#[derive(Default)]
struct RelayTasks {
    outgoing_rx: Option<mpsc::UnboundedReceiver<String>>,
    run_loop: Option<JoinHandle<()>>,
    queue_worker: Option<JoinHandle<()>>,
}

/// Relay connection
pub struct Relay {
    policy: RelayPolicy,
    config: RelayConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<RelayShared>,
    tasks: Mutex<RelayTasks>,
}

impl Relay {
    /// Create a relay over WebSocket (does not connect yet)
    pub fn new(
        url: &str,
        policy: RelayPolicy,
        config: RelayConfig,
        message_pool: Arc<MessagePool>,
    ) -> Result<Self> {
        let transport = Arc::new(WebSocketTransport::with_options(
            config.connect_timeout,
            config.websocket.clone(),
        ));
        Self::with_transport(url, policy, config, message_pool, transport)
    }

    /// Create a relay over a custom transport
    pub fn with_transport(
        url: &str,
        policy: RelayPolicy,
        config: RelayConfig,
        message_pool: Arc<MessagePool>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let parsed_url = Url::parse(url)?;

        // Validate WebSocket URL
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed_url.scheme()
            )));
        }

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        Ok(Self {
            policy,
            config,
            transport,
            shared: Arc::new(RelayShared {
                url: url.to_string(),
                parsed_url,
                state,
                table: Mutex::new(RelayTable::default()),
                sink: AsyncMutex::new(None),
                reset: Mutex::new(None),
                outgoing,
                message_pool,
            }),
            tasks: Mutex::new(RelayTasks {
                outgoing_rx: Some(outgoing_rx),
                ..Default::default()
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn policy(&self) -> RelayPolicy {
        self.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Transport errors since the last successful connect.
    pub fn error_count(&self) -> u32 {
        self.shared.table.lock().error_count
    }

    /// Start the connection.
    ///
    /// Spawns the run loop on the current tokio runtime, and the outgoing
    /// queue worker on the first call only. Calling it while the run loop
    /// is alive is a no-op.
    pub fn connect(&self) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(ClientError::RelayClosed(self.shared.url.clone()));
        }
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let mut tasks = self.tasks.lock();
        if tasks.run_loop.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Relay {} already running", self.shared.url);
            return Ok(());
        }

        info!("Connecting to relay: {}", self.shared.url);
        tasks.run_loop = Some(runtime.spawn(run_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            self.config.clone(),
        )));

        if let Some(outgoing_rx) = tasks.outgoing_rx.take() {
            tasks.queue_worker = Some(runtime.spawn(queue_worker(
                Arc::clone(&self.shared),
                outgoing_rx,
                self.config.clone(),
            )));
        }
        Ok(())
    }

    /// Close the relay for good. Queued outgoing messages are discarded.
    pub fn close(&self) {
        let previous = self.shared.state.send_replace(ConnectionState::Closed);
        // Never connected: the queue has no worker to drop it
        self.tasks.lock().outgoing_rx.take();
        if previous != ConnectionState::Closed {
            info!("Closed relay: {}", self.shared.url);
        }
    }

    /// Enqueue a raw frame for sending. Never blocks.
    pub fn publish(&self, message: impl Into<String>) {
        self.shared.enqueue(message.into());
    }

    /// Encode and enqueue a client message.
    pub fn send_message(&self, message: &ClientMessage) -> Result<()> {
        self.publish(message.to_json()?);
        Ok(())
    }

    /// Register a subscription in the local table, replacing any with the same id.
    pub fn add_subscription(&self, id: &str, filters: FilterSet) -> Result<()> {
        let subscription = Subscription::new(id, filters)?;
        self.shared
            .table
            .lock()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
        debug!("Added subscription {} on {}", id, self.shared.url);
        Ok(())
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn close_subscription(&self, id: &str) -> bool {
        let removed = self.shared.table.lock().subscriptions.remove(id).is_some();
        if removed {
            debug!("Closed subscription {} on {}", id, self.shared.url);
        }
        removed
    }

    /// Replace the filters of an existing subscription.
    pub fn update_subscription(&self, id: &str, filters: FilterSet) -> Result<()> {
        let mut table = self.shared.table.lock();
        let subscription = table.subscriptions.get_mut(id).ok_or_else(|| {
            ClientError::Subscription(format!("no subscription {} on {}", id, self.shared.url))
        })?;
        subscription.filters = filters;
        Ok(())
    }

    pub fn subscription(&self, id: &str) -> Option<Subscription> {
        self.shared.table.lock().subscriptions.get(id).cloned()
    }

    pub fn subscription_ids(&self) -> Vec<String> {
        self.shared.table.lock().subscriptions.keys().cloned().collect()
    }

    /// Validate an inbound frame against this relay's subscriptions.
    pub fn validate_message(&self, raw: &str) -> std::result::Result<RelayMessage, ValidationError> {
        self.shared.validate(raw)
    }

    pub fn is_valid_message(&self, raw: &str) -> bool {
        self.validate_message(raw).is_ok()
    }

    pub fn info(&self) -> RelayInfo {
        let mut subscriptions: Vec<Subscription> = self
            .shared
            .table
            .lock()
            .subscriptions
            .values()
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| a.id.cmp(&b.id));

        RelayInfo {
            url: self.shared.url.clone(),
            policy: self.policy,
            state: self.state(),
            subscriptions,
        }
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("url", &self.shared.url)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        // Tasks hold the shared state, so they would outlive the handle otherwise
        self.shared.state.send_replace(ConnectionState::Closed);
    }
}

impl RelayShared {
    fn is_closed(&self) -> bool {
        *self.state.borrow() == ConnectionState::Closed
    }

    /// Move to `next` unless the relay is already closed.
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn error_count(&self) -> u32 {
        self.table.lock().error_count
    }

    fn enqueue(&self, message: String) {
        if self.outgoing.send(message).is_err() {
            debug!("Relay {} is closed, dropping outgoing message", self.url);
        }
    }

    fn validate(&self, raw: &str) -> std::result::Result<RelayMessage, ValidationError> {
        let message = RelayMessage::from_json(raw.trim())?;

        if let RelayMessage::Event {
            subscription_id,
            event,
        } = &message
        {
            let filters = self
                .table
                .lock()
                .subscriptions
                .get(subscription_id)
                .map(|subscription| subscription.filters.clone())
                .ok_or_else(|| ValidationError::UnknownSubscription(subscription_id.clone()))?;

            match event.verify() {
                Ok(true) => {}
                Ok(false) => return Err(ValidationError::Crypto(event.id().to_string())),
                Err(source) => {
                    return Err(ValidationError::Decode {
                        event_id: event.id().to_string(),
                        source,
                    });
                }
            }

            if !filters.matches(event) {
                return Err(ValidationError::FilterMismatch {
                    subscription_id: subscription_id.clone(),
                    event_id: event.id().to_string(),
                });
            }
        }

        Ok(message)
    }

    fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                let requests: Vec<ClientMessage> = {
                    let mut table = self.table.lock();
                    table.error_count = 0;
                    table.connections += 1;
                    if table.connections > 1 {
                        table
                            .subscriptions
                            .values()
                            .map(Subscription::to_request)
                            .collect()
                    } else {
                        Vec::new()
                    }
                };
                self.set_state(ConnectionState::Connected);
                info!("Connected to relay: {}", self.url);

                for request in requests {
                    match request.to_json() {
                        Ok(frame) => self.enqueue(frame),
                        Err(e) => warn!("Failed to encode resubscription for {}: {}", self.url, e),
                    }
                }
            }
            TransportEvent::Message(raw) => match self.validate(&raw) {
                Ok(message) => self.message_pool.push(message, &self.url),
                Err(e) => debug!("Dropping frame from {}: {}", self.url, e),
            },
            TransportEvent::Error(e) => {
                let count = {
                    let mut table = self.table.lock();
                    table.error_count += 1;
                    table.error_count
                };
                warn!("Transport error on {} ({} since last connect): {}", self.url, count, e);
            }
            TransportEvent::Closed => {
                info!("Relay {} closed the connection", self.url);
            }
        }
    }

    async fn send_frame(&self, frame: String) -> std::result::Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => sink.send(frame).await,
            None => Err(TransportError::NotConnected),
        }
    }

    /// Ask the run loop to drop the live connection, if there is one.
    fn reset_connection(&self) {
        if let Some(reset) = self.reset.lock().take() {
            let _ = reset.send(());
        }
    }

    async fn release_sink(&self, close_timeout: Duration) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            match tokio::time::timeout(close_timeout, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Error closing connection to {}: {}", self.url, e),
                Err(_) => debug!("Closing connection to {} timed out", self.url),
            }
        }
    }
}

async fn wait_until_closed(state: &mut watch::Receiver<ConnectionState>) {
    let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
}

/// Drive the transport until the relay closes.
async fn run_loop(shared: Arc<RelayShared>, transport: Arc<dyn Transport>, config: RelayConfig) {
    let mut state = shared.state.subscribe();

    loop {
        if shared.is_closed() {
            break;
        }
        shared.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            result = transport.connect(&shared.parsed_url) => result,
            _ = wait_until_closed(&mut state) => break,
        };

        match connected {
            Ok((sink, mut stream)) => {
                let (reset_tx, mut reset_rx) = oneshot::channel();
                *shared.reset.lock() = Some(reset_tx);
                *shared.sink.lock().await = Some(sink);
                shared.dispatch(TransportEvent::Opened);

                loop {
                    tokio::select! {
                        frame = stream.next() => match frame {
                            Some(Ok(raw)) => shared.dispatch(TransportEvent::Message(raw)),
                            Some(Err(e)) => {
                                shared.dispatch(TransportEvent::Error(e));
                                break;
                            }
                            None => {
                                shared.dispatch(TransportEvent::Closed);
                                break;
                            }
                        },
                        _ = &mut reset_rx => {
                            debug!("Dropping stalled connection to {}", shared.url);
                            break;
                        }
                        _ = wait_until_closed(&mut state) => break,
                    }
                }
                shared.reset.lock().take();
                shared.release_sink(config.send_timeout).await;
            }
            Err(e) => shared.dispatch(TransportEvent::Error(e)),
        }

        if shared.is_closed() {
            break;
        }

        let errors = shared.error_count();
        if errors > config.max_errors {
            warn!(
                "Relay {} exceeded {} transport errors, closing",
                shared.url, config.max_errors
            );
            shared.state.send_replace(ConnectionState::Closed);
            break;
        }

        shared.set_state(ConnectionState::Reconnecting);
        debug!(
            "Reconnecting to {} in {:?} ({} errors)",
            shared.url, config.reconnect_delay, errors
        );
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = wait_until_closed(&mut state) => break,
        }
    }

    shared.release_sink(config.send_timeout).await;
    debug!("Run loop stopped for {}", shared.url);
}

/// Send queued frames while connected; idle otherwise.
async fn queue_worker(
    shared: Arc<RelayShared>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    config: RelayConfig,
) {
    let mut state = shared.state.subscribe();

    loop {
        let current = match state
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed))
            .await
        {
            Ok(current) => *current,
            Err(_) => break,
        };
        if current == ConnectionState::Closed {
            break;
        }

        let frame = tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = state.wait_for(|s| *s != ConnectionState::Connected) => continue,
        };
        if shared.is_closed() {
            break;
        }

        // Dropping the send future releases the sink lock for the run loop
        let sent = tokio::select! {
            result = tokio::time::timeout(config.send_timeout, shared.send_frame(frame.clone())) => result,
            _ = wait_until_closed(&mut state) => break,
        };

        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Send to {} failed, requeueing: {}", shared.url, e);
                shared.enqueue(frame);
                tokio::select! {
                    _ = tokio::time::sleep(config.queue_retry_delay) => {}
                    _ = wait_until_closed(&mut state) => break,
                }
            }
            Err(_) => {
                warn!(
                    "Send to {} stalled for {:?}, requeueing and reconnecting",
                    shared.url, config.send_timeout
                );
                shared.dispatch(TransportEvent::Error(TransportError::Timeout(
                    config.send_timeout,
                )));
                shared.enqueue(frame);
                shared.reset_connection();
                let _ = state.wait_for(|s| *s != ConnectionState::Connected).await;
            }
        }
    }

    debug!("Outgoing queue stopped for {}", shared.url);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{Event, Filter};

    const SECRET_KEY: [u8; 32] = [7u8; 32];

    fn relay(url: &str) -> Result<Relay> {
        Relay::new(
            url,
            RelayPolicy::default(),
            RelayConfig::default(),
            Arc::new(MessagePool::default()),
        )
    }

    fn signed_event(content: &str, kind: u16) -> Event {
        let pubkey = nostr::get_public_key_hex(&SECRET_KEY).unwrap();
        let mut event = Event::new(pubkey, content).with_kind(kind);
        event.sign(&SECRET_KEY).unwrap();
        event
    }

    fn event_frame(subscription_id: &str, event: &Event) -> String {
        format!(
            r#"["EVENT","{}",{}]"#,
            subscription_id,
            serde_json::to_string(event).unwrap()
        )
    }

    #[test]
    fn test_relay_creation() {
        let relay = relay("wss://relay.example.com").unwrap();
        assert_eq!(relay.url(), "wss://relay.example.com");
        assert_eq!(relay.state(), ConnectionState::Disconnected);
        assert_eq!(relay.error_count(), 0);
        assert_eq!(relay.policy(), RelayPolicy::default());
    }

    #[test]
    fn test_invalid_url_scheme() {
        assert!(matches!(
            relay("http://relay.example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(relay("not a url"), Err(ClientError::UrlParse(_))));
    }

    #[test]
    fn test_connect_requires_runtime() {
        let relay = relay("wss://relay.example.com").unwrap();
        assert!(matches!(relay.connect(), Err(ClientError::NoRuntime)));
    }

    #[test]
    fn test_closed_relay_cannot_connect() {
        let relay = relay("wss://relay.example.com").unwrap();
        relay.close();
        assert_eq!(relay.state(), ConnectionState::Closed);
        assert!(matches!(relay.connect(), Err(ClientError::RelayClosed(_))));
    }

    #[test]
    fn test_subscription_table() {
        let relay = relay("wss://relay.example.com").unwrap();
        relay.add_subscription("a", Filter::new().kinds([1]).into()).unwrap();
        relay.add_subscription("b", FilterSet::new()).unwrap();
        assert!(relay.add_subscription("", FilterSet::new()).is_err());

        let mut ids = relay.subscription_ids();
        ids.sort();
        assert_eq!(ids, ["a", "b"]);

        relay
            .update_subscription("a", Filter::new().kinds([0]).into())
            .unwrap();
        assert_eq!(
            relay.subscription("a").unwrap().filters,
            FilterSet::from(Filter::new().kinds([0]))
        );
        assert!(relay.update_subscription("missing", FilterSet::new()).is_err());

        assert!(relay.close_subscription("a"));
        assert!(!relay.close_subscription("a"));
        assert_eq!(relay.subscription_ids(), ["b"]);
    }

    #[test]
    fn test_validate_accepts_matching_signed_event() {
        let relay = relay("wss://relay.example.com").unwrap();
        relay.add_subscription("notes", Filter::new().kinds([1]).into()).unwrap();

        let event = signed_event("hello", 1);
        assert!(relay.is_valid_message(&event_frame("notes", &event)));
        assert!(relay.is_valid_message(r#"["NOTICE","hi"]"#));
        assert!(relay.is_valid_message(r#"["EOSE","notes"]"#));
    }

    #[test]
    fn test_validate_rejects_unknown_subscription() {
        let relay = relay("wss://relay.example.com").unwrap();
        let event = signed_event("hello", 1);
        assert!(matches!(
            relay.validate_message(&event_frame("nope", &event)),
            Err(ValidationError::UnknownSubscription(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_signature() {
        let relay = relay("wss://relay.example.com").unwrap();
        relay.add_subscription("notes", Filter::new().into()).unwrap();

        let mut event = signed_event("hello", 1);
        event.content = "tampered".to_string();
        assert!(matches!(
            relay.validate_message(&event_frame("notes", &event)),
            Err(ValidationError::Crypto(_))
        ));

        let unsigned = Event::new("ab", "unsigned");
        assert!(!relay.is_valid_message(&event_frame("notes", &unsigned)));
    }

    #[test]
    fn test_validate_rejects_filter_mismatch() {
        let relay = relay("wss://relay.example.com").unwrap();
        relay.add_subscription("metadata", Filter::new().kinds([0]).into()).unwrap();

        let event = signed_event("hello", 1);
        assert!(matches!(
            relay.validate_message(&event_frame("metadata", &event)),
            Err(ValidationError::FilterMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_malformed_frames() {
        let relay = relay("wss://relay.example.com").unwrap();
        for raw in ["", "[", r#"{"EVENT":1}"#, r#"["PING"]"#, r#"["EVENT","x"]"#] {
            assert!(matches!(
                relay.validate_message(raw),
                Err(ValidationError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_dispatch_counts_errors_and_resets_on_open() {
        let relay = relay("wss://relay.example.com").unwrap();
        relay
            .shared
            .dispatch(TransportEvent::Error(TransportError::NotConnected));
        relay
            .shared
            .dispatch(TransportEvent::Error(TransportError::NotConnected));
        assert_eq!(relay.error_count(), 2);

        relay.shared.dispatch(TransportEvent::Opened);
        assert_eq!(relay.error_count(), 0);
        assert_eq!(relay.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_dispatch_never_reopens_closed_relay() {
        let relay = relay("wss://relay.example.com").unwrap();
        relay.close();
        relay.shared.dispatch(TransportEvent::Opened);
        assert_eq!(relay.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_websocket_options_reach_the_transport() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = RelayConfig {
            reconnect_delay: Duration::from_millis(10),
            max_errors: 0,
            websocket: WebSocketOptions {
                tls: None,
                proxy: Some(crate::transport::ProxyConfig::new("127.0.0.1", port)),
            },
            ..Default::default()
        };
        let relay = Relay::new(
            "ws://relay.example.com",
            RelayPolicy::default(),
            config,
            Arc::new(MessagePool::default()),
        )
        .unwrap();

        relay.connect().unwrap();
        let mut state = relay.watch_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ConnectionState::Closed),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(relay.error_count(), 1);
    }

    #[test]
    fn test_info_serializes() {
        let relay = relay("wss://relay.example.com").unwrap();
        relay.add_subscription("a", Filter::new().kinds([1]).into()).unwrap();

        let info = serde_json::to_value(relay.info()).unwrap();
        assert_eq!(info["url"], "wss://relay.example.com");
        assert_eq!(info["policy"], serde_json::json!({ "read": true, "write": true }));
        assert_eq!(info["state"], "disconnected");
        assert_eq!(info["subscriptions"][0]["id"], "a");
        assert_eq!(
            info["subscriptions"][0]["filters"],
            serde_json::json!([{ "kinds": [1] }])
        );
    }
}
