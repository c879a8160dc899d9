//! Shared helpers for relay integration tests.
//!
//! `MockTransport` stands in for a WebSocket: frames the relay sends are
//! recorded, and the test pushes inbound frames, stream errors, or a clean
//! close through the handle of the live connection.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{Sink, StreamExt};
use nostr::{Event, EventTemplate, KIND_SHORT_TEXT_NOTE, finalize_event};
use nostr_client::{FrameSink, FrameStream, RelayConfig, Transport, TransportError};
use parking_lot::Mutex;
use url::Url;

pub const SECRET_KEY: [u8; 32] = [7u8; 32];

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once)
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Config with short delays so lifecycle tests run fast.
pub fn fast_config(max_errors: u32) -> RelayConfig {
    RelayConfig {
        connect_timeout: Duration::from_secs(1),
        reconnect_delay: Duration::from_millis(10),
        max_errors,
        queue_retry_delay: Duration::from_millis(10),
        send_timeout: Duration::from_millis(100),
        ..RelayConfig::default()
    }
}

pub fn signed_note(content: &str) -> Event {
    let template = EventTemplate {
        created_at: 1_700_000_000,
        kind: KIND_SHORT_TEXT_NOTE,
        tags: vec![],
        content: content.to_string(),
    };
    finalize_event(&template, &SECRET_KEY).unwrap()
}

pub fn event_frame(subscription_id: &str, event: &Event) -> String {
    format!(
        r#"["EVENT","{}",{}]"#,
        subscription_id,
        serde_json::to_string(event).unwrap()
    )
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Refuse,
    Accept,
}

type Inbound = mpsc::UnboundedSender<Result<String, TransportError>>;

/// In-memory transport driven by a script of connect outcomes.
///
/// Once the script runs out every further connect uses `fallback`.
pub struct MockTransport {
    script: Mutex<VecDeque<ConnectOutcome>>,
    fallback: ConnectOutcome,
    connects: AtomicUsize,
    sent: Arc<Mutex<Vec<String>>>,
    send_failures: Arc<AtomicUsize>,
    stalled: Arc<AtomicBool>,
    inbound: Mutex<Option<Inbound>>,
}

impl MockTransport {
    pub fn accepting() -> Arc<Self> {
        Self::scripted([], ConnectOutcome::Accept)
    }

    pub fn refusing() -> Arc<Self> {
        Self::scripted([], ConnectOutcome::Refuse)
    }

    pub fn scripted(
        script: impl IntoIterator<Item = ConnectOutcome>,
        fallback: ConnectOutcome,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            connects: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
            send_failures: Arc::new(AtomicUsize::new(0)),
            stalled: Arc::new(AtomicBool::new(false)),
            inbound: Mutex::new(None),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Frames the relay has written, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn sent_starting_with(&self, prefix: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|frame| frame.starts_with(prefix))
            .collect()
    }

    /// Make the next `count` sends fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.send_failures.store(count, Ordering::SeqCst);
    }

    /// While stalled the sink never becomes ready, like a peer that stopped reading.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.inbound.lock().is_some()
    }

    /// True once the relay has dropped the stream of the latest connection.
    pub fn stream_released(&self) -> bool {
        self.inbound
            .lock()
            .as_ref()
            .is_none_or(|inbound| inbound.is_closed())
    }

    /// Deliver a frame on the live connection.
    pub fn deliver(&self, frame: impl Into<String>) {
        if let Some(inbound) = self.inbound.lock().as_ref() {
            let _ = inbound.unbounded_send(Ok(frame.into()));
        }
    }

    /// Fail the live connection with a stream error.
    pub fn fail_connection(&self) {
        if let Some(inbound) = self.inbound.lock().take() {
            let _ = inbound.unbounded_send(Err(TransportError::WebSocket("reset".to_string())));
        }
    }

    /// End the live connection cleanly, as a remote close would.
    pub fn close_connection(&self) {
        self.inbound.lock().take();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &Url) -> Result<(FrameSink, FrameStream), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front().unwrap_or(self.fallback);
        if outcome == ConnectOutcome::Refuse {
            return Err(TransportError::WebSocket("connection refused".to_string()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded();
        *self.inbound.lock() = Some(inbound_tx);

        let sink = RecordingSink {
            sent: Arc::clone(&self.sent),
            send_failures: Arc::clone(&self.send_failures),
            stalled: Arc::clone(&self.stalled),
        };

        Ok((Box::pin(sink), inbound_rx.boxed()))
    }
}

/// Sink that records frames, failing a configured number of sends first.
struct RecordingSink {
    sent: Arc<Mutex<Vec<String>>>,
    send_failures: Arc<AtomicUsize>,
    stalled: Arc<AtomicBool>,
}

impl Sink<String> for RecordingSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.stalled.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: String) -> Result<(), Self::Error> {
        let failing = self
            .send_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::WebSocket("broken pipe".to_string()));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.stalled.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }
}
