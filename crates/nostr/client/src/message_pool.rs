//! Shared inbox for frames received from every relay.
//!
//! Relays push validated frames here tagged with their url. Consumers either
//! poll (`has_events` / `get_event`) or await [`MessagePool::next_event`].

use std::collections::{HashSet, VecDeque};

use nostr::Event;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::message::{MessageError, RelayMessage};

/// Message pool configuration
#[derive(Debug, Clone)]
pub struct MessagePoolConfig {
    /// Drop events whose id was already delivered by any relay
    pub deduplicate_events: bool,
    /// How many recent event ids are remembered for de-duplication. Once
    /// full, the oldest id is forgotten and a late copy of it is delivered
    /// again. Zero remembers nothing.
    pub dedup_window: usize,
}

impl Default for MessagePoolConfig {
    fn default() -> Self {
        Self {
            deduplicate_events: true,
            dedup_window: 100_000,
        }
    }
}

/// Bounded FIFO of recently delivered event ids.
#[derive(Debug, Default)]
struct SeenEvents {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenEvents {
    /// Remember `id`. Returns false if it is already in the window.
    fn insert(&mut self, id: &str, window: usize) -> bool {
        if window == 0 {
            return true;
        }
        if self.ids.contains(id) {
            return false;
        }
        while self.order.len() >= window {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub event: Event,
    pub subscription_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeMessage {
    pub content: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfStoredEventsMessage {
    pub subscription_id: String,
    pub url: String,
}

/// Command result for a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkMessage {
    pub event_id: String,
    pub accepted: bool,
    pub message: String,
    pub url: String,
}

/// Thread-safe multi-producer, multi-consumer inbox.
///
/// Each queue has its own lock and no two are held at once.
#[derive(Debug, Default)]
pub struct MessagePool {
    config: MessagePoolConfig,
    events: Mutex<VecDeque<EventMessage>>,
    notices: Mutex<VecDeque<NoticeMessage>>,
    eose_notices: Mutex<VecDeque<EndOfStoredEventsMessage>>,
    ok_notices: Mutex<VecDeque<OkMessage>>,
    seen_events: Mutex<SeenEvents>,
    event_arrived: Notify,
}

impl MessagePool {
    pub fn new(config: MessagePoolConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Parse a raw frame and queue it. Malformed frames are dropped and
    /// the parse error is returned.
    pub fn add_message(&self, raw: &str, url: &str) -> Result<(), MessageError> {
        match RelayMessage::from_json(raw) {
            Ok(message) => {
                self.push(message, url);
                Ok(())
            }
            Err(e) => {
                debug!("Dropping malformed frame from {}: {}", url, e);
                Err(e)
            }
        }
    }

    /// Queue an already parsed frame.
    pub fn push(&self, message: RelayMessage, url: &str) {
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                if self.config.deduplicate_events
                    && !self
                        .seen_events
                        .lock()
                        .insert(event.id(), self.config.dedup_window)
                {
                    trace!("Duplicate event {} from {}", event.id(), url);
                    return;
                }
                self.events.lock().push_back(EventMessage {
                    event,
                    subscription_id,
                    url: url.to_string(),
                });
                self.event_arrived.notify_waiters();
            }
            RelayMessage::Notice { message } => {
                self.notices.lock().push_back(NoticeMessage {
                    content: message,
                    url: url.to_string(),
                });
            }
            RelayMessage::Eose { subscription_id } => {
                self.eose_notices
                    .lock()
                    .push_back(EndOfStoredEventsMessage {
                        subscription_id,
                        url: url.to_string(),
                    });
            }
            RelayMessage::Ok {
                event_id,
                success,
                message,
            } => {
                self.ok_notices.lock().push_back(OkMessage {
                    event_id,
                    accepted: success,
                    message,
                    url: url.to_string(),
                });
            }
        }
    }

    pub fn has_events(&self) -> bool {
        !self.events.lock().is_empty()
    }

    pub fn get_event(&self) -> Option<EventMessage> {
        self.events.lock().pop_front()
    }

    /// Take every queued event in arrival order.
    pub fn drain_events(&self) -> Vec<EventMessage> {
        self.events.lock().drain(..).collect()
    }

    /// Wait until an event is available and take it.
    pub async fn next_event(&self) -> EventMessage {
        loop {
            let arrived = self.event_arrived.notified();
            if let Some(event) = self.get_event() {
                return event;
            }
            arrived.await;
        }
    }

    pub fn has_notices(&self) -> bool {
        !self.notices.lock().is_empty()
    }

    pub fn get_notice(&self) -> Option<NoticeMessage> {
        self.notices.lock().pop_front()
    }

    pub fn has_eose_notices(&self) -> bool {
        !self.eose_notices.lock().is_empty()
    }

    pub fn get_eose_notice(&self) -> Option<EndOfStoredEventsMessage> {
        self.eose_notices.lock().pop_front()
    }

    pub fn has_ok_notices(&self) -> bool {
        !self.ok_notices.lock().is_empty()
    }

    pub fn get_ok_notice(&self) -> Option<OkMessage> {
        self.ok_notices.lock().pop_front()
    }
}
