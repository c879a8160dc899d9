//! Relay manager for fanning operations out to many relays.
//!
//! The manager owns the relay registry and the shared [`MessagePool`]. It
//! snapshots the registry under its own lock and then talks to relays with
//! that lock released, so no relay lock is ever taken while holding it.

use std::collections::HashMap;
use std::sync::Arc;

use nostr::{Event, FilterSet};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::message::ClientMessage;
use crate::message_pool::{MessagePool, MessagePoolConfig};
use crate::relay::{ConnectionState, Relay, RelayConfig, RelayPolicy};
use crate::subscription::Subscription;
use crate::transport::Transport;

/// Relay manager configuration
#[derive(Debug, Clone, Default)]
pub struct RelayManagerConfig {
    /// Applied to every relay added to the manager
    pub relay: RelayConfig,
    pub message_pool: MessagePoolConfig,
}

/// A set of relays sharing one inbox.
#[derive(Debug)]
pub struct RelayManager {
    relays: RwLock<HashMap<String, Arc<Relay>>>,
    message_pool: Arc<MessagePool>,
    config: RelayManagerConfig,
}

impl Default for RelayManager {
    fn default() -> Self {
        Self::new(RelayManagerConfig::default())
    }
}

impl RelayManager {
    pub fn new(config: RelayManagerConfig) -> Self {
        Self {
            relays: RwLock::new(HashMap::new()),
            message_pool: Arc::new(MessagePool::new(config.message_pool.clone())),
            config,
        }
    }

    /// The inbox every relay writes into.
    pub fn message_pool(&self) -> &Arc<MessagePool> {
        &self.message_pool
    }

    /// Add a WebSocket relay and start connecting to it.
    pub fn add_relay(&self, url: &str, policy: RelayPolicy) -> Result<()> {
        let relay = Relay::new(
            url,
            policy,
            self.config.relay.clone(),
            Arc::clone(&self.message_pool),
        )?;
        self.register(relay)
    }

    /// Add a relay over a custom transport and start connecting to it.
    pub fn add_relay_with_transport(
        &self,
        url: &str,
        policy: RelayPolicy,
        transport: Arc<dyn Transport>,
    ) -> Result<()> {
        let relay = Relay::with_transport(
            url,
            policy,
            self.config.relay.clone(),
            Arc::clone(&self.message_pool),
            transport,
        )?;
        self.register(relay)
    }

    fn register(&self, relay: Relay) -> Result<()> {
        let relay = Arc::new(relay);
        {
            let mut relays = self.relays.write();
            if relays.contains_key(relay.url()) {
                return Err(ClientError::RelayExists(relay.url().to_string()));
            }
            relays.insert(relay.url().to_string(), Arc::clone(&relay));
        }

        if let Err(e) = relay.connect() {
            self.relays.write().remove(relay.url());
            return Err(e);
        }
        info!("Added relay {} ({:?})", relay.url(), relay.policy());
        Ok(())
    }

    /// Close and forget a relay. Returns whether it was registered.
    pub fn remove_relay(&self, url: &str) -> bool {
        let removed = self.relays.write().remove(url);
        match removed {
            Some(relay) => {
                relay.close();
                info!("Removed relay {}", url);
                true
            }
            None => false,
        }
    }

    /// Close and forget every relay.
    pub fn close_all(&self) {
        let relays: Vec<Arc<Relay>> = self.relays.write().drain().map(|(_, relay)| relay).collect();
        for relay in &relays {
            relay.close();
        }
        debug!("Closed {} relays", relays.len());
    }

    pub fn relay(&self, url: &str) -> Option<Arc<Relay>> {
        self.relays.read().get(url).cloned()
    }

    pub fn relay_urls(&self) -> Vec<String> {
        self.relays.read().keys().cloned().collect()
    }

    /// Connection state of every relay.
    pub fn states(&self) -> HashMap<String, ConnectionState> {
        self.snapshot()
            .into_iter()
            .map(|relay| (relay.url().to_string(), relay.state()))
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|relay| relay.state() == ConnectionState::Connected)
            .count()
    }

    fn snapshot(&self) -> Vec<Arc<Relay>> {
        self.relays.read().values().cloned().collect()
    }

    fn require_relay(&self, url: &str) -> Result<Arc<Relay>> {
        self.relay(url)
            .ok_or_else(|| ClientError::UnknownRelay(url.to_string()))
    }

    /// Subscribe on one relay. Fails if the relay does not allow reading.
    pub fn add_subscription_on_relay(
        &self,
        url: &str,
        id: &str,
        filters: impl Into<FilterSet>,
    ) -> Result<()> {
        let relay = self.require_relay(url)?;
        if !relay.policy().read {
            return Err(ClientError::Policy(format!(
                "cannot subscribe on {}: read not allowed",
                url
            )));
        }

        let subscription = Subscription::new(id, filters)?;
        let request = subscription.to_request().to_json()?;
        relay.add_subscription(id, subscription.filters)?;
        relay.publish(request);
        Ok(())
    }

    /// Subscribe on every relay that allows reading.
    pub fn add_subscription_on_all_relays(
        &self,
        id: &str,
        filters: impl Into<FilterSet>,
    ) -> Result<()> {
        let subscription = Subscription::new(id, filters)?;
        let request = subscription.to_request().to_json()?;

        let mut sent = 0;
        for relay in self.snapshot().into_iter().filter(|relay| relay.policy().read) {
            relay.add_subscription(id, subscription.filters.clone())?;
            relay.publish(request.clone());
            sent += 1;
        }
        debug!("Subscription {} sent to {} relays", id, sent);
        Ok(())
    }

    /// Replace a subscription's filters wherever it is held and resend the `REQ`.
    pub fn update_subscription(&self, id: &str, filters: impl Into<FilterSet>) -> Result<()> {
        let subscription = Subscription::new(id, filters)?;
        let request = subscription.to_request().to_json()?;

        for relay in self.snapshot() {
            if relay.subscription(id).is_some() {
                relay.update_subscription(id, subscription.filters.clone())?;
                relay.publish(request.clone());
            }
        }
        Ok(())
    }

    /// Close a subscription on one relay.
    pub fn close_subscription_on_relay(&self, url: &str, id: &str) -> Result<()> {
        let relay = self.require_relay(url)?;
        relay.close_subscription(id);
        relay.send_message(&ClientMessage::Close {
            subscription_id: id.to_string(),
        })
    }

    /// Close a subscription on every relay holding it.
    pub fn close_subscription_on_all_relays(&self, id: &str) -> Result<()> {
        let close = ClientMessage::Close {
            subscription_id: id.to_string(),
        }
        .to_json()?;

        for relay in self.snapshot() {
            if relay.close_subscription(id) {
                relay.publish(close.clone());
            }
        }
        Ok(())
    }

    /// Publish a signed event to every relay that allows writing.
    ///
    /// The event is checked once here: an unsigned event, or one that does
    /// not verify, is rejected with [`ClientError::Protocol`] before any
    /// relay sees it. Returns the number of relays the event was queued on.
    pub fn publish_event(&self, event: &Event) -> Result<usize> {
        if event.sig.is_none() {
            return Err(ClientError::Protocol(format!(
                "could not publish unsigned event {}: events must be signed",
                event.id()
            )));
        }

        match event.verify() {
            Ok(true) => {}
            Ok(false) => {
                return Err(ClientError::Protocol(format!(
                    "could not publish event {}: failed to verify signature",
                    event.id()
                )));
            }
            Err(e) => {
                warn!("Rejecting undecodable event {}: {}", event.id(), e);
                return Err(ClientError::Protocol(format!(
                    "could not publish event {}: failed to verify signature: {}",
                    event.id(),
                    e
                )));
            }
        }

        let frame = ClientMessage::Event(event.clone()).to_json()?;
        let mut queued = 0;
        for relay in self.snapshot().into_iter().filter(|relay| relay.policy().write) {
            relay.publish(frame.clone());
            queued += 1;
        }
        debug!("Event {} queued on {} relays", event.id(), queued);
        Ok(queued)
    }
}

impl Drop for RelayManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::Filter;

    #[test]
    fn test_unknown_relay() {
        let manager = RelayManager::default();
        assert!(matches!(
            manager.add_subscription_on_relay("wss://nowhere", "sub", Filter::new()),
            Err(ClientError::UnknownRelay(_))
        ));
        assert!(matches!(
            manager.close_subscription_on_relay("wss://nowhere", "sub"),
            Err(ClientError::UnknownRelay(_))
        ));
        assert!(!manager.remove_relay("wss://nowhere"));
    }

    #[test]
    fn test_add_relay_outside_runtime_is_rolled_back() {
        let manager = RelayManager::default();
        assert!(matches!(
            manager.add_relay("wss://relay.example.com", RelayPolicy::default()),
            Err(ClientError::NoRuntime)
        ));
        assert!(manager.relay_urls().is_empty());
    }

    #[test]
    fn test_publish_unsigned_event_is_rejected() {
        let manager = RelayManager::default();
        let event = Event::new("ab", "unsigned");
        assert!(matches!(
            manager.publish_event(&event),
            Err(ClientError::Protocol(msg)) if msg.contains("must be signed")
        ));
    }

    #[test]
    fn test_publish_bad_signature_is_rejected() {
        let manager = RelayManager::default();
        let mut event = Event::new("ab", "forged");
        event.sig = Some("0".repeat(32));
        assert!(matches!(
            manager.publish_event(&event),
            Err(ClientError::Protocol(msg)) if msg.contains("failed to verify")
        ));
    }

    #[test]
    fn test_publish_with_no_relays_queues_nothing() {
        let manager = RelayManager::default();
        let secret_key = nostr::generate_secret_key();
        let template = nostr::EventTemplate {
            created_at: 1_700_000_000,
            kind: nostr::KIND_SHORT_TEXT_NOTE,
            tags: vec![],
            content: "hello".to_string(),
        };
        let event = nostr::finalize_event(&template, &secret_key).unwrap();
        assert_eq!(manager.publish_event(&event).unwrap(), 0);
    }
}
