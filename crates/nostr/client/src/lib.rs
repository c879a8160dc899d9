//! Nostr relay client for OpenAgents.
//!
//! This crate provides:
//! - Relay connections with fixed-delay reconnection and an error threshold
//! - An outgoing queue per relay that delivers at least once while connected
//! - Message parsing and validation (NIP-01 relay protocol)
//! - Subscription management with filters
//! - A relay manager that fans out subscriptions and publishes over many relays
//!   into one de-duplicating inbox
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr::{EventTemplate, Filter, finalize_event, generate_secret_key};
//! use nostr_client::{RelayManager, RelayPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = RelayManager::default();
//!     manager.add_relay("wss://relay.damus.io", RelayPolicy::default())?;
//!     manager.add_relay("wss://nos.lol", RelayPolicy::read_only())?;
//!
//!     // Subscribe to kind 1 (text notes)
//!     manager.add_subscription_on_all_relays("notes", Filter::new().kinds([1]).limit(10))?;
//!
//!     let secret_key = generate_secret_key();
//!     let template = EventTemplate {
//!         created_at: 1_700_000_000,
//!         kind: 1,
//!         tags: vec![],
//!         content: "Hello, nostr!".to_string(),
//!     };
//!     manager.publish_event(&finalize_event(&template, &secret_key)?)?;
//!
//!     // Process events
//!     loop {
//!         let received = manager.message_pool().next_event().await;
//!         println!("{} from {}", received.event.content, received.url);
//!     }
//! }
//! ```

mod error;
mod manager;
mod message;
mod message_pool;
mod relay;
mod subscription;
mod transport;

// Re-export main types
pub use error::{ClientError, Result, TransportError, ValidationError};
pub use manager::{RelayManager, RelayManagerConfig};
pub use message::{ClientMessage, MessageError, RelayMessage};
pub use message_pool::{
    EndOfStoredEventsMessage, EventMessage, MessagePool, MessagePoolConfig, NoticeMessage,
    OkMessage,
};
pub use relay::{ConnectionState, Relay, RelayConfig, RelayInfo, RelayPolicy, TransportEvent};
pub use subscription::{Subscription, SubscriptionBuilder, generate_subscription_id};
pub use transport::{
    FrameSink, FrameStream, ProxyConfig, Transport, WebSocketOptions, WebSocketTransport,
};
