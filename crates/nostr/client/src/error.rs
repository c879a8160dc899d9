//! Client error types

use std::time::Duration;

use nostr::Nip01Error;
use thiserror::Error;

use crate::message::MessageError;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// Publish attempted with an unsigned or unverifiable event. Nothing was sent.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Relay policy forbids the operation
    #[error("Policy error: {0}")]
    Policy(String),

    /// No relay registered under this url
    #[error("Unknown relay: {0}")]
    UnknownRelay(String),

    /// A relay is already registered under this url
    #[error("Relay already registered: {0}")]
    RelayExists(String),

    /// Relay has settled into its terminal closed state
    #[error("Relay closed: {0}")]
    RelayClosed(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Subscription error
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Frame encoding error
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Connect called outside a tokio runtime
    #[error("No tokio runtime available to drive relay tasks")]
    NoRuntime,
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;

/// Socket-level failure. Handled by the relay's reconnect policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("not connected")]
    NotConnected,

    /// The HTTP proxy could not be reached or refused the tunnel
    #[error("proxy error: {0}")]
    Proxy(String),
}

/// Reason an inbound frame was dropped.
///
/// Frames come from untrusted peers, so these never reach the application;
/// the relay logs them and moves on.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Not JSON, not an array, wrong arity, or an unknown frame type
    #[error("malformed frame: {0}")]
    Malformed(#[from] MessageError),

    #[error("unknown subscription: {0}")]
    UnknownSubscription(String),

    /// Hex or key encoding inside the event could not be decoded
    #[error("undecodable event {event_id}: {source}")]
    Decode {
        event_id: String,
        #[source]
        source: Nip01Error,
    },

    /// Signature or id does not verify
    #[error("event {0} failed verification")]
    Crypto(String),

    #[error("event {event_id} does not match subscription {subscription_id}")]
    FilterMismatch {
        subscription_id: String,
        event_id: String,
    },
}
