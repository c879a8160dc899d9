//! Nostr relay message types.
//!
//! This module implements the relay protocol frames used by the client:
//! - Client to Relay: EVENT, REQ, CLOSE
//! - Relay to Client: EVENT, OK, EOSE, NOTICE

use nostr::{Event, FilterSet};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when encoding or parsing relay messages.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(String),
}

/// Messages sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Publish an event: ["EVENT", <event JSON>]
    Event(Event),

    /// Subscribe to events: ["REQ", <subscription_id>, <filter1>, <filter2>, ...]
    Req {
        subscription_id: String,
        filters: FilterSet,
    },

    /// Close a subscription: ["CLOSE", <subscription_id>]
    Close { subscription_id: String },
}

impl ClientMessage {
    /// Serialize to JSON array for sending to relay.
    pub fn to_json(&self) -> Result<String, MessageError> {
        let value = match self {
            ClientMessage::Event(event) => {
                Value::Array(vec![Value::from("EVENT"), serde_json::to_value(event)?])
            }
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut arr: Vec<Value> = vec![
                    Value::from("REQ"),
                    Value::String(subscription_id.clone()),
                ];
                for filter in filters {
                    arr.push(serde_json::to_value(filter)?);
                }
                Value::Array(arr)
            }
            ClientMessage::Close { subscription_id } => {
                serde_json::json!(["CLOSE", subscription_id])
            }
        };
        Ok(value.to_string())
    }
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// Event matching a subscription: ["EVENT", <subscription_id>, <event JSON>]
    Event {
        subscription_id: String,
        event: Event,
    },

    /// Command result: ["OK", <event_id>, <true|false>, <message>]
    Ok {
        event_id: String,
        success: bool,
        message: String,
    },

    /// End of stored events: ["EOSE", <subscription_id>]
    Eose { subscription_id: String },

    /// Human-readable notice: ["NOTICE", <message>]
    Notice { message: String },
}

impl RelayMessage {
    /// Parse a JSON frame from the relay.
    ///
    /// Arity is checked strictly: EVENT takes exactly three elements, EOSE
    /// and NOTICE exactly two, OK three or four.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let arr: Vec<Value> =
            serde_json::from_str(json).map_err(|e| MessageError::InvalidFormat(e.to_string()))?;

        let msg_type = arr
            .first()
            .ok_or_else(|| MessageError::InvalidFormat("empty array".to_string()))?
            .as_str()
            .ok_or_else(|| MessageError::InvalidFormat("first element not a string".to_string()))?;

        match msg_type {
            "EVENT" => {
                expect_len(&arr, 3..=3, "EVENT")?;
                let subscription_id = string_at(&arr, 1, "subscription_id")?;
                let event: Event = serde_json::from_value(arr[2].clone())?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            "OK" => {
                expect_len(&arr, 3..=4, "OK")?;
                let event_id = string_at(&arr, 1, "event_id")?;
                let success = arr[2].as_bool().ok_or_else(|| {
                    MessageError::InvalidFormat("success not a boolean".to_string())
                })?;
                let message = arr
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    success,
                    message,
                })
            }
            "EOSE" => {
                expect_len(&arr, 2..=2, "EOSE")?;
                let subscription_id = string_at(&arr, 1, "subscription_id")?;
                Ok(RelayMessage::Eose { subscription_id })
            }
            "NOTICE" => {
                expect_len(&arr, 2..=2, "NOTICE")?;
                let message = string_at(&arr, 1, "message")?;
                Ok(RelayMessage::Notice { message })
            }
            _ => Err(MessageError::UnknownType(msg_type.to_string())),
        }
    }

    /// Frame type as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::Event { .. } => "EVENT",
            RelayMessage::Ok { .. } => "OK",
            RelayMessage::Eose { .. } => "EOSE",
            RelayMessage::Notice { .. } => "NOTICE",
        }
    }
}

fn expect_len(
    arr: &[Value],
    range: std::ops::RangeInclusive<usize>,
    msg_type: &str,
) -> Result<(), MessageError> {
    if arr.len() < *range.start() {
        return Err(MessageError::MissingField(format!("{} fields", msg_type)));
    }
    if !range.contains(&arr.len()) {
        return Err(MessageError::InvalidFormat(format!(
            "{} frame has {} elements",
            msg_type,
            arr.len()
        )));
    }
    Ok(())
}

fn string_at(arr: &[Value], index: usize, field: &str) -> Result<String, MessageError> {
    arr.get(index)
        .ok_or_else(|| MessageError::MissingField(field.to_string()))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MessageError::InvalidFormat(format!("{} not a string", field)))
}
