//! Subscriptions held in a relay's subscription table.

use nostr::{Event, Filter, FilterSet};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::message::ClientMessage;

/// Generate a unique subscription ID.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// A named standing request for events matching a filter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: String,
    pub filters: FilterSet,
}

impl Subscription {
    /// Create a subscription. The id must be non-empty.
    pub fn new(id: impl Into<String>, filters: impl Into<FilterSet>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ClientError::Subscription(
                "subscription id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id,
            filters: filters.into(),
        })
    }

    /// Check if an event matches any filter in this subscription
    pub fn matches(&self, event: &Event) -> bool {
        self.filters.matches(event)
    }

    /// The `REQ` frame announcing this subscription.
    pub fn to_request(&self) -> ClientMessage {
        ClientMessage::Req {
            subscription_id: self.id.clone(),
            filters: self.filters.clone(),
        }
    }
}

/// Builder for creating subscription filter sets.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionBuilder {
    filters: FilterSet,
}

impl SubscriptionBuilder {
    /// Create a new subscription builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter to the subscription.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a filter for specific event kinds.
    pub fn kinds(self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.filter(Filter::new().kinds(kinds))
    }

    /// Add a filter for events from specific authors.
    pub fn authors(self, authors: Vec<String>) -> Self {
        self.filter(Filter::new().authors(authors))
    }

    /// Add a filter for events that reference a pubkey, e.g. direct messages to it.
    pub fn mentions(self, pubkey: impl Into<String>) -> Self {
        self.filter(Filter::new().pubkey_refs([pubkey.into()]))
    }

    /// Build the filter set.
    pub fn build(self) -> FilterSet {
        self.filters
    }

    /// Build a subscription with a generated id.
    pub fn subscribe(self) -> Subscription {
        Subscription {
            id: generate_subscription_id(),
            filters: self.filters,
        }
    }
}
