//! Subscription filters and their matching rules.
//!
//! A [`Filter`] is a conjunction of optional predicates; a [`FilterSet`] is a
//! disjunction of filters, which is what a `REQ` carries on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Event;

/// Prefix that marks a filter key as a tag query (`#e`, `#p`, ...).
pub const TAG_PREFIX: char = '#';

/// A single filter. Absent predicates are always satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event IDs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Event kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Authors (pubkeys)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Events at or after this timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Events at or before this timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Maximum number of stored events the relay should return.
    /// Informational only, never used for matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Tag queries keyed by wire name (`#e`, `#p`, ...)
    #[serde(flatten)]
    tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by event IDs.
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Filter by event kinds.
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Filter by authors.
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Require a tag named `name` carrying any of `values`.
    ///
    /// `name` may be given with or without the `#` prefix. Repeated calls for
    /// the same name extend its value set. An empty value set is ignored.
    pub fn tag<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self;
        }
        let key = format!("{}{}", TAG_PREFIX, name.trim_start_matches(TAG_PREFIX));
        let entry = self.tags.entry(key).or_default();
        for value in values {
            if !entry.contains(&value) {
                entry.push(value);
            }
        }
        self
    }

    /// Filter by referenced events (`#e` tags).
    pub fn event_refs<I, S>(self, event_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag("e", event_ids)
    }

    /// Filter by referenced pubkeys (`#p` tags).
    pub fn pubkey_refs<I, S>(self, pubkeys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag("p", pubkeys)
    }

    /// Values required for tag `name` (without the `#` prefix).
    pub fn tag_values(&self, name: &str) -> Option<&[String]> {
        self.tags
            .get(&format!("{}{}", TAG_PREFIX, name))
            .map(Vec::as_slice)
    }

    /// Tag queries as (name, values) pairs, names without the `#` prefix.
    pub fn tag_queries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tags.iter().filter_map(|(key, values)| {
            key.strip_prefix(TAG_PREFIX)
                .map(|name| (name, values.as_slice()))
        })
    }

    /// True if no predicate is set.
    pub fn is_empty(&self) -> bool {
        self.ids.is_none()
            && self.kinds.is_none()
            && self.authors.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.tag_queries().all(|(_, values)| values.is_empty())
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref ids) = self.ids
            && !ids.iter().any(|id| id == event.id())
        {
            return false;
        }

        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&event.kind)
        {
            return false;
        }

        if let Some(ref authors) = self.authors
            && !authors.iter().any(|author| *author == event.pubkey)
        {
            return false;
        }

        if let Some(since) = self.since
            && event.created_at < since
        {
            return false;
        }

        if let Some(until) = self.until
            && event.created_at > until
        {
            return false;
        }

        // Every requested tag name needs one event tag of that name whose
        // first value is in the requested set. Other tags are ignored.
        self.tag_queries()
            .filter(|(_, wanted)| !wanted.is_empty())
            .all(|(name, wanted)| {
                event.tags.iter().any(|tag| {
                    tag.first().is_some_and(|tag_name| tag_name == name)
                        && tag.get(1).is_some_and(|value| wanted.contains(value))
                })
            })
    }

    /// Wire representation, omitting absent predicates.
    pub fn to_json_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

/// An ordered list of filters combined with OR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(Vec<Filter>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Filter) {
        self.0.push(filter);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if any member filter matches. An empty set matches nothing.
    pub fn matches(&self, event: &Event) -> bool {
        self.0.iter().any(|filter| filter.matches(event))
    }

    /// Wire representation, one object per filter.
    pub fn to_json_array(&self) -> Vec<Value> {
        self.0.iter().map(Filter::to_json_value).collect()
    }
}

impl From<Filter> for FilterSet {
    fn from(filter: Filter) -> Self {
        Self(vec![filter])
    }
}

impl From<Vec<Filter>> for FilterSet {
    fn from(filters: Vec<Filter>) -> Self {
        Self(filters)
    }
}

impl FromIterator<Filter> for FilterSet {
    fn from_iter<T: IntoIterator<Item = Filter>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FilterSet {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
