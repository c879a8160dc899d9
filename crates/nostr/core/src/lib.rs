//! Nostr protocol primitives for OpenAgents.
//!
//! This crate provides:
//! - NIP-01: Events, canonical serialization, signing and verification
//! - NIP-01: Subscription filters and filter sets with matching
//! - NIP-04: Encrypted direct message event construction (payload encryption is left to the caller)
//!
//! Everything here is pure: no I/O, no async. Relay connections live in
//! `nostr-client`.

mod filter;
mod nip01;


// NIP-01: Events and keys
pub use nip01::{
    Event, EventTemplate, KIND_CONTACTS, KIND_DELETE, KIND_ENCRYPTED_DIRECT_MESSAGE,
    KIND_METADATA, KIND_RECOMMEND_RELAY, KIND_SHORT_TEXT_NOTE, Nip01Error, finalize_event,
    generate_secret_key, get_event_hash, get_public_key, get_public_key_hex, serialize_event,
    verify_event,
};

// NIP-01: Filters
pub use filter::{Filter, FilterSet, TAG_PREFIX};
