//! NIP-01: Basic protocol flow description.
//!
//! This module implements the event data model and its integrity contract:
//! - Event structure (id, pubkey, created_at, kind, tags, content, sig)
//! - Canonical serialization for hashing
//! - Event signing with Schnorr signatures
//! - Event verification against the id recomputed from the current fields

use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::hashes::{Hash, sha256};
use bitcoin::secp256k1::{Keypair, Message, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey, schnorr};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during NIP-01 operations.
#[derive(Debug, Error)]
pub enum Nip01Error {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

const SIGNATURE_LEN: usize = 64;

pub const KIND_METADATA: u16 = 0;
pub const KIND_SHORT_TEXT_NOTE: u16 = 1;
pub const KIND_RECOMMEND_RELAY: u16 = 2;
pub const KIND_CONTACTS: u16 = 3;
pub const KIND_ENCRYPTED_DIRECT_MESSAGE: u16 = 4;
pub const KIND_DELETE: u16 = 5;

/// A Nostr event.
///
/// The id is derived from the other fields and computed eagerly on
/// construction. Fields stay public so that callers can build and edit
/// events, but [`Event::verify`] always recomputes the id, so any edit made
/// after signing is detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the serialized event data
    id: String,
    /// Hex-encoded public key of the event creator (32-byte x-only or 33-byte compressed)
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind (integer between 0 and 65535)
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-bytes lowercase hex-encoded Schnorr signature, absent until signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// Event template for building events before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl Event {
    /// Create a short text note authored by `pubkey`, stamped with the current time.
    pub fn new(pubkey: impl Into<String>, content: impl Into<String>) -> Self {
        let mut event = Self {
            id: String::new(),
            pubkey: pubkey.into(),
            created_at: unix_now(),
            kind: KIND_SHORT_TEXT_NOTE,
            tags: Vec::new(),
            content: content.into(),
            sig: None,
        };
        event.refresh_id();
        event
    }

    /// Create an unsigned event from a template.
    pub fn from_template(pubkey: impl Into<String>, template: &EventTemplate) -> Self {
        Self::new(pubkey, template.content.clone())
            .with_created_at(template.created_at)
            .with_kind(template.kind)
            .with_tags(template.tags.clone())
    }

    /// Create a kind-4 direct message carrying already-encrypted content.
    ///
    /// The recipient is referenced by a `p` tag; a reply references the
    /// event it answers with an `e` tag.
    pub fn encrypted_direct_message(
        sender_pubkey: impl Into<String>,
        recipient_pubkey: &str,
        encrypted_content: impl Into<String>,
        reply_to: Option<&str>,
    ) -> Self {
        let mut tags = vec![vec!["p".to_string(), recipient_pubkey.to_string()]];
        if let Some(event_id) = reply_to {
            tags.push(vec!["e".to_string(), event_id.to_string()]);
        }
        Self::new(sender_pubkey, encrypted_content)
            .with_kind(KIND_ENCRYPTED_DIRECT_MESSAGE)
            .with_tags(tags)
    }

    pub fn with_kind(mut self, kind: u16) -> Self {
        self.kind = kind;
        self.refresh_id();
        self
    }

    pub fn with_tags(mut self, tags: Vec<Vec<String>>) -> Self {
        self.tags = tags;
        self.refresh_id();
        self
    }

    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self.refresh_id();
        self
    }

    /// The id computed when the event was built, signed, or received.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_signed(&self) -> bool {
        self.sig.is_some()
    }

    /// Canonical serialization of the signed fields.
    pub fn serialize_canonical(&self) -> String {
        serialize_event(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Hash the current field values into an id, without storing it.
    pub fn compute_id(&self) -> String {
        get_event_hash(&self.serialize_canonical())
    }

    fn refresh_id(&mut self) {
        self.id = self.compute_id();
    }

    /// Sign the event with `secret_key`.
    ///
    /// The id is recomputed from the current fields first, so the signature
    /// always covers what the event holds right now. The secret key must
    /// own `pubkey`.
    pub fn sign(&mut self, secret_key: &[u8; 32]) -> Result<(), Nip01Error> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(secret_key).map_err(|e| Nip01Error::Signing(e.to_string()))?;
        let (xonly_pk, _parity) = sk.x_only_public_key(&secp);

        match parse_public_key(&self.pubkey)? {
            Some(author) if author == xonly_pk => {}
            _ => {
                return Err(Nip01Error::Precondition(
                    "secret key does not match event pubkey".to_string(),
                ));
            }
        }

        self.refresh_id();
        if self.id.is_empty() {
            return Err(Nip01Error::Precondition("event id is not computed".to_string()));
        }

        let message = id_message(&self.id)?;
        let keypair = Keypair::from_secret_key(&secp, &sk);
        let sig = secp.sign_schnorr_no_aux_rand(&message, &keypair);
        self.sig = Some(hex::encode(sig.serialize()));
        Ok(())
    }

    /// Verify the event's id and signature.
    ///
    /// Returns `Ok(false)` for an unsigned event, for a stored id that no
    /// longer matches the fields, and for a signature that does not verify.
    /// Errors are reserved for malformed encodings.
    pub fn verify(&self) -> Result<bool, Nip01Error> {
        let Some(sig_hex) = &self.sig else {
            return Ok(false);
        };

        let computed_id = self.compute_id();
        if computed_id != self.id {
            return Ok(false);
        }

        let sig_bytes = hex::decode(sig_hex)
            .map_err(|e| Nip01Error::InvalidHex(format!("invalid sig hex: {}", e)))?;
        if sig_bytes.len() != SIGNATURE_LEN {
            return Err(Nip01Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                sig_bytes.len()
            )));
        }
        let Ok(sig) = schnorr::Signature::from_slice(&sig_bytes) else {
            return Ok(false);
        };
        let Some(pubkey) = parse_public_key(&self.pubkey)? else {
            return Ok(false);
        };

        let secp = Secp256k1::verification_only();
        let message = id_message(&computed_id)?;
        Ok(secp.verify_schnorr(&sig, &message, &pubkey).is_ok())
    }
}

/// Generate a random 32-byte secret key.
pub fn generate_secret_key() -> [u8; 32] {
    let mut rng = rand::rng();
    loop {
        let mut key = [0u8; 32];
        rng.fill_bytes(&mut key);
        if SecretKey::from_slice(&key).is_ok() {
            return key;
        }
    }
}

/// Get the public key (x-only, 32 bytes) from a secret key.
pub fn get_public_key(secret_key: &[u8; 32]) -> Result<[u8; 32], Nip01Error> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(secret_key)
        .map_err(|e| Nip01Error::InvalidPublicKey(e.to_string()))?;
    let (xonly, _parity) = sk.x_only_public_key(&secp);
    Ok(xonly.serialize())
}

/// Get the public key as a hex string from a secret key.
pub fn get_public_key_hex(secret_key: &[u8; 32]) -> Result<String, Nip01Error> {
    Ok(hex::encode(get_public_key(secret_key)?))
}

/// Serialize the signed fields of an event for hashing.
///
/// Format: `[0, pubkey, created_at, kind, tags, content]` as compact JSON with
/// non-ASCII characters left unescaped.
pub fn serialize_event(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> String {
    let tags = tags
        .iter()
        .map(|tag| Value::Array(tag.iter().cloned().map(Value::String).collect()))
        .collect();

    Value::Array(vec![
        Value::from(0),
        Value::from(pubkey),
        Value::from(created_at),
        Value::from(kind),
        Value::Array(tags),
        Value::from(content),
    ])
    .to_string()
}

/// Get the event hash (id) of a canonical serialization.
pub fn get_event_hash(serialized: &str) -> String {
    let hash = sha256::Hash::hash(serialized.as_bytes());
    hex::encode(hash.as_byte_array())
}

/// Build and sign an event from a template, deriving the pubkey from the secret key.
pub fn finalize_event(
    template: &EventTemplate,
    secret_key: &[u8; 32],
) -> Result<Event, Nip01Error> {
    let pubkey = get_public_key_hex(secret_key).map_err(|e| Nip01Error::Signing(e.to_string()))?;
    let mut event = Event::from_template(pubkey, template);
    event.sign(secret_key)?;
    Ok(event)
}

/// Verify a received event's id and signature.
pub fn verify_event(event: &Event) -> Result<bool, Nip01Error> {
    event.verify()
}

/// Decode a 32-byte x-only or 33-byte compressed public key.
///
/// Returns `Ok(None)` for well-formed bytes that are not a curve point.
fn parse_public_key(pubkey: &str) -> Result<Option<XOnlyPublicKey>, Nip01Error> {
    let bytes = hex::decode(pubkey)
        .map_err(|e| Nip01Error::InvalidHex(format!("invalid pubkey hex: {}", e)))?;
    match bytes.len() {
        32 => Ok(XOnlyPublicKey::from_slice(&bytes).ok()),
        33 => Ok(PublicKey::from_slice(&bytes)
            .ok()
            .map(|pk| pk.x_only_public_key().0)),
        len => Err(Nip01Error::InvalidPublicKey(format!(
            "expected 32 or 33 bytes, got {}",
            len
        ))),
    }
}

fn id_message(id: &str) -> Result<Message, Nip01Error> {
    let id_bytes = hex::decode(id).map_err(|e| Nip01Error::InvalidHex(format!("invalid id hex: {}", e)))?;
    let digest: [u8; 32] = id_bytes
        .try_into()
        .map_err(|_| Nip01Error::InvalidEvent("event id must be 32 bytes".to_string()))?;
    Ok(Message::from_digest(digest))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
