//! A single trackable occurrence and its integrity checksum.
//!
//! Events are built by an [`EventFactory`], which stamps them with the device context and
//! signs them once. The checksum travels with the event through the persisted queue and is
//! never recomputed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;
use uuid::Uuid;

mod checksum;
mod context;

pub use context::{EventContext, EventFactory};

/// SDK flavour tag sent with every event.
const FLAVOUR_TAG: &str = "r";

/// Errors raised while building or decoding events.
#[derive(Debug, Error)]
pub enum EventError {
    /// The event name is empty or only whitespace.
    #[error("event name must not be empty")]
    EmptyName,
    /// The event could not be serialized or deserialized.
    #[error("event serialization error: {0}")]
    Serialization(String),
}

/// How an event reaches the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum TransportMethod {
    /// A plain HTTP request from the SDK.
    DirectConnection,
    /// A page load inside a host-provided rendering surface (web view), which keeps cookies
    /// and can run fingerprinting scripts.
    EmbeddedRenderer,
}

/// Input for [`EventFactory::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    name: String,
    parameters: BTreeMap<String, String>,
    payload: Option<Vec<u8>>,
    requires_cookie: bool,
    requires_fingerprint: bool,
}

impl EventDraft {
    /// Starts a draft for an event called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds one parameter, replacing an earlier value for the same key.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Adds every parameter of `parameters`.
    #[must_use]
    pub fn parameters<K, V>(mut self, parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters
            .extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attaches an opaque payload, sent as the request body.
    #[must_use]
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Requires the delivery to keep the collector's session cookie.
    #[must_use]
    pub const fn requires_cookie(mut self, required: bool) -> Self {
        self.requires_cookie = required;
        self
    }

    /// Requires a device fingerprint computed inside the rendering surface.
    #[must_use]
    pub const fn requires_fingerprint(mut self, required: bool) -> Self {
        self.requires_fingerprint = required;
        self
    }
}

/// A checksummed, timestamped occurrence scheduled for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    name: String,
    parameters: BTreeMap<String, String>,
    payload: Option<Vec<u8>>,
    context: EventContext,
    method: TransportMethod,
    requires_cookie: bool,
    requires_fingerprint: bool,
    checksum: String,
}

impl Event {
    /// Unique id, used to remove exactly this event once delivered.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters, sorted by key.
    #[must_use]
    pub const fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Raw payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Context captured when the event was built.
    #[must_use]
    pub const fn context(&self) -> &EventContext {
        &self.context
    }

    /// Transport this event asks for.
    #[must_use]
    pub const fn method(&self) -> TransportMethod {
        self.method
    }

    /// Whether delivery must keep the collector's cookie.
    #[must_use]
    pub const fn requires_cookie(&self) -> bool {
        self.requires_cookie
    }

    /// Whether delivery must include a device fingerprint.
    #[must_use]
    pub const fn requires_fingerprint(&self) -> bool {
        self.requires_fingerprint
    }

    /// Checksum computed at construction.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Full query string for a delivery attempt made at `sent_at` (ms since the epoch).
    ///
    /// The send time is appended after the signed fields and is not covered by the
    /// checksum.
    #[must_use]
    pub fn to_query_string(&self, sent_at: u64) -> String {
        let mut query = form_urlencoded::Serializer::new(self.query_payload());
        query.append_pair("ct", &sent_at.to_string());
        query.append_pair("cs", &self.checksum);
        query.finish()
    }

    /// Encodes the event as CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if encoding fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, EventError> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| EventError::Serialization(err.to_string()))?;
        Ok(bytes)
    }

    /// Decodes an event written by [`Event::to_cbor`]. The checksum is restored, not
    /// recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if `bytes` is not a valid event.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, EventError> {
        ciborium::de::from_reader(bytes).map_err(|err| EventError::Serialization(err.to_string()))
    }

    /// The signed part of the query string.
    fn query_payload(&self) -> String {
        let context = &self.context;
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("en", &self.name);
        if self.requires_cookie {
            query.append_pair("sc", "1");
        }
        if self.requires_fingerprint {
            query.append_pair("gh", "1");
        }
        query
            .append_pair("lt", &context.created_at.to_string())
            .append_pair("av", &context.app_version)
            .append_pair("sv", &context.sdk_version)
            .append_pair("bu", &context.bundle_id)
            .append_pair("oi", &context.organization_id)
            .append_pair("uu", &context.device_id)
            .append_pair("es", FLAVOUR_TAG);
        if !self.parameters.is_empty() {
            query.append_pair("ep", &encode_parameters(&self.parameters));
        }
        query.finish()
    }
}

/// `k=v;k=v` with every key and value form-urlencoded.
fn encode_parameters(parameters: &BTreeMap<String, String>) -> String {
    parameters
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                form_urlencoded::byte_serialize(key.as_bytes()).collect::<String>(),
                form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>()
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parameters() {
        let parameters = BTreeMap::from([
            ("b".to_string(), "x y".to_string()),
            ("a".to_string(), "1;2=3".to_string()),
        ]);
        assert_eq!(encode_parameters(&parameters), "a=1%3B2%3D3;b=x+y");
    }

    #[test]
    fn test_draft_builder() {
        let draft = EventDraft::new("Purchase")
            .parameter("sku", "a")
            .parameters([("qty", "2"), ("sku", "b")])
            .payload(vec![1])
            .requires_cookie(true);

        assert_eq!(draft.name, "Purchase");
        assert_eq!(draft.parameters.get("sku").map(String::as_str), Some("b"));
        assert_eq!(draft.parameters.len(), 2);
        assert_eq!(draft.payload, Some(vec![1]));
        assert!(draft.requires_cookie);
        assert!(!draft.requires_fingerprint);
    }
}
