use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{checksum, Event, EventDraft, EventError, TransportMethod};
use crate::{
    crypto::CryptoProvider,
    identity::{IdentityRecord, SigningKey},
    utils::now_millis,
    SDK_VERSION,
};

/// Device and application context captured when an event is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Organization id from the SDK key.
    pub organization_id: String,
    /// Device identifier resolved at launch.
    pub device_id: String,
    /// Bundle id of the host application.
    pub bundle_id: String,
    /// Version of the host application.
    pub app_version: String,
    /// Version of the SDK that built the event.
    pub sdk_version: String,
    /// Creation time, ms since the Unix epoch.
    pub created_at: u64,
}

/// Builds signed events for one device identity.
pub struct EventFactory {
    context: EventContext,
    signing_key: SigningKey,
    crypto: Arc<dyn CryptoProvider>,
}

impl EventFactory {
    /// Creates a factory for `identity`, signing with the key derived from `secret`.
    #[must_use]
    pub fn new(
        identity: &IdentityRecord,
        secret: &str,
        bundle_id: impl Into<String>,
        app_version: impl Into<String>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Self {
        let signing_key = identity.signing_key(secret, crypto.as_ref());
        Self {
            context: EventContext {
                organization_id: identity.organization_id().to_string(),
                device_id: identity.identifier().to_string(),
                bundle_id: bundle_id.into(),
                app_version: app_version.into(),
                sdk_version: SDK_VERSION.to_string(),
                created_at: 0,
            },
            signing_key,
            crypto,
        }
    }

    /// Builds an event from a name, parameters and an optional payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyName`] if `name` is empty or whitespace.
    pub fn create<K, V>(
        &self,
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = (K, V)>,
        payload: Option<Vec<u8>>,
    ) -> Result<Event, EventError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut draft = EventDraft::new(name).parameters(parameters);
        if let Some(payload) = payload {
            draft = draft.payload(payload);
        }
        self.build(draft)
    }

    /// Builds an event from `draft`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyName`] if the draft's name is empty or whitespace.
    pub fn build(&self, draft: EventDraft) -> Result<Event, EventError> {
        self.build_at(draft, now_millis())
    }

    /// Builds an event from `draft` with an explicit creation time.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyName`] if the draft's name is empty or whitespace.
    pub fn build_at(&self, draft: EventDraft, created_at: u64) -> Result<Event, EventError> {
        if draft.name.trim().is_empty() {
            return Err(EventError::EmptyName);
        }
        let method = if draft.requires_cookie || draft.requires_fingerprint {
            TransportMethod::EmbeddedRenderer
        } else {
            TransportMethod::DirectConnection
        };

        let mut event = Event {
            id: Uuid::new_v4(),
            name: draft.name,
            parameters: draft.parameters,
            payload: draft.payload,
            context: EventContext {
                created_at,
                ..self.context.clone()
            },
            method,
            requires_cookie: draft.requires_cookie,
            requires_fingerprint: draft.requires_fingerprint,
            checksum: String::new(),
        };
        event.checksum = checksum::compute(
            &event.query_payload(),
            event.payload(),
            self.signing_key.as_str(),
            self.crypto.as_ref(),
        );
        Ok(event)
    }

    /// Whether `event`'s checksum matches its content under this factory's signing key.
    #[must_use]
    pub fn verify(&self, event: &Event) -> bool {
        checksum::compute(
            &event.query_payload(),
            event.payload(),
            self.signing_key.as_str(),
            self.crypto.as_ref(),
        ) == event.checksum
    }

    /// Organization id stamped on every event.
    #[must_use]
    pub fn organization_id(&self) -> &str {
        &self.context.organization_id
    }

    /// Device identifier stamped on every event.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.context.device_id
    }
}
