//! Common test utilities shared across integration tests.
#![allow(dead_code)]
#![allow(missing_docs)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tallykit_core::{
    crypto::DefaultCrypto,
    delivery::{DeliveryEngine, DeliveryOutcome, Transport, TransportSelector},
    event::{Event, EventDraft, EventFactory, TransportMethod},
    identity::IdentityRecord,
    storage::AtomicBlobStore,
    DeliveryConfig,
};

/// A transport that answers from a script, then delivers everything.
pub struct ScriptedTransport {
    method: TransportMethod,
    script: Mutex<VecDeque<DeliveryOutcome>>,
    fallback: DeliveryOutcome,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(method: TransportMethod, script: &[DeliveryOutcome]) -> Arc<Self> {
        Self::with_fallback(method, script, DeliveryOutcome::Delivered)
    }

    pub fn with_fallback(
        method: TransportMethod,
        script: &[DeliveryOutcome],
        fallback: DeliveryOutcome,
    ) -> Arc<Self> {
        Arc::new(Self {
            method,
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn direct(script: &[DeliveryOutcome]) -> Arc<Self> {
        Self::new(TransportMethod::DirectConnection, script)
    }

    /// Names of the events attempted, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn method(&self) -> TransportMethod {
        self.method
    }

    async fn deliver(&self, event: &Event) -> DeliveryOutcome {
        self.attempts.lock().unwrap().push(event.name().to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// A transport whose attempts never complete.
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    fn method(&self) -> TransportMethod {
        TransportMethod::DirectConnection
    }

    async fn deliver(&self, _event: &Event) -> DeliveryOutcome {
        std::future::pending().await
    }
}

pub fn factory() -> EventFactory {
    EventFactory::new(
        &IdentityRecord::new("ORG1", "device-1"),
        "secret",
        "com.example.app",
        "1.0.0",
        Arc::new(DefaultCrypto::new()),
    )
}

pub fn event(name: &str) -> Event {
    factory().build(EventDraft::new(name)).unwrap()
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis()
        .try_into()
        .unwrap()
}

pub fn engine(
    blob_store: Arc<dyn AtomicBlobStore>,
    direct: Arc<dyn Transport>,
    config: &DeliveryConfig,
) -> Arc<DeliveryEngine> {
    let selector =
        TransportSelector::new(direct, None, config.direct_failures_before_fallback);
    Arc::new(DeliveryEngine::new(blob_store, selector, config))
}

pub fn pending_names(engine: &DeliveryEngine) -> Vec<String> {
    engine
        .pending_events()
        .iter()
        .map(|event| event.name().to_string())
        .collect()
}
