use std::sync::Arc;

use crate::{
    delivery::DeliveryEngine,
    event::{EventDraft, EventError, EventFactory},
    identity::{LaunchType, Resolution},
    storage::{StorageBroker, USER_ID_KEY, USER_REGISTERED_KEY},
};

/// Names of the events the SDK reports on its own.
pub mod names {
    /// First launch of the app on this device.
    pub const FIRST_LAUNCH: &str = "FirstLaunch";
    /// Launch after the identifier was recovered from shared storage.
    pub const REINSTALL_LAUNCH: &str = "ReinstallLaunch";
    /// Launch with disagreeing local and shared identifiers.
    pub const TAMPERED_LAUNCH: &str = "TamperedLaunch";
    /// The identifier in the own shared partition was replaced.
    pub const CHANGED_ID: &str = "ChangedID";
    /// The user registered in the host app. Reported once per install.
    pub const USER_REGISTERED: &str = "UserRegistered";
    /// The host app's own user id. Reported when it changes.
    pub const USER_ID: &str = "UserID";
    /// An in-app purchase or refund.
    pub const IN_APP_PURCHASE: &str = "InAppPurchase";
    /// A purchase made outside the app store.
    pub const EXTERNAL_PURCHASE: &str = "ExternalPurchase";
    /// A click on a banner.
    pub const BANNER_CLICK: &str = "BannerClick";
}

/// Builds the well-known events and hands them to the delivery engine.
///
/// None of the logging methods fail: a problem building or recording an event is logged.
pub struct EventLogger {
    factory: EventFactory,
    engine: Arc<DeliveryEngine>,
    broker: Arc<StorageBroker>,
}

impl EventLogger {
    /// Creates a logger enqueueing into `engine`, keeping its flags in `broker`.
    #[must_use]
    pub const fn new(
        factory: EventFactory,
        engine: Arc<DeliveryEngine>,
        broker: Arc<StorageBroker>,
    ) -> Self {
        Self {
            factory,
            engine,
            broker,
        }
    }

    /// The factory events are built with.
    #[must_use]
    pub const fn factory(&self) -> &EventFactory {
        &self.factory
    }

    /// Builds and enqueues a host-defined event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyName`] if the draft has no name.
    pub fn log(&self, draft: EventDraft) -> Result<(), EventError> {
        let event = self.factory.build(draft)?;
        self.engine.enqueue(event);
        Ok(())
    }

    /// Reports the launch classification and any identifier change found at startup.
    pub fn log_launch(&self, resolution: &Resolution) {
        let candidates = resolution
            .conflict
            .as_ref()
            .map(|conflict| conflict.candidates.to_string());
        match resolution.launch_type {
            LaunchType::Normal => {}
            LaunchType::First => self.emit(
                EventDraft::new(names::FIRST_LAUNCH)
                    .requires_cookie(true)
                    .requires_fingerprint(true),
            ),
            LaunchType::Reinstall => self.emit(
                EventDraft::new(names::REINSTALL_LAUNCH)
                    .parameters(candidates.map(|count| ("candidates", count))),
            ),
            LaunchType::Tampered => {
                let mut draft = EventDraft::new(names::TAMPERED_LAUNCH);
                if let Some(conflict) = &resolution.conflict {
                    draft = draft
                        .parameter("conflict", conflict.kind.to_string())
                        .parameter("candidates", conflict.candidates.to_string());
                    if let Some(local) = &conflict.local {
                        draft = draft.parameter("local", local.clone());
                    }
                }
                self.emit(draft);
            }
        }

        if let Some(previous) = &resolution.changed_from {
            self.emit(
                EventDraft::new(names::CHANGED_ID)
                    .parameter("old", previous.clone())
                    .parameter("new", resolution.record.identifier()),
            );
        }
    }

    /// Reports that the user registered. Only the first call per install sends an event.
    /// Returns whether an event was enqueued.
    pub fn log_user_registered(&self) -> bool {
        match self.broker.read(self.broker.private(), USER_REGISTERED_KEY) {
            Ok(Some(_)) => {
                log::info!("user already marked as registered");
                return false;
            }
            Ok(None) => {}
            Err(err) => log::warn!("could not read registration flag: {err}"),
        }
        if let Err(err) = self
            .broker
            .write(self.broker.private(), USER_REGISTERED_KEY, b"1")
        {
            log::warn!("could not persist registration flag: {err}");
        }
        self.emit(EventDraft::new(names::USER_REGISTERED));
        true
    }

    /// Reports the host app's own user id. Empty ids and repeats of the last reported id are
    /// ignored. Returns whether an event was enqueued.
    pub fn set_user_id(&self, user_id: &str) -> bool {
        if user_id.is_empty() {
            return false;
        }
        match self.broker.read(self.broker.private(), USER_ID_KEY) {
            Ok(Some(stored)) if stored == user_id.as_bytes() => {
                log::info!("user id already reported");
                return false;
            }
            Ok(_) => {}
            Err(err) => log::warn!("could not read stored user id: {err}"),
        }
        if let Err(err) = self
            .broker
            .write(self.broker.private(), USER_ID_KEY, user_id.as_bytes())
        {
            log::warn!("could not persist user id: {err}");
        }
        self.emit(EventDraft::new(names::USER_ID).parameter("id", user_id));
        true
    }

    /// Reports an in-app purchase.
    pub fn log_in_app_purchase(&self, product_id: &str, order_id: &str) {
        self.in_app(product_id, order_id, "1");
    }

    /// Reports a refunded in-app purchase.
    pub fn log_in_app_refund(&self, product_id: &str, order_id: &str) {
        self.in_app(product_id, order_id, "-1");
    }

    fn in_app(&self, product_id: &str, order_id: &str, quantity: &str) {
        self.emit(
            EventDraft::new(names::IN_APP_PURCHASE)
                .parameter("productID", product_id)
                .parameter("orderID", order_id)
                .parameter("quantity", quantity),
        );
    }

    /// Reports a purchase made outside the store. `currency` is an ISO 4217 code.
    pub fn log_external_purchase(
        &self,
        product_id: &str,
        currency: &str,
        price: f64,
        quantity: i32,
    ) {
        self.emit(
            EventDraft::new(names::EXTERNAL_PURCHASE)
                .parameter("productID", product_id)
                .parameter("currency", currency.trim().to_ascii_uppercase())
                .parameter("price", price.to_string())
                .parameter("quantity", quantity.to_string()),
        );
    }

    /// Reports a banner click, optionally naming its publisher.
    pub fn log_banner_click(&self, publisher: Option<&str>) {
        self.emit(
            EventDraft::new(names::BANNER_CLICK)
                .parameters(publisher.map(|publisher| ("publisher", publisher))),
        );
    }

    fn emit(&self, draft: EventDraft) {
        match self.factory.build(draft) {
            Ok(event) => self.engine.enqueue(event),
            Err(err) => log::error!("failed to build event: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DeliveryConfig,
        crypto::DefaultCrypto,
        delivery::{DeliveryOutcome, Transport, TransportSelector},
        event::{Event, TransportMethod},
        identity::{ConflictKind, IdentityConflict, IdentityRecord},
        storage::memory::{MemorySharedMedium, MemoryStorageProvider},
        storage::SharedStorageProvider,
    };
    use async_trait::async_trait;

    struct Never;

    #[async_trait]
    impl Transport for Never {
        fn method(&self) -> TransportMethod {
            TransportMethod::DirectConnection
        }

        async fn deliver(&self, _event: &Event) -> DeliveryOutcome {
            DeliveryOutcome::Failed
        }
    }

    fn logger(provider: &MemoryStorageProvider) -> EventLogger {
        let factory = EventFactory::new(
            &IdentityRecord::new("ORG1", "device"),
            "secret",
            "com.example.app",
            "1.0",
            Arc::new(DefaultCrypto::new()),
        );
        let engine = Arc::new(DeliveryEngine::new(
            provider.queue_blob_store(),
            TransportSelector::new(Arc::new(Never), None, 3),
            &DeliveryConfig::default(),
        ));
        let broker = Arc::new(StorageBroker::new(Arc::new(provider.relaunched())));
        EventLogger::new(factory, engine, broker)
    }

    fn names_of(logger: &EventLogger) -> Vec<String> {
        logger
            .engine
            .pending_events()
            .iter()
            .map(|event| event.name().to_string())
            .collect()
    }

    fn resolution(launch_type: LaunchType) -> Resolution {
        Resolution {
            record: IdentityRecord::new("ORG1", "device"),
            launch_type,
            conflict: None,
            changed_from: None,
        }
    }

    #[test]
    fn test_user_registered_once_per_install() {
        let medium = MemorySharedMedium::new();
        let provider = MemoryStorageProvider::new("app.a", &medium);
        assert!(logger(&provider).log_user_registered());
        assert!(!logger(&provider).log_user_registered());

        let reinstalled = provider.reinstalled();
        assert!(logger(&reinstalled).log_user_registered());
    }

    #[test]
    fn test_user_id_deduplicated() {
        let medium = MemorySharedMedium::new();
        let provider = MemoryStorageProvider::new("app.a", &medium);
        let logger = logger(&provider);
        assert!(!logger.set_user_id(""));
        assert!(logger.set_user_id("u-1"));
        assert!(!logger.set_user_id("u-1"));
        assert!(logger.set_user_id("u-2"));
        assert_eq!(names_of(&logger), vec!["UserID", "UserID"]);
    }

    #[test]
    fn test_launch_events() {
        let medium = MemorySharedMedium::new();
        let logger = logger(&MemoryStorageProvider::new("app.a", &medium));

        logger.log_launch(&resolution(LaunchType::Normal));
        assert!(names_of(&logger).is_empty());

        logger.log_launch(&resolution(LaunchType::First));
        let first = &logger.engine.pending_events()[0];
        assert_eq!(first.name(), "FirstLaunch");
        assert_eq!(first.method(), TransportMethod::EmbeddedRenderer);

        let mut tampered = resolution(LaunchType::Tampered);
        tampered.conflict = Some(IdentityConflict {
            kind: ConflictKind::ConflictingSharedValues,
            local: None,
            adopted: "device".to_string(),
            candidates: 2,
        });
        tampered.changed_from = Some("older".to_string());
        logger.log_launch(&tampered);

        let events = logger.engine.pending_events();
        assert_eq!(names_of(&logger), vec!["FirstLaunch", "TamperedLaunch", "ChangedID"]);
        assert_eq!(
            events[1].parameters().get("conflict").map(String::as_str),
            Some("conflicting_shared_values")
        );
        assert_eq!(
            events[2].parameters().get("old").map(String::as_str),
            Some("older")
        );
    }

    #[test]
    fn test_purchase_parameters() {
        let medium = MemorySharedMedium::new();
        let logger = logger(&MemoryStorageProvider::new("app.a", &medium));
        logger.log_in_app_refund("gold", "order-1");
        logger.log_external_purchase("room", " eur ", 129.5, 2);
        logger.log_banner_click(None);
        logger.log_banner_click(Some("acme"));

        let events = logger.engine.pending_events();
        assert_eq!(
            events[0].parameters().get("quantity").map(String::as_str),
            Some("-1")
        );
        let external = events[1].parameters();
        assert_eq!(external.get("currency").map(String::as_str), Some("EUR"));
        assert_eq!(external.get("price").map(String::as_str), Some("129.5"));
        assert_eq!(external.get("quantity").map(String::as_str), Some("2"));
        assert!(events[2].parameters().is_empty());
        assert_eq!(
            events[3].parameters().get("publisher").map(String::as_str),
            Some("acme")
        );
    }

    #[test]
    fn test_log_rejects_blank_name() {
        let medium = MemorySharedMedium::new();
        let logger = logger(&MemoryStorageProvider::new("app.a", &medium));
        assert!(matches!(
            logger.log(EventDraft::new(" ")),
            Err(EventError::EmptyName)
        ));
        assert!(logger.log(EventDraft::new("Custom")).is_ok());
        assert_eq!(names_of(&logger), vec!["Custom"]);
    }
}
