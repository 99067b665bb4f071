//! The `TallyKit` facade wires storage, identity, the event logger and the delivery engine
//! together for a host.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::runtime::Runtime;

use crate::{
    crypto::{CryptoProvider, DefaultCrypto},
    delivery::{
        BackgroundTask, BackgroundTaskHost, ContentRenderer, DeliveryEngine, DeliveryStats,
        DirectConnection, EmbeddedRenderer, FlushReport, Transport, TransportSelector,
    },
    event::{Event, EventDraft, EventFactory},
    event_logger::EventLogger,
    identity::{IdentityResolver, LaunchType, Resolution},
    storage::{SharedStorageProvider, StorageBroker},
    TallyKitConfig, TallyKitError,
};

/// An embedded telemetry pipeline for one host application.
///
/// Construction resolves the device identity, reports the launch and starts the delivery
/// loop on a runtime owned by the instance. Dropping the instance stops the loop; pending
/// events stay persisted and are picked up by the next instance.
#[derive(uniffi::Object)]
pub struct TallyKit {
    resolution: Resolution,
    logger: EventLogger,
    engine: Arc<DeliveryEngine>,
    runtime: Option<Runtime>,
}

#[uniffi::export(async_runtime = "tokio")]
impl TallyKit {
    /// Starts the pipeline.
    ///
    /// `renderer` is the host's embedded rendering surface. Without it, events that need
    /// cookies or a fingerprint are sent directly. `crypto` overrides [`DefaultCrypto`].
    ///
    /// # Errors
    ///
    /// * [`TallyKitError::InvalidSdkKey`] or [`TallyKitError::InvalidConfig`] if `config` does
    ///   not validate.
    /// * [`TallyKitError::Runtime`] if the delivery runtime or HTTP client cannot be created.
    #[uniffi::constructor]
    pub fn new(
        config: TallyKitConfig,
        storage: Arc<dyn SharedStorageProvider>,
        renderer: Option<Arc<dyn ContentRenderer>>,
        crypto: Option<Arc<dyn CryptoProvider>>,
    ) -> Result<Self, TallyKitError> {
        let mut builder = Self::builder(config, storage);
        if let Some(renderer) = renderer {
            builder = builder.renderer(renderer);
        }
        if let Some(crypto) = crypto {
            builder = builder.crypto(crypto);
        }
        builder.build()
    }

    /// The device identifier in use for this process.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.resolution.record.identifier().to_string()
    }

    /// The identifier displaced from the own shared partition, if one ever was.
    #[must_use]
    pub fn previous_identifier(&self) -> Option<String> {
        self.resolution
            .record
            .previous_identifier()
            .map(ToString::to_string)
    }

    /// The organization id taken from the SDK key.
    #[must_use]
    pub fn organization_id(&self) -> String {
        self.resolution.record.organization_id().to_string()
    }

    /// How this launch was classified.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn launch_type(&self) -> LaunchType {
        self.resolution.launch_type
    }

    /// Builds and enqueues a host-defined event.
    ///
    /// # Errors
    ///
    /// Returns [`TallyKitError::InvalidEvent`] if `name` is empty or whitespace.
    pub fn log_event(
        &self,
        name: String,
        parameters: HashMap<String, String>,
        payload: Option<Vec<u8>>,
    ) -> Result<(), TallyKitError> {
        self.log_event_with_options(name, parameters, payload, false, false)
    }

    /// Builds and enqueues a host-defined event that may need the embedded renderer.
    ///
    /// # Errors
    ///
    /// Returns [`TallyKitError::InvalidEvent`] if `name` is empty or whitespace.
    pub fn log_event_with_options(
        &self,
        name: String,
        parameters: HashMap<String, String>,
        payload: Option<Vec<u8>>,
        requires_cookie: bool,
        requires_fingerprint: bool,
    ) -> Result<(), TallyKitError> {
        let mut draft = EventDraft::new(name)
            .parameters(parameters)
            .requires_cookie(requires_cookie)
            .requires_fingerprint(requires_fingerprint);
        if let Some(payload) = payload {
            draft = draft.payload(payload);
        }
        self.log(draft)
    }

    /// Reports that the user registered. Returns whether an event was enqueued.
    pub fn log_user_registered(&self) -> bool {
        self.logger.log_user_registered()
    }

    /// Reports the host's user id. Returns whether an event was enqueued.
    pub fn set_user_id(&self, user_id: &str) -> bool {
        self.logger.set_user_id(user_id)
    }

    /// Reports an in-app purchase.
    pub fn log_in_app_purchase(&self, product_id: &str, order_id: &str) {
        self.logger.log_in_app_purchase(product_id, order_id);
    }

    /// Reports a refunded in-app purchase.
    pub fn log_in_app_refund(&self, product_id: &str, order_id: &str) {
        self.logger.log_in_app_refund(product_id, order_id);
    }

    /// Reports a purchase made outside the store. `currency` is an ISO 4217 code.
    pub fn log_external_purchase(
        &self,
        product_id: &str,
        currency: &str,
        price: f64,
        quantity: i32,
    ) {
        self.logger
            .log_external_purchase(product_id, currency, price, quantity);
    }

    /// Reports a banner click.
    #[allow(clippy::needless_pass_by_value)]
    pub fn log_banner_click(&self, publisher: Option<String>) {
        self.logger.log_banner_click(publisher.as_deref());
    }

    /// Number of events waiting for delivery.
    #[must_use]
    pub fn pending_event_count(&self) -> u64 {
        self.engine.pending_count() as u64
    }

    /// Drops every pending event. Returns how many were dropped.
    pub fn clear_pending_events(&self) -> u64 {
        self.engine.clear() as u64
    }

    /// Delivery counters since construction.
    #[must_use]
    pub fn delivery_stats(&self) -> DeliveryStats {
        self.engine.stats()
    }

    /// Called when the host moves to the background.
    ///
    /// Pauses the continuous loop and flushes for at most `window_ms`, holding a grace
    /// period from `host` for the duration. Call [`TallyKit::app_did_become_active`] when
    /// the host returns to the foreground.
    pub async fn app_will_suspend(
        &self,
        window_ms: u64,
        host: Option<Arc<dyn BackgroundTaskHost>>,
    ) -> FlushReport {
        let _task = host.map(BackgroundTask::begin);
        self.engine
            .flush_within(Duration::from_millis(window_ms))
            .await
    }

    /// Called when the host returns to the foreground. Resumes the continuous loop.
    pub fn app_did_become_active(&self) {
        if self.engine.resume() {
            log::debug!("delivery loop resumed");
        }
    }

    /// Stops the delivery loop. Pending events stay persisted.
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}

impl TallyKit {
    /// Starts configuring an instance with more options than [`TallyKit::new`] offers.
    #[must_use]
    pub fn builder(
        config: TallyKitConfig,
        storage: Arc<dyn SharedStorageProvider>,
    ) -> TallyKitBuilder {
        TallyKitBuilder {
            config,
            storage,
            renderer: None,
            crypto: Arc::new(DefaultCrypto::new()),
            start_paused: false,
        }
    }

    /// Builds and enqueues an event from `draft`.
    ///
    /// # Errors
    ///
    /// Returns [`TallyKitError::InvalidEvent`] if the draft has no name.
    pub fn log(&self, draft: EventDraft) -> Result<(), TallyKitError> {
        Ok(self.logger.log(draft)?)
    }

    /// The identity resolution made at construction.
    #[must_use]
    pub const fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Pending events in delivery order.
    #[must_use]
    pub fn pending_events(&self) -> Vec<Event> {
        self.engine.pending_events()
    }

    /// The delivery engine, for hosts driving delivery themselves.
    #[must_use]
    pub fn engine(&self) -> Arc<DeliveryEngine> {
        Arc::clone(&self.engine)
    }
}

impl Drop for TallyKit {
    fn drop(&mut self) {
        self.engine.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Configures a [`TallyKit`] instance.
pub struct TallyKitBuilder {
    config: TallyKitConfig,
    storage: Arc<dyn SharedStorageProvider>,
    renderer: Option<Arc<dyn ContentRenderer>>,
    crypto: Arc<dyn CryptoProvider>,
    start_paused: bool,
}

impl TallyKitBuilder {
    /// Registers the host's embedded rendering surface.
    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn ContentRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Replaces [`DefaultCrypto`].
    #[must_use]
    pub fn crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    /// Starts with the continuous loop paused, so events are only delivered by explicit
    /// flushes until [`TallyKit::app_did_become_active`] is called.
    #[must_use]
    pub const fn start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    /// Validates the configuration, resolves the identity, reports the launch and starts the
    /// delivery loop.
    ///
    /// # Errors
    ///
    /// See [`TallyKit::new`].
    pub fn build(self) -> Result<TallyKit, TallyKitError> {
        let (sdk_key, collector) = self.config.validate()?;
        let delivery = self.config.delivery;

        let broker = Arc::new(StorageBroker::new(self.storage));
        let resolution = IdentityResolver::new(
            Arc::clone(&broker),
            Arc::clone(&self.crypto),
            sdk_key.organization_id(),
        )
        .resolve();
        log::info!(
            "tallykit {} started for {}: {} launch",
            crate::SDK_VERSION,
            self.config.bundle_id,
            resolution.launch_type
        );
        if let Some(conflict) = &resolution.conflict {
            log::warn!(
                "identity conflict ({}), {} candidate(s), adopted {}",
                conflict.kind,
                conflict.candidates,
                conflict.adopted
            );
        }

        let direct: Arc<dyn Transport> = Arc::new(
            DirectConnection::new(
                collector.clone(),
                sdk_key.organization_id(),
                delivery.request_timeout(),
            )
            .map_err(|err| TallyKitError::Runtime(err.to_string()))?,
        );
        let embedded = self.renderer.map(|renderer| -> Arc<dyn Transport> {
            Arc::new(EmbeddedRenderer::new(
                renderer,
                collector,
                delivery.request_timeout(),
            ))
        });
        let selector =
            TransportSelector::new(direct, embedded, delivery.direct_failures_before_fallback);
        let engine = Arc::new(DeliveryEngine::new(
            broker.queue_blob_store(),
            selector,
            &delivery,
        ));
        if self.start_paused {
            engine.pause();
        }

        let factory = EventFactory::new(
            &resolution.record,
            sdk_key.secret(),
            self.config.bundle_id.as_str(),
            self.config.app_version.as_str(),
            self.crypto,
        );
        let logger = EventLogger::new(factory, Arc::clone(&engine), broker);
        logger.log_launch(&resolution);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tallykit-delivery")
            .enable_all()
            .build()
            .map_err(|err| TallyKitError::Runtime(err.to_string()))?;
        let looping = Arc::clone(&engine);
        runtime.spawn(async move { looping.run().await });

        Ok(TallyKit {
            resolution,
            logger,
            engine,
            runtime: Some(runtime),
        })
    }
}
