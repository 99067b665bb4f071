use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use url::{form_urlencoded, Url};

use super::transport::{DeliveryOutcome, Transport, TransportError};
use crate::{
    event::{Event, TransportMethod},
    http_request::user_agent,
    utils::now_millis,
};

/// Result of a page load in the host's rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum RenderOutcome {
    /// The page finished loading.
    Loaded,
    /// The page could not be loaded.
    Failed {
        /// Host-provided description of the failure.
        reason: String,
    },
}

/// A host rendering surface (typically an off-screen web view) that loads collector URLs.
///
/// Loading through the renderer keeps the collector's cookies and lets its scripts compute
/// a device fingerprint, which a plain request cannot do.
#[uniffi::export(with_foreign)]
#[async_trait]
pub trait ContentRenderer: Send + Sync {
    /// Loads `url` with `user_agent` and reports whether the page finished loading.
    async fn load(&self, url: String, user_agent: String) -> RenderOutcome;
}

/// Delivers events by loading the collector URL in a [`ContentRenderer`].
///
/// A renderer cannot send a request body, so a payload is carried base64url-encoded in the
/// `pd` query parameter. A load that does not finish within the timeout counts as a failed
/// attempt.
pub struct EmbeddedRenderer {
    renderer: Arc<dyn ContentRenderer>,
    endpoint: Url,
    timeout: Duration,
}

impl EmbeddedRenderer {
    /// Creates a transport loading `endpoint` through `renderer`, giving up on a load after
    /// `timeout`.
    #[must_use]
    pub fn new(renderer: Arc<dyn ContentRenderer>, endpoint: Url, timeout: Duration) -> Self {
        Self {
            renderer,
            endpoint,
            timeout,
        }
    }

    fn url_for(&self, event: &Event, sent_at: u64) -> Url {
        let mut query = event.to_query_string(sent_at);
        if let Some(payload) = event.payload() {
            query = form_urlencoded::Serializer::new(query)
                .append_pair("pd", &URL_SAFE_NO_PAD.encode(payload))
                .finish();
        }
        let mut url = self.endpoint.clone();
        url.set_query(Some(&query));
        url
    }

    async fn send(&self, event: &Event) -> Result<(), TransportError> {
        let url = self.url_for(event, now_millis());
        let load = self.renderer.load(url.to_string(), user_agent());
        match tokio::time::timeout(self.timeout, load).await {
            Ok(RenderOutcome::Loaded) => Ok(()),
            Ok(RenderOutcome::Failed { reason }) => Err(TransportError::Renderer(reason)),
            Err(_) => Err(TransportError::Renderer("timed out".to_string())),
        }
    }
}

#[async_trait]
impl Transport for EmbeddedRenderer {
    fn method(&self) -> TransportMethod {
        TransportMethod::EmbeddedRenderer
    }

    async fn deliver(&self, event: &Event) -> DeliveryOutcome {
        log::trace!("embedded delivery of {} ({})", event.id(), event.name());
        self.send(event).await.into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        crypto::DefaultCrypto,
        event::{EventDraft, EventFactory},
        identity::IdentityRecord,
    };

    const TIMEOUT: Duration = Duration::from_secs(15);

    struct RecordingRenderer {
        outcome: RenderOutcome,
        loads: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ContentRenderer for RecordingRenderer {
        async fn load(&self, url: String, user_agent: String) -> RenderOutcome {
            self.loads.lock().unwrap().push((url, user_agent));
            self.outcome.clone()
        }
    }

    struct StalledRenderer;

    #[async_trait]
    impl ContentRenderer for StalledRenderer {
        async fn load(&self, _url: String, _user_agent: String) -> RenderOutcome {
            std::future::pending().await
        }
    }

    fn renderer(outcome: RenderOutcome) -> Arc<RecordingRenderer> {
        Arc::new(RecordingRenderer {
            outcome,
            loads: Mutex::new(Vec::new()),
        })
    }

    fn event(draft: EventDraft) -> Event {
        EventFactory::new(
            &IdentityRecord::new("ORG1", "device"),
            "secret",
            "com.example.app",
            "1.0",
            Arc::new(DefaultCrypto::new()),
        )
        .build(draft)
        .expect("event")
    }

    fn endpoint() -> Url {
        Url::parse("https://collector.example.com/e/").expect("url")
    }

    #[tokio::test]
    async fn test_loaded_is_delivered() {
        let host = renderer(RenderOutcome::Loaded);
        let transport = EmbeddedRenderer::new(host.clone(), endpoint(), TIMEOUT);
        let event = event(EventDraft::new("FirstLaunch").requires_cookie(true));

        assert_eq!(transport.deliver(&event).await, DeliveryOutcome::Delivered);

        let loads = host.loads.lock().unwrap();
        assert_eq!(loads.len(), 1);
        let (url, agent) = &loads[0];
        assert!(url.starts_with("https://collector.example.com/e/?en=FirstLaunch&sc=1&"));
        assert!(url.ends_with(event.checksum()));
        assert_eq!(agent, &user_agent());
    }

    #[tokio::test]
    async fn test_failure_is_retryable() {
        let host = renderer(RenderOutcome::Failed {
            reason: "offline".to_string(),
        });
        let transport = EmbeddedRenderer::new(host, endpoint(), TIMEOUT);
        let event = event(EventDraft::new("FirstLaunch").requires_fingerprint(true));
        assert_eq!(transport.deliver(&event).await, DeliveryOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_load_times_out_as_failure() {
        let transport = EmbeddedRenderer::new(Arc::new(StalledRenderer), endpoint(), TIMEOUT);
        let event = event(EventDraft::new("FirstLaunch").requires_cookie(true));

        let started = tokio::time::Instant::now();
        assert_eq!(transport.deliver(&event).await, DeliveryOutcome::Failed);
        assert!(started.elapsed() >= TIMEOUT);
    }

    #[test]
    fn test_payload_travels_in_query() {
        let transport =
            EmbeddedRenderer::new(renderer(RenderOutcome::Loaded), endpoint(), TIMEOUT);
        let event = event(EventDraft::new("Upload").payload(vec![0xfb, 0xff]));
        let url = transport.url_for(&event, 7);
        assert!(url.as_str().ends_with("&pd=-_8"));
        assert!(url.as_str().contains("&ct=7&"));
    }
}
