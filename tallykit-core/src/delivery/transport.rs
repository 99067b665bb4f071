use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::event::{Event, TransportMethod};

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DeliveryOutcome {
    /// The collector accepted the event.
    Delivered,
    /// A transient failure; the event stays at the head and is retried.
    Failed,
    /// The collector permanently refused the event; it is dropped.
    Rejected,
}

/// Failures inside a transport. Always mapped to a [`DeliveryOutcome`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The collector could not be reached or did not answer in time.
    #[error("collector unreachable at {url}: {error}")]
    Unreachable {
        /// Requested URL.
        url: String,
        /// Underlying error.
        error: String,
    },
    /// The collector answered with a status worth retrying (408, 429, 5xx).
    #[error("collector at {url} answered {status}")]
    RetryableStatus {
        /// Requested URL.
        url: String,
        /// HTTP status.
        status: u16,
    },
    /// The collector refused the event (any other non-2xx status).
    #[error("collector at {url} rejected the event with {status}")]
    Rejected {
        /// Requested URL.
        url: String,
        /// HTTP status.
        status: u16,
    },
    /// The request could not be built or failed for another reason.
    #[error("request error: {0}")]
    Request(String),
    /// The host's renderer failed to load the page.
    #[error("renderer error: {0}")]
    Renderer(String),
}

impl TransportError {
    /// Outcome a failure maps to.
    #[must_use]
    pub const fn outcome(&self) -> DeliveryOutcome {
        match self {
            Self::Rejected { .. } => DeliveryOutcome::Rejected,
            _ => DeliveryOutcome::Failed,
        }
    }
}

impl From<Result<(), TransportError>> for DeliveryOutcome {
    fn from(result: Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => Self::Delivered,
            Err(err) => {
                log::debug!("delivery attempt failed: {err}");
                err.outcome()
            }
        }
    }
}

/// A way of shipping an event to the collector.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which method this transport implements.
    fn method(&self) -> TransportMethod;

    /// Makes one delivery attempt.
    async fn deliver(&self, event: &Event) -> DeliveryOutcome;
}

/// Chooses the transport for the head event.
pub struct TransportSelector {
    direct: Arc<dyn Transport>,
    embedded: Option<Arc<dyn Transport>>,
    failures_before_fallback: u32,
}

impl TransportSelector {
    /// Creates a selector. Without an `embedded` transport every event goes direct.
    #[must_use]
    pub fn new(
        direct: Arc<dyn Transport>,
        embedded: Option<Arc<dyn Transport>>,
        failures_before_fallback: u32,
    ) -> Self {
        Self {
            direct,
            embedded,
            failures_before_fallback,
        }
    }

    /// Transport for `event`, given how many direct attempts for it already failed in a row.
    ///
    /// Events asking for the embedded renderer get it when one is registered. Direct events
    /// move to the renderer once `failures_before_fallback` consecutive attempts have failed;
    /// a threshold of zero disables the fallback.
    #[must_use]
    pub fn select(&self, event: &Event, consecutive_failures: u32) -> &Arc<dyn Transport> {
        match (event.method(), &self.embedded) {
            (TransportMethod::EmbeddedRenderer, Some(embedded)) => embedded,
            (TransportMethod::EmbeddedRenderer, None) => {
                log::warn!(
                    "no renderer registered, sending {} ({}) directly",
                    event.id(),
                    event.name()
                );
                &self.direct
            }
            (TransportMethod::DirectConnection, Some(embedded))
                if self.failures_before_fallback > 0
                    && consecutive_failures >= self.failures_before_fallback =>
            {
                log::info!(
                    "falling back to renderer for {} after {consecutive_failures} direct failures",
                    event.id()
                );
                embedded
            }
            (TransportMethod::DirectConnection, _) => &self.direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::DefaultCrypto,
        event::{EventDraft, EventFactory},
        identity::IdentityRecord,
    };
    use test_case::test_case;

    struct Named(TransportMethod);

    #[async_trait]
    impl Transport for Named {
        fn method(&self) -> TransportMethod {
            self.0
        }

        async fn deliver(&self, _event: &Event) -> DeliveryOutcome {
            DeliveryOutcome::Delivered
        }
    }

    fn event(embedded: bool) -> Event {
        EventFactory::new(
            &IdentityRecord::new("ORG1", "device"),
            "secret",
            "com.example.app",
            "1.0",
            Arc::new(DefaultCrypto::new()),
        )
        .build(EventDraft::new("E").requires_cookie(embedded))
        .expect("event")
    }

    fn selector(with_renderer: bool, threshold: u32) -> TransportSelector {
        let embedded: Option<Arc<dyn Transport>> = if with_renderer {
            Some(Arc::new(Named(TransportMethod::EmbeddedRenderer)))
        } else {
            None
        };
        TransportSelector::new(
            Arc::new(Named(TransportMethod::DirectConnection)),
            embedded,
            threshold,
        )
    }

    #[test_case(false, true, 3, 0 => TransportMethod::DirectConnection; "direct event")]
    #[test_case(false, true, 3, 2 => TransportMethod::DirectConnection; "below threshold")]
    #[test_case(false, true, 3, 3 => TransportMethod::EmbeddedRenderer; "fallback at threshold")]
    #[test_case(false, true, 0, 9 => TransportMethod::DirectConnection; "fallback disabled")]
    #[test_case(false, false, 3, 9 => TransportMethod::DirectConnection; "no renderer to fall back to")]
    #[test_case(true, true, 3, 0 => TransportMethod::EmbeddedRenderer; "embedded event")]
    #[test_case(true, false, 3, 0 => TransportMethod::DirectConnection; "embedded without renderer")]
    fn test_select(
        embedded_event: bool,
        with_renderer: bool,
        threshold: u32,
        failures: u32,
    ) -> TransportMethod {
        selector(with_renderer, threshold)
            .select(&event(embedded_event), failures)
            .method()
    }

    #[test]
    fn test_error_outcomes() {
        let rejected = TransportError::Rejected {
            url: "u".to_string(),
            status: 400,
        };
        let retryable = TransportError::RetryableStatus {
            url: "u".to_string(),
            status: 503,
        };
        assert_eq!(DeliveryOutcome::from(Err(rejected)), DeliveryOutcome::Rejected);
        assert_eq!(DeliveryOutcome::from(Err(retryable)), DeliveryOutcome::Failed);
        assert_eq!(
            DeliveryOutcome::from(Err(TransportError::Renderer("x".to_string()))),
            DeliveryOutcome::Failed
        );
        assert_eq!(DeliveryOutcome::from(Ok(())), DeliveryOutcome::Delivered);
    }
}
