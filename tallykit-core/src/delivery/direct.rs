use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::transport::{DeliveryOutcome, Transport, TransportError};
use crate::{
    event::{Event, TransportMethod},
    http_request::Request,
    utils::now_millis,
};

/// Sends events to the collector with a plain HTTP request.
///
/// Events without a payload are sent as a GET with the signed query string. Events with a
/// payload are POSTed with the payload as the body.
pub struct DirectConnection {
    request: Request,
    endpoint: Url,
}

impl DirectConnection {
    /// Creates a connection to `endpoint` identifying itself as `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the HTTP client cannot be initialized.
    pub fn new(
        endpoint: Url,
        organization_id: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            request: Request::new(timeout, organization_id)?,
            endpoint,
        })
    }

    async fn send(&self, event: &Event) -> Result<(), TransportError> {
        let mut url = self.endpoint.clone();
        url.set_query(Some(&event.to_query_string(now_millis())));

        let builder = match event.payload() {
            Some(payload) => self.request.post(url).body(payload.to_vec()),
            None => self.request.get(url),
        };
        self.request.handle(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for DirectConnection {
    fn method(&self) -> TransportMethod {
        TransportMethod::DirectConnection
    }

    async fn deliver(&self, event: &Event) -> DeliveryOutcome {
        log::trace!("direct delivery of {} ({})", event.id(), event.name());
        self.send(event).await.into()
    }
}
