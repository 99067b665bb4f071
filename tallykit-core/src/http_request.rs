use std::time::Duration;

use reqwest::{redirect, Method, RequestBuilder, Response};
use url::Url;

use crate::delivery::TransportError;

const MAX_REDIRECTS: usize = 10;

/// A thin wrapper on an HTTP client for collector requests. Sets the timeout, the user agent
/// and the client identifier header, and classifies responses into retryable and permanent
/// failures. Retrying itself is left to the delivery loop.
pub struct Request {
    client: reqwest::Client,
    timeout: Duration,
    client_id: String,
}

impl Request {
    /// Initializes a new `Request` identifying itself as `client_id`.
    pub(crate) fn new(timeout: Duration, client_id: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|err| TransportError::Request(format!("http client: {err}")))?;
        Ok(Self {
            client,
            timeout,
            client_id: client_id.to_string(),
        })
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header("User-Agent", user_agent())
            .header("X-TallyKit-Client", &self.client_id)
    }

    /// Creates a GET request builder with defaults applied.
    pub(crate) fn get(&self, url: Url) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: Url) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Sends a request built by `get`/`post`. Only a 2xx response (after redirects) is `Ok`.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, TransportError> {
        let (client, request) = request_builder.build_split();
        let request = request.map_err(|err| {
            TransportError::Request(format!("request build failed: {err}"))
        })?;
        let url = request.url().to_string();

        match client.execute(request).await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if resp.status().is_success() {
                    Ok(resp)
                } else if status == 408 || status == 429 || (500..600).contains(&status) {
                    Err(TransportError::RetryableStatus { url, status })
                } else {
                    Err(TransportError::Rejected { url, status })
                }
            }
            Err(err) if err.is_timeout() || err.is_connect() => {
                Err(TransportError::Unreachable {
                    url,
                    error: err.to_string(),
                })
            }
            Err(err) => Err(TransportError::Request(format!("request to {url} failed: {err}"))),
        }
    }
}

/// `User-Agent` sent by the SDK, also handed to embedded renderers.
pub fn user_agent() -> String {
    format!("TallyKit/{}", env!("CARGO_PKG_VERSION"))
}
