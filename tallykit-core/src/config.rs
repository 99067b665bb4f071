use std::{fmt, time::Duration};

use url::Url;
use zeroize::Zeroizing;

use crate::error::TallyKitError;

/// Collector used when the host does not override it.
pub const DEFAULT_COLLECTOR_URL: &str = "https://collector.tallykit.dev/e/";

const ORGANIZATION_ID_LEN: usize = 4;
const THIRTY_DAYS_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Host configuration for a [`crate::TallyKit`] instance.
#[derive(Debug, Clone, uniffi::Record)]
pub struct TallyKitConfig {
    /// SDK key issued to the organization. The first four characters are the organization
    /// id, the remainder is the signing secret.
    pub sdk_key: String,
    /// Bundle identifier of the host application.
    pub bundle_id: String,
    /// Version string of the host application.
    pub app_version: String,
    /// Collector endpoint override. `None` uses [`DEFAULT_COLLECTOR_URL`].
    pub collector_url: Option<String>,
    /// Delivery tuning.
    pub delivery: DeliveryConfig,
}

impl TallyKitConfig {
    /// Builds a configuration with the default collector and delivery settings.
    #[must_use]
    pub fn new(
        sdk_key: impl Into<String>,
        bundle_id: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            sdk_key: sdk_key.into(),
            bundle_id: bundle_id.into(),
            app_version: app_version.into(),
            collector_url: None,
            delivery: DeliveryConfig::default(),
        }
    }

    /// Checks every field and returns the parsed SDK key and collector URL.
    ///
    /// # Errors
    ///
    /// * [`TallyKitError::InvalidSdkKey`] if the key is too short.
    /// * [`TallyKitError::InvalidConfig`] if the bundle id is empty, the collector URL does not
    ///   parse or is not HTTPS, or the delivery settings are inconsistent.
    pub fn validate(&self) -> Result<(SdkKey, Url), TallyKitError> {
        let sdk_key = SdkKey::parse(&self.sdk_key)?;
        if self.bundle_id.trim().is_empty() {
            return Err(TallyKitError::InvalidConfig(
                "bundle_id must not be empty".to_string(),
            ));
        }
        let collector = parse_collector_url(
            self.collector_url.as_deref().unwrap_or(DEFAULT_COLLECTOR_URL),
        )?;
        self.delivery.validate()?;
        Ok((sdk_key, collector))
    }
}

/// Collector URLs must be HTTPS. Plain HTTP is accepted for loopback hosts so the SDK can be
/// pointed at a local collector during development.
fn parse_collector_url(raw: &str) -> Result<Url, TallyKitError> {
    let url = Url::parse(raw).map_err(|err| {
        TallyKitError::InvalidConfig(format!("collector_url {raw:?}: {err}"))
    })?;
    let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    match url.scheme() {
        "https" => Ok(url),
        "http" if loopback => Ok(url),
        scheme => Err(TallyKitError::InvalidConfig(format!(
            "collector_url must use https, got {scheme}"
        ))),
    }
}

/// Tuning for the delivery engine. All durations are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct DeliveryConfig {
    /// Delay before the first attempt and after every success.
    pub base_delay_ms: u64,
    /// Ceiling for the doubling delay after failures.
    pub max_delay_ms: u64,
    /// Delay between attempts while flushing inside a background window.
    pub background_delay_ms: u64,
    /// Timeout for a single direct request.
    pub request_timeout_ms: u64,
    /// Consecutive direct failures of the same event before the embedded renderer is tried.
    pub direct_failures_before_fallback: u32,
    /// Maximum pending events. Enqueueing beyond it drops the oldest. `0` disables the limit.
    pub max_queue_len: u64,
    /// Events older than this are dropped when they reach the head. `0` disables expiry.
    pub max_event_age_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
            background_delay_ms: 100,
            request_timeout_ms: 15_000,
            direct_failures_before_fallback: 3,
            max_queue_len: 1_000,
            max_event_age_ms: THIRTY_DAYS_MS,
        }
    }
}

impl DeliveryConfig {
    /// # Errors
    ///
    /// Returns [`TallyKitError::InvalidConfig`] if `base_delay_ms` is zero, `max_delay_ms` is
    /// below `base_delay_ms` or the request timeout is zero.
    pub fn validate(&self) -> Result<(), TallyKitError> {
        if self.base_delay_ms == 0 {
            return Err(TallyKitError::InvalidConfig(
                "base_delay_ms must be positive".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(TallyKitError::InvalidConfig(format!(
                "max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(TallyKitError::InvalidConfig(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Base inter-event delay.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff ceiling.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Inter-event delay inside a background window.
    #[must_use]
    pub const fn background_delay(&self) -> Duration {
        Duration::from_millis(self.background_delay_ms)
    }

    /// Direct request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Maximum event age, `None` when expiry is disabled.
    #[must_use]
    pub const fn max_event_age(&self) -> Option<Duration> {
        if self.max_event_age_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.max_event_age_ms))
        }
    }

    /// Maximum queue length, `None` when the limit is disabled.
    #[must_use]
    pub fn max_queue_len(&self) -> Option<usize> {
        if self.max_queue_len == 0 {
            None
        } else {
            Some(usize::try_from(self.max_queue_len).unwrap_or(usize::MAX))
        }
    }
}

/// A parsed SDK key: the organization id and the secret used for signing.
#[derive(Clone)]
pub struct SdkKey {
    organization_id: String,
    secret: Zeroizing<String>,
}

impl SdkKey {
    /// Splits `raw` into organization id and secret.
    ///
    /// # Errors
    ///
    /// Returns [`TallyKitError::InvalidSdkKey`] if `raw` has no characters after the
    /// four-character organization id.
    pub fn parse(raw: &str) -> Result<Self, TallyKitError> {
        let raw = raw.trim();
        let split = raw
            .char_indices()
            .nth(ORGANIZATION_ID_LEN)
            .map(|(index, _)| index)
            .ok_or_else(|| {
                TallyKitError::InvalidSdkKey(format!(
                    "expected more than {ORGANIZATION_ID_LEN} characters"
                ))
            })?;
        let (organization_id, secret) = raw.split_at(split);
        Ok(Self {
            organization_id: organization_id.to_string(),
            secret: Zeroizing::new(secret.to_string()),
        })
    }

    /// Organization id (public part of the key).
    #[must_use]
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// Signing secret (private part of the key).
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for SdkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkKey")
            .field("organization_id", &self.organization_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}
