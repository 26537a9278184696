//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into
//! core services as `Arc<CoreConfig>`. The intent is to avoid reading
//! process-wide environment variables during request handling, which can
//! lead to inconsistent behaviour in multi-threaded runtimes and test
//! harnesses; the binaries read the environment, this type holds the
//! result.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ReportError, ReportResult};
use crate::source::RetryPolicy;

/// Deadline for fetches against the primary (discovery-resolved) source.
pub const DEFAULT_PRIMARY_DEADLINE: Duration = Duration::from_secs(10);
/// Deadline for fetches against the direct fallback source.
pub const DEFAULT_FALLBACK_DEADLINE: Duration = Duration::from_secs(5);
/// Consecutive failures that open a source's circuit.
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
/// How long an open circuit refuses calls.
pub const DEFAULT_BREAKER_COOL_DOWN: Duration = Duration::from_secs(30);

/// Where the report template is loaded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateLocation {
    /// Packaged template file on disk.
    File(PathBuf),
    /// Remote document embedding a `template: "..."` field.
    Remote(String),
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    primary_base_url: String,
    fallback_base_url: Option<String>,
    primary_deadline: Duration,
    fallback_deadline: Duration,
    retry: RetryPolicy,
    breaker_failure_threshold: u32,
    breaker_cool_down: Duration,
    template_location: TemplateLocation,
}

impl CoreConfig {
    /// Create a new `CoreConfig` with default timing knobs.
    pub fn new(
        primary_base_url: String,
        fallback_base_url: Option<String>,
        template_location: TemplateLocation,
    ) -> ReportResult<Self> {
        if primary_base_url.trim().is_empty() {
            return Err(ReportError::InvalidInput(
                "primary patient service url cannot be empty".into(),
            ));
        }
        if let Some(fallback) = &fallback_base_url {
            if fallback.trim().is_empty() {
                return Err(ReportError::InvalidInput(
                    "fallback patient service url cannot be empty when configured".into(),
                ));
            }
        }

        Ok(Self {
            primary_base_url,
            fallback_base_url,
            primary_deadline: DEFAULT_PRIMARY_DEADLINE,
            fallback_deadline: DEFAULT_FALLBACK_DEADLINE,
            retry: RetryPolicy::default(),
            breaker_failure_threshold: DEFAULT_BREAKER_THRESHOLD,
            breaker_cool_down: DEFAULT_BREAKER_COOL_DOWN,
            template_location,
        })
    }

    /// Override the per-source fetch deadlines.
    pub fn with_deadlines(mut self, primary: Duration, fallback: Duration) -> Self {
        self.primary_deadline = primary;
        self.fallback_deadline = fallback;
        self
    }

    /// Override the transport retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the breaker threshold and cool-down.
    pub fn with_breaker(mut self, failure_threshold: u32, cool_down: Duration) -> Self {
        self.breaker_failure_threshold = failure_threshold;
        self.breaker_cool_down = cool_down;
        self
    }

    pub fn primary_base_url(&self) -> &str {
        &self.primary_base_url
    }

    pub fn fallback_base_url(&self) -> Option<&str> {
        self.fallback_base_url.as_deref()
    }

    pub fn primary_deadline(&self) -> Duration {
        self.primary_deadline
    }

    pub fn fallback_deadline(&self) -> Duration {
        self.fallback_deadline
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn breaker_failure_threshold(&self) -> u32 {
        self.breaker_failure_threshold
    }

    pub fn breaker_cool_down(&self) -> Duration {
        self.breaker_cool_down
    }

    pub fn template_location(&self) -> &TemplateLocation {
        &self.template_location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TemplateLocation {
        TemplateLocation::File(PathBuf::from("templates/patient_report.txt"))
    }

    #[test]
    fn new_applies_reference_defaults() {
        let cfg = CoreConfig::new("http://patient-service:8082".into(), None, template())
            .expect("CoreConfig::new should succeed");

        assert_eq!(cfg.primary_deadline(), DEFAULT_PRIMARY_DEADLINE);
        assert_eq!(cfg.fallback_deadline(), DEFAULT_FALLBACK_DEADLINE);
        assert_eq!(cfg.breaker_failure_threshold(), DEFAULT_BREAKER_THRESHOLD);
        assert_eq!(cfg.breaker_cool_down(), DEFAULT_BREAKER_COOL_DOWN);
        assert_eq!(cfg.retry(), RetryPolicy::default());
        assert_eq!(cfg.fallback_base_url(), None);
    }

    #[test]
    fn rejects_empty_primary_url() {
        let err = CoreConfig::new("  ".into(), None, template())
            .expect_err("empty primary url should be rejected");
        assert!(matches!(err, ReportError::InvalidInput(_)));
    }

    #[test]
    fn rejects_empty_configured_fallback_url() {
        let err = CoreConfig::new(
            "http://patient-service:8082".into(),
            Some("".into()),
            template(),
        )
        .expect_err("empty fallback url should be rejected");
        assert!(matches!(err, ReportError::InvalidInput(_)));
    }

    #[test]
    fn overrides_apply() {
        let cfg = CoreConfig::new(
            "http://patient-service:8082".into(),
            Some("http://localhost:8082".into()),
            template(),
        )
        .expect("CoreConfig::new should succeed")
        .with_deadlines(Duration::from_secs(3), Duration::from_secs(4))
        .with_breaker(2, Duration::from_secs(5));

        assert_eq!(cfg.primary_deadline(), Duration::from_secs(3));
        assert_eq!(cfg.fallback_deadline(), Duration::from_secs(4));
        assert_eq!(cfg.breaker_failure_threshold(), 2);
        assert_eq!(cfg.breaker_cool_down(), Duration::from_secs(5));
        assert_eq!(cfg.fallback_base_url(), Some("http://localhost:8082"));
    }
}
