//! Remote patient sources.
//!
//! A [`PatientSource`] is anything that can look up a patient record by id
//! over the network. The resolver treats sources uniformly through this
//! trait, so the primary (service-discovery resolved) and fallback (fixed
//! base URL) providers are the same type configured differently, and tests
//! swap in [`MockPatientSource`].
//!
//! Not-found is a normal answer (`Ok(None)`), not an error: the source
//! reached the service and the service knows the patient does not exist.
//! Errors describe transport and protocol failures only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use report_types::PatientId;

use crate::patient::PatientRecord;

/// Path under a source's base URL where patients are served.
const PATIENTS_PATH: &str = "/api/v1/patients";

/// Failures a source can surface to the resolver.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected status from patient service: {0}")]
    Status(u16),
    #[error("failed to decode patient payload: {0}")]
    Decode(String),
}

impl SourceError {
    /// Whether retrying the same call can plausibly succeed. Protocol
    /// failures (bad status, undecodable payload) are not transient.
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

/// A network-accessible provider of patient records.
#[async_trait]
pub trait PatientSource: Send + Sync {
    /// Source name used in logs and breaker transitions.
    fn name(&self) -> &str;

    /// Looks up a patient by id. `Ok(None)` means the source is healthy
    /// and the patient does not exist there.
    async fn fetch_by_id(&self, id: &PatientId)
        -> Result<Option<PatientRecord>, SourceError>;
}

/// Capped exponential backoff between transport-level retries:
/// `min(base * 2^attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delay to wait after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        doubled.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    /// Reference values: 3 attempts, 500 ms base, 2 s cap.
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_millis(2000))
    }
}

/// HTTP patient source backed by `reqwest`.
///
/// GETs `{base_url}/api/v1/patients/{id}`. 404 maps to `Ok(None)`; other
/// non-success statuses are protocol errors. Transport failures are retried
/// with capped exponential backoff; the backoff sleep is a plain
/// `tokio::time::sleep`, so dropping the fetch future (caller cancellation
/// or deadline) abandons the wait immediately instead of sleeping it out.
pub struct HttpPatientSource {
    name: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpPatientSource {
    /// Creates a source for the given base URL.
    ///
    /// The overall per-request deadline belongs to the resolver; this
    /// client only bounds connection establishment.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        retry: RetryPolicy,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry,
        })
    }

    /// Base URL this source targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn patient_url(&self, id: &PatientId) -> String {
        format!("{}{}/{}", self.base_url, PATIENTS_PATH, id)
    }

    async fn try_fetch(&self, url: &str) -> Result<Option<PatientRecord>, SourceError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(Duration::from_secs(2))
            } else {
                SourceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let record = response
            .json::<PatientRecord>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok(Some(record))
    }
}

#[async_trait]
impl PatientSource for HttpPatientSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_by_id(
        &self,
        id: &PatientId,
    ) -> Result<Option<PatientRecord>, SourceError> {
        let url = self.patient_url(id);
        let mut attempt = 0u32;
        loop {
            match self.try_fetch(&url).await {
                Ok(found) => {
                    tracing::debug!(
                        source = %self.name,
                        patient_id = %id,
                        found = found.is_some(),
                        "patient lookup completed"
                    );
                    return Ok(found);
                }
                Err(err) if err.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        source = %self.name,
                        patient_id = %id,
                        attempt,
                        error = %err,
                        "transient failure, backing off for {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// In-memory patient source for tests: returns configured records,
/// optionally failing or delaying every call, and counts invocations so
/// cache behaviour is observable.
#[derive(Default)]
pub struct MockPatientSource {
    name: String,
    records: HashMap<String, PatientRecord>,
    fail_transport: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockPatientSource {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Serves the given record, keyed by its id.
    pub fn with_record(mut self, record: PatientRecord) -> Self {
        self.records.insert(record.id.clone(), record);
        self
    }

    /// Every call fails with a transport error.
    pub fn failing(mut self) -> Self {
        self.fail_transport = true;
        self
    }

    /// Every call waits before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of lookups this source has served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatientSource for MockPatientSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_by_id(
        &self,
        id: &PatientId,
    ) -> Result<Option<PatientRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_transport {
            return Err(SourceError::Transport("simulated connection failure".into()));
        }
        Ok(self.records.get(id.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> PatientId {
        PatientId::new(raw).expect("test id should be valid")
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for(0), Duration::from_millis(500));
        assert_eq!(retry.delay_for(1), Duration::from_millis(1000));
        assert_eq!(retry.delay_for(2), Duration::from_millis(2000));
        assert_eq!(retry.delay_for(3), Duration::from_millis(2000), "cap applies");
        assert_eq!(retry.delay_for(30), Duration::from_millis(2000), "no overflow");
    }

    #[test]
    fn status_and_decode_errors_are_not_retryable() {
        assert!(SourceError::Transport("refused".into()).is_retryable());
        assert!(SourceError::Timeout(Duration::from_secs(2)).is_retryable());
        assert!(!SourceError::Status(500).is_retryable());
        assert!(!SourceError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn http_source_trims_trailing_slash_and_builds_url() {
        let source = HttpPatientSource::new(
            "patient-service",
            "http://localhost:8082/",
            RetryPolicy::default(),
        )
        .expect("client should build");

        assert_eq!(source.base_url(), "http://localhost:8082");
        assert_eq!(
            source.patient_url(&id("p-7")),
            "http://localhost:8082/api/v1/patients/p-7"
        );
    }

    #[tokio::test]
    async fn mock_source_serves_configured_record_and_counts_calls() {
        let source = MockPatientSource::named("mock")
            .with_record(PatientRecord::new("p-1"));

        let found = source
            .fetch_by_id(&id("p-1"))
            .await
            .expect("lookup should succeed");
        assert!(found.is_some());

        let missing = source
            .fetch_by_id(&id("p-2"))
            .await
            .expect("lookup should succeed");
        assert!(missing.is_none(), "unknown id should be a healthy not-found");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failing_mock_source_reports_transport_error() {
        let source = MockPatientSource::named("mock").failing();
        let err = source
            .fetch_by_id(&id("p-1"))
            .await
            .expect_err("lookup should fail");
        assert!(matches!(err, SourceError::Transport(_)));
    }
}
