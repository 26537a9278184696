//! Resilient patient resolution.
//!
//! Turns a patient id into a record via cache-then-network lookup:
//!
//! 1. Cache hit returns immediately; repeated requests for the same id
//!    cost zero remote calls.
//! 2. Cache miss fetches from the primary source under a bounded deadline.
//! 3. On failure (not-found, timeout, transport error) the configured
//!    fallback source is tried once under its own deadline. Each source is
//!    guarded by its own circuit breaker; an open breaker skips the network
//!    call entirely and moves straight to the next source.
//! 4. The first success populates the cache and is returned.
//! 5. Exhaustion distinguishes [`ResolveError::NotFound`] (some source
//!    definitively answered "no such patient") from
//!    [`ResolveError::Unavailable`] (every source was unreachable), so the
//!    shell can map them to different external outcomes.

use std::sync::Arc;
use std::time::Duration;

use report_types::PatientId;

use crate::breaker::CircuitBreaker;
use crate::cache::PatientCache;
use crate::error::ReportError;
use crate::patient::PatientRecord;
use crate::source::PatientSource;

/// Resolution failures surfaced to the report assembler.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no patient found with id: {0}")]
    NotFound(String),
    #[error("patient sources unavailable: {0}")]
    Unavailable(String),
}

impl From<ResolveError> for ReportError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(id) => ReportError::PatientNotFound(id),
            ResolveError::Unavailable(reason) => ReportError::Unavailable(reason),
        }
    }
}

/// A patient source paired with its breaker and fetch deadline.
pub struct SourceBinding {
    source: Arc<dyn PatientSource>,
    breaker: CircuitBreaker,
    deadline: Duration,
}

impl SourceBinding {
    pub fn new(source: Arc<dyn PatientSource>, breaker: CircuitBreaker, deadline: Duration) -> Self {
        Self {
            source,
            breaker,
            deadline,
        }
    }

    /// Breaker guarding this source.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Deadline applied to each fetch against this source.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// Cache-first resolver over a primary source and an optional fallback.
pub struct ResilientResolver {
    cache: Arc<PatientCache>,
    primary: SourceBinding,
    fallback: Option<SourceBinding>,
}

impl ResilientResolver {
    pub fn new(
        cache: Arc<PatientCache>,
        primary: SourceBinding,
        fallback: Option<SourceBinding>,
    ) -> Self {
        Self {
            cache,
            primary,
            fallback,
        }
    }

    /// Primary source binding (breaker state is observable through it).
    pub fn primary(&self) -> &SourceBinding {
        &self.primary
    }

    /// Fallback source binding, if one is configured.
    pub fn fallback(&self) -> Option<&SourceBinding> {
        self.fallback.as_ref()
    }

    /// Resolves a patient record, consulting the cache first.
    pub async fn resolve(
        &self,
        id: &PatientId,
    ) -> Result<Arc<PatientRecord>, ResolveError> {
        if let Some(hit) = self.cache.get(id.as_str()) {
            tracing::debug!(patient_id = %id, "patient served from cache");
            return Ok(hit);
        }
        tracing::info!(patient_id = %id, "patient not cached, querying sources");

        let mut saw_not_found = false;
        let mut last_failure = String::from("no patient source answered");

        for binding in self.bindings() {
            let source_name = binding.source.name();
            if !binding.breaker.try_acquire() {
                tracing::warn!(
                    source = source_name,
                    patient_id = %id,
                    "circuit open, skipping source"
                );
                last_failure = format!("{source_name}: circuit open");
                continue;
            }

            match tokio::time::timeout(binding.deadline, binding.source.fetch_by_id(id)).await {
                Ok(Ok(Some(record))) => {
                    binding.breaker.record_success();
                    tracing::info!(source = source_name, patient_id = %id, "patient cached");
                    return Ok(self.cache.put(id.as_str(), record));
                }
                Ok(Ok(None)) => {
                    // A definitive miss still counts against the source: the
                    // breaker guards the whole fallback path, and every fetch
                    // outcome updates its counters.
                    binding.breaker.record_failure();
                    saw_not_found = true;
                    tracing::warn!(source = source_name, patient_id = %id, "patient not found");
                }
                Ok(Err(err)) => {
                    binding.breaker.record_failure();
                    last_failure = format!("{source_name}: {err}");
                    tracing::warn!(
                        source = source_name,
                        patient_id = %id,
                        error = %err,
                        "source failed"
                    );
                }
                Err(_elapsed) => {
                    // The fetch future is dropped here; whatever the source
                    // eventually produces is discarded.
                    binding.breaker.record_failure();
                    last_failure =
                        format!("{source_name}: timed out after {:?}", binding.deadline);
                    tracing::warn!(
                        source = source_name,
                        patient_id = %id,
                        deadline = ?binding.deadline,
                        "fetch deadline elapsed"
                    );
                }
            }
        }

        if saw_not_found {
            Err(ResolveError::NotFound(id.to_string()))
        } else {
            Err(ResolveError::Unavailable(last_failure))
        }
    }

    fn bindings(&self) -> impl Iterator<Item = &SourceBinding> {
        std::iter::once(&self.primary).chain(self.fallback.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use crate::source::MockPatientSource;

    const DEADLINE: Duration = Duration::from_millis(200);

    fn id(raw: &str) -> PatientId {
        PatientId::new(raw).expect("test id should be valid")
    }

    fn binding(source: Arc<MockPatientSource>, threshold: u32) -> SourceBinding {
        let name = source.name().to_string();
        SourceBinding::new(
            source,
            CircuitBreaker::new(name, threshold, Duration::from_secs(60)),
            DEADLINE,
        )
    }

    fn record(raw_id: &str) -> PatientRecord {
        PatientRecord {
            first_name: Some("Ana".into()),
            last_name: Some("Gomez".into()),
            ..PatientRecord::new(raw_id)
        }
    }

    #[tokio::test]
    async fn repeated_resolves_hit_cache_with_zero_extra_remote_calls() {
        let primary = Arc::new(MockPatientSource::named("primary").with_record(record("p-1")));
        let resolver = ResilientResolver::new(
            Arc::new(PatientCache::new()),
            binding(primary.clone(), 5),
            None,
        );

        let first = resolver.resolve(&id("p-1")).await.expect("first resolve should succeed");
        let second = resolver.resolve(&id("p-1")).await.expect("second resolve should succeed");

        assert!(Arc::ptr_eq(&first, &second), "second resolve should come from cache");
        assert_eq!(primary.calls(), 1, "cache hit must not touch the source");
    }

    #[tokio::test]
    async fn falls_back_to_secondary_and_counts_primary_failure() {
        let primary = Arc::new(MockPatientSource::named("primary"));
        let secondary = Arc::new(MockPatientSource::named("secondary").with_record(record("p-2")));
        let resolver = ResilientResolver::new(
            Arc::new(PatientCache::new()),
            binding(primary.clone(), 5),
            Some(binding(secondary.clone(), 5)),
        );

        let found = resolver.resolve(&id("p-2")).await.expect("fallback should supply the record");
        assert_eq!(found.id, "p-2");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
        assert_eq!(
            resolver.primary().breaker().consecutive_failures(),
            1,
            "primary miss should count exactly one failed attempt"
        );
        assert_eq!(resolver.fallback().map(|b| b.breaker().consecutive_failures()), Some(0));
    }

    #[tokio::test]
    async fn open_breaker_skips_the_network_call() {
        let primary = Arc::new(MockPatientSource::named("primary").failing());
        let resolver = ResilientResolver::new(
            Arc::new(PatientCache::new()),
            binding(primary.clone(), 2),
            None,
        );

        for _ in 0..2 {
            let err = resolver.resolve(&id("p-3")).await.expect_err("resolve should fail");
            assert!(matches!(err, ResolveError::Unavailable(_)));
        }
        assert_eq!(primary.calls(), 2);
        assert_eq!(resolver.primary().breaker().state(), BreakerState::Open);

        let err = resolver.resolve(&id("p-3")).await.expect_err("resolve should fail");
        match err {
            ResolveError::Unavailable(reason) => {
                assert!(reason.contains("circuit open"), "got: {reason}")
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(
            primary.calls(),
            2,
            "open breaker must short-circuit without a network call"
        );
    }

    #[tokio::test]
    async fn unknown_id_across_all_sources_is_not_found() {
        let primary = Arc::new(MockPatientSource::named("primary"));
        let secondary = Arc::new(MockPatientSource::named("secondary"));
        let resolver = ResilientResolver::new(
            Arc::new(PatientCache::new()),
            binding(primary, 5),
            Some(binding(secondary, 5)),
        );

        let err = resolver.resolve(&id("ghost")).await.expect_err("resolve should fail");
        assert!(
            matches!(err, ResolveError::NotFound(_)),
            "reachable sources answering 'absent' must classify as NotFound, got {err:?}"
        );
    }

    #[tokio::test]
    async fn transport_failure_with_definitive_miss_still_classifies_not_found() {
        let primary = Arc::new(MockPatientSource::named("primary").failing());
        let secondary = Arc::new(MockPatientSource::named("secondary"));
        let resolver = ResilientResolver::new(
            Arc::new(PatientCache::new()),
            binding(primary, 5),
            Some(binding(secondary, 5)),
        );

        let err = resolver.resolve(&id("ghost")).await.expect_err("resolve should fail");
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_exceeding_deadline_returns_unavailable_without_hanging() {
        let primary = Arc::new(
            MockPatientSource::named("primary")
                .with_record(record("p-9"))
                .with_delay(Duration::from_secs(60)),
        );
        let resolver = ResilientResolver::new(
            Arc::new(PatientCache::new()),
            binding(primary, 5),
            None,
        );

        let err = resolver.resolve(&id("p-9")).await.expect_err("resolve should time out");
        match err {
            ResolveError::Unavailable(reason) => {
                assert!(reason.contains("timed out"), "got: {reason}")
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(
            resolver.primary().breaker().consecutive_failures(),
            1,
            "timeout should count as a failed attempt"
        );
    }
}
