use crate::models::ProviderOutcome;
use crate::providers::EmailProvider;
use async_trait::async_trait;
use failsafe::{backoff, failure_policy, CircuitBreaker, Config};
use std::sync::Arc;
use std::time::Duration;

pub const CIRCUIT_OPEN_REASON: &str = "circuit open, provider temporarily disabled";

/// Creates a circuit breaker for a paid email-discovery API.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failed lookups trigger OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, lookups pass through.
/// - **OPEN**: Too many failures, the provider is skipped without an HTTP call.
/// - **HALF_OPEN**: Testing if the provider recovered.
pub fn create_provider_circuit_breaker() -> impl CircuitBreaker + Send + Sync {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

/// Wraps a provider so repeated failures stop further calls for a while.
pub struct GuardedProvider<B> {
    inner: Arc<dyn EmailProvider>,
    breaker: B,
}

impl<B> GuardedProvider<B>
where
    B: CircuitBreaker + Send + Sync,
{
    pub fn new(inner: Arc<dyn EmailProvider>, breaker: B) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl<B> EmailProvider for GuardedProvider<B>
where
    B: CircuitBreaker + Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find_emails(&self, domain: &str) -> ProviderOutcome {
        if !self.breaker.is_call_permitted() {
            tracing::warn!(
                "Circuit open for provider {}, skipping lookup of {}",
                self.inner.name(),
                domain
            );
            return ProviderOutcome::failed(CIRCUIT_OPEN_REASON);
        }

        let outcome = self.inner.find_emails(domain).await;

        // Record the result; a rejection here only means the state flipped meanwhile.
        let succeeded = outcome.success;
        let _ = self
            .breaker
            .call(|| if succeeded { Ok(()) } else { Err(()) });

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_circuit_breaker_opens_after_failures() {
        let cb = create_provider_circuit_breaker();

        // Simulate 5 consecutive failures
        for _ in 0..5 {
            let result: Result<(), Error<&str>> = cb.call(|| Err::<(), &str>("simulated error"));
            assert!(result.is_err());
        }

        // Next call should be rejected (circuit is open)
        let result: Result<(), Error<&str>> = cb.call(|| Ok::<(), &str>(()));

        match result {
            Err(Error::Rejected) => {}
            _ => panic!("Expected circuit to be open and reject requests"),
        }
    }

    #[test]
    fn test_circuit_breaker_allows_success() {
        let cb = create_provider_circuit_breaker();

        let result: Result<i32, Error<&str>> = cb.call(|| Ok::<i32, &str>(42));

        assert_eq!(result.unwrap(), 42);
    }

    struct FailingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmailProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn find_emails(&self, _domain: &str) -> ProviderOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ProviderOutcome::failed("HTTP 500")
        }
    }

    #[tokio::test]
    async fn test_guarded_provider_skips_after_repeated_failures() {
        let inner = Arc::new(FailingProvider {
            calls: AtomicUsize::new(0),
        });
        let guarded = GuardedProvider::new(inner.clone(), create_provider_circuit_breaker());

        for _ in 0..5 {
            let outcome = guarded.find_emails("example.com").await;
            assert_eq!(outcome.error.as_deref(), Some("HTTP 500"));
        }

        let outcome = guarded.find_emails("example.com").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some(CIRCUIT_OPEN_REASON));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 5);
        assert_eq!(guarded.name(), "failing");
    }
}
