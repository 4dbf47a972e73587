//! Retrying coordination decorator.
//!
//! Wraps any [`Coordinator`] and retries retryable failures with exponential
//! backoff. Each attempt has its own deadline; a missed deadline counts as a
//! retryable [`CoordinationError::Timeout`].

use super::{CallKind, Coordinator, Extras, SeatRequest};
use crate::config::RetryPolicy;
use crate::errors::CoordinationError;
use crate::observability::metrics;
use std::future::Future;
use tracing::{debug, warn};

/// Coordinator that retries the inner coordinator according to a policy.
pub struct RetryingCoordinator<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: Coordinator> RetryingCoordinator<C> {
    #[must_use]
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn run<F, Fut>(
        &self,
        kind: CallKind,
        request: &SeatRequest,
        mut attempt_fn: F,
    ) -> Result<(), CoordinationError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<(), CoordinationError>> + Send,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = tokio::time::timeout(self.policy.attempt_timeout, attempt_fn())
                .await
                .unwrap_or(Err(CoordinationError::Timeout));

            match result {
                Ok(()) => {
                    debug!(
                        target: "live_room.coordination",
                        call = kind.as_str(),
                        room_id = %request.room_id,
                        seat_index = request.seat_index,
                        attempt,
                        "Coordination call succeeded"
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff_for(attempt);
                    warn!(
                        target: "live_room.coordination",
                        call = kind.as_str(),
                        room_id = %request.room_id,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Coordination call failed, retrying"
                    );
                    metrics::record_coordination_retry(kind.as_str());
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        target: "live_room.coordination",
                        call = kind.as_str(),
                        room_id = %request.room_id,
                        error = %e,
                        attempts = attempt,
                        "Coordination call failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<C: Coordinator> Coordinator for RetryingCoordinator<C> {
    async fn send_invite(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        self.run(CallKind::Invite, request, || self.inner.send_invite(request))
            .await
    }

    async fn send_acceptance(
        &self,
        request: &SeatRequest,
        extras: &Extras,
    ) -> Result<(), CoordinationError> {
        self.run(CallKind::Acceptance, request, || {
            self.inner.send_acceptance(request, extras)
        })
        .await
    }

    async fn send_rejection(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        self.run(CallKind::Rejection, request, || {
            self.inner.send_rejection(request)
        })
        .await
    }

    async fn send_force_end(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        self.run(CallKind::ForceEnd, request, || {
            self.inner.send_force_end(request)
        })
        .await
    }

    async fn send_self_end(&self, request: &SeatRequest) -> Result<(), CoordinationError> {
        self.run(CallKind::SelfEnd, request, || self.inner.send_self_end(request))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinator;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(1_000),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn request() -> SeatRequest {
        SeatRequest {
            room_id: "room-1".to_string(),
            seat_index: 1,
            from_user_id: "owner".to_string(),
            to_user_id: "u1".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_unavailable_then_succeeds() {
        let inner = InMemoryCoordinator::new();
        inner
            .push_outcome(
                CallKind::Invite,
                Err(CoordinationError::Unavailable("down".to_string())),
            )
            .await;
        inner
            .push_outcome(
                CallKind::Invite,
                Err(CoordinationError::Unavailable("down".to_string())),
            )
            .await;
        let coordinator = RetryingCoordinator::new(inner, policy());

        let result = coordinator.send_invite(&request()).await;

        assert!(result.is_ok());
        assert_eq!(coordinator.inner().calls_of(CallKind::Invite).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_is_not_retried() {
        let inner = InMemoryCoordinator::new();
        inner
            .push_outcome(
                CallKind::ForceEnd,
                Err(CoordinationError::Rejected("not owner".to_string())),
            )
            .await;
        let coordinator = RetryingCoordinator::new(inner, policy());

        let result = coordinator.send_force_end(&request()).await;

        assert!(matches!(result, Err(CoordinationError::Rejected(_))));
        assert_eq!(coordinator.inner().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let inner = InMemoryCoordinator::new();
        for _ in 0..5 {
            inner
                .push_outcome(
                    CallKind::SelfEnd,
                    Err(CoordinationError::Unavailable("down".to_string())),
                )
                .await;
        }
        let coordinator = RetryingCoordinator::new(inner, policy());

        let started = tokio::time::Instant::now();
        let result = coordinator.send_self_end(&request()).await;

        assert!(matches!(result, Err(CoordinationError::Unavailable(_))));
        assert_eq!(coordinator.inner().call_count(), 3);
        // Backoff of 100ms then 200ms between the three attempts.
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_retryable() {
        let inner = InMemoryCoordinator::new();
        inner.hold(CallKind::Acceptance).await;
        let coordinator = RetryingCoordinator::new(
            inner,
            RetryPolicy {
                max_attempts: 2,
                attempt_timeout: Duration::from_millis(500),
                ..policy()
            },
        );

        let result = coordinator
            .send_acceptance(&request(), &Extras::new())
            .await;

        assert_eq!(result, Err(CoordinationError::Timeout));
        assert_eq!(coordinator.inner().calls_of(CallKind::Acceptance).len(), 2);
    }
}
