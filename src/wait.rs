//! The polling synchronization primitive.
//!
//! One engine, one loop: evaluate a condition once per tick up to a tick
//! budget, returning early the moment the condition lands on the awaited
//! side. A condition that is already satisfied costs a single evaluation
//! and zero sleeps; exhaustion costs `timeout` evaluations and
//! `timeout - 1` sleeps.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::trace;

use crate::errors::{PageError, Result};

/// How condition errors raised during polling are handled.
///
/// `Swallow` treats a raising condition as unmet for that tick. `Capture`
/// remembers the most recent error and rethrows it only at exhaustion, so a
/// condition that starts failing but later succeeds is not penalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    Swallow,
    Capture,
}

impl Default for OnError {
    fn default() -> Self {
        OnError::Swallow
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Duration of one polling tick.
    pub tick: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn tick(&self) -> Duration {
        self.config.tick
    }

    /// Poll `condition` once per tick for up to `timeout` ticks.
    ///
    /// With `reverse` false the wait succeeds when the condition turns
    /// true; with `reverse` true it succeeds when the condition turns
    /// false. The returned bool is the condition value that ended the
    /// wait — on exhaustion that is `reverse`, i.e. the logical negation
    /// of what was being awaited.
    ///
    /// A `timeout` of zero with a condition is a caller error and fails
    /// fast with `ConfigurationError`.
    pub async fn wait_until<F, Fut>(
        &self,
        timeout: u32,
        mut condition: F,
        reverse: bool,
        on_error: OnError,
    ) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        if timeout == 0 {
            return Err(PageError::ConfigurationError(
                "wait timeout must be at least one tick when a condition is supplied".to_string(),
            ));
        }

        let mut captured: Option<PageError> = None;
        for tick in 1..=timeout {
            match condition().await {
                Ok(met) if met != reverse => return Ok(met),
                Ok(_) => {}
                Err(err) => match on_error {
                    OnError::Capture => captured = Some(err),
                    OnError::Swallow => trace!(error = %err, tick, "wait condition raised"),
                },
            }
            if tick < timeout {
                tokio::time::sleep(self.config.tick).await;
            }
        }

        match (on_error, captured) {
            (OnError::Capture, Some(err)) => Err(PageError::ConditionError(Box::new(err))),
            _ => Ok(reverse),
        }
    }

    /// Plain fixed delay of `ticks` ticks, no condition.
    ///
    /// A scheduling nicety for letting a client-side transition settle; not
    /// a synchronization primitive.
    pub async fn pause(&self, ticks: u32) {
        tokio::time::sleep(self.config.tick * ticks).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Instant;

    fn engine() -> SyncEngine {
        SyncEngine::new(SyncConfig {
            tick: Duration::from_millis(20),
        })
    }

    #[tokio::test]
    async fn true_condition_returns_after_one_evaluation_and_no_sleep() {
        let evaluations = Cell::new(0u32);
        let started = Instant::now();
        let met = engine()
            .wait_until(
                5,
                || {
                    evaluations.set(evaluations.get() + 1);
                    async { Ok(true) }
                },
                false,
                OnError::Swallow,
            )
            .await
            .unwrap();
        assert!(met);
        assert_eq!(evaluations.get(), 1);
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn false_condition_exhausts_with_timeout_evaluations() {
        let slow = SyncEngine::new(SyncConfig {
            tick: Duration::from_millis(50),
        });
        let evaluations = Cell::new(0u32);
        let started = Instant::now();
        let met = slow
            .wait_until(
                3,
                || {
                    evaluations.set(evaluations.get() + 1);
                    async { Ok(false) }
                },
                false,
                OnError::Swallow,
            )
            .await
            .unwrap();
        assert!(!met);
        assert_eq!(evaluations.get(), 3);
        // timeout - 1 sleeps: two ticks, not three
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn reverse_wait_returns_immediately_on_false() {
        let evaluations = Cell::new(0u32);
        let met = engine()
            .wait_until(
                5,
                || {
                    evaluations.set(evaluations.get() + 1);
                    async { Ok(false) }
                },
                true,
                OnError::Swallow,
            )
            .await
            .unwrap();
        assert!(!met);
        assert_eq!(evaluations.get(), 1);
    }

    #[tokio::test]
    async fn reverse_wait_exhausts_to_true() {
        let met = engine()
            .wait_until(2, || async { Ok(true) }, true, OnError::Swallow)
            .await
            .unwrap();
        assert!(met);
    }

    #[tokio::test]
    async fn zero_timeout_with_condition_is_a_caller_error() {
        let err = engine()
            .wait_until(0, || async { Ok(true) }, false, OnError::Swallow)
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn captured_condition_error_rethrows_at_exhaustion() {
        let err = engine()
            .wait_until(
                2,
                || async { Err(PageError::DriverError("boom".to_string())) },
                false,
                OnError::Capture,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::ConditionError(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn swallowed_condition_error_resolves_to_reverse() {
        let met = engine()
            .wait_until(
                2,
                || async { Err(PageError::DriverError("boom".to_string())) },
                false,
                OnError::Swallow,
            )
            .await
            .unwrap();
        assert!(!met);
    }

    #[tokio::test]
    async fn condition_recovering_from_error_is_not_penalized() {
        let evaluations = Cell::new(0u32);
        let met = engine()
            .wait_until(
                5,
                || {
                    evaluations.set(evaluations.get() + 1);
                    let attempt = evaluations.get();
                    async move {
                        if attempt < 3 {
                            Err(PageError::DriverError("not ready".to_string()))
                        } else {
                            Ok(true)
                        }
                    }
                },
                false,
                OnError::Capture,
            )
            .await
            .unwrap();
        assert!(met);
        assert_eq!(evaluations.get(), 3);
    }

    #[tokio::test]
    async fn pause_sleeps_for_the_requested_ticks() {
        let started = Instant::now();
        engine().pause(2).await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
