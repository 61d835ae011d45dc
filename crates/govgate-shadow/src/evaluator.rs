//! # Shadow Evaluator
//!
//! Runs a candidate policy against the same intent as production, on its
//! own blocking task, with a hard deadline measured from the moment the
//! task is started.
//!
//! Callers start the shadow task *before* evaluating production
//! ([`ShadowEvaluator::start`]) and collect it afterwards
//! ([`ShadowTask::join`]). A shadow failure, panic or timeout is returned as
//! a [`ShadowError`] for the caller to record; nothing about it reaches the
//! production decision. A timed-out task is abandoned, and its late result
//! is dropped.

use std::sync::Arc;
use std::time::Duration;

use govgate_core::{Decision, Intent, Policy, PolicyError};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ShadowError;

/// Default bound on a shadow evaluation.
pub const DEFAULT_SHADOW_TIMEOUT: Duration = Duration::from_millis(250);

/// Production and shadow outcomes for one intent.
///
/// `shadow` is `None` when the shadow evaluation failed; such a pair never
/// counts as diverged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualDecision {
    pub production: Decision,
    pub shadow: Option<Decision>,
    /// `production.allowed != shadow.allowed`.
    pub diverged: bool,
}

impl DualDecision {
    pub fn new(production: Decision, shadow: Option<Decision>) -> Self {
        let diverged = shadow
            .as_ref()
            .is_some_and(|s| s.allowed != production.allowed);
        Self {
            production,
            shadow,
            diverged,
        }
    }

    /// The caller-visible outcome. Always the production decision.
    pub fn allowed(&self) -> bool {
        self.production.allowed
    }
}

/// Spawns time-bounded shadow evaluations on the tokio blocking pool.
#[derive(Debug, Clone)]
pub struct ShadowEvaluator {
    timeout: Duration,
}

impl Default for ShadowEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_SHADOW_TIMEOUT)
    }
}

impl ShadowEvaluator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start evaluating `policy` against `intent` immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, intent: Intent, policy: Arc<dyn Policy>) -> ShadowTask {
        let policy_id = policy.id().to_string();
        let deadline = Instant::now() + self.timeout;
        let handle = tokio::task::spawn_blocking(move || policy.evaluate(&intent));
        ShadowTask {
            policy_id,
            deadline,
            timeout: self.timeout,
            handle,
        }
    }

    /// Evaluate and wait, bounded by the timeout.
    pub async fn evaluate(
        &self,
        intent: &Intent,
        policy: Arc<dyn Policy>,
    ) -> Result<Decision, ShadowError> {
        self.start(intent.clone(), policy).join().await
    }
}

/// A running shadow evaluation.
#[derive(Debug)]
pub struct ShadowTask {
    policy_id: String,
    deadline: Instant,
    timeout: Duration,
    handle: JoinHandle<Result<Decision, PolicyError>>,
}

impl ShadowTask {
    /// Identifier of the policy being evaluated.
    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    /// Wait for the result until the deadline set at start.
    pub async fn join(self) -> Result<Decision, ShadowError> {
        let policy_id = self.policy_id;
        let result = match tokio::time::timeout_at(self.deadline, self.handle).await {
            Err(_) => Err(ShadowError::Timeout {
                policy_id: policy_id.clone(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(join_err)) if join_err.is_panic() => Err(ShadowError::Panicked {
                policy_id: policy_id.clone(),
            }),
            Ok(Err(_)) => Err(ShadowError::Cancelled {
                policy_id: policy_id.clone(),
            }),
            Ok(Ok(Err(policy_err))) => Err(ShadowError::Failed(policy_err)),
            Ok(Ok(Ok(decision))) => Ok(decision),
        };
        if let Err(e) = &result {
            tracing::warn!(policy_id = %policy_id, code = e.code(), error = %e, "shadow evaluation failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govgate_core::FnPolicy;

    fn intent() -> Intent {
        Intent::new("transfer").with("amount", 30_000).with("domain", "fintech")
    }

    fn policy<F>(f: F) -> Arc<dyn Policy>
    where
        F: Fn(&Intent) -> Result<Decision, PolicyError> + Send + Sync + 'static,
    {
        Arc::new(FnPolicy::new("shadow_fintech_strict", f))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn returns_shadow_decision() {
        let eval = ShadowEvaluator::default();
        let p = policy(|i: &Intent| {
            if i.amount().unwrap_or(0) >= 20_000 {
                Ok(Decision::block("shadow_fintech_strict", "SHADOW_FINTECH_STRICT"))
            } else {
                Ok(Decision::allow("shadow_fintech_strict", "OK"))
            }
        });
        let d = eval.evaluate(&intent(), p).await.unwrap();
        assert!(!d.allowed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn policy_error_is_captured() {
        let eval = ShadowEvaluator::default();
        let p = policy(|_| Err(PolicyError::new("shadow_fintech_strict", "rule table unavailable")));
        let err = eval.evaluate(&intent(), p).await.unwrap_err();
        assert_eq!(err.code(), "SHADOW_POLICY_FAILED");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panic_is_isolated() {
        let eval = ShadowEvaluator::default();
        let p = policy(|_| panic!("shadow rule bug"));
        let err = eval.evaluate(&intent(), p).await.unwrap_err();
        assert_eq!(err.code(), "SHADOW_PANICKED");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_policy_times_out() {
        let eval = ShadowEvaluator::new(Duration::from_millis(20));
        let p = policy(|_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(Decision::allow("shadow_fintech_strict", "OK"))
        });
        let started = std::time::Instant::now();
        let err = eval.evaluate(&intent(), p).await.unwrap_err();
        assert_eq!(err.code(), "SHADOW_TIMEOUT");
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn divergence_is_allowed_mismatch_only() {
        let allow = Decision::allow("prod", "OK");
        let block = Decision::block("shadow", "STRICT");
        assert!(DualDecision::new(allow.clone(), Some(block)).diverged);
        assert!(!DualDecision::new(allow.clone(), Some(Decision::allow("shadow", "OK"))).diverged);
        let missing = DualDecision::new(allow, None);
        assert!(!missing.diverged);
        assert!(missing.allowed());
    }
}
