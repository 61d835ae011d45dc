//! # DecisionCoordinator
//!
//! Orchestrates one decision end to end:
//!
//! ```text
//! evaluate_and_log:  start shadow ─────────────────────────────┐
//!                    production → append decision_production    │
//!                    allowed? → issue token → append capability_issued
//!                    detached:  join shadow ←───────────────────┘
//!                               → append decision_shadow | shadow_evaluation_error
//!
//! execute:           state check → token verify + consume → append execution
//!                    (any failure → append execution_blocked, return reason)
//! ```
//!
//! ## Failure Policy
//!
//! - A ledger append that fails or exceeds its bound fails the operation
//!   closed: no token is handed out for a decision that is not durably
//!   recorded, and no execution proceeds without its `execution` entry.
//! - A production policy error or panic is a denial.
//! - A shadow error, panic or timeout is recorded as
//!   `shadow_evaluation_error` and otherwise ignored. The shadow result
//!   never changes the production outcome, and `evaluate_and_log` returns
//!   without waiting for it: a detached task appends the shadow entry.
//!   [`PendingShadow::join`] waits for that entry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use govgate_capability::{
    ApprovalStore, CapabilityError, CapabilityToken, CapabilityTokenService, Expected,
    InMemoryReplayGuard, TokenClaims,
};
use govgate_core::{
    sha256_digest, ApprovalId, CanonicalBytes, Clock, ContentDigest, Decision, DecisionId, Intent,
    Policy, Principal, Timestamp,
};
use govgate_ledger::{
    mirror_entry, ChainVerification, HashChainLedger, JsonlFileStorage, LedgerBackend,
    LedgerEntry, LedgerError, LedgerStorage, LoadOptions, MemoryStorage, WormFileBackend,
};
use govgate_shadow::{
    DualDecision, ShadowEvaluator, ShadowReport, ShadowTask, DECISION_PRODUCTION_EVENT,
    DECISION_SHADOW_EVENT, SHADOW_ERROR_EVENT,
};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use crate::config::CoordinatorConfig;
use crate::error::{ConfigError, CoordinatorError, DenialReason};
use crate::state::{DecisionRecord, DecisionState};

/// Event type recorded when a capability token is issued.
pub const CAPABILITY_ISSUED_EVENT: &str = "capability_issued";
/// Event type recorded when a capability is consumed and execution may proceed.
pub const EXECUTION_EVENT: &str = "execution";
/// Event type recorded when an execution attempt is refused.
pub const EXECUTION_BLOCKED_EVENT: &str = "execution_blocked";

/// Outcome of [`DecisionCoordinator::evaluate_and_log`].
#[derive(Debug)]
pub struct EvaluationResult {
    pub decision_id: DecisionId,
    /// The production outcome. Shadow never changes it.
    pub allowed: bool,
    /// Hash of the `decision_production` ledger entry.
    pub evidence_hash: ContentDigest,
    /// Present iff `allowed`.
    pub token: Option<CapabilityToken>,
    pub production: Decision,
    /// The shadow evaluation, still running. Dropping it leaves the
    /// shadow entry to be recorded in the background.
    pub shadow: Option<PendingShadow>,
}

/// A shadow evaluation detached from the production path.
#[derive(Debug)]
pub struct PendingShadow {
    policy_id: String,
    handle: JoinHandle<Option<DualDecision>>,
}

impl PendingShadow {
    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    /// Wait until the shadow outcome has been recorded.
    ///
    /// `None` when the shadow evaluation failed or timed out; the
    /// `shadow_evaluation_error` entry has been appended by then.
    pub async fn join(self) -> Option<DualDecision> {
        match self.handle.await {
            Ok(dual) => dual,
            Err(e) => {
                tracing::warn!(policy_id = %self.policy_id, error = %e, "shadow recording task failed");
                None
            }
        }
    }
}

/// Proof that an execution was authorized and recorded.
#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub decision_id: DecisionId,
    pub claims: TokenClaims,
    /// Hash of the `execution` ledger entry.
    pub evidence_hash: ContentDigest,
    /// Approvals consumed by this execution.
    pub approvals: Vec<ApprovalId>,
}

/// Expected bindings for a decision recovered from the ledger.
struct LoggedDecision {
    action: String,
    principal: Principal,
    allowed: bool,
    requires_approval: bool,
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            map
        }
    }
}

/// Ledger appends off the async executor, bounded by the write timeout,
/// with best-effort mirroring. Cloned into detached shadow tasks.
#[derive(Clone)]
struct Recorder {
    ledger: Arc<HashChainLedger>,
    backend: Option<Arc<dyn LedgerBackend>>,
    bound: Duration,
}

impl Recorder {
    async fn append(
        &self,
        event_type: &'static str,
        data: Map<String, Value>,
    ) -> Result<LedgerEntry, LedgerError> {
        let ledger = Arc::clone(&self.ledger);
        let write = tokio::task::spawn_blocking(move || ledger.append(event_type, data));
        let entry = match tokio::time::timeout(self.bound, write).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => {
                return Err(LedgerError::Write(std::io::Error::other(format!(
                    "ledger writer task failed: {join}"
                ))))
            }
            Err(_) => {
                let ms = u64::try_from(self.bound.as_millis()).unwrap_or(u64::MAX);
                tracing::error!(event_type, timeout_ms = ms, "ledger append timed out");
                return Err(LedgerError::WriteTimeout(ms));
            }
        };
        self.mirror(&entry);
        Ok(entry)
    }

    fn mirror(&self, entry: &LedgerEntry) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = mirror_entry(backend.as_ref(), &entry) {
                tracing::warn!(
                    backend = backend.name(),
                    index = entry.index,
                    error = %e,
                    "ledger mirror failed"
                );
            }
        });
    }

    /// Append a shadow-path entry. Failures are logged only.
    async fn append_shadow(
        &self,
        decision_id: &DecisionId,
        event_type: &'static str,
        data: Map<String, Value>,
    ) {
        if let Err(e) = self.append(event_type, data).await {
            tracing::error!(
                decision_id = %decision_id,
                event_type,
                code = e.code(),
                error = %e,
                "failed to record shadow outcome"
            );
        }
    }
}

/// Orchestrates evaluation, recording, capability issuance and execution.
pub struct DecisionCoordinator {
    config: CoordinatorConfig,
    recorder: Recorder,
    tokens: Arc<CapabilityTokenService>,
    replay: Arc<InMemoryReplayGuard>,
    approvals: ApprovalStore,
    shadow: ShadowEvaluator,
    clock: Arc<dyn Clock>,
    production_policy: Option<Arc<dyn Policy>>,
    shadow_policy: Option<Arc<dyn Policy>>,
    decisions: Arc<DashMap<DecisionId, DecisionRecord>>,
}

impl std::fmt::Debug for DecisionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCoordinator")
            .field("config", &self.config)
            .field("ledger", &self.recorder.ledger)
            .field(
                "production_policy",
                &self.production_policy.as_ref().map(|p| p.id().to_string()),
            )
            .field(
                "shadow_policy",
                &self.shadow_policy.as_ref().map(|p| p.id().to_string()),
            )
            .field("decisions", &self.decisions.len())
            .finish()
    }
}

impl DecisionCoordinator {
    /// Build a coordinator over an already-opened ledger.
    pub fn new(
        config: CoordinatorConfig,
        ledger: Arc<HashChainLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let replay = Arc::new(InMemoryReplayGuard::new(Arc::clone(&clock)));
        let tokens = Arc::new(CapabilityTokenService::new(
            config.signing_secret()?,
            replay.clone(),
            Arc::clone(&clock),
        ));
        let approvals = ApprovalStore::new(config.approval_policy(), Arc::clone(&clock));
        let shadow = ShadowEvaluator::new(config.shadow_timeout());
        let recorder = Recorder {
            ledger,
            backend: None,
            bound: config.ledger_write_timeout(),
        };
        Ok(Self {
            config,
            recorder,
            tokens,
            replay,
            approvals,
            shadow,
            clock,
            production_policy: None,
            shadow_policy: None,
            decisions: Arc::new(DashMap::new()),
        })
    }

    /// Open the configured ledger (verifying it if configured) and the
    /// optional WORM mirror, then build the coordinator.
    pub fn from_config(
        config: CoordinatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let storage: Box<dyn LedgerStorage> = match &config.ledger_path {
            Some(path) => Box::new(JsonlFileStorage::open(path)?),
            None => Box::new(MemoryStorage::new()),
        };
        let ledger = HashChainLedger::open(
            storage,
            Arc::clone(&clock),
            LoadOptions {
                verify: config.verify_on_load,
            },
        )?;
        let backend: Option<Arc<dyn LedgerBackend>> = match &config.worm_mirror_path {
            Some(path) => Some(Arc::new(WormFileBackend::open(path)?)),
            None => None,
        };
        let mut coordinator = Self::new(config, Arc::new(ledger), clock)?;
        coordinator.recorder.backend = backend;
        Ok(coordinator)
    }

    /// Set the default production policy.
    pub fn with_production_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.production_policy = Some(policy);
        self
    }

    /// Set the default shadow policy. Its id must match
    /// `shadow_policy_id` when that is configured.
    pub fn with_shadow_policy(mut self, policy: Arc<dyn Policy>) -> Result<Self, CoordinatorError> {
        if let Some(expected) = &self.config.shadow_policy_id {
            if policy.id() != expected {
                return Err(ConfigError::Invalid(vec![format!(
                    "shadow policy {:?} does not match configured shadow_policy_id {expected:?}",
                    policy.id()
                )])
                .into());
            }
        }
        self.shadow_policy = Some(policy);
        Ok(self)
    }

    /// Mirror every ledger entry to `backend`. Mirror failures are logged
    /// and never affect the operation.
    pub fn with_backend(mut self, backend: Arc<dyn LedgerBackend>) -> Self {
        self.recorder.backend = Some(backend);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<HashChainLedger> {
        &self.recorder.ledger
    }

    pub fn tokens(&self) -> &Arc<CapabilityTokenService> {
        &self.tokens
    }

    pub fn approvals(&self) -> &ApprovalStore {
        &self.approvals
    }

    /// Current lifecycle state of a decision evaluated by this coordinator.
    pub fn decision_state(&self, decision_id: &DecisionId) -> Option<DecisionState> {
        self.decisions.get(decision_id).map(|r| r.state)
    }

    pub fn decision(&self, decision_id: &DecisionId) -> Option<DecisionRecord> {
        self.decisions.get(decision_id).map(|r| r.clone())
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluate `intent` with the configured policies.
    pub async fn evaluate_and_log(
        &self,
        intent: &Intent,
        principal: &Principal,
    ) -> Result<EvaluationResult, CoordinatorError> {
        let production = self.production_policy.clone().ok_or_else(|| {
            ConfigError::Invalid(vec!["no production policy configured".to_string()])
        })?;
        self.evaluate_and_log_with(intent, principal, production, self.shadow_policy.clone())
            .await
    }

    /// Evaluate `intent` with explicit policies, record both decisions and
    /// issue a capability if production allows.
    pub async fn evaluate_and_log_with(
        &self,
        intent: &Intent,
        principal: &Principal,
        production: Arc<dyn Policy>,
        shadow: Option<Arc<dyn Policy>>,
    ) -> Result<EvaluationResult, CoordinatorError> {
        let intent_value = serde_json::to_value(intent).map_err(
            govgate_core::CanonicalizationError::SerializationFailed,
        )?;
        let intent_hash = sha256_digest(&CanonicalBytes::from_value(intent_value.clone())?);

        let decision_id = DecisionId::generate();
        self.decisions.insert(
            decision_id.clone(),
            DecisionRecord {
                state: DecisionState::Received,
                action: intent.action.clone(),
                principal: principal.clone(),
                intent_hash,
                requires_approval: self.approvals.policy().requires_dual_approval(intent),
                evidence_hash: None,
                updated_at: self.clock.now(),
            },
        );

        // Shadow starts first and runs beside production.
        let shadow_task = shadow.map(|policy| self.shadow.start(intent.clone(), policy));

        let production_decision = evaluate_production(intent, production).await;
        self.advance(&decision_id, DecisionState::Evaluated);

        let production_entry = self
            .record_for(
                &decision_id,
                DECISION_PRODUCTION_EVENT,
                object(json!({
                    "decision_id": decision_id.as_str(),
                    "principal": principal.as_str(),
                    "action": intent.action,
                    "intent": intent_value,
                    "intent_hash": intent_hash.to_hex(),
                    "allowed": production_decision.allowed,
                    "policy_id": production_decision.policy_id,
                    "reason": production_decision.reason,
                })),
            )
            .await?;

        self.advance(&decision_id, DecisionState::Logged);
        if let Some(mut record) = self.decisions.get_mut(&decision_id) {
            record.evidence_hash = Some(production_entry.hash);
        }

        let shadow = shadow_task.map(|task| {
            self.record_shadow_detached(decision_id.clone(), production_decision.clone(), task)
        });

        let allowed = production_decision.allowed;
        let token = if allowed {
            Some(self.issue_capability(&decision_id, intent, principal).await?)
        } else {
            self.advance(&decision_id, DecisionState::Blocked);
            None
        };

        tracing::info!(
            decision_id = %decision_id,
            allowed,
            evidence_hash = %production_entry.hash,
            "decision logged"
        );

        Ok(EvaluationResult {
            decision_id,
            allowed,
            evidence_hash: production_entry.hash,
            token,
            production: production_decision,
            shadow,
        })
    }

    /// Join the shadow task and record its outcome off the production path.
    fn record_shadow_detached(
        &self,
        decision_id: DecisionId,
        production: Decision,
        task: ShadowTask,
    ) -> PendingShadow {
        let recorder = self.recorder.clone();
        let policy_id = task.policy_id().to_string();
        let handle = tokio::spawn(async move {
            let policy_id = task.policy_id().to_string();
            let shadow = match task.join().await {
                Ok(decision) => decision,
                Err(e) => {
                    let data = object(json!({
                        "decision_id": decision_id.as_str(),
                        "policy_id": policy_id,
                        "code": e.code(),
                        "error": e.to_string(),
                    }));
                    recorder
                        .append_shadow(&decision_id, SHADOW_ERROR_EVENT, data)
                        .await;
                    return None;
                }
            };
            let dual = DualDecision::new(production, Some(shadow.clone()));
            let data = object(json!({
                "decision_id": decision_id.as_str(),
                "allowed": shadow.allowed,
                "policy_id": shadow.policy_id,
                "reason": shadow.reason,
                "diverged": dual.diverged,
            }));
            recorder
                .append_shadow(&decision_id, DECISION_SHADOW_EVENT, data)
                .await;
            if dual.diverged {
                tracing::warn!(
                    decision_id = %decision_id,
                    production_allowed = dual.production.allowed,
                    shadow_allowed = shadow.allowed,
                    shadow_policy = %policy_id,
                    "policy divergence"
                );
            }
            Some(dual)
        });
        PendingShadow { policy_id, handle }
    }

    async fn issue_capability(
        &self,
        decision_id: &DecisionId,
        intent: &Intent,
        principal: &Principal,
    ) -> Result<CapabilityToken, CoordinatorError> {
        let token = match self.tokens.issue(
            decision_id,
            &intent.action,
            principal,
            self.config.token_ttl_seconds,
        ) {
            Ok(token) => token,
            Err(e) => {
                self.set_failed(decision_id);
                return Err(e.into());
            }
        };
        let claims = token.claims();
        let recorded = self
            .record_for(
                decision_id,
                CAPABILITY_ISSUED_EVENT,
                object(json!({
                    "decision_id": decision_id.as_str(),
                    "jti": claims.jti.to_string(),
                    "action": claims.action,
                    "principal": claims.principal.as_str(),
                    "exp": claims.exp,
                })),
            )
            .await;
        if let Err(e) = recorded {
            // The token is never handed out; revoke it so a copy is useless too.
            self.tokens.revoke(claims, self.clock.now());
            return Err(e);
        }
        self.advance(decision_id, DecisionState::CapabilityIssued);
        Ok(token)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Consume `token` for `decision_id` and record the execution.
    ///
    /// The token must be bound to `decision_id`. For decisions evaluated by
    /// this coordinator (or found in its ledger) it must also carry the
    /// decided action and principal. On any failure an `execution_blocked`
    /// entry with the reason code is appended and the error is returned;
    /// the caller must not execute.
    pub async fn execute(
        &self,
        decision_id: &DecisionId,
        token: &str,
    ) -> Result<ExecutionReceipt, CoordinatorError> {
        self.execute_inner(decision_id, token, None).await
    }

    /// As [`execute`](Self::execute), additionally requiring human
    /// approvals bound to `intent`. `intent` must be the intent that was
    /// decided.
    pub async fn execute_with_approval(
        &self,
        decision_id: &DecisionId,
        token: &str,
        intent: &Intent,
        approval_ids: &[ApprovalId],
    ) -> Result<ExecutionReceipt, CoordinatorError> {
        self.execute_inner(decision_id, token, Some((intent, approval_ids)))
            .await
    }

    async fn execute_inner(
        &self,
        decision_id: &DecisionId,
        token: &str,
        approval: Option<(&Intent, &[ApprovalId])>,
    ) -> Result<ExecutionReceipt, CoordinatorError> {
        let (claims, approvals) = match self.authorize(decision_id, token, approval) {
            Ok(authorized) => authorized,
            Err(err) => {
                self.record_blocked(decision_id, &err).await;
                return Err(err);
            }
        };

        let approval_values: Vec<Value> = approvals
            .iter()
            .map(|id| Value::from(id.as_str()))
            .collect();
        let entry = self
            .record_for(
                decision_id,
                EXECUTION_EVENT,
                object(json!({
                    "decision_id": decision_id.as_str(),
                    "jti": claims.jti.to_string(),
                    "action": claims.action,
                    "principal": claims.principal.as_str(),
                    "outcome": "executed",
                    "approvals": approval_values,
                })),
            )
            .await?;
        self.advance(decision_id, DecisionState::Executed);

        tracing::info!(decision_id = %decision_id, jti = %claims.jti, "execution authorized");
        Ok(ExecutionReceipt {
            decision_id: decision_id.clone(),
            claims,
            evidence_hash: entry.hash,
            approvals,
        })
    }

    fn authorize(
        &self,
        decision_id: &DecisionId,
        token: &str,
        approval: Option<(&Intent, &[ApprovalId])>,
    ) -> Result<(TokenClaims, Vec<ApprovalId>), CoordinatorError> {
        let denied = |reason| CoordinatorError::Denied {
            decision_id: decision_id.clone(),
            reason,
        };

        let tracked = self.decision(decision_id);
        if let Some(record) = &tracked {
            match record.state {
                DecisionState::Blocked => return Err(denied(DenialReason::DecisionBlocked)),
                // An executed decision falls through to the token check,
                // which reports the replay.
                DecisionState::CapabilityIssued | DecisionState::Executed => {}
                other => return Err(denied(DenialReason::NotExecutable(other))),
            }
        }

        let (action, principal, requires_approval) = match &tracked {
            Some(record) => (
                record.action.clone(),
                record.principal.clone(),
                record.requires_approval,
            ),
            None => match self.logged_decision(decision_id) {
                Some(logged) if !logged.allowed => {
                    return Err(denied(DenialReason::DecisionBlocked))
                }
                Some(logged) => (logged.action, logged.principal, logged.requires_approval),
                None => {
                    let claims = self.tokens.authenticate(token)?;
                    (claims.action, claims.principal, false)
                }
            },
        };
        if requires_approval && approval.is_none() {
            return Err(CapabilityError::ApprovalMissing(format!(
                "decision {decision_id} requires human approval"
            ))
            .into());
        }

        if let Some((intent, ids)) = approval {
            let matches = match &tracked {
                Some(record) => {
                    let hash = sha256_digest(&CanonicalBytes::new(intent)?);
                    hash == record.intent_hash
                }
                None => intent.action == action,
            };
            if !matches {
                return Err(denied(DenialReason::IntentMismatch));
            }
            self.approvals.validate_and_collect(ids, intent)?;
        }

        let claims = self.tokens.verify_and_consume_bound(
            token,
            Expected {
                decision_id: Some(decision_id),
                action: &action,
                principal: &principal,
            },
        )?;

        // The replay guard is not durable; the ledger is.
        let executed = match &tracked {
            Some(_) => self.decision_state(decision_id) == Some(DecisionState::Executed),
            None => self
                .get_audit(decision_id)
                .iter()
                .any(|e| e.event_type == EXECUTION_EVENT),
        };
        if executed {
            return Err(denied(DenialReason::AlreadyExecuted));
        }

        let approvals = match approval {
            Some((intent, ids)) => self.approvals.consume(ids, intent)?,
            None => Vec::new(),
        };
        Ok((claims, approvals))
    }

    fn logged_decision(&self, decision_id: &DecisionId) -> Option<LoggedDecision> {
        self.recorder.ledger
            .get_events_by_field("decision_id", decision_id.as_str())
            .into_iter()
            .find(|e| e.event_type == DECISION_PRODUCTION_EVENT)
            .and_then(|e| {
                let requires_approval = e
                    .data
                    .get("intent")
                    .and_then(|v| serde_json::from_value::<Intent>(v.clone()).ok())
                    .is_some_and(|intent| self.approvals.policy().requires_dual_approval(&intent));
                Some(LoggedDecision {
                    action: e.data_str("action")?.to_string(),
                    principal: Principal::new(e.data_str("principal")?),
                    allowed: e.data_bool("allowed")?,
                    requires_approval,
                })
            })
    }

    async fn record_blocked(&self, decision_id: &DecisionId, err: &CoordinatorError) {
        tracing::warn!(decision_id = %decision_id, code = err.code(), error = %err, "execution blocked");
        if err.is_ledger_failure() {
            return;
        }
        let data = object(json!({
            "decision_id": decision_id.as_str(),
            "reason": err.code(),
            "detail": err.to_string(),
        }));
        if let Err(e) = self.record(EXECUTION_BLOCKED_EVENT, data).await {
            tracing::error!(decision_id = %decision_id, code = e.code(), error = %e, "failed to record blocked execution");
        }
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Every ledger entry for `decision_id`, in chain order.
    pub fn get_audit(&self, decision_id: &DecisionId) -> Vec<LedgerEntry> {
        self.recorder.ledger
            .get_events_by_field("decision_id", decision_id.as_str())
    }

    /// Whether the whole chain verifies.
    pub fn verify_chain(&self) -> bool {
        self.chain_verification().is_valid()
    }

    /// Full verification result, including the first broken index.
    pub fn chain_verification(&self) -> ChainVerification {
        self.recorder.ledger.verify_chain()
    }

    /// Verify the chain and record a `chain_verified` entry.
    pub async fn record_chain_verification(&self) -> Result<LedgerEntry, CoordinatorError> {
        let ledger = Arc::clone(&self.recorder.ledger);
        let entry = tokio::task::spawn_blocking(move || ledger.verify_and_record())
            .await
            .map_err(|e| LedgerError::Write(std::io::Error::other(e.to_string())))??;
        self.recorder.mirror(&entry);
        Ok(entry)
    }

    /// Production versus shadow comparison over the whole ledger.
    pub fn shadow_report(&self) -> ShadowReport {
        ShadowReport::from_entries(&self.recorder.ledger.entries())
    }

    /// Forget decisions with no state change for `token_ttl_seconds`.
    ///
    /// Any token such a decision issued has expired by then. Later calls
    /// for an evicted decision are answered from the ledger. Returns the
    /// number of records dropped.
    pub fn evict_settled_decisions(&self, now: Timestamp) -> usize {
        evict_settled(&self.decisions, now, self.config.token_ttl_seconds)
    }

    /// Spawn the periodic sweeper for replay records, revocations,
    /// replay-attempt counters and settled decisions.
    ///
    /// Returns `None` when `replay_sweep_interval_secs` is zero.
    pub fn spawn_replay_sweeper(&self) -> Option<JoinHandle<()>> {
        let secs = self.config.replay_sweep_interval_secs;
        if secs == 0 {
            return None;
        }
        let replay = Arc::clone(&self.replay);
        let tokens = Arc::clone(&self.tokens);
        let decisions = Arc::clone(&self.decisions);
        let clock = Arc::clone(&self.clock);
        let ttl = self.config.token_ttl_seconds;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = clock.now();
                let records = replay.sweep(now);
                let revocations = tokens.sweep_revocations(now);
                let principals = replay.sweep_replay_attempts(now);
                let evicted = evict_settled(&decisions, now, ttl);
                tracing::debug!(records, revocations, principals, decisions = evicted, "replay sweep");
            }
        }))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn record(
        &self,
        event_type: &'static str,
        data: Map<String, Value>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.recorder.append(event_type, data).await
    }

    /// `record`, marking the decision failed on error.
    async fn record_for(
        &self,
        decision_id: &DecisionId,
        event_type: &'static str,
        data: Map<String, Value>,
    ) -> Result<LedgerEntry, CoordinatorError> {
        match self.record(event_type, data).await {
            Ok(entry) => Ok(entry),
            Err(e) => {
                tracing::error!(
                    decision_id = %decision_id,
                    event_type,
                    code = e.code(),
                    error = %e,
                    "ledger append failed; failing closed"
                );
                self.set_failed(decision_id);
                Err(e.into())
            }
        }
    }

    fn advance(&self, decision_id: &DecisionId, next: DecisionState) {
        if let Some(mut record) = self.decisions.get_mut(decision_id) {
            if record.state.can_transition_to(next) {
                record.state = next;
                record.updated_at = self.clock.now();
            } else {
                tracing::warn!(
                    decision_id = %decision_id,
                    from = %record.state,
                    to = %next,
                    "invalid decision transition ignored"
                );
            }
        }
    }

    fn set_failed(&self, decision_id: &DecisionId) {
        if let Some(mut record) = self.decisions.get_mut(decision_id) {
            record.state = DecisionState::Failed;
            record.updated_at = self.clock.now();
        }
    }
}

fn evict_settled(
    decisions: &DashMap<DecisionId, DecisionRecord>,
    now: Timestamp,
    ttl_secs: u64,
) -> usize {
    let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
    let before = decisions.len();
    decisions.retain(|_, record| record.updated_at.plus_secs(ttl) > now);
    before.saturating_sub(decisions.len())
}

async fn evaluate_production(intent: &Intent, policy: Arc<dyn Policy>) -> Decision {
    let policy_id = policy.id().to_string();
    let intent = intent.clone();
    match tokio::task::spawn_blocking(move || policy.evaluate(&intent)).await {
        Ok(Ok(decision)) => decision,
        Ok(Err(e)) => {
            tracing::error!(policy_id = %policy_id, error = %e, "production policy failed; denying");
            Decision::block(policy_id, "POLICY_ERROR")
        }
        Err(e) => {
            tracing::error!(policy_id = %policy_id, panicked = e.is_panic(), "production policy task failed; denying");
            Decision::block(policy_id, "POLICY_PANICKED")
        }
    }
}
