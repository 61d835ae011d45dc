//! # Human Approval Grants
//!
//! An approval binds a named approver to the canonical hash of a fixed
//! subset of intent fields (by default `action`, `amount`, `recipient`,
//! `currency`). An approval is only usable for an intent whose same fields
//! hash to exactly the same value, so an approval cannot be attached to an
//! intent with different risk-relevant fields. Fields absent from the
//! intent hash as `null`; extra fields outside the subset are ignored.
//!
//! Intents whose amount reaches the dual-approval threshold need
//! `required_approvals` valid grants from distinct approvers; all other
//! intents need one.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use govgate_core::{sha256_digest, ApprovalId, CanonicalBytes, Clock, ContentDigest, Intent, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;

use crate::error::CapabilityError;

/// The intent fields covered by an approval unless configured otherwise.
pub const DEFAULT_APPROVAL_FIELDS: [&str; 4] = ["action", "amount", "recipient", "currency"];

/// Canonical hash of `fields` of `intent`.
pub fn approval_scope_hash(intent: &Intent, fields: &[String]) -> Result<ContentDigest, CapabilityError> {
    let scope: Map<String, Value> = fields
        .iter()
        .map(|f| (f.clone(), intent.get(f).unwrap_or(Value::Null)))
        .collect();
    let canonical = CanonicalBytes::from_value(Value::Object(scope))?;
    Ok(sha256_digest(&canonical))
}

/// Reject unless `scope_hash` equals the intent's scope hash.
pub fn assert_approval_binding(
    approval_id: &ApprovalId,
    scope_hash: &ContentDigest,
    intent: &Intent,
    fields: &[String],
) -> Result<(), CapabilityError> {
    let actual = approval_scope_hash(intent, fields)?;
    if bool::from(scope_hash.as_bytes().ct_eq(actual.as_bytes())) {
        Ok(())
    } else {
        Err(CapabilityError::ApprovalBindingViolation {
            approval_id: approval_id.clone(),
            expected: scope_hash.to_hex(),
            actual: actual.to_hex(),
        })
    }
}

/// Thresholds and scope for approvals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Approvals required at or above the threshold.
    pub required_approvals: usize,
    /// Amount at which dual approval applies.
    pub dual_approval_threshold: i128,
    /// Intent fields covered by the scope hash.
    pub fields: Vec<String>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            required_approvals: 2,
            dual_approval_threshold: 250_000,
            fields: DEFAULT_APPROVAL_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl ApprovalPolicy {
    /// Approvals needed for `intent`.
    pub fn required_for(&self, intent: &Intent) -> usize {
        if self.requires_dual_approval(intent) {
            self.required_approvals.max(1)
        } else {
            1
        }
    }

    /// Whether `intent` is at or above the dual-approval threshold.
    pub fn requires_dual_approval(&self, intent: &Intent) -> bool {
        intent
            .amount()
            .is_some_and(|amount| amount >= self.dual_approval_threshold)
    }
}

/// One approver's sign-off on one intent scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGrant {
    pub approval_id: ApprovalId,
    pub approver: String,
    /// Canonical hash of the approved intent fields.
    pub scope_hash: ContentDigest,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub consumed: bool,
}

/// Encapsulated store of approval grants.
#[derive(Debug)]
pub struct ApprovalStore {
    grants: Mutex<HashMap<ApprovalId, ApprovalGrant>>,
    policy: ApprovalPolicy,
    clock: Arc<dyn Clock>,
}

impl ApprovalStore {
    pub fn new(policy: ApprovalPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            grants: Mutex::new(HashMap::new()),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Record an approval of `scope_hash` by `approver`, valid for
    /// `valid_for_secs` seconds.
    pub fn issue(
        &self,
        approver: &str,
        scope_hash: ContentDigest,
        valid_for_secs: u64,
    ) -> Result<ApprovalId, CapabilityError> {
        if approver.trim().is_empty() {
            return Err(CapabilityError::ApprovalMissing("approver is required".into()));
        }
        let now = self.clock.now();
        let valid_for = i64::try_from(valid_for_secs).unwrap_or(i64::MAX);
        let approval_id = ApprovalId::generate();
        let grant = ApprovalGrant {
            approval_id: approval_id.clone(),
            approver: approver.to_string(),
            scope_hash,
            issued_at: now,
            expires_at: now.plus_secs(valid_for),
            consumed: false,
        };
        self.grants.lock().insert(approval_id.clone(), grant);
        tracing::info!(approval_id = %approval_id, approver, scope_hash = %scope_hash, "approval issued");
        Ok(approval_id)
    }

    /// Record an approval of `intent`'s scoped fields.
    pub fn issue_for_intent(
        &self,
        approver: &str,
        intent: &Intent,
        valid_for_secs: u64,
    ) -> Result<ApprovalId, CapabilityError> {
        let scope_hash = approval_scope_hash(intent, &self.policy.fields)?;
        self.issue(approver, scope_hash, valid_for_secs)
    }

    /// A copy of the grant, if known.
    pub fn get(&self, approval_id: &ApprovalId) -> Option<ApprovalGrant> {
        self.grants.lock().get(approval_id).cloned()
    }

    /// Check that `approval_ids` satisfy the approval requirement for
    /// `intent` without consuming them.
    ///
    /// Returns the ids that count towards the requirement.
    pub fn validate_and_collect(
        &self,
        approval_ids: &[ApprovalId],
        intent: &Intent,
    ) -> Result<Vec<ApprovalId>, CapabilityError> {
        let grants = self.grants.lock();
        self.collect(&grants, approval_ids, intent)
    }

    /// Validate and mark consumed under one lock. Either every counted
    /// approval is consumed or none is.
    pub fn consume(
        &self,
        approval_ids: &[ApprovalId],
        intent: &Intent,
    ) -> Result<Vec<ApprovalId>, CapabilityError> {
        let mut grants = self.grants.lock();
        let valid = self.collect(&grants, approval_ids, intent)?;
        for id in &valid {
            if let Some(grant) = grants.get_mut(id) {
                grant.consumed = true;
            }
        }
        tracing::info!(approvals = valid.len(), action = %intent.action, "approvals consumed");
        Ok(valid)
    }

    fn collect(
        &self,
        grants: &HashMap<ApprovalId, ApprovalGrant>,
        approval_ids: &[ApprovalId],
        intent: &Intent,
    ) -> Result<Vec<ApprovalId>, CapabilityError> {
        if approval_ids.is_empty() {
            return Err(CapabilityError::ApprovalMissing("no approval supplied".into()));
        }
        let required = self.policy.required_for(intent);
        let now = self.clock.now();

        let mut seen_ids = BTreeSet::new();
        let mut approvers = BTreeSet::new();
        let mut valid = Vec::new();
        let mut first_failure = None;

        for id in approval_ids {
            if !seen_ids.insert(id) {
                continue;
            }
            let Some(grant) = grants.get(id) else {
                first_failure.get_or_insert(CapabilityError::ApprovalMissing(id.to_string()));
                continue;
            };
            // A grant bound to other intent fields is never skipped over.
            assert_approval_binding(id, &grant.scope_hash, intent, &self.policy.fields)?;
            if grant.consumed {
                first_failure.get_or_insert(CapabilityError::ApprovalConsumed(id.clone()));
                continue;
            }
            if grant.expires_at <= now {
                first_failure.get_or_insert(CapabilityError::ApprovalExpired(id.clone()));
                continue;
            }
            if approvers.insert(grant.approver.as_str()) {
                valid.push(id.clone());
            }
        }

        if valid.len() >= required {
            return Ok(valid);
        }
        match first_failure {
            Some(e) if valid.is_empty() => Err(e),
            _ => Err(CapabilityError::InsufficientApprovals {
                required,
                valid: valid.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govgate_core::ManualClock;

    fn store() -> (Arc<ManualClock>, ApprovalStore) {
        let clock = Arc::new(ManualClock::new(
            Timestamp::parse("2026-01-15T12:00:00Z").unwrap(),
        ));
        (clock.clone(), ApprovalStore::new(ApprovalPolicy::default(), clock))
    }

    fn fields() -> Vec<String> {
        ApprovalPolicy::default().fields
    }

    fn big_transfer() -> Intent {
        Intent::new("transfer")
            .with("amount", 500_000)
            .with("recipient", "X")
            .with("currency", "USD")
    }

    #[test]
    fn scope_hash_matches_pinned_vector() {
        assert_eq!(
            approval_scope_hash(&big_transfer(), &fields()).unwrap().to_hex(),
            "d71645d308e560e4aaf578d870301d717d007e07f4b31f938e7b9181b657dc03"
        );
    }

    #[test]
    fn scope_ignores_fields_outside_the_subset() {
        let with_memo = big_transfer().with("memo", "rent");
        assert_eq!(
            approval_scope_hash(&with_memo, &fields()).unwrap(),
            approval_scope_hash(&big_transfer(), &fields()).unwrap()
        );
    }

    #[test]
    fn binding_rejects_changed_amount_or_recipient() {
        let id = ApprovalId::new("HAP-test0001");
        let approved = approval_scope_hash(&big_transfer(), &fields()).unwrap();
        assert!(assert_approval_binding(&id, &approved, &big_transfer(), &fields()).is_ok());

        for changed in [
            big_transfer().with("amount", 500_001),
            big_transfer().with("recipient", "Y"),
        ] {
            let err = assert_approval_binding(&id, &approved, &changed, &fields()).unwrap_err();
            assert_eq!(err.code(), "APPROVAL_BINDING_VIOLATION");
        }
    }

    #[test]
    fn missing_field_is_not_a_partial_match() {
        let id = ApprovalId::new("HAP-test0002");
        let approved = approval_scope_hash(&big_transfer(), &fields()).unwrap();
        let partial = Intent::new("transfer").with("amount", 500_000).with("recipient", "X");
        assert!(assert_approval_binding(&id, &approved, &partial, &fields()).is_err());
    }

    #[test]
    fn large_amount_needs_two_distinct_approvers() {
        let (_, s) = store();
        let intent = big_transfer();
        let a = s.issue_for_intent("alice", &intent, 600).unwrap();
        let a2 = s.issue_for_intent("alice", &intent, 600).unwrap();

        let err = s.validate_and_collect(&[a.clone(), a2], &intent).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_APPROVALS");

        let b = s.issue_for_intent("bob", &intent, 600).unwrap();
        let valid = s.validate_and_collect(&[a.clone(), b.clone()], &intent).unwrap();
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn small_amount_needs_one() {
        let (_, s) = store();
        let intent = Intent::new("transfer")
            .with("amount", 1_000)
            .with("recipient", "X")
            .with("currency", "USD");
        let a = s.issue_for_intent("alice", &intent, 600).unwrap();
        assert_eq!(s.consume(&[a], &intent).unwrap().len(), 1);
    }

    #[test]
    fn consumed_approvals_cannot_be_reused() {
        let (_, s) = store();
        let intent = big_transfer();
        let ids = vec![
            s.issue_for_intent("alice", &intent, 600).unwrap(),
            s.issue_for_intent("bob", &intent, 600).unwrap(),
        ];
        s.consume(&ids, &intent).unwrap();
        assert!(s.get(&ids[0]).unwrap().consumed);
        let err = s.consume(&ids, &intent).unwrap_err();
        assert_eq!(err.code(), "APPROVAL_CONSUMED");
    }

    #[test]
    fn expired_and_unknown_approvals_are_reported() {
        let (clock, s) = store();
        let intent = Intent::new("transfer").with("amount", 10).with("recipient", "X").with("currency", "USD");
        let a = s.issue_for_intent("alice", &intent, 60).unwrap();
        clock.advance_secs(60);
        assert_eq!(s.validate_and_collect(&[a], &intent).unwrap_err().code(), "APPROVAL_EXPIRED");
        assert_eq!(
            s.validate_and_collect(&[ApprovalId::new("HAP-nope")], &intent).unwrap_err().code(),
            "APPROVAL_MISSING"
        );
        assert_eq!(s.validate_and_collect(&[], &intent).unwrap_err().code(), "APPROVAL_MISSING");
    }

    #[test]
    fn failed_validation_consumes_nothing() {
        let (_, s) = store();
        let intent = big_transfer();
        let a = s.issue_for_intent("alice", &intent, 600).unwrap();
        assert!(s.consume(&[a.clone()], &intent).is_err());
        assert!(!s.get(&a).unwrap().consumed);
    }

    #[test]
    fn mismatched_grant_fails_closed_even_with_enough_valid_ones() {
        let (_, s) = store();
        let intent = big_transfer();
        let ids = vec![
            s.issue_for_intent("alice", &intent, 600).unwrap(),
            s.issue_for_intent("bob", &intent, 600).unwrap(),
            s.issue_for_intent("carol", &intent.clone().with("recipient", "Z"), 600).unwrap(),
        ];
        let err = s.consume(&ids, &intent).unwrap_err();
        assert_eq!(err.code(), "APPROVAL_BINDING_VIOLATION");
    }
}
