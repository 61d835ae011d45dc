//! # Intents, Decisions and the Policy Seam
//!
//! An `Intent` is what an automated agent asks to do. A `Policy` turns an
//! intent into a `Decision`. Rule content (thresholds, blocklists, pattern
//! detectors) lives outside govgate; the coordinator only ever sees the
//! `Policy` trait.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PolicyError;

/// A requested action with its risk-relevant fields.
///
/// `action` is mandatory; everything else (`amount`, `recipient`,
/// `currency`, `domain`, ...) is carried in `fields`. Amounts must be
/// integers or strings so that the intent canonicalizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// The action being requested, e.g. `transfer`.
    pub action: String,
    /// Remaining intent fields.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Intent {
    /// An intent with no fields beyond the action.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Look up a field by name. `action` resolves to the action itself.
    pub fn get(&self, key: &str) -> Option<Value> {
        if key == "action" {
            return Some(Value::String(self.action.clone()));
        }
        self.fields.get(key).cloned()
    }

    /// The `amount` field as an integer, when it is an integer or an
    /// integer-valued string.
    pub fn amount(&self) -> Option<i128> {
        match self.fields.get("amount")? {
            Value::Number(n) => n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from)),
            Value::String(s) => s.trim().parse::<i128>().ok(),
            _ => None,
        }
    }
}

/// The outcome of evaluating one policy against one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the policy permits the intent.
    pub allowed: bool,
    /// Identifier of the policy that produced the decision.
    pub policy_id: String,
    /// Machine-readable reason, e.g. `AMOUNT_LIMIT`.
    pub reason: String,
}

impl Decision {
    /// An allowing decision.
    pub fn allow(policy_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            policy_id: policy_id.into(),
            reason: reason.into(),
        }
    }

    /// A blocking decision.
    pub fn block(policy_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            policy_id: policy_id.into(),
            reason: reason.into(),
        }
    }
}

/// An external policy engine.
pub trait Policy: Send + Sync {
    /// Stable identifier, recorded in every decision.
    fn id(&self) -> &str;

    /// Evaluate the intent.
    ///
    /// Implementations should be pure with respect to the intent. A returned
    /// error means "no decision", which the production path treats as a
    /// denial and the shadow path records and ignores.
    fn evaluate(&self, intent: &Intent) -> Result<Decision, PolicyError>;
}

type PolicyFnBox = dyn Fn(&Intent) -> Result<Decision, PolicyError> + Send + Sync;

/// A policy backed by a closure. Handy for adapters and tests.
#[derive(Clone)]
pub struct FnPolicy {
    id: String,
    f: Arc<PolicyFnBox>,
}

impl FnPolicy {
    /// Wrap a closure as a policy.
    pub fn new<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Intent) -> Result<Decision, PolicyError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            f: Arc::new(f),
        }
    }
}

impl std::fmt::Debug for FnPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPolicy").field("id", &self.id).finish()
    }
}

impl Policy for FnPolicy {
    fn id(&self) -> &str {
        &self.id
    }

    fn evaluate(&self, intent: &Intent) -> Result<Decision, PolicyError> {
        (self.f)(intent)
    }
}
