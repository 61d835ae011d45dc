//! # Coordinator Configuration
//!
//! All settings are passed explicitly. Nothing here reads environment
//! variables; deployments load a YAML file and hand the result to
//! [`DecisionCoordinator::from_config`](crate::DecisionCoordinator::from_config).
//!
//! ```yaml
//! ledger_path: /var/lib/govgate/ledger.jsonl
//! signing_secret_hex: "<64+ hex chars>"
//! token_ttl_seconds: 300
//! shadow_policy_id: shadow_fintech_strict
//! shadow_timeout_ms: 250
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use govgate_capability::{
    ApprovalPolicy, CapabilityError, SigningSecret, DEFAULT_APPROVAL_FIELDS,
    DEFAULT_TOKEN_TTL_SECS,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Coordinator settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// JSONL ledger file. `None` keeps the ledger in memory only.
    pub ledger_path: Option<PathBuf>,
    /// Re-verify the stored chain when opening the ledger.
    pub verify_on_load: bool,
    /// Capability token lifetime.
    pub token_ttl_seconds: u64,
    /// Hex-encoded HMAC key, at least 32 bytes once decoded.
    pub signing_secret_hex: String,
    /// Expected identifier of the shadow policy, if one is wired in.
    pub shadow_policy_id: Option<String>,
    /// Bound on a shadow evaluation.
    pub shadow_timeout_ms: u64,
    /// Bound on a durable ledger append.
    pub ledger_write_timeout_ms: u64,
    /// Period of the replay-record sweeper. Zero disables it.
    pub replay_sweep_interval_secs: u64,
    /// Amount at or above which dual approval applies.
    pub dual_approval_threshold: i64,
    /// Distinct approvers required above the threshold.
    pub required_approvals: usize,
    /// Intent fields covered by an approval.
    pub approval_fields: Vec<String>,
    /// Optional WORM file each ledger entry is mirrored to.
    pub worm_mirror_path: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ledger_path: None,
            verify_on_load: true,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECS,
            signing_secret_hex: String::new(),
            shadow_policy_id: None,
            shadow_timeout_ms: 250,
            ledger_write_timeout_ms: 2_000,
            replay_sweep_interval_secs: 60,
            dual_approval_threshold: 250_000,
            required_approvals: 2,
            approval_fields: DEFAULT_APPROVAL_FIELDS.iter().map(|f| f.to_string()).collect(),
            worm_mirror_path: None,
        }
    }
}

impl std::fmt::Debug for CoordinatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("ledger_path", &self.ledger_path)
            .field("verify_on_load", &self.verify_on_load)
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("signing_secret_hex", &"[REDACTED]")
            .field("shadow_policy_id", &self.shadow_policy_id)
            .field("shadow_timeout_ms", &self.shadow_timeout_ms)
            .field("ledger_write_timeout_ms", &self.ledger_write_timeout_ms)
            .field("replay_sweep_interval_secs", &self.replay_sweep_interval_secs)
            .field("dual_approval_threshold", &self.dual_approval_threshold)
            .field("required_approvals", &self.required_approvals)
            .field("approval_fields", &self.approval_fields)
            .field("worm_mirror_path", &self.worm_mirror_path)
            .finish()
    }
}

impl CoordinatorConfig {
    /// Parse and validate YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Check every setting, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.token_ttl_seconds == 0 {
            problems.push("token_ttl_seconds must be > 0".to_string());
        }
        if let Err(e) = self.signing_secret() {
            problems.push(format!("signing_secret_hex: {e}"));
        }
        if self.shadow_timeout_ms == 0 {
            problems.push("shadow_timeout_ms must be > 0".to_string());
        }
        if self.ledger_write_timeout_ms == 0 {
            problems.push("ledger_write_timeout_ms must be > 0".to_string());
        }
        if self.required_approvals == 0 {
            problems.push("required_approvals must be > 0".to_string());
        }
        if self.approval_fields.is_empty() {
            problems.push("approval_fields must not be empty".to_string());
        }
        if self.shadow_policy_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            problems.push("shadow_policy_id must not be blank".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Decode the signing secret.
    pub fn signing_secret(&self) -> Result<SigningSecret, CapabilityError> {
        SigningSecret::from_hex(&self.signing_secret_hex)
    }

    /// Approval thresholds and scope.
    pub fn approval_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy {
            required_approvals: self.required_approvals,
            dual_approval_threshold: i128::from(self.dual_approval_threshold),
            fields: self.approval_fields.clone(),
        }
    }

    pub fn shadow_timeout(&self) -> Duration {
        Duration::from_millis(self.shadow_timeout_ms)
    }

    pub fn ledger_write_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_write_timeout_ms)
    }
}
