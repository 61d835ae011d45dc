//! # Capability Tokens
//!
//! A capability token authorizes exactly one execution of one decision.
//!
//! ## Wire Format
//!
//! ```text
//! base64url(JCS(claims)) "." base64url(HMAC-SHA256(secret, JCS(claims)))
//! ```
//!
//! with claims `{jti, decision_id, action, principal, exp}` and no padding.
//! The MAC covers the exact claim bytes carried in the token, so
//! verification never re-serializes before checking the signature.
//!
//! ## Verification Order
//!
//! signature → `exp > now` → decision → action → principal → revocation →
//! atomic replay check-and-set. Every check before the last is read-only,
//! so a token rejected for any other reason is not consumed.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use govgate_core::{CanonicalBytes, Clock, DecisionId, Principal, Timestamp, TokenId};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CapabilityError;
use crate::replay::ReplayGuard;

type HmacSha256 = Hmac<Sha256>;

/// Minimum signing secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Default token lifetime in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// SigningSecret
// ---------------------------------------------------------------------------

/// Symmetric HMAC key. Zeroized on drop; never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    /// Wrap raw key bytes. At least [`MIN_SECRET_LEN`] bytes are required.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CapabilityError> {
        if bytes.len() < MIN_SECRET_LEN {
            return Err(CapabilityError::InvalidSecret(format!(
                "signing secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Decode a hex-encoded key.
    pub fn from_hex(s: &str) -> Result<Self, CapabilityError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CapabilityError::InvalidSecret(format!("hex decode: {e}")))?;
        Self::from_bytes(bytes)
    }

    fn mac(&self) -> Result<HmacSha256, CapabilityError> {
        HmacSha256::new_from_slice(&self.0)
            .map_err(|e| CapabilityError::InvalidSecret(e.to_string()))
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// Claims and token
// ---------------------------------------------------------------------------

/// The authenticated content of a capability token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenClaims {
    /// Unique token id; the single-use key.
    pub jti: TokenId,
    /// The decision this token executes.
    pub decision_id: DecisionId,
    /// The only action this token authorizes.
    pub action: String,
    /// The only principal this token authorizes.
    pub principal: Principal,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// A signed compact capability token.
///
/// `Debug` shows the claims but not the compact form, which is a bearer
/// credential.
#[derive(Clone, PartialEq, Eq)]
pub struct CapabilityToken {
    compact: String,
    claims: TokenClaims,
}

impl CapabilityToken {
    /// The compact wire form to hand to the executor.
    pub fn as_str(&self) -> &str {
        &self.compact
    }

    /// The signed claims.
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }
}

impl std::fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityToken")
            .field("compact", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

fn sign(secret: &SigningSecret, claims: &TokenClaims) -> Result<String, CapabilityError> {
    let payload = CanonicalBytes::new(claims)?;
    let mut mac = secret.mac()?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        URL_SAFE_NO_PAD.encode(sig)
    ))
}

/// Check the signature on a compact token and return its claims.
///
/// Does not check expiry, bindings or replay.
pub fn decode_and_authenticate(
    secret: &SigningSecret,
    compact: &str,
) -> Result<TokenClaims, CapabilityError> {
    let (payload_b64, sig_b64) = compact
        .trim()
        .split_once('.')
        .ok_or_else(|| CapabilityError::Malformed("expected <payload>.<signature>".into()))?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| CapabilityError::Malformed(format!("payload: {e}")))?;
    let sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| CapabilityError::Malformed(format!("signature: {e}")))?;

    let mut mac = secret.mac()?;
    mac.update(&payload);
    mac.verify_slice(&sig)
        .map_err(|_| CapabilityError::InvalidSignature)?;

    serde_json::from_slice(&payload).map_err(|e| CapabilityError::Malformed(format!("claims: {e}")))
}

// ---------------------------------------------------------------------------
// CapabilityTokenService
// ---------------------------------------------------------------------------

/// What a presented token must be bound to.
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    /// Required decision, when the caller knows it.
    pub decision_id: Option<&'a DecisionId>,
    /// Required action.
    pub action: &'a str,
    /// Required principal.
    pub principal: &'a Principal,
}

/// Issues and consumes capability tokens.
///
/// Issuance and consumption may happen in different processes provided
/// they share the signing secret and the replay guard.
#[derive(Debug)]
pub struct CapabilityTokenService {
    secret: SigningSecret,
    guard: Arc<dyn ReplayGuard>,
    clock: Arc<dyn Clock>,
    revoked: DashMap<TokenId, Timestamp>,
}

impl CapabilityTokenService {
    /// Build a service over a shared replay guard.
    pub fn new(secret: SigningSecret, guard: Arc<dyn ReplayGuard>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret,
            guard,
            clock,
            revoked: DashMap::new(),
        }
    }

    /// The replay guard this service consumes against.
    pub fn replay_guard(&self) -> &Arc<dyn ReplayGuard> {
        &self.guard
    }

    /// Check the signature and return the claims. Nothing is consumed.
    pub fn authenticate(&self, token: &str) -> Result<TokenClaims, CapabilityError> {
        decode_and_authenticate(&self.secret, token)
    }

    /// Mint a token for `(decision_id, action, principal)` with a fresh
    /// `jti`. The token is not marked used.
    pub fn issue(
        &self,
        decision_id: &DecisionId,
        action: &str,
        principal: &Principal,
        ttl_seconds: u64,
    ) -> Result<CapabilityToken, CapabilityError> {
        if ttl_seconds == 0 {
            return Err(CapabilityError::InvalidTtl);
        }
        let ttl = i64::try_from(ttl_seconds).map_err(|_| CapabilityError::InvalidTtl)?;
        let claims = TokenClaims {
            jti: TokenId::generate(),
            decision_id: decision_id.clone(),
            action: action.to_string(),
            principal: principal.clone(),
            exp: self.clock.now().epoch_secs().saturating_add(ttl),
        };
        let compact = sign(&self.secret, &claims)?;
        tracing::info!(
            jti = %claims.jti,
            decision_id = %claims.decision_id,
            action,
            principal = %principal,
            exp = claims.exp,
            "capability token issued"
        );
        Ok(CapabilityToken { compact, claims })
    }

    /// Verify a token against the expected action and principal and
    /// consume it.
    pub fn verify_and_consume(
        &self,
        token: &str,
        expected_action: &str,
        expected_principal: &Principal,
    ) -> Result<TokenClaims, CapabilityError> {
        self.verify_and_consume_bound(
            token,
            Expected {
                decision_id: None,
                action: expected_action,
                principal: expected_principal,
            },
        )
    }

    /// Verify a token against every binding in `expected` and consume it.
    ///
    /// On success the `jti` is recorded in the replay guard for the token's
    /// remaining lifetime and any later call with the same token fails with
    /// `ReplayDetected`.
    pub fn verify_and_consume_bound(
        &self,
        token: &str,
        expected: Expected<'_>,
    ) -> Result<TokenClaims, CapabilityError> {
        let result = self.check_and_consume(token, &expected);
        if let Err(e) = &result {
            tracing::warn!(code = e.code(), error = %e, "capability token rejected");
        }
        result
    }

    fn check_and_consume(
        &self,
        token: &str,
        expected: &Expected<'_>,
    ) -> Result<TokenClaims, CapabilityError> {
        let claims = decode_and_authenticate(&self.secret, token)?;

        let now = self.clock.now().epoch_secs();
        if claims.exp <= now {
            return Err(CapabilityError::TokenExpired { exp: claims.exp, now });
        }
        if let Some(decision_id) = expected.decision_id {
            if &claims.decision_id != decision_id {
                return Err(CapabilityError::DecisionMismatch {
                    expected: decision_id.to_string(),
                    actual: claims.decision_id.to_string(),
                });
            }
        }
        if claims.action != expected.action {
            return Err(CapabilityError::ActionMismatch {
                expected: expected.action.to_string(),
                actual: claims.action,
            });
        }
        if &claims.principal != expected.principal {
            return Err(CapabilityError::PrincipalMismatch {
                expected: expected.principal.to_string(),
                actual: claims.principal.to_string(),
            });
        }
        if self.is_revoked(&claims.jti) {
            return Err(CapabilityError::Revoked { jti: claims.jti });
        }

        let remaining = u64::try_from(claims.exp - now).unwrap_or(1);
        if !self.guard.check_and_mark(&claims.jti.to_string(), remaining) {
            self.guard.record_replay_attempt(&claims.principal);
            return Err(CapabilityError::ReplayDetected { jti: claims.jti });
        }

        tracing::info!(
            jti = %claims.jti,
            decision_id = %claims.decision_id,
            principal = %claims.principal,
            "capability token consumed"
        );
        Ok(claims)
    }

    /// Blacklist the token until `until`, and never before its `exp`: a
    /// revocation cannot lapse while the token could still be consumed.
    pub fn revoke(&self, claims: &TokenClaims, until: Timestamp) {
        let until = match Timestamp::from_epoch_secs(claims.exp) {
            Ok(exp) => until.max(exp),
            Err(_) => until,
        };
        tracing::info!(jti = %claims.jti, until = %until, "capability token revoked");
        self.revoked.insert(claims.jti, until);
    }

    /// Whether `jti` is currently revoked.
    pub fn is_revoked(&self, jti: &TokenId) -> bool {
        let now = self.clock.now();
        self.revoked.get(jti).is_some_and(|until| *until > now)
    }

    /// Drop revocations that have lapsed. Returns the number removed.
    pub fn sweep_revocations(&self, now: Timestamp) -> usize {
        let before = self.revoked.len();
        self.revoked.retain(|_, until| *until > now);
        before.saturating_sub(self.revoked.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::InMemoryReplayGuard;
    use govgate_core::ManualClock;

    fn secret() -> SigningSecret {
        SigningSecret::from_bytes(vec![0x42; 32]).unwrap()
    }

    fn service() -> (Arc<ManualClock>, CapabilityTokenService) {
        let clock = Arc::new(ManualClock::new(
            Timestamp::parse("2026-01-15T12:00:00Z").unwrap(),
        ));
        let guard = Arc::new(InMemoryReplayGuard::new(clock.clone()));
        (clock.clone(), CapabilityTokenService::new(secret(), guard, clock))
    }

    fn d1() -> DecisionId {
        DecisionId::new("D1").unwrap()
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = SigningSecret::from_bytes(vec![1; 16]).unwrap_err();
        assert_eq!(err.code(), "INVALID_SECRET");
        assert!(SigningSecret::from_hex("zz").is_err());
        assert!(SigningSecret::from_hex(&"ab".repeat(32)).is_ok());
    }

    #[test]
    fn secret_debug_is_redacted() {
        assert_eq!(format!("{:?}", secret()), "SigningSecret([REDACTED])");
    }

    #[test]
    fn issue_then_consume_once() {
        let (_, svc) = service();
        let p1 = Principal::new("P1");
        let token = svc.issue(&d1(), "transfer", &p1, 300).unwrap();
        assert!(!format!("{token:?}").contains(token.as_str()));

        let claims = svc.verify_and_consume(token.as_str(), "transfer", &p1).unwrap();
        assert_eq!(claims.decision_id, d1());

        let err = svc.verify_and_consume(token.as_str(), "transfer", &p1).unwrap_err();
        assert_eq!(err.code(), "REPLAY_DETECTED");
        assert_eq!(svc.replay_guard().replay_attempts(&p1), 1);
    }

    #[test]
    fn expired_token_fails_even_if_never_used() {
        let (clock, svc) = service();
        let p1 = Principal::new("P1");
        let token = svc.issue(&d1(), "transfer", &p1, 300).unwrap();
        clock.advance_secs(300);
        let err = svc.verify_and_consume(token.as_str(), "transfer", &p1).unwrap_err();
        assert_eq!(err.code(), "TOKEN_EXPIRED");
        assert!(!svc.replay_guard().seen(&token.claims().jti.to_string()));
    }

    #[test]
    fn binding_mismatches_do_not_consume() {
        let (_, svc) = service();
        let p1 = Principal::new("P1");
        let token = svc.issue(&d1(), "transfer", &p1, 300).unwrap();

        let err = svc.verify_and_consume(token.as_str(), "refund", &p1).unwrap_err();
        assert_eq!(err.code(), "ACTION_MISMATCH");
        let err = svc
            .verify_and_consume(token.as_str(), "transfer", &Principal::new("P2"))
            .unwrap_err();
        assert_eq!(err.code(), "PRINCIPAL_MISMATCH");
        let other = DecisionId::new("D2").unwrap();
        let err = svc
            .verify_and_consume_bound(
                token.as_str(),
                Expected { decision_id: Some(&other), action: "transfer", principal: &p1 },
            )
            .unwrap_err();
        assert_eq!(err.code(), "DECISION_MISMATCH");

        assert!(svc.verify_and_consume(token.as_str(), "transfer", &p1).is_ok());
    }

    #[test]
    fn altered_claims_fail_signature() {
        let (_, svc) = service();
        let p1 = Principal::new("P1");
        let token = svc.issue(&d1(), "transfer", &p1, 300).unwrap();
        let (_, sig) = token.as_str().split_once('.').unwrap();

        let mut forged = token.claims().clone();
        forged.action = "withdraw_all".into();
        let forged_payload =
            URL_SAFE_NO_PAD.encode(CanonicalBytes::new(&forged).unwrap().as_bytes());
        let err = svc
            .verify_and_consume(&format!("{forged_payload}.{sig}"), "withdraw_all", &p1)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE");
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let (clock, svc) = service();
        let guard = Arc::new(InMemoryReplayGuard::new(clock.clone()));
        let other = CapabilityTokenService::new(
            SigningSecret::from_bytes(vec![0x24; 32]).unwrap(),
            guard,
            clock,
        );
        let p1 = Principal::new("P1");
        let token = other.issue(&d1(), "transfer", &p1, 300).unwrap();
        let err = svc.verify_and_consume(token.as_str(), "transfer", &p1).unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE");
    }

    #[test]
    fn garbage_is_malformed() {
        let (_, svc) = service();
        let p1 = Principal::new("P1");
        for bad in ["", "abc", "a.b.c", "!!!.???"] {
            let err = svc.verify_and_consume(bad, "transfer", &p1).unwrap_err();
            assert!(
                matches!(err.code(), "MALFORMED_TOKEN" | "INVALID_SIGNATURE"),
                "{bad}: {}",
                err.code()
            );
        }
    }

    #[test]
    fn revocation_outlives_a_short_until() {
        let (clock, svc) = service();
        let p1 = Principal::new("P1");
        let token = svc.issue(&d1(), "transfer", &p1, 300).unwrap();
        svc.revoke(token.claims(), clock.now().plus_secs(60));
        let err = svc.verify_and_consume(token.as_str(), "transfer", &p1).unwrap_err();
        assert_eq!(err.code(), "TOKEN_REVOKED");

        clock.advance_secs(120);
        assert_eq!(svc.sweep_revocations(clock.now()), 0);
        let err = svc.verify_and_consume(token.as_str(), "transfer", &p1).unwrap_err();
        assert_eq!(err.code(), "TOKEN_REVOKED");

        clock.advance_secs(180);
        assert_eq!(svc.sweep_revocations(clock.now()), 1);
        let err = svc.verify_and_consume(token.as_str(), "transfer", &p1).unwrap_err();
        assert_eq!(err.code(), "TOKEN_EXPIRED");
    }

    #[test]
    fn zero_ttl_is_refused() {
        let (_, svc) = service();
        let err = svc.issue(&d1(), "transfer", &Principal::new("P1"), 0).unwrap_err();
        assert_eq!(err.code(), "INVALID_TTL");
    }
}
