//! Access-point side of the wire contract: payload parsing and
//! drift-tolerant token verification.

use crate::access::clock::{Clock, SystemClock};
use crate::access::core;
use crate::access::types::*;

/// Counters checked on either side of the current one.
pub const DEFAULT_DRIFT_WINDOW: u32 = 1;
/// Largest accepted drift window (100 s either side at a 10 s step).
pub const MAX_DRIFT_WINDOW: u32 = 10;

/// Split `ISSY-R-<identity prefix>-<token>` into its parts.
///
/// The token is taken after the last hyphen so identity prefixes that
/// contain hyphens still parse.
pub fn parse_payload(payload: &str) -> AccessResult<ParsedPayload> {
    let rest = payload
        .trim()
        .strip_prefix(PAYLOAD_PREFIX)
        .ok_or_else(|| AccessError::new(AccessErrorKind::InvalidToken, "Missing ISSY-R- prefix"))?;
    let (identity_prefix, token) = rest
        .rsplit_once('-')
        .ok_or_else(|| AccessError::new(AccessErrorKind::InvalidToken, "Missing token separator"))?;
    if identity_prefix.is_empty() {
        return Err(AccessError::new(AccessErrorKind::InvalidToken, "Empty identity prefix"));
    }
    if !is_well_formed_token(token) {
        return Err(AccessError::new(AccessErrorKind::InvalidToken, "Token must be 6 digits")
            .with_detail(token.to_string()));
    }
    Ok(ParsedPayload {
        identity_prefix: identity_prefix.to_string(),
        token: token.to_string(),
    })
}

fn is_well_formed_token(token: &str) -> bool {
    token.len() == TOKEN_LENGTH as usize && token.bytes().all(|b| b.is_ascii_digit())
}

/// Verify a numeric token at the current time.
pub fn verify_token(secret_b64: &str, identity: &str, token: &str, drift_window: u32) -> AccessResult<VerifyResult> {
    verify_token_at(secret_b64, identity, token, drift_window, SystemClock.now_ms())
}

/// Verify a numeric token against the counters around `now_ms`.
pub fn verify_token_at(
    secret_b64: &str,
    identity: &str,
    token: &str,
    drift_window: u32,
    now_ms: u64,
) -> AccessResult<VerifyResult> {
    let key = core::decode_secret(secret_b64)?;
    if identity.trim().is_empty() {
        return Err(AccessError::invalid_identity("Identity is missing"));
    }
    if drift_window > MAX_DRIFT_WINDOW {
        return Err(AccessError::invalid_config(format!(
            "drift window {} exceeds the maximum of {}",
            drift_window, MAX_DRIFT_WINDOW
        )));
    }
    if !is_well_formed_token(token) {
        return Ok(VerifyResult::rejected());
    }

    let base = core::time_counter_at(now_ms);
    let start = base.saturating_sub(drift_window as u64);
    let end = base.saturating_add(drift_window as u64);

    for counter in start..=end {
        let expected = core::token_raw(&key, identity, counter)?;
        if constant_time_eq(expected.as_bytes(), token.as_bytes()) {
            return Ok(VerifyResult {
                valid: true,
                drift: counter as i64 - base as i64,
                matched_counter: Some(counter),
            });
        }
    }
    Ok(VerifyResult::rejected())
}

/// Verify a full display payload: prefix, identity prefix and token.
pub fn verify_payload_at(
    secret_b64: &str,
    identity: &str,
    payload: &str,
    drift_window: u32,
    now_ms: u64,
) -> AccessResult<VerifyResult> {
    let parsed = parse_payload(payload)?;
    let expected_prefix: String = identity.chars().take(IDENTITY_PREFIX_CHARS).collect();
    if parsed.identity_prefix != expected_prefix {
        log::debug!("payload identity prefix does not match resident");
        return Ok(VerifyResult::rejected());
    }
    verify_token_at(secret_b64, identity, &parsed.token, drift_window, now_ms)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
