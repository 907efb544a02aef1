//! Code generation: HMAC-SHA256 over `"<identity>:<counter>"` with HOTP
//! dynamic truncation (RFC 4226 §5.3) on a 10-second time grid.
//!
//! Every function here is pure given its inputs; the `*_at` variants take
//! the current time explicitly and the plain variants read the system clock.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::access::clock::{Clock, SystemClock};
use crate::access::types::*;

/// Output length of HMAC-SHA256.
pub const MAC_LEN: usize = 32;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Time grid
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rotation window length in seconds.
pub fn time_step() -> u64 {
    TIME_STEP
}

/// Time counter for an epoch-millisecond timestamp.
pub fn time_counter_at(now_ms: u64) -> u64 {
    now_ms / TIME_STEP_MS
}

/// Time counter for the current wall-clock time.
pub fn current_counter() -> u64 {
    time_counter_at(SystemClock.now_ms())
}

/// Epoch-ms at which the window for `counter` closes.
pub fn expires_at_ms(counter: u64) -> u64 {
    counter.saturating_add(1).saturating_mul(TIME_STEP_MS)
}

/// Whole seconds (rounded up) from `now_ms` until `expires_ms`, never negative.
pub fn remaining_seconds_at(expires_ms: u64, now_ms: u64) -> u64 {
    let left = expires_ms.saturating_sub(now_ms);
    left.div_ceil(1000)
}

/// Seconds until the next rotation boundary, in `[0, TIME_STEP]`.
pub fn seconds_until_next_rotation() -> u64 {
    seconds_until_next_rotation_at(SystemClock.now_ms())
}

/// Seconds until the boundary following `now_ms`.
pub fn seconds_until_next_rotation_at(now_ms: u64) -> u64 {
    remaining_seconds_at(expires_at_ms(time_counter_at(now_ms)), now_ms)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  MAC + truncation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode the base64 secret delivered by the provisioning backend.
pub fn decode_secret(secret_b64: &str) -> AccessResult<Vec<u8>> {
    let trimmed = secret_b64.trim();
    if trimmed.is_empty() {
        return Err(AccessError::invalid_credential("Secret is missing"));
    }
    let key = STANDARD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|e| {
            AccessError::invalid_credential("Secret is not valid base64").with_detail(e.to_string())
        })?;
    if key.is_empty() {
        return Err(AccessError::invalid_credential("Secret decodes to zero bytes"));
    }
    Ok(key)
}

/// The signed message for one identity and counter.
pub fn message_for(identity: &str, counter: u64) -> String {
    format!("{}:{}", identity, counter)
}

/// HMAC-SHA256(key, message).
pub fn compute_mac(key: &[u8], message: &[u8]) -> AccessResult<[u8; MAC_LEN]> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| AccessError::transient("HMAC initialisation failed").with_detail(e.to_string()))?;
    mac.update(message);
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&digest);
    Ok(out)
}

/// Dynamic truncation to an unsigned 31-bit value.
///
/// The top bit of the first extracted byte is masked off; the verifier does
/// the same, so leaving it set yields a different token for roughly half of
/// all MACs.
pub fn truncate(mac: &[u8; MAC_LEN]) -> u32 {
    let offset = (mac[MAC_LEN - 1] & 0x0f) as usize;
    ((mac[offset] as u32 & 0x7f) << 24)
        | ((mac[offset + 1] as u32) << 16)
        | ((mac[offset + 2] as u32) << 8)
        | (mac[offset + 3] as u32)
}

/// Reduce a truncated value to a zero-padded `TOKEN_LENGTH`-digit token.
pub fn format_token(value: u32) -> String {
    let code = value % 10u32.pow(TOKEN_LENGTH);
    format!("{:0>width$}", code, width = TOKEN_LENGTH as usize)
}

/// `ISSY-R-<first 8 chars of identity>-<token>`.
pub fn display_payload(identity: &str, token: &str) -> String {
    let prefix: String = identity.chars().take(IDENTITY_PREFIX_CHARS).collect();
    format!("{}{}-{}", PAYLOAD_PREFIX, prefix, token)
}

/// Numeric token for already-decoded key material.
pub fn token_raw(key: &[u8], identity: &str, counter: u64) -> AccessResult<String> {
    let mac = compute_mac(key, message_for(identity, counter).as_bytes())?;
    Ok(format_token(truncate(&mac)))
}

fn check_identity(identity: &str) -> AccessResult<()> {
    if identity.trim().is_empty() {
        return Err(AccessError::invalid_identity("Identity is missing"));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  High-level: generate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate a code at the current time. `counter` defaults to the current
/// time counter.
pub fn generate(secret_b64: &str, identity: &str, counter: Option<u64>) -> AccessResult<GeneratedCode> {
    generate_at(secret_b64, identity, counter, SystemClock.now_ms())
}

/// Generate a code as seen at `now_ms`.
pub fn generate_at(
    secret_b64: &str,
    identity: &str,
    counter: Option<u64>,
    now_ms: u64,
) -> AccessResult<GeneratedCode> {
    let key = decode_secret(secret_b64)?;
    check_identity(identity)?;

    let counter = counter.unwrap_or_else(|| time_counter_at(now_ms));
    let token = token_raw(&key, identity, counter)?;
    let expires_at = expires_at_ms(counter);

    log::trace!("generated access code for counter {}", counter);

    Ok(GeneratedCode {
        code: display_payload(identity, &token),
        token,
        user_id: identity.to_string(),
        counter,
        expires_at,
        remaining_seconds: remaining_seconds_at(expires_at, now_ms),
        time_step: TIME_STEP,
    })
}

/// Generate for a [`Credential`].
pub fn generate_for(credential: &Credential, counter: Option<u64>, now_ms: u64) -> AccessResult<GeneratedCode> {
    generate_at(credential.secret_b64(), credential.identity(), counter, now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference fixture: key "0123456789abcdef0123456789abcdef".
    const SECRET: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
    const IDENTITY: &str = "11111111-aaaa-bbbb-cccc-222222222222";
    const COUNTER: u64 = 1_000_000;

    fn mac_for(counter: u64) -> [u8; MAC_LEN] {
        let key = decode_secret(SECRET).unwrap();
        compute_mac(&key, message_for(IDENTITY, counter).as_bytes()).unwrap()
    }

    // ── HMAC-SHA256 (RFC 4231) ──────────────────────────────────

    #[test]
    fn rfc4231_case_2() {
        let mac = compute_mac(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn rfc4231_case_6_key_longer_than_block() {
        let key = [0xaau8; 131];
        let mac = compute_mac(&key, b"Test Using Larger Than Block-Size Key - Hash Key First").unwrap();
        assert_eq!(
            hex::encode(mac),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    // ── Reference vector ─────────────────────────────────────────

    #[test]
    fn end_to_end_vector() {
        let code = generate_at(SECRET, IDENTITY, Some(COUNTER), 10_000_005_000).unwrap();
        assert_eq!(code.token, "176423");
        assert_eq!(code.code, "ISSY-R-11111111-176423");
        assert_eq!(code.user_id, IDENTITY);
        assert_eq!(code.counter, COUNTER);
        assert_eq!(code.expires_at, 10_000_010_000);
        assert_eq!(code.remaining_seconds, 5);
        assert_eq!(code.time_step, 10);
    }

    #[test]
    fn reference_mac_bytes() {
        assert_eq!(
            hex::encode(mac_for(COUNTER)),
            "cd144e678ae30f57b516c211f2ca2018560f80b0b04c11e150c8ea1f88d42df0"
        );
    }

    #[test]
    fn truncation_masks_top_bit() {
        // Offset 0 selects 0xcd, whose high bit is set.
        let mac = mac_for(COUNTER);
        assert_eq!(mac[(mac[MAC_LEN - 1] & 0x0f) as usize] & 0x80, 0x80);
        let value = truncate(&mac);
        assert_eq!(value, 1_293_176_423);
        assert!(value < 1 << 31);
        // Unmasked, this would have been 3_440_660_071 → "660071".
        assert_eq!(format_token(value), "176423");
        assert_eq!(value, (3_440_660_071u64 % (1 << 31)) as u32);
    }

    #[test]
    fn consecutive_reference_tokens() {
        let tokens: Vec<String> = (COUNTER..COUNTER + 4)
            .map(|c| generate_at(SECRET, IDENTITY, Some(c), 0).unwrap().token)
            .collect();
        assert_eq!(tokens, ["176423", "466782", "986067", "458791"]);
    }

    // ── Invariants ───────────────────────────────────────────────

    #[test]
    fn deterministic() {
        let a = generate_at(SECRET, IDENTITY, Some(COUNTER), 1).unwrap();
        let b = generate_at(SECRET, IDENTITY, Some(COUNTER), 999_999_999).unwrap();
        assert_eq!(a.token, b.token);
        assert_eq!(a.code, b.code);
    }

    #[test]
    fn token_keeps_leading_zeros() {
        assert_eq!(format_token(42), "000042");
        assert_eq!(format_token(0), "000000");
        assert_eq!(format_token(2_147_483_647), "483647");
        let code = generate_at(SECRET, IDENTITY, Some(1_000_051), 0).unwrap();
        assert_eq!(code.token, "004648");
    }

    #[test]
    fn tokens_are_always_six_digits() {
        for c in COUNTER..COUNTER + 200 {
            let token = generate_at(SECRET, IDENTITY, Some(c), 0).unwrap().token;
            assert_eq!(token.len(), 6);
            assert!(token.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn adjacent_tokens_are_independent() {
        let tokens: Vec<String> = (COUNTER..COUNTER + 100)
            .map(|c| generate_at(SECRET, IDENTITY, Some(c), 0).unwrap().token)
            .collect();
        let equal_pairs = tokens.windows(2).filter(|w| w[0] == w[1]).count();
        assert_eq!(equal_pairs, 0);
    }

    #[test]
    fn different_secret_changes_token() {
        // base64("another-secret-key")
        let code = generate_at("YW5vdGhlci1zZWNyZXQta2V5", IDENTITY, Some(COUNTER), 0).unwrap();
        assert_eq!(code.token, "736839");
    }

    #[test]
    fn short_identity_used_whole() {
        let code = generate_at(SECRET, "abc", Some(5), 0).unwrap();
        assert_eq!(code.token, "164185");
        assert_eq!(code.code, "ISSY-R-abc-164185");
    }

    #[test]
    fn payload_prefix_counts_chars_not_bytes() {
        assert_eq!(display_payload("ÄÖÜäöüßéèê", "000001"), "ISSY-R-ÄÖÜäöüßé-000001");
    }

    #[test]
    fn omitted_counter_uses_clock() {
        let now = 1_700_000_003_500;
        let code = generate_at(SECRET, IDENTITY, None, now).unwrap();
        assert_eq!(code.counter, 170_000_000);
        assert_eq!(code.token, "657673");
        assert_eq!(code.remaining_seconds, 7);
    }

    #[test]
    fn unpadded_base64_accepted() {
        let padded = generate_at(SECRET, IDENTITY, Some(COUNTER), 0).unwrap();
        let unpadded = generate_at(SECRET.trim_end_matches('='), IDENTITY, Some(COUNTER), 0).unwrap();
        assert_eq!(padded.token, unpadded.token);
    }

    // ── Errors ───────────────────────────────────────────────────

    #[test]
    fn empty_secret_rejected() {
        let err = generate_at("", IDENTITY, Some(1), 0).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::InvalidCredential);
        let err = generate_at("   ", IDENTITY, Some(1), 0).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::InvalidCredential);
    }

    #[test]
    fn malformed_secret_rejected() {
        let err = generate_at("not base64!!", IDENTITY, Some(1), 0).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::InvalidCredential);
        assert!(err.detail.is_some());
    }

    #[test]
    fn empty_identity_rejected() {
        let err = generate_at(SECRET, "", Some(1), 0).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::InvalidIdentity);
        let err = generate_at(SECRET, " \t", Some(1), 0).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::InvalidIdentity);
    }

    // ── Time grid ────────────────────────────────────────────────

    #[test]
    fn counter_calculation() {
        assert_eq!(time_counter_at(0), 0);
        assert_eq!(time_counter_at(9_999), 0);
        assert_eq!(time_counter_at(10_000), 1);
        assert_eq!(time_counter_at(1_700_000_000_000), 170_000_000);
    }

    #[test]
    fn seconds_until_rotation() {
        assert_eq!(seconds_until_next_rotation_at(0), 10);
        assert_eq!(seconds_until_next_rotation_at(1), 10);
        assert_eq!(seconds_until_next_rotation_at(1_000), 9);
        assert_eq!(seconds_until_next_rotation_at(9_001), 1);
        assert_eq!(seconds_until_next_rotation_at(9_999), 1);
        assert_eq!(seconds_until_next_rotation_at(10_000), 10);
        let live = seconds_until_next_rotation();
        assert!(live <= time_step());
    }

    #[test]
    fn remaining_seconds_never_negative() {
        assert_eq!(remaining_seconds_at(10_000, 12_000), 0);
        assert_eq!(remaining_seconds_at(10_000, 10_000), 0);
        assert_eq!(remaining_seconds_at(10_000, 9_999), 1);
        let past = generate_at(SECRET, IDENTITY, Some(1), 1_000_000).unwrap();
        assert_eq!(past.remaining_seconds, 0);
    }

    #[test]
    fn huge_counters_saturate_expiry() {
        for counter in [u64::MAX, 1u64 << 60] {
            let code = generate_at(SECRET, "abc", Some(counter), 0).unwrap();
            assert_eq!(code.expires_at, u64::MAX);
            assert_eq!(code.remaining_seconds, 18_446_744_073_709_552);
            assert_eq!(code.token.len(), 6);
        }
        assert_eq!(remaining_seconds_at(u64::MAX, 0), u64::MAX.div_ceil(1000));
    }

    #[test]
    fn generate_for_credential_matches_free_function() {
        let cred = Credential::new(SECRET, IDENTITY);
        let a = generate_for(&cred, Some(COUNTER), 0).unwrap();
        assert_eq!(a.token, "176423");
    }

    #[test]
    fn live_generation_is_current() {
        let code = generate(SECRET, IDENTITY, None).unwrap();
        let now = current_counter();
        assert!(code.counter == now || code.counter + 1 == now);
    }
}
