//! Core types for the resident access pass.

use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Wire constants (shared with the access-point verifier)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Length of one rotation window in seconds.
pub const TIME_STEP: u64 = 10;
/// Length of one rotation window in milliseconds.
pub const TIME_STEP_MS: u64 = TIME_STEP * 1000;
/// Number of digits in the numeric token.
pub const TOKEN_LENGTH: u32 = 6;
/// Prefix of every display payload.
pub const PAYLOAD_PREFIX: &str = "ISSY-R-";
/// How many leading identity characters are embedded in the payload.
pub const IDENTITY_PREFIX_CHARS: usize = 8;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Credential
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared secret (base64) paired with the resident identity it belongs to.
///
/// Held in memory only. The secret never appears in `Debug` output or logs.
pub struct Credential {
    secret: SecretString,
    identity: String,
}

impl Credential {
    pub fn new(secret: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
            identity: identity.into(),
        }
    }

    /// Base64 secret as delivered by the provisioning backend.
    pub fn secret_b64(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self {
            secret: SecretString::new(self.secret.expose_secret().clone()),
            identity: self.identity.clone(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"[REDACTED]")
            .field("identity", &self.identity)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Generated code
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A generated access code with its timing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    /// Display payload, e.g. `ISSY-R-11111111-176423`.
    pub code: String,
    /// Zero-padded numeric token.
    pub token: String,
    /// Identity the code was generated for.
    pub user_id: String,
    /// Time counter the code belongs to.
    pub counter: u64,
    /// End of validity, epoch milliseconds.
    pub expires_at: u64,
    /// Seconds left until `expires_at` at generation time.
    pub remaining_seconds: u64,
    /// Rotation window length in seconds.
    pub time_step: u64,
}

impl GeneratedCode {
    /// `expires_at` as a UTC timestamp.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        let ms = i64::try_from(self.expires_at).ok()?;
        Utc.timestamp_millis_opt(ms).single()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Rotation display state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle phase of a rotation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No credential; nothing is polled.
    Idle,
    /// Credential present, first code not yet displayed.
    Initializing,
    /// A valid code is displayed and counting down.
    Live,
    /// A replacement code is being generated; the previous one stays visible.
    Regenerating,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Initializing => write!(f, "initializing"),
            Self::Live => write!(f, "live"),
            Self::Regenerating => write!(f, "regenerating"),
        }
    }
}

/// Countdown colouring hint for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
}

/// Snapshot of what a display should currently show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    pub phase: Phase,
    /// `true` while a credential is present but no code has been shown yet.
    pub loading: bool,
    /// Most recent valid code (kept across failed regenerations).
    pub code: Option<GeneratedCode>,
    /// Seconds until the next rotation.
    pub remaining_seconds: u64,
}

impl DisplayState {
    /// Elapsed fraction of the current window (0.0 = fresh, 1.0 = expiring).
    pub fn progress(&self) -> f64 {
        let remaining = self.remaining_seconds.min(TIME_STEP) as f64;
        1.0 - remaining / TIME_STEP as f64
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Verification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A display payload split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPayload {
    pub identity_prefix: String,
    pub token: String,
}

/// Result of checking a token against a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub valid: bool,
    /// How many time-steps off the match was (0 = exact).
    pub drift: i64,
    /// The counter value that matched (if any).
    pub matched_counter: Option<u64>,
}

impl VerifyResult {
    pub(crate) fn rejected() -> Self {
        Self {
            valid: false,
            drift: 0,
            matched_counter: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kind for this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessErrorKind {
    /// Secret missing, not base64, or empty after decoding.
    InvalidCredential,
    /// Identity missing or blank.
    InvalidIdentity,
    /// The MAC primitive failed; retried at the next boundary.
    TransientGenerationFailure,
    /// A presented payload or token is malformed.
    InvalidToken,
    QrEncodeFailed,
    InvalidConfig,
    Io,
}

/// Crate-level error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessError {
    pub kind: AccessErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

pub type AccessResult<T> = Result<T, AccessError>;

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(d) = &self.detail {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for AccessError {}

impl AccessError {
    pub fn new(kind: AccessErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn invalid_credential(msg: impl Into<String>) -> Self {
        Self::new(AccessErrorKind::InvalidCredential, msg)
    }

    pub fn invalid_identity(msg: impl Into<String>) -> Self {
        Self::new(AccessErrorKind::InvalidIdentity, msg)
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::new(AccessErrorKind::TransientGenerationFailure, msg)
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(AccessErrorKind::InvalidConfig, msg)
    }

    /// Whether the next rotation boundary may succeed without new input.
    pub fn is_transient(&self) -> bool {
        self.kind == AccessErrorKind::TransientGenerationFailure
    }
}

impl From<AccessError> for String {
    fn from(e: AccessError) -> String {
        e.to_string()
    }
}

impl From<std::io::Error> for AccessError {
    fn from(e: std::io::Error) -> Self {
        Self::new(AccessErrorKind::Io, e.to_string())
    }
}
