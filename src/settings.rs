//! Host settings.
//!
//! Read from `$ISSY_SETTINGS`, or `<config dir>/issy/settings.json` when
//! that is unset. A missing file means defaults. The credential never lives
//! in the settings file: it comes from `ISSY_SECRET` and `ISSY_IDENTITY`.

use std::path::{Path, PathBuf};

use issy_access::access::{AccessError, AccessErrorKind, AccessResult, Credential, RotationConfig};
use serde::{Deserialize, Serialize};

pub const SETTINGS_ENV: &str = "ISSY_SETTINGS";
pub const LOG_ENV: &str = "ISSY_LOG";
pub const SECRET_ENV: &str = "ISSY_SECRET";
pub const IDENTITY_ENV: &str = "ISSY_IDENTITY";

const APP_DIR: &str = "issy";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub rotation: RotationConfig,
    /// `tracing` filter directive.
    pub log_level: String,
    pub json_logs: bool,
    /// Print the payload as a QR block on every rotation.
    pub show_qr: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            rotation: RotationConfig::default(),
            log_level: "info".to_string(),
            json_logs: false,
            show_qr: true,
        }
    }
}

impl AppSettings {
    /// Load from the resolved settings path and apply environment overrides.
    pub fn load() -> AccessResult<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut settings = match settings_path(lookup) {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        settings.apply_env(lookup);
        Ok(settings)
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> AccessResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(AccessError::from(e).with_detail(path.display().to_string())),
        };
        let settings: Self = serde_json::from_str(&raw).map_err(|e| {
            AccessError::new(AccessErrorKind::InvalidConfig, format!("Malformed settings: {}", e))
                .with_detail(path.display().to_string())
        })?;
        settings.rotation.validate()?;
        Ok(settings)
    }

    /// Write to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> AccessResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AccessError::new(AccessErrorKind::Io, format!("Serialize settings: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
    }
}

/// `$ISSY_SETTINGS` if set, else the per-user config location.
pub fn settings_path(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    match lookup(SETTINGS_ENV).filter(|v| !v.trim().is_empty()) {
        Some(path) => Some(PathBuf::from(path)),
        None => dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE)),
    }
}

/// Credential from the environment. `None` when neither variable is set;
/// setting only one of them is a configuration error.
pub fn credential_from(lookup: impl Fn(&str) -> Option<String>) -> AccessResult<Option<Credential>> {
    let secret = lookup(SECRET_ENV).filter(|v| !v.trim().is_empty());
    let identity = lookup(IDENTITY_ENV).filter(|v| !v.trim().is_empty());
    match (secret, identity) {
        (Some(secret), Some(identity)) => Ok(Some(Credential::new(secret, identity))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(AccessError::invalid_config(format!("{} is set but {} is not", SECRET_ENV, IDENTITY_ENV))),
        (None, Some(_)) => Err(AccessError::invalid_config(format!("{} is set but {} is not", IDENTITY_ENV, SECRET_ENV))),
    }
}
