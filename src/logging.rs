//! Logging bootstrap for the host shell.
//!
//! Installs a `tracing-subscriber` fmt subscriber. The `tracing-log` bridge
//! is enabled so records emitted through the `log` facade by `issy-access`
//! land in the same output.

use tracing_subscriber::EnvFilter;

/// Parse a filter directive such as `info` or `info,issy_access=debug`.
pub fn filter_for(level: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(level).map_err(|e| format!("invalid log filter {:?}: {}", level, e))
}

/// Install the global subscriber. `json` switches to one JSON object per line.
pub fn init(level: &str, json: bool) -> Result<(), String> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level)?)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| format!("failed to install logger: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_targeted_levels() {
        assert!(filter_for("info").is_ok());
        assert!(filter_for("warn,issy_access=debug").is_ok());
    }

    #[test]
    fn rejects_unknown_level() {
        let err = filter_for("issy_access=loud").unwrap_err();
        assert!(err.contains("issy_access=loud"));
    }
}
