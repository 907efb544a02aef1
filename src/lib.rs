//! Host shell for the resident access pass: settings, logging and a
//! terminal display driven by the `issy-access` rotation engine.

pub mod logging;
pub mod settings;
pub mod terminal;

use issy_access::access::{AccessError, RotationEngine};
use settings::AppSettings;

/// Load settings, start the engine and display codes until Ctrl-C.
pub async fn run() -> Result<(), String> {
    let settings = AppSettings::load()?;
    logging::init(&settings.log_level, settings.json_logs)?;

    let credential = settings::credential_from(|key| std::env::var(key).ok())?.ok_or_else(|| {
        format!(
            "no credential: set {} and {}",
            settings::SECRET_ENV,
            settings::IDENTITY_ENV
        )
    })?;
    tracing::info!(poll_ms = settings.rotation.poll_interval_ms, "starting access pass");

    let engine = RotationEngine::builder(Some(credential))
        .config(settings.rotation.clone())
        .on_error(|err: &AccessError| tracing::error!(kind = ?err.kind, "access code unavailable: {}", err))
        .spawn()?;

    let display = tokio::spawn(terminal::run_display(
        engine.subscribe_code(),
        engine.subscribe_countdown(),
        settings.rotation.clone(),
        settings.show_qr,
    ));

    let shutdown = tokio::signal::ctrl_c().await;
    engine.dispose().await;
    display.abort();
    println!();
    shutdown.map_err(|e| format!("failed to wait for Ctrl-C: {}", e))?;

    tracing::info!(engine = engine.id(), "access pass stopped");
    Ok(())
}
