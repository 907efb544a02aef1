use issy_access::access::{Credential, RotationConfig, RotationEngine, Urgency};
use issy_lib::settings::{self, AppSettings};

#[test]
fn test_settings_file_from_env_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("pass.json");
    std::fs::write(
        &file,
        r#"{"logLevel": "warn", "jsonLogs": true, "rotation": {"pollIntervalMs": 250, "warningSeconds": 6, "criticalSeconds": 2}}"#,
    )
    .unwrap();
    let file_str = file.to_string_lossy().to_string();

    let path = settings::settings_path(|key| (key == settings::SETTINGS_ENV).then(|| file_str.clone())).unwrap();
    let mut loaded = AppSettings::load_from(&path).unwrap();
    loaded.apply_env(|key| (key == settings::LOG_ENV).then(|| "trace".to_string()));

    assert_eq!(loaded.log_level, "trace");
    assert!(loaded.json_logs);
    assert!(loaded.show_qr);
    assert_eq!(loaded.rotation.poll_interval_ms, 250);
    assert_eq!(loaded.rotation.urgency(6), Urgency::Warning);
    assert_eq!(loaded.rotation.urgency(2), Urgency::Critical);
}

#[tokio::test]
async fn test_loaded_rotation_config_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let mut saved = AppSettings::default();
    saved.rotation = RotationConfig::default().with_poll_interval_ms(100).with_thresholds(4, 1);
    saved.save_to(&path).unwrap();

    let loaded = AppSettings::load_from(&path).unwrap();
    let engine = RotationEngine::builder(Some(Credential::new("c2VjcmV0", "abc")))
        .config(loaded.rotation.clone())
        .spawn()
        .unwrap();
    assert_eq!(engine.config().poll_interval_ms, 100);
    assert_eq!(engine.config().critical_seconds, 1);
    engine.dispose().await;
}
