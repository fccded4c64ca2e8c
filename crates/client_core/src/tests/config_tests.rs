use super::*;

use std::{
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn defaults_poll_every_minute() {
    let settings = ClientSettings::default();
    assert_eq!(settings.poll_interval(), Duration::from_secs(60));
    assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    assert_eq!(settings.base_url, "http://127.0.0.1:8000/");
    assert!(settings.session_path.is_none());
}

#[test]
fn zero_intervals_are_clamped() {
    let settings = ClientSettings {
        poll_interval_secs: 0,
        request_timeout_secs: 0,
        ..ClientSettings::default()
    };
    assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    assert_eq!(settings.request_timeout(), Duration::from_secs(1));
}

#[test]
fn file_values_override_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let root = env::temp_dir().join(format!("shipment_client_config_{suffix}"));
    fs::create_dir_all(&root).expect("temp root");
    let path = root.join("client.toml");
    fs::write(
        &path,
        "poll_interval_secs = 15\nsession_path = \"/tmp/shipctl-session.json\"\n",
    )
    .expect("write");

    let settings = load_client_settings(Some(&path)).expect("settings");
    assert_eq!(settings.poll_interval_secs, 15);
    assert_eq!(
        settings.session_path.as_deref(),
        Some(Path::new("/tmp/shipctl-session.json"))
    );

    fs::remove_dir_all(root).expect("cleanup");
}

#[test]
fn missing_file_is_not_an_error() {
    let path = env::temp_dir().join("shipment_client_config_absent.toml");
    let settings = load_client_settings(Some(&path)).expect("settings");
    assert_eq!(settings.poll_interval_secs, 60);
}

#[test]
fn environment_overrides_request_timeout() {
    env::set_var("SHIPMENTS__REQUEST_TIMEOUT_SECS", "5");
    let settings = load_client_settings(None);
    env::remove_var("SHIPMENTS__REQUEST_TIMEOUT_SECS");

    assert_eq!(settings.expect("settings").request_timeout_secs, 5);
}
