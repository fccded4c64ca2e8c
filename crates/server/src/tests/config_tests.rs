use super::{apply_env, apply_file, apply_file_values, Settings};

use std::{
    collections::HashMap,
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_bind_locally_with_short_access_tokens() {
    let settings = Settings::default();
    assert_eq!(settings.server_bind, "127.0.0.1:8000");
    assert_eq!(settings.access_ttl_seconds, 300);
    assert_eq!(settings.resolved_public_url(), "http://127.0.0.1:8000");
}

#[test]
fn prefixed_env_overrides_plain_env() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_from(&[
            ("SERVER_BIND", "0.0.0.0:9000"),
            ("APP__BIND_ADDR", "0.0.0.0:9100"),
            ("APP__JWT_SECRET", "from-env"),
            ("APP__ACCESS_TTL_SECONDS", "42"),
            ("APP__REFRESH_TTL_SECONDS", "not-a-number"),
        ]),
    );
    assert_eq!(settings.server_bind, "0.0.0.0:9100");
    assert_eq!(settings.jwt_secret, "from-env");
    assert_eq!(settings.access_ttl_seconds, 42);
    assert_eq!(
        settings.refresh_ttl_seconds,
        Settings::default().refresh_ttl_seconds
    );
}

#[test]
fn public_url_is_trimmed_of_trailing_slash() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_from(&[("SERVER_PUBLIC_URL", "https://sandbox.example.com/")]),
    );
    assert_eq!(
        settings.resolved_public_url(),
        "https://sandbox.example.com"
    );
}

#[test]
fn file_values_apply_typed_keys() {
    let raw = r#"
bind_addr = "127.0.0.1:7000"
jwt_secret = "file-secret"
access_ttl_seconds = 60
"#;
    let values: HashMap<String, toml::Value> = toml::from_str(raw).expect("toml");
    let mut settings = Settings::default();
    apply_file_values(&mut settings, &values);
    assert_eq!(settings.server_bind, "127.0.0.1:7000");
    assert_eq!(settings.jwt_secret, "file-secret");
    assert_eq!(settings.access_ttl_seconds, 60);
}

#[test]
fn missing_or_malformed_file_keeps_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("shipment_sandbox_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");

    let mut settings = Settings::default();
    apply_file(&mut settings, &temp_root.join("absent.toml"));
    assert_eq!(settings, Settings::default());

    let broken = temp_root.join("server.toml");
    fs::write(&broken, "bind_addr = [unterminated").expect("write");
    apply_file(&mut settings, &broken);
    assert_eq!(settings, Settings::default());

    fs::remove_dir_all(temp_root).expect("cleanup");
}
