use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

pub const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub public_url: Option<String>,
    pub jwt_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8000".into(),
            public_url: None,
            jwt_secret: "sandbox-secret".into(),
            access_ttl_seconds: 300,
            refresh_ttl_seconds: 86_400,
        }
    }
}

impl Settings {
    /// Base used for label links; falls back to the bind address.
    pub fn resolved_public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.server_bind))
            .trim_end_matches('/')
            .to_string()
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new(SETTINGS_FILE));
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, path: &Path) {
    let Ok(raw) = fs::read_to_string(path) else {
        return;
    };
    match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
        Ok(file_cfg) => apply_file_values(settings, &file_cfg),
        Err(error) => tracing::warn!(path = %path.display(), %error, "ignoring malformed settings file"),
    }
}

pub(crate) fn apply_file_values(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("bind_addr").and_then(toml::Value::as_str) {
        settings.server_bind = v.to_string();
    }
    if let Some(v) = file_cfg.get("public_url").and_then(toml::Value::as_str) {
        settings.public_url = Some(v.to_string());
    }
    if let Some(v) = file_cfg.get("jwt_secret").and_then(toml::Value::as_str) {
        settings.jwt_secret = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("access_ttl_seconds")
        .and_then(toml::Value::as_integer)
    {
        settings.access_ttl_seconds = v;
    }
    if let Some(v) = file_cfg
        .get("refresh_ttl_seconds")
        .and_then(toml::Value::as_integer)
    {
        settings.refresh_ttl_seconds = v;
    }
}

pub(crate) fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("SERVER_PUBLIC_URL") {
        settings.public_url = Some(v);
    }
    if let Some(v) = var("APP__PUBLIC_URL") {
        settings.public_url = Some(v);
    }

    if let Some(v) = var("APP__JWT_SECRET") {
        settings.jwt_secret = v;
    }

    if let Some(parsed) = var("APP__ACCESS_TTL_SECONDS").and_then(|v| v.parse::<i64>().ok()) {
        settings.access_ttl_seconds = parsed;
    }
    if let Some(parsed) = var("APP__REFRESH_TTL_SECONDS").and_then(|v| v.parse::<i64>().ok()) {
        settings.refresh_ttl_seconds = parsed;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
