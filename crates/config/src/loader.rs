use std::path::Path;

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::schema::AppConfig;

/// Standard config file name, looked up in the working directory.
const CONFIG_FILENAME: &str = "stemsplit.toml";

/// Load config from the given TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    Ok(cfg)
}

/// Discover and load `stemsplit.toml`, then layer process environment
/// variables on top. Returns defaults when no file is found.
#[must_use]
pub fn discover_and_load() -> AppConfig {
    // `.env` is a convenience for local runs; absence is not an error.
    let _ = dotenvy::dotenv();

    let path = Path::new(CONFIG_FILENAME);
    let mut cfg = if path.exists() {
        debug!(path = %path.display(), "loading config");
        match load_config(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                AppConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        AppConfig::default()
    };

    apply_env(&mut cfg, |name| std::env::var(name).ok());
    cfg
}

/// Apply environment overrides from an injectable lookup, so tests never
/// touch process-wide state.
pub fn apply_env(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup("BOT_TOKEN") {
        cfg.telegram.token = Secret::new(token);
    }
    if let Some(raw) = lookup("OPERATOR_CHAT_ID") {
        match raw.parse::<i64>() {
            Ok(id) => cfg.telegram.operator_chat_id = Some(id),
            Err(_) => warn!(value = %raw, "OPERATOR_CHAT_ID is not a chat id, ignoring"),
        }
    }
    if let Some(url) = lookup("WEBHOOK_URL") {
        if !url.is_empty() {
            cfg.webhook.base_url = Some(url);
        }
    }
    if let Some(raw) = lookup("PORT") {
        match raw.parse::<u16>() {
            Ok(port) => cfg.webhook.port = port,
            Err(_) => warn!(value = %raw, "PORT is not a port number, ignoring"),
        }
    }
}
