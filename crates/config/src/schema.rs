use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Placeholder value shipped in sample configs. A token equal to this is
/// treated the same as a missing token.
pub const TOKEN_PLACEHOLDER: &str = "YOUR_LOCAL_BOT_TOKEN";

/// Which transport feeds Telegram updates into the handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Long-poll `getUpdates` loop.
    Polling,
    /// Inbound HTTP webhook.
    Webhook,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polling => write!(f, "polling"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

/// Telegram account settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,

    /// Chat that receives truncated failure details. Optional.
    pub operator_chat_id: Option<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            operator_chat_id: None,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("operator_chat_id", &self.operator_chat_id)
            .finish()
    }
}

/// Webhook transport settings. Presence of `base_url` selects webhook mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Public base URL Telegram posts updates to; the bot token is appended
    /// as the route path.
    pub base_url: Option<String>,

    /// Local bind address.
    pub bind: String,

    /// Local bind port.
    pub port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            bind: "0.0.0.0".into(),
            port: 10_000,
        }
    }
}

/// Filesystem locations for staged uploads and model weights.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for staged input and produced output files.
    /// Defaults to `/tmp` in webhook mode, `./tmp` otherwise.
    pub tmp_dir: Option<PathBuf>,

    /// Directory holding the ONNX model and its stems sidecar.
    /// Defaults to `/app/models` in webhook mode, `./models` otherwise.
    pub model_dir: Option<PathBuf>,
}

/// Worker pool and encoding settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Maximum concurrently running separation jobs.
    pub workers: usize,

    /// Queue depth before selections are rejected as busy.
    pub queue_depth: usize,

    /// Wall-clock budget for one job, seconds.
    pub timeout_secs: u64,

    /// Output MP3 bitrate, kbps.
    pub bitrate_kbps: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 16,
            timeout_secs: 300,
            bitrate_kbps: 192,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub webhook: WebhookConfig,
    pub storage: StorageConfig,
    pub jobs: JobsConfig,
}

impl AppConfig {
    /// Active transport mode: webhook when a base URL is configured.
    #[must_use]
    pub fn transport_mode(&self) -> TransportMode {
        if self.webhook.base_url.is_some() {
            TransportMode::Webhook
        } else {
            TransportMode::Polling
        }
    }

    /// Resolved temp directory for staged files.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.storage.tmp_dir.clone().unwrap_or_else(|| {
            match self.transport_mode() {
                TransportMode::Webhook => PathBuf::from("/tmp"),
                TransportMode::Polling => PathBuf::from("./tmp"),
            }
        })
    }

    /// Resolved model directory.
    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        self.storage.model_dir.clone().unwrap_or_else(|| {
            match self.transport_mode() {
                TransportMode::Webhook => PathBuf::from("/app/models"),
                TransportMode::Polling => PathBuf::from("./models"),
            }
        })
    }

    /// Startup validation. The process must not serve anything when this
    /// fails.
    pub fn validate(&self) -> anyhow::Result<()> {
        let token = self.telegram.token.expose_secret();
        if token.is_empty() || token == TOKEN_PLACEHOLDER {
            anyhow::bail!("BOT_TOKEN must be set (and not the placeholder value)");
        }
        if self.jobs.workers == 0 {
            anyhow::bail!("jobs.workers must be at least 1");
        }
        if self.jobs.queue_depth == 0 {
            anyhow::bail!("jobs.queue_depth must be at least 1");
        }
        Ok(())
    }
}
