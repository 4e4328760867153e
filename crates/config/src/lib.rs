//! Configuration loading and validation.
//!
//! Config file: `stemsplit.toml` in the working directory, optional.
//! Environment variables (`BOT_TOKEN`, `OPERATOR_CHAT_ID`, `WEBHOOK_URL`,
//! `PORT`) override file values; `WEBHOOK_URL` also switches the transport
//! mode and the default temp/model directories.

pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env, discover_and_load, load_config},
    schema::{AppConfig, JobsConfig, StorageConfig, TelegramConfig, TransportMode, WebhookConfig},
};
