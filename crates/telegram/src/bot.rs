//! Manual long-polling loop against the Bot API.

use {
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{context::SharedContext, handlers, Result};

// Long-polling timeout; the HTTP client timeout must sit above it so
// the client does not abort the request before Telegram responds.
const POLL_TIMEOUT_SECS: u32 = 30;
const CLIENT_TIMEOUT_SECS: u64 = 45;

pub fn build_bot(token: &Secret<String>) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(std::time::Duration::from_secs(CLIENT_TIMEOUT_SECS))
        .build()?;
    Ok(Bot::with_client(token.expose_secret(), client))
}

/// Registers the slash commands shown in Telegram's autocomplete.
pub async fn register_commands(bot: &Bot) {
    let commands = vec![
        BotCommand::new("start", "ابدأ واستعرض طريقة الاستخدام"),
        BotCommand::new("help", "عرض المساعدة"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }
}

/// Polls `getUpdates` until the token is cancelled. Clears any webhook
/// first so polling is the only consumer, and stops if another instance
/// claims the same bot token.
pub async fn run_polling(ctx: SharedContext, shutdown: CancellationToken) -> Result<()> {
    let bot = ctx.bot.clone();

    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;
    register_commands(&bot).await;
    info!(username = ?me.username, "bot connected, polling (webhook cleared)");

    let mut offset: i32 = 0;
    loop {
        if shutdown.is_cancelled() {
            info!("polling stopped");
            return Ok(());
        }

        let result = bot
            .get_updates()
            .offset(offset)
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await;

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got updates");
                for update in updates {
                    offset = update.id.as_offset();
                    handlers::handle_update(&ctx, update).await;
                }
            },
            Err(e) => {
                if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                    warn!("another instance is already polling with this token, stopping");
                    shutdown.cancel();
                    return Err(e.into());
                }
                warn!(error = %e, "getUpdates failed");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            },
        }
    }
}
