//! Outbound delivery of finished jobs, with rate-limit aware retries.

use {
    std::{future::Future, path::Path, time::Duration},
    teloxide::{
        RequestError,
        payloads::SendAudioSetters,
        prelude::*,
        types::{ChatId, InputFile},
    },
    tracing::{info, warn},
};

use {
    async_trait::async_trait,
    stemsplit_common::text::truncate_chars,
    stemsplit_jobs::{Delivery, FailureKind},
    stemsplit_separation::StemChoice,
};

use crate::messages;

const RETRY_AFTER_MAX_RETRIES: usize = 4;
const OPERATOR_DETAIL_MAX_CHARS: usize = 150;

/// Sends separated stems and failure notices back through the Bot API.
pub struct TelegramDelivery {
    bot: Bot,
    operator_chat_id: Option<i64>,
}

impl TelegramDelivery {
    pub fn new(bot: Bot, operator_chat_id: Option<i64>) -> Self {
        Self {
            bot,
            operator_chat_id,
        }
    }

    /// Copies a truncated failure detail to the operator chat, if one is
    /// configured. Users never see the raw error.
    async fn notify_operator(&self, chat_id: i64, kind: FailureKind, detail: &str) {
        let Some(operator) = self.operator_chat_id else {
            return;
        };
        let text = format!(
            "⚠️ job failed for chat {chat_id} ({kind:?}): {}",
            truncate_chars(detail, OPERATOR_DETAIL_MAX_CHARS)
        );
        if let Err(e) = self.bot.send_message(ChatId(operator), text).await {
            warn!(operator, error = %e, "failed to notify operator");
        }
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn deliver(
        &self,
        chat_id: i64,
        output: &Path,
        choice: StemChoice,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let caption = messages::result_caption(choice);
        run_with_retry(chat_id, "send audio", || {
            let req = self
                .bot
                .send_audio(ChatId(chat_id), InputFile::file(output.to_path_buf()))
                .caption(caption);
            async move { req.await }
        })
        .await?;
        info!(chat_id, %choice, "stem delivered");
        Ok(())
    }

    async fn fail(&self, chat_id: i64, kind: FailureKind, detail: &str) {
        let text = messages::failure_text(kind);
        let result = run_with_retry(chat_id, "send failure notice", || {
            let req = self.bot.send_message(ChatId(chat_id), text);
            async move { req.await }
        })
        .await;
        if let Err(e) = result {
            warn!(chat_id, error = %e, "failed to send failure notice");
        }
        self.notify_operator(chat_id, kind, detail).await;
    }
}

/// Retries a Bot API call when Telegram answers 429, honoring the
/// server-provided wait time. Other errors pass straight through.
async fn run_with_retry<T, F, Fut>(
    chat_id: i64,
    operation: &'static str,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id,
                        operation,
                        retries,
                        retry_after_secs = wait.as_secs(),
                        "rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id,
                    operation,
                    retries,
                    retry_after_secs = wait.as_secs(),
                    "rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}
