//! Inbound update handling: audio ingress, the stem-choice keyboard,
//! and callback dispatch into the job queue.

use std::path::PathBuf;

use {
    teloxide::{
        payloads::{AnswerCallbackQuerySetters, SendMessageSetters},
        prelude::*,
        types::{
            CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, MediaKind, MessageKind,
            UpdateKind,
        },
    },
    tracing::{debug, error, info, warn},
};

use {
    stemsplit_jobs::JobRequest,
    stemsplit_separation::StemChoice,
    stemsplit_sessions::StagedUpload,
};

use crate::{context::BotContext, messages, Error, Result};

/// Entry point shared by the polling loop and the webhook route.
pub async fn handle_update(ctx: &BotContext, update: Update) {
    match update.kind {
        UpdateKind::Message(msg) => {
            let chat_id = msg.chat.id.0;
            if let Err(e) = handle_message(ctx, msg).await {
                error!(chat_id, error = %e, "error handling message");
            }
        },
        UpdateKind::CallbackQuery(query) => {
            if let Err(e) = handle_callback(ctx, query).await {
                error!(error = %e, "error handling callback query");
            }
        },
        other => {
            debug!("ignoring update: {other:?}");
        },
    }
}

pub async fn handle_message(ctx: &BotContext, msg: Message) -> Result<()> {
    let chat_id = msg.chat.id;

    if let Some(text) = msg.text() {
        match text.split_whitespace().next() {
            Some("/start") => {
                ctx.bot.send_message(chat_id, messages::WELCOME).await?;
            },
            Some("/help") => {
                ctx.bot.send_message(chat_id, messages::HELP).await?;
            },
            // Plain text gets no reply; the bot only reacts to audio.
            _ => {},
        }
        return Ok(());
    }

    let Some((file_id, mime_type)) = extract_upload(&msg) else {
        if has_attachment(&msg) {
            ctx.bot.send_message(chat_id, messages::AUDIO_ONLY).await?;
        }
        return Ok(());
    };

    ctx.bot.send_message(chat_id, messages::DOWNLOADING).await?;
    let staged_path = match download_to_tmp(ctx, &file_id, &mime_type).await {
        Ok(path) => path,
        Err(e) => {
            warn!(chat_id = chat_id.0, error = %e, "upload download failed");
            ctx.bot.send_message(chat_id, messages::DOWNLOAD_FAILED).await?;
            return Ok(());
        },
    };

    ctx.store
        .stage(chat_id.0, StagedUpload::new(staged_path, mime_type.clone()));
    info!(chat_id = chat_id.0, mime_type, "upload staged");

    ctx.bot
        .send_message(chat_id, messages::CHOOSE_STEM)
        .reply_markup(choice_keyboard())
        .await?;
    Ok(())
}

pub async fn handle_callback(ctx: &BotContext, query: CallbackQuery) -> Result<()> {
    let choice = query.data.as_deref().and_then(StemChoice::from_callback_data);
    let (Some(choice), Some(message)) = (choice, query.message.as_ref()) else {
        let _ = ctx.bot.answer_callback_query(&query.id).await;
        return Ok(());
    };
    let chat_id = message.chat().id;
    let message_id = message.id();

    // One job per staged upload: taking the entry makes a second button
    // press land here and get the alert instead of a duplicate job.
    let Some(upload) = ctx.store.take(chat_id.0) else {
        ctx.bot
            .answer_callback_query(&query.id)
            .text(messages::NO_FILE_FOUND)
            .show_alert(true)
            .await?;
        return Ok(());
    };
    ctx.bot.answer_callback_query(&query.id).await?;

    if let Err(e) = ctx
        .bot
        .edit_message_text(chat_id, message_id, messages::PROCESSING)
        .await
    {
        debug!(chat_id = chat_id.0, error = %e, "could not edit prompt, sending instead");
        let _ = ctx.bot.send_message(chat_id, messages::PROCESSING).await;
    }

    let request = JobRequest {
        chat_id: chat_id.0,
        input_path: upload.path,
        choice,
    };
    if let Err(e) = ctx.queue.try_enqueue(request) {
        warn!(chat_id = chat_id.0, error = %e, "job rejected");
        let request = e.into_request();
        if let Err(e) = std::fs::remove_file(&request.input_path) {
            warn!(
                path = %request.input_path.display(),
                error = %e,
                "failed to remove rejected input"
            );
        }
        ctx.bot.send_message(chat_id, messages::BUSY).await?;
    } else {
        info!(chat_id = chat_id.0, %choice, "job enqueued");
    }
    Ok(())
}

fn choice_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            messages::BUTTON_VOCALS,
            StemChoice::Vocals.callback_data(),
        ),
        InlineKeyboardButton::callback(
            messages::BUTTON_ACCOMPANIMENT,
            StemChoice::Accompaniment.callback_data(),
        ),
    ]])
}

/// Returns the file id and mime type when the message carries audio:
/// either a native audio message or a document with an `audio/*` mime
/// type. Anything else yields `None`.
fn extract_upload(msg: &Message) -> Option<(String, String)> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Audio(a) => {
                let mime = a
                    .audio
                    .mime_type
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "audio/mpeg".to_string());
                Some((a.audio.file.id.clone(), mime))
            },
            MediaKind::Document(d) => {
                let mime = d.document.mime_type.as_ref().map(|m| m.to_string())?;
                if mime.starts_with("audio/") {
                    Some((d.document.file.id.clone(), mime))
                } else {
                    None
                }
            },
            _ => None,
        },
        _ => None,
    }
}

fn has_attachment(msg: &Message) -> bool {
    matches!(
        &msg.kind,
        MessageKind::Common(common) if !matches!(common.media_kind, MediaKind::Text(_))
    )
}

/// Maps the upload's mime type onto the staging file extension, so the
/// decoder's container probe gets a useful hint.
fn suffix_for_mime(mime: &str) -> &'static str {
    if mime.contains("wav") {
        ".wav"
    } else if mime.contains("ogg") {
        ".ogg"
    } else {
        ".mp3"
    }
}

/// Resolves the file via `getFile` and streams it into a uniquely named
/// file under the staging directory. The caller owns the returned path.
async fn download_to_tmp(ctx: &BotContext, file_id: &str, mime_type: &str) -> Result<PathBuf> {
    let file = ctx.bot.get_file(file_id).await?;

    let root = ctx.api_root.as_str().trim_end_matches('/');
    let url = format!("{root}/file/bot{}/{}", ctx.bot.token(), file.path);
    let response = reqwest::get(&url).await?;
    if !response.status().is_success() {
        return Err(Error::message(format!(
            "file download failed: HTTP {}",
            response.status()
        )));
    }
    let data = response.bytes().await?;

    let tmp = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(suffix_for_mime(mime_type))
        .tempfile_in(&ctx.tmp_dir)?;
    std::fs::write(tmp.path(), &data)?;
    let path = tmp
        .into_temp_path()
        .keep()
        .map_err(|e| Error::message(e.to_string()))?;
    Ok(path)
}
