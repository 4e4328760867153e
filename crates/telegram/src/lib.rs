//! Telegram front end for the stem splitter.
//!
//! Receives audio uploads via the teloxide library, stages them on disk,
//! asks the user which stem they want through an inline keyboard, and
//! sends the separated MP3 back once the job queue finishes it.

pub mod bot;
pub mod context;
pub mod handlers;
pub mod messages;
pub mod outbound;

pub use {context::BotContext, outbound::TelegramDelivery};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
