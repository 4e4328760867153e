use std::path::PathBuf;
use std::sync::Arc;

use teloxide::Bot;

use stemsplit_jobs::JobQueue;
use stemsplit_sessions::UploadStore;

/// Everything the update handlers need, shared across the polling loop
/// and the webhook route.
pub struct BotContext {
    pub bot: Bot,
    pub store: UploadStore,
    pub queue: JobQueue,
    /// Directory staged uploads are written into.
    pub tmp_dir: PathBuf,
    /// Base URL for `file/bot<token>/<path>` downloads. Points at the
    /// real Bot API in production and at a local server in tests.
    pub api_root: reqwest::Url,
    pub operator_chat_id: Option<i64>,
}

pub type SharedContext = Arc<BotContext>;
