use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};

use tracing::{debug, warn};

/// One staged, not-yet-processed upload.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    /// Filesystem path of the downloaded audio.
    pub path: PathBuf,
    /// Declared media type of the attachment.
    pub mime_type: String,
    /// When the file was staged.
    pub staged_at: Instant,
}

impl StagedUpload {
    #[must_use]
    pub fn new(path: PathBuf, mime_type: impl Into<String>) -> Self {
        Self {
            path,
            mime_type: mime_type.into(),
            staged_at: Instant::now(),
        }
    }
}

/// Mutex-guarded map from chat id to its staged upload.
///
/// Lock scopes are synchronous and never held across an await point; file
/// deletion on overwrite happens outside the lock.
#[derive(Clone, Default)]
pub struct UploadStore {
    inner: Arc<Mutex<HashMap<i64, StagedUpload>>>,
}

impl UploadStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an upload for a chat, replacing any previous record.
    /// The previous staged file is deleted from disk (best effort) and the
    /// replaced record is returned for observability.
    pub fn stage(&self, chat_id: i64, upload: StagedUpload) -> Option<StagedUpload> {
        let previous = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.insert(chat_id, upload)
        };

        if let Some(ref old) = previous {
            debug!(chat_id, path = %old.path.display(), "replacing staged upload");
            if let Err(e) = std::fs::remove_file(&old.path) {
                warn!(chat_id, path = %old.path.display(), error = %e, "failed to delete replaced staged file");
            }
        }
        previous
    }

    /// Consume the staged upload for a chat. At most one caller observes
    /// the record; a concurrent take on the same key gets `None`.
    pub fn take(&self, chat_id: i64) -> Option<StagedUpload> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&chat_id)
    }

    /// Peek without consuming.
    #[must_use]
    pub fn get(&self, chat_id: i64) -> Option<StagedUpload> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&chat_id).cloned()
    }

    /// Drop the record for a chat without touching the file.
    pub fn clear(&self, chat_id: i64) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&chat_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
