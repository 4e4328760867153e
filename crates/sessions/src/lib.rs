//! Per-conversation staged upload store.
//!
//! One record per chat: the path of a downloaded, not-yet-processed audio
//! file. A fresh upload replaces the previous record and deletes its file,
//! so a user who re-uploads before choosing never leaks a temp file.

pub mod store;

pub use store::{StagedUpload, UploadStore};
