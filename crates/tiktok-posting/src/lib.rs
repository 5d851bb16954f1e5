//! Client for TikTok's Content Posting API.
//!
//! A post is three calls: `video/init` reserves a `publish_id` and an upload
//! URL, the file is PUT to that URL in one or more chunks, and
//! `status/fetch` is polled until TikTok finishes processing.

mod client;
mod error;
mod history;
mod types;

pub use client::{
    DEFAULT_POLL_INTERVAL, DEFAULT_STATUS_POLLS, MAX_TITLE_CHARS, PostRequest, STATUS_UNAVAILABLE,
    UploadClient,
};
pub use error::{HistoryError, UploadError};
pub use history::{DEFAULT_HISTORY_FILE, HistoryEntry, UploadHistory};
pub use types::{ChunkPlan, PrivacyLevel, PublishState, UploadStatus, UserInfo};
