//! Content Posting API types.
//!
//! See: <https://developers.tiktok.com/doc/content-posting-api-reference-direct-post>

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who can see the published video.
///
/// Unaudited (sandbox) clients may only post `SELF_ONLY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivacyLevel {
    SelfOnly,
    MutualFollowFriends,
    FollowerOfCreator,
    PublicToEveryone,
}

impl PrivacyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PrivacyLevel::SelfOnly => "SELF_ONLY",
            PrivacyLevel::MutualFollowFriends => "MUTUAL_FOLLOW_FRIENDS",
            PrivacyLevel::FollowerOfCreator => "FOLLOWER_OF_CREATOR",
            PrivacyLevel::PublicToEveryone => "PUBLIC_TO_EVERYONE",
        }
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyLevel {
    type Err = String;

    /// Accepts the API spelling as well as lower/kebab case (`self-only`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SELF_ONLY" => Ok(PrivacyLevel::SelfOnly),
            "MUTUAL_FOLLOW_FRIENDS" => Ok(PrivacyLevel::MutualFollowFriends),
            "FOLLOWER_OF_CREATOR" => Ok(PrivacyLevel::FollowerOfCreator),
            "PUBLIC_TO_EVERYONE" => Ok(PrivacyLevel::PublicToEveryone),
            _ => Err(format!(
                "unknown privacy level '{s}' (expected SELF_ONLY, MUTUAL_FOLLOW_FRIENDS, \
                FOLLOWER_OF_CREATOR or PUBLIC_TO_EVERYONE)"
            )),
        }
    }
}

/// Coarse publish state derived from the provider's status string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PublishState {
    Processing,
    Published,
    Failed,
}

impl PublishState {
    /// Map `PUBLISH_COMPLETE`/`FAILED`; every in-flight status
    /// (`PROCESSING_UPLOAD`, `PROCESSING_DOWNLOAD`, `SEND_TO_USER_INBOX`, ...)
    /// is processing.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "PUBLISH_COMPLETE" => PublishState::Published,
            "FAILED" => PublishState::Failed,
            _ => PublishState::Processing,
        }
    }
}

/// Publish status of one submitted video, as last observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadStatus {
    pub publish_id: String,
    pub state: PublishState,
    /// Raw status string reported by TikTok
    pub provider_status: String,
    /// Reason reported when `state` is `Failed`
    pub fail_reason: Option<String>,
    /// Unix seconds
    pub last_checked_at: u64,
}

/// Profile of the authorized account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub open_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// How a file is split for `FILE_UPLOAD`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub video_size: u64,
    pub chunk_size: u64,
    pub total_chunk_count: u64,
}

impl ChunkPlan {
    /// Files up to this size go up in one piece
    pub const SINGLE_CHUNK_LIMIT: u64 = 64 * 1024 * 1024;
    /// Chunk size for larger files
    pub const CHUNK_SIZE: u64 = 10 * 1024 * 1024;

    /// Split `video_size` bytes; the last chunk absorbs the remainder.
    pub fn for_size(video_size: u64) -> Self {
        if video_size <= Self::SINGLE_CHUNK_LIMIT {
            return Self {
                video_size,
                chunk_size: video_size,
                total_chunk_count: 1,
            };
        }
        Self {
            video_size,
            chunk_size: Self::CHUNK_SIZE,
            total_chunk_count: video_size / Self::CHUNK_SIZE,
        }
    }

    /// Inclusive byte ranges `(start, end)` of each chunk, in order.
    pub fn ranges(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        (0..self.total_chunk_count).map(move |i| {
            let start = i * self.chunk_size;
            let end = if i + 1 == self.total_chunk_count {
                self.video_size.saturating_sub(1)
            } else {
                start + self.chunk_size - 1
            };
            (start, end)
        })
    }
}

// Wire types

/// Every Content Posting API response wraps its payload the same way
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    pub fn is_ok(&self) -> bool {
        self.code == "ok"
    }

    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self.code.as_str(),
            "access_token_invalid" | "scope_not_authorized" | "token_not_authorized_for_specified_scope"
        )
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct InitRequest<'a> {
    pub post_info: PostInfo<'a>,
    pub source_info: SourceInfo,
}

#[derive(Debug, Serialize)]
pub(crate) struct PostInfo<'a> {
    pub title: &'a str,
    pub privacy_level: PrivacyLevel,
    pub disable_duet: bool,
    pub disable_comment: bool,
    pub disable_stitch: bool,
    pub video_cover_timestamp_ms: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SourceInfo {
    pub source: &'static str,
    pub video_size: u64,
    pub chunk_size: u64,
    pub total_chunk_count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InitData {
    pub publish_id: String,
    pub upload_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusData {
    pub status: String,
    pub fail_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserData {
    pub user: UserInfo,
}
