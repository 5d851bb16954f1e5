use reqwest::StatusCode;
use tiktok_oauth::AuthError;

/// Errors from the Content Posting API calls
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("video file not found or unreadable: {0}")]
    FileNotFound(String),

    #[error("video file is empty: {0}")]
    EmptyVideo(String),

    #[error("access token rejected by TikTok")]
    Unauthorized,

    #[error("TikTok API error (status {status}): {body}")]
    RemoteError { status: StatusCode, body: String },

    #[error("unexpected TikTok API response: {0}")]
    InvalidResponse(String),

    #[error("token refresh after rejection failed: {0}")]
    RefreshFailed(#[source] AuthError),

    #[error("HTTP request to TikTok failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors reading or writing the upload history file
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("failed to access upload history '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse upload history '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
