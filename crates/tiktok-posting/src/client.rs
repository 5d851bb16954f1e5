use crate::error::UploadError;
use crate::types::{
    ApiResponse, ChunkPlan, InitData, InitRequest, PostInfo, PrivacyLevel, PublishState,
    SourceInfo, StatusData, UploadStatus, UserData, UserInfo,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tiktok_oauth::{AuthError, TokenRecord, unix_now};

/// Status checks after the upload before giving up and reporting `Processing`
pub const DEFAULT_STATUS_POLLS: u32 = 10;

/// Delay between status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// TikTok truncates longer titles; do it up front
pub const MAX_TITLE_CHARS: usize = 150;

/// Reported as `provider_status` when no status check succeeded
pub const STATUS_UNAVAILABLE: &str = "STATUS_UNAVAILABLE";

/// What to post
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub video: PathBuf,
    pub caption: String,
    pub privacy: PrivacyLevel,
}

impl PostRequest {
    pub fn new(video: impl Into<PathBuf>, caption: impl Into<String>, privacy: PrivacyLevel) -> Self {
        Self {
            video: video.into(),
            caption: caption.into(),
            privacy,
        }
    }

    fn title(&self) -> &str {
        match self.caption.char_indices().nth(MAX_TITLE_CHARS) {
            Some((idx, _)) => &self.caption[..idx],
            None => &self.caption,
        }
    }
}

/// Client for the Content Posting API (direct post, `FILE_UPLOAD` source)
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    api_base: String,
    status_polls: u32,
    poll_interval: Duration,
}

impl UploadClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            status_polls: DEFAULT_STATUS_POLLS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override how often and how long publish status is polled.
    pub fn with_polling(mut self, status_polls: u32, poll_interval: Duration) -> Self {
        self.status_polls = status_polls.max(1);
        self.poll_interval = poll_interval;
        self
    }

    /// Upload `request.video` and wait for TikTok to process it.
    ///
    /// The file is checked before any request is sent. Returns the last
    /// observed status; `Processing` means TikTok accepted the upload but had
    /// not finished when polling stopped.
    pub async fn publish(
        &self,
        token: &TokenRecord,
        request: &PostRequest,
    ) -> Result<UploadStatus, UploadError> {
        let video = read_video(&request.video).await?;
        let publish_id = self.start_upload(token, request, &video).await?;
        self.wait_for_publish(token, &publish_id).await
    }

    /// [`Self::publish`], refreshing once if the token is rejected.
    ///
    /// `refresh` runs at most once and should persist the new token. A
    /// rejected init is retried from the start; a rejection while polling
    /// resumes polling the same `publish_id`, so the video is never sent twice.
    pub async fn publish_with_refresh<F, Fut>(
        &self,
        token: TokenRecord,
        request: &PostRequest,
        refresh: F,
    ) -> Result<UploadStatus, UploadError>
    where
        F: FnOnce(TokenRecord) -> Fut,
        Fut: Future<Output = Result<TokenRecord, AuthError>>,
    {
        let video = read_video(&request.video).await?;
        let mut refresh = Some(refresh);
        let mut token = token;

        let started = self.start_upload(&token, request, &video).await;
        let publish_id = match started {
            Err(UploadError::Unauthorized) => {
                token = refresh_once(&mut refresh, token).await?;
                self.start_upload(&token, request, &video).await?
            }
            other => other?,
        };

        let polled = self.wait_for_publish(&token, &publish_id).await;
        match polled {
            Err(UploadError::Unauthorized) => {
                token = refresh_once(&mut refresh, token).await?;
                self.wait_for_publish(&token, &publish_id).await
            }
            other => other,
        }
    }

    /// Fetch the authorized user's profile
    pub async fn user_info(&self, token: &TokenRecord) -> Result<UserInfo, UploadError> {
        let response = self
            .http
            .get(format!("{}/user/info/", self.api_base))
            .bearer_auth(&token.access_token)
            .query(&[("fields", "open_id,display_name,avatar_url")])
            .send()
            .await?;

        let data: UserData = read_api_response(response).await?;
        Ok(data.user)
    }

    /// Query the current publish status once
    pub async fn fetch_status(
        &self,
        token: &TokenRecord,
        publish_id: &str,
    ) -> Result<UploadStatus, UploadError> {
        let response = self
            .http
            .post(format!("{}/post/publish/status/fetch/", self.api_base))
            .bearer_auth(&token.access_token)
            .json(&serde_json::json!({ "publish_id": publish_id }))
            .send()
            .await?;

        let data: StatusData = read_api_response(response).await?;
        Ok(UploadStatus {
            publish_id: publish_id.to_string(),
            state: PublishState::from_provider(&data.status),
            provider_status: data.status,
            fail_reason: data.fail_reason,
            last_checked_at: unix_now(),
        })
    }

    /// Init plus chunk upload; returns the `publish_id`.
    async fn start_upload(
        &self,
        token: &TokenRecord,
        request: &PostRequest,
        video: &[u8],
    ) -> Result<String, UploadError> {
        let plan = ChunkPlan::for_size(video.len() as u64);

        tracing::info!(
            file = %request.video.display(),
            size_bytes = video.len(),
            privacy = %request.privacy,
            chunks = plan.total_chunk_count,
            "starting upload"
        );

        let init = self.init_upload(token, request, &plan).await?;
        tracing::info!(publish_id = %init.publish_id, "upload initialized");

        let upload_url = init.upload_url.ok_or_else(|| {
            UploadError::InvalidResponse("init response has no upload_url".to_string())
        })?;
        self.upload_chunks(&upload_url, video, &plan).await?;
        tracing::info!(publish_id = %init.publish_id, "video bytes uploaded");

        Ok(init.publish_id)
    }

    async fn init_upload(
        &self,
        token: &TokenRecord,
        request: &PostRequest,
        plan: &ChunkPlan,
    ) -> Result<InitData, UploadError> {
        let body = InitRequest {
            post_info: PostInfo {
                title: request.title(),
                privacy_level: request.privacy,
                disable_duet: false,
                disable_comment: false,
                disable_stitch: false,
                video_cover_timestamp_ms: 1000,
            },
            source_info: SourceInfo {
                source: "FILE_UPLOAD",
                video_size: plan.video_size,
                chunk_size: plan.chunk_size,
                total_chunk_count: plan.total_chunk_count,
            },
        };

        let response = self
            .http
            .post(format!("{}/post/publish/video/init/", self.api_base))
            .bearer_auth(&token.access_token)
            .json(&body)
            .send()
            .await?;

        read_api_response(response).await
    }

    async fn upload_chunks(
        &self,
        upload_url: &str,
        video: &[u8],
        plan: &ChunkPlan,
    ) -> Result<(), UploadError> {
        for (start, end) in plan.ranges() {
            let chunk = video[start as usize..=end as usize].to_vec();
            tracing::debug!(start, end, total = plan.video_size, "uploading chunk");

            let response = self
                .http
                .put(upload_url)
                .header(reqwest::header::CONTENT_TYPE, "video/mp4")
                .header(
                    reqwest::header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, plan.video_size),
                )
                .body(chunk)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await?;
                return Err(UploadError::RemoteError { status, body });
            }
        }
        Ok(())
    }

    /// Poll until TikTok reports a final state or the budget runs out.
    ///
    /// A failed check is logged and polling continues; only a rejected token
    /// stops it.
    async fn wait_for_publish(
        &self,
        token: &TokenRecord,
        publish_id: &str,
    ) -> Result<UploadStatus, UploadError> {
        let mut last = None;
        for attempt in 1..=self.status_polls {
            match self.fetch_status(token, publish_id).await {
                Ok(status) => {
                    tracing::info!(
                        publish_id,
                        attempt,
                        status = %status.provider_status,
                        "publish status"
                    );
                    if status.state != PublishState::Processing {
                        return Ok(status);
                    }
                    last = Some(status);
                }
                Err(UploadError::Unauthorized) => return Err(UploadError::Unauthorized),
                Err(e) => {
                    tracing::warn!(publish_id, attempt, error = %e, "publish status check failed");
                }
            }
            if attempt < self.status_polls {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Ok(last.unwrap_or_else(|| UploadStatus {
            publish_id: publish_id.to_string(),
            state: PublishState::Processing,
            provider_status: STATUS_UNAVAILABLE.to_string(),
            fail_reason: None,
            last_checked_at: unix_now(),
        }))
    }
}

/// Run the caller's refresh if it has not been used yet.
async fn refresh_once<F, Fut>(
    refresh: &mut Option<F>,
    token: TokenRecord,
) -> Result<TokenRecord, UploadError>
where
    F: FnOnce(TokenRecord) -> Fut,
    Fut: Future<Output = Result<TokenRecord, AuthError>>,
{
    let Some(refresh) = refresh.take() else {
        return Err(UploadError::Unauthorized);
    };
    tracing::warn!("access token rejected, refreshing and retrying once");
    refresh(token).await.map_err(UploadError::RefreshFailed)
}

async fn read_video(path: &Path) -> Result<Vec<u8>, UploadError> {
    let not_found = || UploadError::FileNotFound(path.display().to_string());

    let metadata = tokio::fs::metadata(path).await.map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }
    let video = tokio::fs::read(path).await.map_err(|_| not_found())?;
    if video.is_empty() {
        return Err(UploadError::EmptyVideo(path.display().to_string()));
    }
    Ok(video)
}

/// Map the HTTP status and the `error` envelope, then extract `data`.
async fn read_api_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, UploadError> {
    let status = response.status();
    let body = response.text().await?;

    if status == StatusCode::UNAUTHORIZED {
        return Err(UploadError::Unauthorized);
    }
    if !status.is_success() {
        return Err(UploadError::RemoteError { status, body });
    }

    let parsed: ApiResponse<T> = serde_json::from_str(&body)
        .map_err(|e| UploadError::InvalidResponse(format!("{e}: {body}")))?;

    if let Some(error) = &parsed.error {
        if error.is_token_rejection() {
            return Err(UploadError::Unauthorized);
        }
        if !error.is_ok() {
            tracing::debug!(code = %error.code, message = %error.message, "API error envelope");
            return Err(UploadError::RemoteError { status, body });
        }
    }

    parsed
        .data
        .ok_or_else(|| UploadError::InvalidResponse(format!("response has no data: {body}")))
}
