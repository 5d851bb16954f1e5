mod config;

use clap::{ArgGroup, Parser};
use config::Config;
use eyre::{WrapErr, bail};
use std::path::{Path, PathBuf};
use tiktok_oauth::{
    AuthError, AuthFlow, DEFAULT_ACCOUNT, FileTokenStore, TokenRecord, TokenStore, unix_now,
};
use tiktok_posting::{
    HistoryEntry, PostRequest, PrivacyLevel, PublishState, UploadClient, UploadHistory,
};
use tracing_subscriber::EnvFilter;

/// Number of uploads shown by --status
const RECENT_UPLOADS: usize = 5;

/// TikTok Video Uploader - authenticate with TikTok and post videos
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(group(
    ArgGroup::new("command")
        .required(true)
        .args(["auth", "post", "status", "refresh"])
))]
struct Args {
    /// Log in through the browser and store the account's tokens
    #[arg(long)]
    auth: bool,

    /// Upload and publish a video
    #[arg(long)]
    post: bool,

    /// Post in sandbox mode (visible only to the uploading account)
    #[arg(long, requires = "post")]
    sandbox: bool,

    /// Path to the video file (defaults to the sample video in sandbox mode)
    #[arg(long, requires = "post")]
    video: Option<PathBuf>,

    /// Caption for the post (defaults to the file name)
    #[arg(long, requires = "post")]
    caption: Option<String>,

    /// Who can see the post; sandbox posts are always SELF_ONLY
    #[arg(long, requires = "post", conflicts_with = "sandbox")]
    privacy: Option<PrivacyLevel>,

    /// Show stored accounts, the video folder and recent uploads
    #[arg(long)]
    status: bool,

    /// Refresh the stored access token
    #[arg(long)]
    refresh: bool,

    /// Name of the stored account to use
    #[arg(long, default_value = DEFAULT_ACCOUNT)]
    account: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "tiktok_uploader=info,tiktok_oauth=info,tiktok_posting=info".into()
        }))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    if args.auth {
        authenticate(&config, &args.account).await
    } else if args.refresh {
        refresh(&config, &args.account).await
    } else if args.status {
        show_status(&config)
    } else {
        post(&config, &args).await
    }
}

async fn authenticate(config: &Config, account: &str) -> eyre::Result<()> {
    let store = FileTokenStore::new(&config.token_file);
    let mut flow = AuthFlow::new(config.oauth()?);

    eprintln!("\n=================================================");
    eprintln!("TikTok authorization (account: {})", account);
    eprintln!("=================================================");
    eprintln!("Log in to TikTok in the browser window that opens.");
    eprintln!("Redirect URI: {}", config.redirect_uri);
    eprintln!("Waiting for authorization...\n");

    let token = flow
        .authenticate(&store, account)
        .await
        .wrap_err("TikTok authentication failed")?;

    println!("Authenticated account '{}'", account);
    println!("  Open ID: {}", abbreviate(&token.open_id, 20));
    println!("  Scopes:  {}", join_scopes(&token));
    println!("  Expires: {}", format_time(token.expires_at));
    println!("  Saved to {}", config.token_file.display());
    Ok(())
}

async fn refresh(config: &Config, account: &str) -> eyre::Result<()> {
    let store = FileTokenStore::new(&config.token_file);
    let flow = AuthFlow::new(config.oauth()?);
    let token = load_token(&store, account)?;

    let refreshed = flow
        .refresh(&token)
        .await
        .wrap_err("token refresh failed; run with --auth to log in again")?;
    store.save(account, &refreshed)?;

    println!("Token refreshed for account '{}'", account);
    println!("  Expires: {}", format_time(refreshed.expires_at));
    Ok(())
}

fn show_status(config: &Config) -> eyre::Result<()> {
    let store = FileTokenStore::new(&config.token_file);
    let history = UploadHistory::new(&config.history_file);
    let accounts = store.accounts()?;
    let now = unix_now();

    println!("=================================================");
    println!("TikTok Uploader status");
    println!("=================================================");

    println!("\nAuthentication:");
    if accounts.is_empty() {
        println!("  not authenticated");
    }
    for (account, token) in &accounts {
        let expiry = if token.is_expired(now) {
            "expired, run --refresh"
        } else {
            "valid"
        };
        println!("  {}", account);
        println!("    authenticated: {}", format_time(token.authenticated_at));
        println!("    scopes:        {}", join_scopes(token));
        println!("    access token:  {} until {}", expiry, format_time(token.expires_at));
    }

    println!("\nVideo folder:");
    match list_videos(&config.videos_dir) {
        Some(videos) => println!(
            "  {} ({} videos)",
            config.videos_dir.display(),
            videos.len()
        ),
        None => println!("  {} does not exist", config.videos_dir.display()),
    }

    let recent = history.recent(RECENT_UPLOADS)?;
    if !recent.is_empty() {
        println!("\nRecent uploads:");
        for entry in &recent {
            let name = Path::new(&entry.video)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.video.clone());
            println!(
                "  [{}] [{}] {} - {}",
                if entry.success { "ok" } else { "failed" },
                if entry.sandbox { "sandbox" } else { "post" },
                format_time(entry.uploaded_at),
                name
            );
        }
    }

    if accounts.is_empty() {
        bail!("not authenticated: run with --auth first");
    }
    Ok(())
}

async fn post(config: &Config, args: &Args) -> eyre::Result<()> {
    let store = FileTokenStore::new(&config.token_file);
    let history = UploadHistory::new(&config.history_file);
    let flow = AuthFlow::new(config.oauth()?);
    let client = UploadClient::new(&config.api_base);
    let account = args.account.as_str();

    let mut token = load_token(&store, account)?;
    if token.is_expired(unix_now()) {
        tracing::info!(account, "access token expired, refreshing before upload");
        token = flow
            .refresh(&token)
            .await
            .wrap_err("access token expired and refresh failed; run with --auth to log in again")?;
        store.save(account, &token)?;
    }

    let (video, privacy) = if args.sandbox {
        match client.user_info(&token).await {
            Ok(user) => println!("Account: {}", user.display_name),
            Err(e) => tracing::warn!(error = %e, "could not fetch user info"),
        }
        let video = match &args.video {
            Some(video) => video.clone(),
            None => pick_sample_video(&config.sample_video, &config.videos_dir).ok_or_else(|| {
                eyre::eyre!(
                    "no video found: pass --video, or place {} or an .mp4 in {}",
                    config.sample_video.display(),
                    config.videos_dir.display()
                )
            })?,
        };
        (video, PrivacyLevel::SelfOnly)
    } else {
        let Some(video) = args.video.clone() else {
            bail!("--video is required (or use --post --sandbox)");
        };
        (video, args.privacy.unwrap_or(PrivacyLevel::PublicToEveryone))
    };

    let caption = args.caption.clone().unwrap_or_else(|| default_caption(&video));
    let request = PostRequest::new(&video, caption, privacy);
    if args.sandbox {
        println!("SANDBOX MODE: the video will only be visible to this account");
    }

    let store_ref = &store;
    let flow_ref = &flow;
    let result = client
        .publish_with_refresh(token, &request, |old| async move {
            let new = flow_ref.refresh(&old).await?;
            store_ref.save(account, &new)?;
            Ok::<_, AuthError>(new)
        })
        .await;

    let entry = HistoryEntry {
        account: account.to_string(),
        video: video.display().to_string(),
        uploaded_at: unix_now(),
        success: matches!(&result, Ok(status) if status.state != PublishState::Failed),
        sandbox: args.sandbox,
        publish_id: result.as_ref().ok().map(|s| s.publish_id.clone()),
    };
    if let Err(e) = history.append(entry) {
        tracing::warn!(error = %e, "could not record upload history");
    }

    let status = result.wrap_err("upload failed")?;
    println!("Publish ID: {}", status.publish_id);
    match status.state {
        PublishState::Published => println!("Status: published"),
        PublishState::Processing => println!(
            "Status: {} (TikTok is still processing the video)",
            status.provider_status
        ),
        PublishState::Failed => bail!(
            "publish failed: {}",
            status.fail_reason.as_deref().unwrap_or("unknown reason")
        ),
    }
    Ok(())
}

fn load_token(store: &FileTokenStore, account: &str) -> eyre::Result<TokenRecord> {
    match store.load(account) {
        Ok(token) => Ok(token),
        Err(e) if e.is_not_found() => {
            bail!("not authenticated (account '{account}'): run with --auth first")
        }
        Err(e) => Err(e.into()),
    }
}

/// `.mp4` files in `dir`, sorted; `None` if the directory is missing.
fn list_videos(dir: &Path) -> Option<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut videos: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
        })
        .collect();
    videos.sort();
    Some(videos)
}

/// The sample video if present, else the first `.mp4` in `videos_dir`.
fn pick_sample_video(sample: &Path, videos_dir: &Path) -> Option<PathBuf> {
    if sample.is_file() {
        return Some(sample.to_path_buf());
    }
    list_videos(videos_dir)?.into_iter().next()
}

fn default_caption(video: &Path) -> String {
    video
        .file_stem()
        .map(|stem| stem.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_default()
}

fn join_scopes(token: &TokenRecord) -> String {
    if token.scope.is_empty() {
        return "N/A".to_string();
    }
    token.scope.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn abbreviate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

fn format_time(unix_secs: u64) -> String {
    if unix_secs == 0 {
        return "N/A".to_string();
    }
    i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| jiff::Timestamp::from_second(secs).ok())
        .map(|ts| ts.to_string())
        .unwrap_or_else(|| unix_secs.to_string())
}
