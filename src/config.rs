use eyre::{WrapErr, eyre};
use std::path::PathBuf;
use std::time::Duration;
use tiktok_oauth::{
    DEFAULT_API_BASE, DEFAULT_AUTH_URL, DEFAULT_CALLBACK_TIMEOUT, DEFAULT_REDIRECT_URI,
    DEFAULT_TOKEN_FILE, OAuthConfig,
};
use tiktok_posting::DEFAULT_HISTORY_FILE;

/// Uploader settings, read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    pub client_key: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub api_base: String,
    pub auth_url: String,
    pub token_file: PathBuf,
    pub history_file: PathBuf,
    pub videos_dir: PathBuf,
    pub sample_video: PathBuf,
    pub auth_timeout: Duration,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let auth_timeout = match var("TIKTOK_AUTH_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse::<u64>()
                    .wrap_err_with(|| format!("invalid TIKTOK_AUTH_TIMEOUT_SECS '{raw}'"))?,
            ),
            None => DEFAULT_CALLBACK_TIMEOUT,
        };

        Ok(Self {
            client_key: var("TIKTOK_CLIENT_KEY"),
            client_secret: var("TIKTOK_CLIENT_SECRET"),
            redirect_uri: or("TIKTOK_REDIRECT_URI", DEFAULT_REDIRECT_URI),
            api_base: or("TIKTOK_API_BASE", DEFAULT_API_BASE),
            auth_url: or("TIKTOK_AUTH_URL", DEFAULT_AUTH_URL),
            token_file: or("TIKTOK_TOKEN_FILE", DEFAULT_TOKEN_FILE).into(),
            history_file: or("TIKTOK_HISTORY_FILE", DEFAULT_HISTORY_FILE).into(),
            videos_dir: or("TIKTOK_VIDEOS_DIR", "videos").into(),
            sample_video: or("TIKTOK_SAMPLE_VIDEO", "sample_video.mp4").into(),
            auth_timeout,
        })
    }

    /// OAuth settings; fails when the client credentials are missing.
    pub fn oauth(&self) -> eyre::Result<OAuthConfig> {
        let (Some(client_key), Some(client_secret)) = (&self.client_key, &self.client_secret)
        else {
            return Err(eyre!(
                "TIKTOK_CLIENT_KEY and TIKTOK_CLIENT_SECRET must be set (environment or .env file)"
            ));
        };

        let mut oauth = OAuthConfig::new(client_key.clone(), client_secret.clone());
        oauth.redirect_uri = self.redirect_uri.clone();
        oauth.api_base = self.api_base.clone();
        oauth.auth_url = self.auth_url.clone();
        oauth.callback_timeout = self.auth_timeout;
        Ok(oauth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> eyre::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.redirect_uri, "http://localhost:8080/callback");
        assert_eq!(config.token_file, PathBuf::from("tiktok_tokens.json"));
        assert_eq!(config.history_file, PathBuf::from("upload_history.json"));
        assert_eq!(config.auth_timeout, Duration::from_secs(120));
        assert!(config.oauth().is_err());
    }

    #[test]
    fn credentials_and_overrides_flow_into_oauth() {
        let config = config(&[
            ("TIKTOK_CLIENT_KEY", "key"),
            ("TIKTOK_CLIENT_SECRET", "secret"),
            ("TIKTOK_REDIRECT_URI", "http://127.0.0.1:9000/cb"),
            ("TIKTOK_API_BASE", "http://127.0.0.1:9001/v2"),
            ("TIKTOK_AUTH_TIMEOUT_SECS", "30"),
        ])
        .unwrap();

        let oauth = config.oauth().unwrap();
        assert_eq!(oauth.client_key, "key");
        assert_eq!(oauth.redirect_uri, "http://127.0.0.1:9000/cb");
        assert_eq!(oauth.api_base, "http://127.0.0.1:9001/v2");
        assert_eq!(oauth.callback_timeout, Duration::from_secs(30));
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let config = config(&[("TIKTOK_CLIENT_KEY", "key"), ("TIKTOK_CLIENT_SECRET", "  ")]).unwrap();
        assert!(config.oauth().is_err());
    }

    #[test]
    fn bad_timeout_is_rejected() {
        assert!(config(&[("TIKTOK_AUTH_TIMEOUT_SECS", "soon")]).is_err());
    }
}
