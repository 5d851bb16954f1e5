use crate::callback::{CallbackListener, CallbackResult};
use crate::error::AuthError;
use crate::pkce::{generate_pkce, generate_state};
use crate::store::TokenStore;
use crate::token::{TokenRecord, TokenResponse, parse_scope, unix_now};
use std::time::Duration;

/// Scopes requested for posting videos
pub const DEFAULT_SCOPES: &[&str] = &["user.info.basic", "video.publish", "video.upload"];

/// Redirect URI registered in the TikTok developer portal
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";

/// Base URL of the TikTok Open API (token, user info and posting endpoints)
pub const DEFAULT_API_BASE: &str = "https://open.tiktokapis.com/v2";

/// TikTok Login Kit authorization page
pub const DEFAULT_AUTH_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";

/// How long to wait for the user to finish logging in
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// OAuth configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// TikTok client key (the OAuth client ID)
    pub client_key: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI for OAuth callback
    pub redirect_uri: String,
    /// OAuth scope(s)
    pub scopes: Vec<String>,
    /// Authorization page URL
    pub auth_url: String,
    /// Open API base URL; the token endpoint is `{api_base}/oauth/token/`
    pub api_base: String,
    /// Maximum wait for the redirect callback
    pub callback_timeout: Duration,
}

impl OAuthConfig {
    /// Create new OAuth configuration with TikTok defaults
    pub fn new(client_key: String, client_secret: String) -> Self {
        Self {
            client_key,
            client_secret,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token/", self.api_base.trim_end_matches('/'))
    }
}

/// Progress of one [`AuthFlow::authenticate`] run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    AwaitingCallback,
    Exchanging,
    Complete,
    Failed,
}

impl AuthState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuthState::Complete | AuthState::Failed)
    }
}

type BrowserOpener = Box<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Drives the authorization-code grant and token refresh against TikTok
pub struct AuthFlow {
    config: OAuthConfig,
    http: reqwest::Client,
    state: AuthState,
    open_browser: BrowserOpener,
}

impl AuthFlow {
    pub fn new(config: OAuthConfig) -> Self {
        let http = reqwest::Client::builder()
            // the token endpoint never redirects
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            http,
            state: AuthState::Idle,
            open_browser: Box::new(|url: &str| webbrowser::open(url)),
        }
    }

    /// Replace how the authorization URL is shown to the user.
    pub fn with_browser<F>(mut self, open: F) -> Self
    where
        F: Fn(&str) -> std::io::Result<()> + Send + Sync + 'static,
    {
        self.open_browser = Box::new(open);
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn transition(&mut self, next: AuthState) {
        tracing::debug!(from = ?self.state, to = ?next, "auth flow state change");
        self.state = next;
    }

    /// Generate authorization URL
    pub fn authorization_url(&self, redirect_uri: &str, state: &str, code_challenge: &str) -> String {
        format!(
            "{}?\
            client_key={}&\
            scope={}&\
            response_type=code&\
            redirect_uri={}&\
            state={}&\
            code_challenge={}&\
            code_challenge_method=S256",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_key),
            urlencoding::encode(&self.config.scopes.join(",")),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    /// Run the full login: browser, callback, code exchange, persistence.
    pub async fn authenticate(
        &mut self,
        store: &impl TokenStore,
        account: &str,
    ) -> Result<TokenRecord, AuthError> {
        self.authenticate_with_state(store, account, generate_state())
            .await
    }

    /// [`Self::authenticate`] with a caller-chosen anti-forgery `state`.
    pub async fn authenticate_with_state(
        &mut self,
        store: &impl TokenStore,
        account: &str,
        state: String,
    ) -> Result<TokenRecord, AuthError> {
        self.transition(AuthState::Idle);
        let result = self.run(store, account, &state).await;
        match &result {
            Ok(_) => self.transition(AuthState::Complete),
            Err(e) => {
                tracing::warn!(error = %e, "authorization failed");
                self.transition(AuthState::Failed);
            }
        }
        result
    }

    async fn run(
        &mut self,
        store: &impl TokenStore,
        account: &str,
        state: &str,
    ) -> Result<TokenRecord, AuthError> {
        let (verifier, challenge) = generate_pkce();

        // Bind first so the redirect can't race the listener.
        let listener = CallbackListener::bind(&self.config.redirect_uri).await?;
        let redirect_uri = listener.redirect_uri().to_string();
        let auth_url = self.authorization_url(&redirect_uri, state, &challenge);

        self.transition(AuthState::AwaitingCallback);
        tracing::info!(url = %auth_url, account, "asking user to follow OAuth flow");
        if let Err(e) = (self.open_browser)(&auth_url) {
            tracing::warn!(error = %e, url = %auth_url, "could not open browser; visit the URL manually");
        }

        let callback = listener.wait(self.config.callback_timeout).await?;
        let code = verify_callback(state, callback)?;

        self.transition(AuthState::Exchanging);
        let record = self.exchange_code(&code, &verifier, &redirect_uri).await?;
        store.save(account, &record)?;

        tracing::info!(account, open_id = %record.open_id, "successfully obtained OAuth tokens");
        Ok(record)
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenRecord, AuthError> {
        tracing::info!("exchanging authorization code for tokens");

        let params = [
            ("client_key", self.config.client_key.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ];

        let response = self
            .http
            .post(self.config.token_url())
            .form(&params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::TokenExchangeFailed { status, body });
        }

        match parse_token_response(&body, unix_now(), None) {
            Some(record) => Ok(record),
            None => Err(AuthError::TokenExchangeFailed { status, body }),
        }
    }

    /// Refresh the access token using the refresh token.
    ///
    /// Any failure means the stored grant is unusable; run
    /// [`Self::authenticate`] again.
    pub async fn refresh(&self, record: &TokenRecord) -> Result<TokenRecord, AuthError> {
        tracing::info!("refreshing OAuth token");

        let params = [
            ("client_key", self.config.client_key.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", record.refresh_token.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_url())
            .form(&params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::RefreshFailed { status, body });
        }

        match parse_token_response(&body, unix_now(), Some(record)) {
            Some(refreshed) => {
                tracing::info!("OAuth token refreshed successfully");
                Ok(refreshed)
            }
            None => Err(AuthError::RefreshFailed { status, body }),
        }
    }
}

/// Accept the callback only when it echoes the `state` we generated.
pub fn verify_callback(expected_state: &str, callback: CallbackResult) -> Result<String, AuthError> {
    if callback.state != expected_state {
        return Err(AuthError::StateMismatch);
    }
    Ok(callback.authorization_code)
}

/// Build a record from a token endpoint body. On refresh, fields the provider
/// leaves out are carried over from `previous`.
fn parse_token_response(
    body: &str,
    now: u64,
    previous: Option<&TokenRecord>,
) -> Option<TokenRecord> {
    let response: TokenResponse = serde_json::from_str(body).ok()?;
    let access_token = response.access_token.filter(|t| !t.is_empty())?;

    let refresh_token = response
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| previous.map(|p| p.refresh_token.clone()))
        .unwrap_or_default();
    let scope = match (&response.scope, previous) {
        (Some(raw), _) => parse_scope(raw),
        (None, Some(p)) => p.scope.clone(),
        (None, None) => Default::default(),
    };
    let open_id = response
        .open_id
        .or_else(|| previous.map(|p| p.open_id.clone()))
        .unwrap_or_default();

    Some(TokenRecord {
        access_token,
        refresh_token,
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expires_at: now.saturating_add(response.expires_in.unwrap_or(0)),
        refresh_expires_at: response
            .refresh_expires_in
            .map(|secs| now.saturating_add(secs))
            .or_else(|| previous.and_then(|p| p.refresh_expires_at)),
        scope,
        open_id,
        authenticated_at: previous.map(|p| p.authenticated_at).unwrap_or(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileTokenStore;
    use axum::{Form, Json, Router, extract::State, http::StatusCode, routing::post};
    use reqwest::Url;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Provider {
        exchanges: Arc<AtomicUsize>,
        fail: bool,
    }

    async fn token_endpoint(
        State(provider): State<Provider>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        provider.exchanges.fetch_add(1, Ordering::SeqCst);
        if provider.fail {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_grant"})),
            );
        }

        let body = match form.get("grant_type").map(String::as_str) {
            Some("authorization_code") if form.get("code").map(String::as_str) == Some("abc") => {
                assert!(form.contains_key("code_verifier"));
                serde_json::json!({
                    "access_token": "act.from-abc",
                    "refresh_token": "rft.1",
                    "expires_in": 86400,
                    "refresh_expires_in": 31536000,
                    "open_id": "open-123",
                    "scope": "user.info.basic,video.publish,video.upload",
                    "token_type": "Bearer"
                })
            }
            Some("refresh_token") => serde_json::json!({
                "access_token": "act.refreshed",
                "expires_in": 86400
            }),
            _ => serde_json::json!({"error": "invalid_request"}),
        };
        (StatusCode::OK, Json(body))
    }

    async fn spawn_provider(fail: bool) -> (String, Arc<AtomicUsize>) {
        let exchanges = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/oauth/token/", post(token_endpoint))
            .with_state(Provider {
                exchanges: exchanges.clone(),
                fail,
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{}", addr), exchanges)
    }

    fn config(api_base: &str) -> OAuthConfig {
        let mut config = OAuthConfig::new("client-key".to_string(), "secret".to_string());
        config.redirect_uri = "http://127.0.0.1:0/callback".to_string();
        config.api_base = api_base.to_string();
        config.callback_timeout = Duration::from_secs(5);
        config
    }

    /// Simulates the user approving the app: follows the redirect with `code`
    /// and either the real state or `forced_state`.
    fn fake_browser(
        code: &'static str,
        forced_state: Option<&'static str>,
    ) -> impl Fn(&str) -> std::io::Result<()> + Send + Sync + 'static {
        move |auth_url: &str| {
            let url = Url::parse(auth_url).unwrap();
            let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
            let state = forced_state
                .map(str::to_string)
                .unwrap_or_else(|| query["state"].clone());
            let mut redirect = Url::parse(&query["redirect_uri"]).unwrap();
            redirect
                .query_pairs_mut()
                .append_pair("code", code)
                .append_pair("state", &state);
            tokio::spawn(async move { reqwest::get(redirect).await });
            Ok(())
        }
    }

    #[tokio::test]
    async fn exchanges_code_and_persists_record() {
        let (api_base, exchanges) = spawn_provider(false).await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tiktok_tokens.json"));

        let mut flow = AuthFlow::new(config(&api_base)).with_browser(fake_browser("abc", None));
        assert_eq!(flow.state(), AuthState::Idle);

        let record = flow
            .authenticate_with_state(&store, "default", "xyz".to_string())
            .await
            .unwrap();

        assert_eq!(record.access_token, "act.from-abc");
        assert_eq!(record.open_id, "open-123");
        assert!(record.has_scope("video.upload"));
        assert_eq!(flow.state(), AuthState::Complete);
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(store.load("default").unwrap(), record);
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected_for_every_generated_state() {
        let (api_base, exchanges) = spawn_provider(false).await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tiktok_tokens.json"));

        for _ in 0..3 {
            let mut flow = AuthFlow::new(config(&api_base))
                .with_browser(fake_browser("abc", Some("forged-state")));
            let err = flow.authenticate(&store, "default").await.unwrap_err();
            assert!(matches!(err, AuthError::StateMismatch), "got {err:?}");
            assert_eq!(flow.state(), AuthState::Failed);
        }

        assert_eq!(exchanges.load(Ordering::SeqCst), 0);
        assert!(store.load("default").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn provider_rejection_carries_body() {
        let (api_base, _) = spawn_provider(true).await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tiktok_tokens.json"));

        let mut flow = AuthFlow::new(config(&api_base)).with_browser(fake_browser("abc", None));
        match flow.authenticate(&store, "default").await {
            Err(AuthError::TokenExchangeFailed { status, body }) => {
                assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(flow.state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn ok_status_without_access_token_is_a_failed_exchange() {
        let (api_base, _) = spawn_provider(false).await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tiktok_tokens.json"));

        let mut flow = AuthFlow::new(config(&api_base)).with_browser(fake_browser("wrong", None));
        let err = flow.authenticate(&store, "default").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed { .. }));
    }

    #[tokio::test]
    async fn no_callback_times_out() {
        let (api_base, _) = spawn_provider(false).await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tiktok_tokens.json"));

        let mut config = config(&api_base);
        config.callback_timeout = Duration::from_millis(50);
        let mut flow = AuthFlow::new(config).with_browser(|_| Ok(()));

        let err = flow.authenticate(&store, "default").await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout(_)));
        assert_eq!(flow.state(), AuthState::Failed);
        assert!(flow.state().is_terminal());
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_when_not_rotated() {
        let (api_base, _) = spawn_provider(false).await;
        let flow = AuthFlow::new(config(&api_base));
        let old = parse_token_response(
            r#"{"access_token":"act.old","refresh_token":"rft.keep","expires_in":10,"scope":"video.upload","open_id":"o"}"#,
            100,
            None,
        )
        .unwrap();

        let refreshed = flow.refresh(&old).await.unwrap();
        assert_eq!(refreshed.access_token, "act.refreshed");
        assert_eq!(refreshed.refresh_token, "rft.keep");
        assert_eq!(refreshed.scope, old.scope);
        assert_eq!(refreshed.authenticated_at, 100);
    }

    #[tokio::test]
    async fn refresh_failure_requires_reauthentication() {
        let (api_base, _) = spawn_provider(true).await;
        let flow = AuthFlow::new(config(&api_base));
        let old = parse_token_response(r#"{"access_token":"a","refresh_token":"r"}"#, 0, None)
            .unwrap();

        let err = flow.refresh(&old).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed { .. }));
    }

    #[test]
    fn huge_lifetimes_saturate() {
        let body = format!(
            r#"{{"access_token":"a","refresh_token":"r","expires_in":{max},"refresh_expires_in":{max}}}"#,
            max = u64::MAX
        );
        let record = parse_token_response(&body, 1_000, None).unwrap();
        assert_eq!(record.expires_at, u64::MAX);
        assert_eq!(record.refresh_expires_at, Some(u64::MAX));
        assert!(!record.is_expired(u64::MAX - 1));
    }

    #[test]
    fn authorization_url_carries_request_parameters() {
        let flow = AuthFlow::new(config("http://unused"));
        let url = Url::parse(&flow.authorization_url(
            "http://localhost:8080/callback",
            "xyz",
            "challenge",
        ))
        .unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("www.tiktok.com"));
        assert_eq!(query["client_key"], "client-key");
        assert_eq!(query["scope"], "user.info.basic,video.publish,video.upload");
        assert_eq!(query["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(query["state"], "xyz");
        assert_eq!(query["code_challenge_method"], "S256");
    }

    #[test]
    fn verify_callback_requires_exact_state() {
        let callback = |state: &str| CallbackResult {
            authorization_code: "abc".to_string(),
            state: state.to_string(),
        };
        assert_eq!(verify_callback("xyz", callback("xyz")).unwrap(), "abc");
        assert!(matches!(
            verify_callback("xyz", callback("XYZ")),
            Err(AuthError::StateMismatch)
        ));
        assert!(matches!(
            verify_callback("xyz", callback("")),
            Err(AuthError::StateMismatch)
        ));
    }
}
