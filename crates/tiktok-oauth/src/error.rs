use reqwest::StatusCode;

/// Errors from the persisted token store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no OAuth token stored for account '{0}'")]
    NotFound(String),

    #[error("failed to access OAuth token file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse OAuth token file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors raised while authorizing, exchanging or refreshing tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("OAuth state mismatch: callback did not originate from this authorization request")]
    StateMismatch,

    #[error("OAuth authorization timeout ({0} seconds)")]
    Timeout(u64),

    #[error("failed to exchange authorization code (status {status}): {body}")]
    TokenExchangeFailed { status: StatusCode, body: String },

    #[error("authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    #[error("no authorization code in callback")]
    MissingCode,

    #[error("failed to refresh OAuth token (status {status}): {body}; re-run --auth")]
    RefreshFailed { status: StatusCode, body: String },

    #[error("invalid redirect URI '{0}'")]
    InvalidRedirectUri(String),

    #[error("failed to bind callback listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("callback listener closed before a callback arrived")]
    ListenerClosed,

    #[error("HTTP request to OAuth provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
