//! OAuth 2.0 for TikTok Login Kit.
//!
//! [`AuthFlow`] runs the authorization-code grant (with PKCE) through a local
//! [`CallbackListener`], and persists the resulting [`TokenRecord`] through a
//! [`TokenStore`]. Refreshing goes through the same flow object.

mod callback;
mod error;
mod flow;
mod pkce;
mod store;
mod token;

pub use callback::{CallbackListener, CallbackParams, CallbackResult};
pub use error::{AuthError, StoreError};
pub use flow::{
    AuthFlow, AuthState, DEFAULT_API_BASE, DEFAULT_AUTH_URL, DEFAULT_CALLBACK_TIMEOUT,
    DEFAULT_REDIRECT_URI, DEFAULT_SCOPES, OAuthConfig, verify_callback,
};
pub use pkce::{generate_pkce, generate_state, pkce_challenge};
pub use store::{DEFAULT_ACCOUNT, DEFAULT_TOKEN_FILE, FileTokenStore, TokenStore};
pub use token::{TokenRecord, is_expired, parse_scope, unix_now};
