//! One-shot local HTTP endpoint receiving the OAuth redirect.
//!
//! The listener is bound before the browser is opened and owns its server
//! task. It accepts the first request to the redirect path, then shuts the
//! server down; dropping it on any other path aborts the task, which releases
//! the port.

use crate::error::AuthError;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use reqwest::Url;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

/// How long a graceful shutdown may take before the server task is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_HTML: &str = "<!DOCTYPE html>\
    <html><body style=\"font-family:Arial;text-align:center;padding:50px;\">\
    <h1>Authorization received</h1>\
    <p>You can close this window and return to the terminal.</p>\
    </body></html>";

const FAILURE_HTML: &str = "<!DOCTYPE html>\
    <html><body style=\"font-family:Arial;text-align:center;padding:50px;\">\
    <h1>Authorization failed</h1>\
    <p>Check the terminal for details. You can close this window.</p>\
    </body></html>";

/// Query parameters TikTok appends to the redirect URI
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Turn raw parameters into a [`CallbackResult`], surfacing provider errors.
    pub fn into_result(self) -> Result<CallbackResult, AuthError> {
        if let Some(error) = self.error {
            let reason = match self.error_description {
                Some(description) if !description.is_empty() => {
                    format!("{error}: {description}")
                }
                _ => error,
            };
            return Err(AuthError::AuthorizationDenied(reason));
        }

        let authorization_code = self
            .code
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingCode)?;

        Ok(CallbackResult {
            authorization_code,
            state: self.state.unwrap_or_default(),
        })
    }
}

/// Authorization code and state returned through the redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub authorization_code: String,
    pub state: String,
}

type Slot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// Short-lived server bound to the redirect URI's host and port
pub struct CallbackListener {
    addr: SocketAddr,
    redirect_uri: String,
    received: oneshot::Receiver<CallbackParams>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind to the host/port of `redirect_uri` and start serving its path.
    ///
    /// Port 0 binds an ephemeral port; [`Self::redirect_uri`] then returns
    /// the URI with the real port filled in.
    pub async fn bind(redirect_uri: &str) -> Result<Self, AuthError> {
        let invalid = || AuthError::InvalidRedirectUri(redirect_uri.to_string());

        let mut url = Url::parse(redirect_uri).map_err(|_| invalid())?;
        if url.scheme() != "http" {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?.to_string();
        let port = url.port_or_known_default().ok_or_else(invalid)?;
        let bind_host = if host == "localhost" {
            "127.0.0.1"
        } else {
            host.as_str()
        };
        let bind_addr = format!("{}:{}", bind_host, port);

        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| AuthError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| AuthError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;

        if port == 0 {
            url.set_port(Some(addr.port())).map_err(|()| invalid())?;
        }

        let (tx, received) = oneshot::channel();
        let slot: Slot = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new()
            .route(url.path(), get(handle_callback))
            .with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::warn!(error = %e, "callback server stopped with error");
            }
        });

        tracing::debug!(%addr, path = url.path(), "callback listener bound");

        Ok(Self {
            addr,
            redirect_uri: url.to_string(),
            received,
            shutdown: Some(shutdown_tx),
            server: Some(server),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Redirect URI to hand to the provider
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the single callback, or fail with [`AuthError::Timeout`].
    ///
    /// The server is stopped before this returns, whatever the outcome.
    pub async fn wait(mut self, timeout: Duration) -> Result<CallbackResult, AuthError> {
        let outcome = tokio::time::timeout(timeout, &mut self.received).await;
        self.shutdown().await;

        match outcome {
            Ok(Ok(params)) => params.into_result(),
            Ok(Err(_)) => Err(AuthError::ListenerClosed),
            Err(_) => Err(AuthError::Timeout(timeout.as_secs())),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut server) = self.server.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
                server.abort();
                let _ = server.await;
            }
        }
        tracing::debug!(addr = %self.addr, "callback listener released");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn handle_callback(
    State(slot): State<Slot>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let Some(tx) = slot.lock().await.take() else {
        return (StatusCode::GONE, Html(FAILURE_HTML));
    };

    let ok = params.error.is_none() && params.code.is_some();
    let _ = tx.send(params);

    if ok {
        (StatusCode::OK, Html(SUCCESS_HTML))
    } else {
        (StatusCode::BAD_REQUEST, Html(FAILURE_HTML))
    }
}
