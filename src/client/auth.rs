use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::api::ApiClient;
use crate::client::credentials::CredentialStore;
use crate::client::error::ClientError;
use crate::db::models::User;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SignupFields {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    token: String,
    user: User,
}

#[derive(Deserialize)]
struct MeResponse {
    user: User,
}

/// Client-side session state: who is signed in, and the last error shown
/// to the user.
pub struct AuthService<S> {
    api: Arc<ApiClient>,
    store: S,
    current: Option<User>,
    error: Option<String>,
}

impl<S: CredentialStore> AuthService<S> {
    pub fn new(api: Arc<ApiClient>, store: S) -> Self {
        Self {
            api,
            store,
            current: None,
            error: None,
        }
    }

    pub fn current_session(&self) -> Option<&User> {
        self.current.as_ref()
    }

    /// Message from the most recent failed call, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn login(&mut self, identifier: &str, password: &str) -> bool {
        let body = LoginBody {
            identifier,
            password,
        };
        let result = self.api.post("/api/auth/login", &body).await;
        self.finish_sign_in(result).await
    }

    pub async fn signup(&mut self, fields: &SignupFields) -> bool {
        let result = self.api.post("/api/auth/register", fields).await;
        self.finish_sign_in(result).await
    }

    /// A failed attempt leaves any existing session (user, live token and
    /// stored token) exactly as it was.
    async fn finish_sign_in(&mut self, result: Result<SessionResponse, ClientError>) -> bool {
        let outcome = match result {
            Ok(session) => self.adopt(session).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {
                self.error = None;
                true
            }
            Err(e) => {
                tracing::debug!("Sign-in failed: {}", e);
                self.error = Some(e.user_message());
                false
            }
        }
    }

    async fn adopt(&mut self, session: SessionResponse) -> Result<(), ClientError> {
        self.store.save(&session.token).await?;
        self.api.set_token(Some(session.token)).await;
        self.current = Some(session.user);
        Ok(())
    }

    /// Revoke the token server-side when possible and always forget it
    /// locally.
    pub async fn logout(&mut self) {
        if self.api.token().await.is_some() {
            if let Err(e) = self
                .api
                .post_empty::<serde_json::Value>("/api/auth/logout")
                .await
            {
                tracing::debug!("Server-side logout failed: {}", e);
            }
        }
        self.api.set_token(None).await;
        self.current = None;
        self.error = None;
        if let Err(e) = self.store.clear().await {
            tracing::warn!("Failed to clear stored credentials: {}", e);
        }
    }

    /// Resume a persisted session. A token the server no longer accepts is
    /// discarded; transport failures keep it for a later attempt.
    pub async fn restore(&mut self) -> bool {
        let token = match self.store.load().await {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(e) => {
                self.error = Some(e.user_message());
                return false;
            }
        };

        self.api.set_token(Some(token)).await;
        match self.api.get::<MeResponse>("/api/auth/me").await {
            Ok(me) => {
                self.current = Some(me.user);
                self.error = None;
                true
            }
            Err(e) => {
                self.current = None;
                if !e.is_retriable() {
                    self.api.set_token(None).await;
                    if let Err(clear_err) = self.store.clear().await {
                        tracing::warn!("Failed to clear stored credentials: {}", clear_err);
                    }
                }
                self.error = Some(e.user_message());
                false
            }
        }
    }
}
