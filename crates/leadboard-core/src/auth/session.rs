use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::CredentialSource;
use crate::api::{endpoints, ApiClient, ApiError};
use crate::models::{Role, User};

#[derive(Error, Debug)]
pub enum AuthError {
    /// The server (or the network) refused the request; message is user-facing.
    #[error("{0}")]
    Rejected(String),

    #[error("Credential storage failed: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    fn from_api(err: &ApiError, fallback: &str) -> Self {
        AuthError::Rejected(err.server_message().unwrap_or(fallback).to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    user: User,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: User,
}

/// The signed-in user plus the token the data layer reads.
pub struct Session {
    client: ApiClient,
    credentials: Arc<dyn CredentialSource>,
    user: RwLock<Option<User>>,
}

impl Session {
    pub fn new(client: ApiClient, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            client,
            credentials,
            user: RwLock::new(None),
        }
    }

    pub fn credentials(&self) -> Arc<dyn CredentialSource> {
        self.credentials.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.credentials.token()
    }

    pub fn user(&self) -> Option<User> {
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_user(&self, user: Option<User>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user().map(|u| u.role == Role::Admin).unwrap_or(false)
    }

    pub fn is_user(&self) -> bool {
        self.user().map(|u| u.role == Role::User).unwrap_or(false)
    }

    /// Resolve the stored token to a user.
    ///
    /// Returns `Ok(None)` when there is no token or the server rejects it;
    /// a rejected token is removed from storage.
    pub async fn check_auth(&self) -> Result<Option<User>, AuthError> {
        let Some(token) = self.credentials.token() else {
            return Ok(None);
        };

        let user = self
            .client
            .get_json(endpoints::AUTH_ME, &token)
            .await
            .and_then(|body| {
                serde_json::from_value::<MeResponse>(body)
                    .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            });

        match user {
            Ok(me) => {
                self.set_user(Some(me.user.clone()));
                Ok(Some(me.user))
            }
            Err(e) => {
                warn!(error = %e, "Stored token rejected, signing out");
                self.credentials.clear_token()?;
                self.set_user(None);
                Ok(None)
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .client
            .post_json(endpoints::AUTH_LOGIN, None, &body)
            .await
            .and_then(|body| {
                serde_json::from_value::<LoginResponse>(body)
                    .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            })
            .map_err(|e| {
                warn!(error = %e, "Login failed");
                AuthError::from_api(&e, "Login failed")
            })?;

        self.credentials.store_token(&response.token)?;
        self.set_user(Some(response.user.clone()));
        info!(user = %response.user.name, "Logged in");
        Ok(response.user)
    }

    /// Create an account. Does not sign the new user in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), AuthError> {
        let body = serde_json::to_value(request)
            .map_err(|e| AuthError::Rejected(e.to_string()))?;
        self.client
            .post_json(endpoints::AUTH_REGISTER, None, &body)
            .await
            .map_err(|e| AuthError::from_api(&e, "Registration failed"))?;
        Ok(())
    }

    /// End the server session (best effort) and forget the token locally.
    pub async fn logout(&self) -> Result<(), AuthError> {
        if let Some(token) = self.credentials.token() {
            if let Err(e) = self
                .client
                .post_json(endpoints::AUTH_LOGOUT, Some(&token), &Value::Null)
                .await
            {
                warn!(error = %e, "Error during logout");
            }
        }

        self.credentials.clear_token()?;
        self.set_user(None);
        Ok(())
    }
}
