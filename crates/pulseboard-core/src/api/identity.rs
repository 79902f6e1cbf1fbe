//! Identity-provider interface used by the session manager.
//!
//! `ApiClient` implements this over HTTP; tests substitute scripted providers.

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::auth::Credential;

#[derive(Debug, Clone, Serialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupInput {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Authorization-code exchange with an external provider (e.g. "google").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedLoginInput {
    #[serde(skip)]
    pub provider: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// Summary of the caller returned alongside a fresh credential.
/// Informational only; the session derives identity from the credential.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: Credential,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

pub trait IdentityProvider: Send + Sync {
    fn login<'a>(&'a self, input: &'a LoginInput) -> BoxFuture<'a, Result<AuthResponse>>;

    fn signup<'a>(&'a self, input: &'a SignupInput) -> BoxFuture<'a, Result<AuthResponse>>;

    fn federated_login<'a>(
        &'a self,
        input: &'a FederatedLoginInput,
    ) -> BoxFuture<'a, Result<AuthResponse>>;

    /// Exchange `current` for a credential scoped to `workspace_id`.
    fn switch_workspace<'a>(
        &'a self,
        current: &'a Credential,
        workspace_id: i64,
    ) -> BoxFuture<'a, Result<AuthResponse>>;
}
