//! Session-aware request layer.
//!
//! Every request sent through [`TransportGuard`] reads the credential from
//! the session at send time. A 401 or 403 from the server signs the session
//! out and sends the user back to the entry route.

use std::sync::Arc;

use anyhow::Result;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use super::{ApiClient, ApiError};
use crate::auth::SessionManager;

/// Route shown to signed-out users.
pub const DEFAULT_ENTRY_ROUTE: &str = "/login";

/// Where the guard sends the user after a forced logout.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

pub struct TransportGuard {
    api: ApiClient,
    session: Arc<SessionManager>,
    navigator: Arc<dyn Navigator>,
    entry_route: String,
}

impl TransportGuard {
    pub fn new(
        api: ApiClient,
        session: Arc<SessionManager>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            api,
            session,
            navigator,
            entry_route: DEFAULT_ENTRY_ROUTE.to_string(),
        }
    }

    pub fn with_entry_route(mut self, route: impl Into<String>) -> Self {
        self.entry_route = route.into();
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None::<&()>).await
    }

    /// Workspace switch goes out with the current bearer, so a rejection
    /// here is handled like any other guarded request.
    pub async fn switch_workspace(&self, workspace_id: i64) -> Result<()> {
        let result = self.session.switch_workspace(workspace_id).await;
        if let Err(ref e) = result {
            self.intercept(e);
        }
        result
    }

    async fn send<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let result = self
            .api
            .request(method, path, body, || self.session.credential())
            .await;
        if let Err(ref e) = result {
            self.intercept(e);
        }
        result
    }

    fn intercept(&self, err: &anyhow::Error) {
        if ApiError::find(err).is_some_and(ApiError::is_auth_failure) {
            self.force_logout();
        }
    }

    fn force_logout(&self) {
        warn!("Server rejected the session credential, signing out");
        self.session.logout();
        self.navigator.navigate(&self.entry_route);
    }
}
