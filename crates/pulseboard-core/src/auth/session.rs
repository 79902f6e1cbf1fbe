use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::claims::{decode, Claims, Credential, DecodeError};
use super::credentials::CredentialStore;
use crate::api::identity::{
    AuthResponse, FederatedLoginInput, IdentityProvider, LoginInput, SignupInput,
};

/// Storage key holding the persisted credential.
pub const CREDENTIAL_KEY: &str = "auth_token";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("The session changed while this request was in flight")]
    Superseded,

    #[error("Server issued an unreadable credential: {0}")]
    InvalidCredential(#[from] DecodeError),
}

/// A credential together with its decoding. Held as one value so the two
/// can only ever be replaced together.
#[derive(Debug, Clone)]
struct Authenticated {
    credential: Credential,
    identity: Claims,
}

/// Current authentication state.
#[derive(Debug, Clone)]
pub struct Session {
    auth: Option<Authenticated>,
    is_initializing: bool,
    // Bumped on every committed change (sign-in, switch, logout); async
    // results commit only if nothing was committed since they started.
    epoch: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            auth: None,
            is_initializing: true,
            epoch: 0,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.auth.as_ref().map(|a| &a.credential)
    }

    pub fn identity(&self) -> Option<&Claims> {
        self.auth.as_ref().map(|a| &a.identity)
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    pub fn is_initializing(&self) -> bool {
        self.is_initializing
    }
}

/// Owner of the process's single [`Session`].
///
/// Built once by the application and shared as `Arc<SessionManager>` with
/// everything that reads or changes the session.
pub struct SessionManager {
    state: watch::Sender<Session>,
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn IdentityProvider>,
    initialized: AtomicBool,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            state: watch::Sender::new(Session::new()),
            store,
            provider,
            initialized: AtomicBool::new(false),
        }
    }

    /// Clone of the current session.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Current credential, read fresh on every call.
    pub fn credential(&self) -> Option<Credential> {
        self.state.borrow().credential().cloned()
    }

    pub fn identity(&self) -> Option<Claims> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_initializing(&self) -> bool {
        self.state.borrow().is_initializing()
    }

    /// Watch for session changes (sign-in, workspace switch, sign-out).
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Rehydrate the session from storage. Only the first call does anything.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Session already initialized");
            return;
        }

        let stored = match self.store.get(CREDENTIAL_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted credential");
                None
            }
        };

        self.state.send_modify(|session| {
            match stored {
                // A sign-in that completed first wins over the stored value.
                Some(_) if session.auth.is_some() => {}
                Some(raw) => match decode(&raw) {
                    Ok(identity) => {
                        info!(
                            user_id = identity.user_id(),
                            workspace_id = identity.workspace_id(),
                            "Restored session"
                        );
                        session.auth = Some(Authenticated {
                            credential: Credential::new(raw),
                            identity,
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Discarding unreadable persisted credential");
                        if let Err(e) = self.store.remove(CREDENTIAL_KEY) {
                            warn!(error = %e, "Failed to remove persisted credential");
                        }
                    }
                },
                None => debug!("No persisted credential"),
            }
            session.is_initializing = false;
        });
    }

    /// Password sign-in. Returns false on any failure, leaving the current
    /// session untouched.
    pub async fn login(&self, input: &LoginInput) -> bool {
        let ticket = self.begin();
        let result = self.provider.login(input).await;
        self.finish_sign_in("password", ticket, result)
    }

    pub async fn signup(&self, input: &SignupInput) -> bool {
        let ticket = self.begin();
        let result = self.provider.signup(input).await;
        self.finish_sign_in("signup", ticket, result)
    }

    pub async fn federated_login(&self, input: &FederatedLoginInput) -> bool {
        let ticket = self.begin();
        let result = self.provider.federated_login(input).await;
        self.finish_sign_in("federated", ticket, result)
    }

    /// Re-scope the session to another workspace. Unlike sign-in, failures
    /// are returned to the caller.
    pub async fn switch_workspace(&self, workspace_id: i64) -> Result<()> {
        let (ticket, current) = {
            let session = self.state.borrow();
            let current = session.credential().cloned();
            (session.epoch, current.ok_or(SessionError::NotAuthenticated)?)
        };

        let response = self
            .provider
            .switch_workspace(&current, workspace_id)
            .await
            .with_context(|| format!("Failed to switch to workspace {}", workspace_id))?;

        let identity = self.adopt(ticket, response)?;
        if identity.workspace_id() != workspace_id {
            warn!(
                requested = workspace_id,
                issued = identity.workspace_id(),
                "Server issued a credential for a different workspace"
            );
        }
        info!(workspace_id = identity.workspace_id(), "Switched workspace");
        Ok(())
    }

    /// Drop the credential from memory and storage. Purely local; always
    /// leaves the session signed out.
    pub fn logout(&self) {
        self.state.send_modify(|session| {
            session.epoch += 1;
            let was_signed_in = session.auth.take().is_some();
            if let Err(e) = self.store.remove(CREDENTIAL_KEY) {
                warn!(error = %e, "Failed to remove persisted credential");
            }
            if was_signed_in {
                info!("Signed out");
            } else {
                debug!("Logout with no active session");
            }
        });
    }

    /// Epoch the caller's result must still match to be committed.
    fn begin(&self) -> u64 {
        self.state.borrow().epoch
    }

    fn finish_sign_in(
        &self,
        method: &'static str,
        ticket: u64,
        result: Result<AuthResponse>,
    ) -> bool {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(method, error = %e, "Sign-in failed");
                return false;
            }
        };

        match self.adopt(ticket, response) {
            Ok(identity) => {
                info!(
                    method,
                    user_id = identity.user_id(),
                    workspace_id = identity.workspace_id(),
                    "Signed in"
                );
                true
            }
            Err(e) => {
                warn!(method, error = %e, "Sign-in result discarded");
                false
            }
        }
    }

    /// Decode, then replace credential and identity and persist, all in one
    /// step. Undecodable credentials leave the session as it was.
    fn adopt(&self, ticket: u64, response: AuthResponse) -> Result<Claims, SessionError> {
        let identity = decode(response.token.as_str())?;
        let credential = response.token;

        let mut outcome = Err(SessionError::Superseded);
        self.state.send_if_modified(|session| {
            if session.epoch != ticket {
                return false;
            }
            if let Err(e) = self.store.set(CREDENTIAL_KEY, credential.as_str()) {
                warn!(error = %e, "Failed to persist credential");
            }
            session.epoch += 1;
            session.auth = Some(Authenticated {
                credential,
                identity: identity.clone(),
            });
            outcome = Ok(identity);
            true
        });
        outcome
    }
}
