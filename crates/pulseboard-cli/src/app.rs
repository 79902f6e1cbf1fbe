//! Application wiring for the Pulseboard CLI.
//!
//! `App` is the composition root: it builds the credential store, the
//! session manager and the guarded transport once, and every command goes
//! through it.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use pulseboard_core::api::{FederatedLoginInput, LoginInput, Navigator, SignupInput};
use pulseboard_core::auth::Claims;
use pulseboard_core::{ApiClient, Config, SessionManager, TransportGuard};

/// Environment variable consulted before prompting for a password.
const PASSWORD_ENV: &str = "PULSEBOARD_PASSWORD";

/// Maximum length for email input.
const MAX_EMAIL_LENGTH: usize = 254;

/// Tells the user their session ended; the CLI's "entry route" is the
/// login command.
struct CliNavigator;

impl Navigator for CliNavigator {
    fn navigate(&self, route: &str) {
        debug!(route, "Forced logout redirect");
        eprintln!("Your session has ended. Run `pulseboard login` to sign in again.");
    }
}

pub struct App {
    pub config: Config,
    pub session: Arc<SessionManager>,
    pub guard: TransportGuard,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = config.credential_store()?;
        let api = ApiClient::new(config.api_base_url.clone())?;
        debug!(api = %api.base_url(), storage = ?config.storage, "App configured");

        let session = Arc::new(SessionManager::new(store, Arc::new(api.clone())));
        session.initialize();

        let guard = TransportGuard::new(api, session.clone(), Arc::new(CliNavigator))
            .with_entry_route(config.entry_route.clone());

        Ok(Self {
            config,
            session,
            guard,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, email: Option<String>, password: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt_email()?,
        };
        let password = resolve_password(password)?;

        let input = LoginInput { email, password };
        if !self.session.login(&input).await {
            return Err(anyhow::anyhow!("Login failed. Check your email and password."));
        }

        self.remember_email(input.email);
        self.print_signed_in();
        Ok(())
    }

    pub async fn signup(
        &mut self,
        email: String,
        username: String,
        name: Option<String>,
        password: Option<String>,
    ) -> Result<()> {
        let password = resolve_password(password)?;
        let input = SignupInput {
            email,
            username,
            password,
            name,
        };
        if !self.session.signup(&input).await {
            return Err(anyhow::anyhow!("Signup failed."));
        }

        self.remember_email(input.email);
        self.print_signed_in();
        Ok(())
    }

    pub async fn federated_login(
        &mut self,
        provider: String,
        code: String,
        redirect_uri: Option<String>,
    ) -> Result<()> {
        let input = FederatedLoginInput {
            provider,
            code,
            redirect_uri,
        };
        if !self.session.federated_login(&input).await {
            return Err(anyhow::anyhow!("{} sign-in failed.", input.provider));
        }

        if let Some(identity) = self.session.identity() {
            self.remember_email(identity.email().to_string());
        }
        self.print_signed_in();
        Ok(())
    }

    pub fn logout(&self) {
        self.session.logout();
        println!("Signed out.");
    }

    pub async fn switch_workspace(&self, workspace_id: i64) -> Result<()> {
        self.guard.switch_workspace(workspace_id).await?;
        self.print_signed_in();
        Ok(())
    }

    pub fn whoami(&self) {
        match self.session.identity() {
            Some(identity) => print_identity(&identity),
            None => println!("Not signed in."),
        }
    }

    /// Fetch any API path with the current session and print the JSON.
    pub async fn get(&self, path: &str) -> Result<()> {
        let value: serde_json::Value = self.guard.get(path).await?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    fn remember_email(&mut self, email: String) {
        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    fn print_signed_in(&self) {
        if let Some(identity) = self.session.identity() {
            println!(
                "Signed in as {} <{}> (workspace {})",
                identity.display_name(),
                identity.email(),
                identity.workspace_id()
            );
        }
    }
}

fn print_identity(identity: &Claims) {
    println!("User:      {} (id {})", identity.display_name(), identity.user_id());
    println!("Handle:    {}", identity.username());
    println!("Email:     {}", identity.email());
    println!("Workspace: {}", identity.workspace_id());
    if let Some(issued) = identity.issued_at() {
        println!("Issued:    {}", issued.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(expires) = identity.expires_at() {
        println!(
            "Expires:   {} ({} min)",
            expires.format("%Y-%m-%d %H:%M UTC"),
            identity.minutes_until_expiry()
        );
    }
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    let email = email.trim().to_string();
    if !is_plausible_email(&email) {
        return Err(anyhow::anyhow!("Please enter a valid email address"));
    }
    Ok(email)
}

fn resolve_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password.or_else(|| std::env::var(PASSWORD_ENV).ok()) {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

fn is_plausible_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LENGTH
        && !email.chars().any(char::is_control)
        && email
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_plausible_email() {
        assert!(is_plausible_email("a@b.com"));
        assert!(is_plausible_email("first.last@sub.example.org"));

        assert!(!is_plausible_email(""));
        assert!(!is_plausible_email("no-at-sign"));
        assert!(!is_plausible_email("@b.com"));
        assert!(!is_plausible_email("a@localhost"));
        assert!(!is_plausible_email("a\n@b.com"));
        assert!(!is_plausible_email(&format!("{}@b.com", "x".repeat(260))));
    }
}
