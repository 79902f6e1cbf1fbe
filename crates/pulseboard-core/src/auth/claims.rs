//! Credential decoding.
//!
//! A credential is a JWT-shaped `header.payload.signature` string. Only the
//! payload is read here, to extract identity and workspace context for display
//! and routing. Nothing in this module validates the signature or the expiry;
//! the server is the only authority on whether a credential is still good.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque server-issued bearer token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("credential has no payload segment")]
    MissingPayload,

    #[error("payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("payload is not a valid claim set: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity and workspace claims embedded in a [`Credential`].
///
/// There is no public constructor: the only way to get a `Claims` value is
/// [`decode`], so identity always matches the credential it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    email: String,
    username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    workspace_id: i64,
    user_id: i64,
    iat: i64,
    exp: i64,
}

impl Claims {
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Display handle.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn workspace_id(&self) -> i64 {
        self.workspace_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Issued-at, seconds since the Unix epoch, as embedded.
    pub fn iat(&self) -> i64 {
        self.iat
    }

    /// Expiry, seconds since the Unix epoch, as embedded.
    pub fn exp(&self) -> i64 {
        self.exp
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Minutes remaining until the embedded expiry (for display only).
    pub fn minutes_until_expiry(&self) -> i64 {
        self.expires_at()
            .map(|exp| (exp - Utc::now()).num_minutes().max(0))
            .unwrap_or(0)
    }

    /// Name to show in prompts and status lines.
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(&self.username)
    }
}

/// Decode the claim set embedded in a credential.
///
/// Never panics on malformed input.
pub fn decode(credential: &str) -> Result<Claims, DecodeError> {
    let payload = credential
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(DecodeError::MissingPayload)?;

    // Some issuers keep the `=` padding; the URL-safe engine rejects it.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let json = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Build an unsigned credential carrying the given claims.
    pub fn encode(
        email: &str,
        username: &str,
        name: Option<&str>,
        workspace_id: i64,
        user_id: i64,
    ) -> String {
        let claims = Claims {
            email: email.to_string(),
            username: username.to_string(),
            name: name.map(str::to_string),
            workspace_id,
            user_id,
            iat: 1_700_000_000,
            exp: 1_700_086_400,
        };
        encode_claims(&claims)
    }

    pub fn encode_claims(claims: &Claims) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{}.{}.signature", header, payload)
    }

    /// Credential for `a@b.com` (user 1) scoped to `workspace_id`.
    pub fn token_for_workspace(workspace_id: i64) -> String {
        encode("a@b.com", "alice", Some("Alice"), workspace_id, 1)
    }
}
