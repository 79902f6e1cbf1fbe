//! Core library for the Pulseboard client.
//!
//! Owns the client-side session: who the caller is, which workspace the
//! credential is scoped to, and how that state is persisted, restored and
//! revoked. Resource APIs go through [`api::TransportGuard`], which reads the
//! credential from the [`auth::SessionManager`] for every request.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError, TransportGuard};
pub use auth::{Claims, Credential, SessionManager};
pub use config::Config;
