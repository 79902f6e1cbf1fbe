//! REST API access for Pulseboard services.
//!
//! This module provides:
//! - `ApiClient`: plain HTTP transport, also the HTTP identity provider
//! - `TransportGuard`: attaches the session credential to each request and
//!   signs the session out when the server rejects it
//!
//! The API uses JWT bearer authentication obtained from the `/auth`
//! endpoints.

pub mod client;
pub mod error;
pub mod guard;
pub mod identity;

pub use client::ApiClient;
pub use error::ApiError;
pub use guard::{Navigator, TransportGuard, DEFAULT_ENTRY_ROUTE};
pub use identity::{
    AuthResponse, FederatedLoginInput, IdentityProvider, LoginInput, SignupInput, UserSummary,
};
