//! Authentication: the session manager and everything it owns.
//!
//! This module provides:
//! - `SessionManager`: the single owner of the current session
//! - `decode`: credential -> `Claims` (display/routing context, not validation)
//! - `CredentialStore`: durable storage backends (file, OS keyring, memory)
//!
//! The credential is persisted under one key and restored by
//! `SessionManager::initialize` at startup.

pub mod claims;
pub mod credentials;
pub mod session;

pub use claims::{decode, Claims, Credential, DecodeError};
pub use credentials::{CredentialStore, FileStore, KeyringStore, MemoryStore, StorageBackend};
pub use session::{Session, SessionError, SessionManager, CREDENTIAL_KEY};
