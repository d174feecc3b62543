//! Authentication module for managing credentials and token refresh.
//!
//! This module provides:
//! - `TokenStore`: access/refresh tokens kept in a key-value store and cookies
//! - `KeyValueStore` backends: memory, JSON file, OS keyring
//! - `CookieJar`: cookie backend, also the HTTP client's cookie provider
//! - `AuthRefreshCoordinator`: single-flight refresh and replay on 401

pub mod cookies;
pub mod refresh;
pub mod storage;
pub mod tokens;

pub use cookies::CookieJar;
pub use refresh::AuthRefreshCoordinator;
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
pub use tokens::{Credentials, TokenGrant, TokenStore};
