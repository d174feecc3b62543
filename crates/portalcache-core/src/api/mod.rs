//! REST API client module for the portal backend.
//!
//! This module provides the `ApiClient` used by every service module, and
//! the layers it is built from:
//!
//! - `RequestExecutor`: one request, one deadline, typed outcome
//! - `RetryPolicy`: exponential backoff for transient failures
//! - `ApiResponse`: the `{ success, data, message, errors }` envelope
//! - `ResourceService`: list/get/create/update/delete/search over one endpoint
//!
//! Bearer tokens are attached from the `TokenStore` and refreshed by the
//! `AuthRefreshCoordinator` in the auth module.

pub mod client;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod request;
pub mod resource;
pub mod retry;

pub use client::{ApiClient, LoginSession};
pub use envelope::{ApiResponse, Response, ResponseBody};
pub use error::ApiError;
pub use executor::{RequestExecutor, Router};
pub use request::{segment_path, FilePart, FormPart, RequestDescriptor};
pub use resource::{Page, ResourceService};
pub use retry::RetryPolicy;
