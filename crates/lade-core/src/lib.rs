//! Core library for the `lade` command-line client.
//!
//! This crate owns the parts of the client that have real lifetime and
//! concurrency concerns:
//! - [`auth`]: the OAuth credential lifecycle, shared by every API call
//! - [`stream`]: attaching the local terminal to a remote process or log stream
//!
//! The [`api`] module is the thin REST transport those two build on, and
//! [`config`] holds the on-disk configuration the credential is persisted in.

pub mod api;
pub mod auth;
pub mod config;
pub mod shutdown;
pub mod stream;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, Credential, TokenManager};
pub use config::Config;
pub use stream::{AttachMode, Attacher, StreamError};
