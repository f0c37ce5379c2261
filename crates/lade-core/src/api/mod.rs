//! REST API client for the Lade platform.
//!
//! Every request is authorised through the shared [`TokenManager`](crate::auth::TokenManager),
//! so API calls refresh the credential or prompt for a login as needed. Besides
//! plain JSON calls the client can upgrade a connection to a raw process
//! stream and open newline-delimited log streams.

pub mod client;
pub mod error;
pub mod models;

pub use client::{ApiClient, LogStream, ProcessResizer};
pub use error::ApiError;
pub use models::{LogStreamOpts, Process, ProcessCreateOpts, ProcessResizeOpts, Release};
