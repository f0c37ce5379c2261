use std::io;

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Terminal error: {0}")]
    Terminal(#[source] io::Error),

    #[error("Connection error: {0}")]
    Remote(#[source] io::Error),

    #[error("Input error: {0}")]
    Local(#[source] io::Error),

    /// The remote side reported a failure on the stream itself (e.g. a failed build)
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}
