use thiserror::Error;

use crate::{requester::RequestError, router::RouterError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Request error: {0}")]
    Request(#[from] RequestError),
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    // config / io
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

// エラー作成用のヘルパー関数
impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
