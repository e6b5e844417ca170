use joke_market_engine::error::{ApiError, EngineError, ErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// The server understood the request and turned it down.
    #[error("rejected: {0}")]
    Rejected(#[from] ApiError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not logged in")]
    LoggedOut,
}

impl From<EngineError> for ClientError {
    fn from(value: EngineError) -> Self {
        Self::Rejected(value.into())
    }
}

impl From<hyper_util::client::legacy::Error> for ClientError {
    fn from(value: hyper_util::client::legacy::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<hyper::Error> for ClientError {
    fn from(value: hyper::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<http::Error> for ClientError {
    fn from(value: http::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl ClientError {
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Rejected(error) => Some(error.kind),
            Self::Transport(_) | Self::Json(_) | Self::LoggedOut => None,
        }
    }

    /// Whether this answer to an identity lookup means the identity is gone
    /// for good.
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(
            self.kind(),
            Some(ErrorKind::SessionLost | ErrorKind::NotFound | ErrorKind::Authorization)
        )
    }
}
