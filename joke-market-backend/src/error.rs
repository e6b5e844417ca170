use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::InvalidHeaderValue;
use http::StatusCode;
use joke_market_config::ConfigError;
use joke_market_engine::error::{ApiError, EngineError, ErrorCode, ErrorKind};
use tracing::error;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid request body: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("invalid path: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("header error: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("IO error: {0}")]
    File(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[must_use]
pub const fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::SessionLost => StatusCode::UNAUTHORIZED,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let api_error = match self {
            Self::Engine(error) => ApiError::from(error),
            err @ (Self::JsonRejection(_) | Self::PathRejection(_)) => ApiError {
                kind: ErrorKind::Validation,
                code: ErrorCode::Validation,
                message: err.to_string(),
            },
            err @ (Self::Header(_) | Self::File(_) | Self::Config(_)) => {
                error!("{err}");
                return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
            }
        };
        (status_code(api_error.kind), Json(api_error)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use joke_market_engine::models::JokeId;

    use super::*;

    #[test]
    fn engine_errors_keep_their_kind() {
        let response = AppError::from(EngineError::AlreadyBought(JokeId(3))).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let response = AppError::from(EngineError::SessionLost).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response =
            AppError::from(EngineError::Validation("nope".to_owned())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = AppError::from(EngineError::Forbidden("customers")).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
