//! Drives the HTTP binding in process, one request at a time, the way a
//! browser client would.

use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt as _;
use joke_market_backend::session::HEADER_NAME_SESSION;
use joke_market_backend::setup_server;
use joke_market_engine::Engine;
use serde_json::Value;
use tower::ServiceExt as _;

#[derive(thiserror::Error, Debug)]
pub enum E2eError {
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    #[error("body error: {0}")]
    Body(#[from] axum::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response {status}: {body}")]
    Unexpected { status: StatusCode, body: Value },
}

#[derive(Clone)]
pub struct TestApi {
    router: Router,
    engine: Arc<Engine>,
}

impl Default for TestApi {
    fn default() -> Self {
        Self::new(Arc::new(Engine::default()))
    }
}

impl TestApi {
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            router: setup_server(Arc::clone(&engine)),
            engine,
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Sends one request below `/api`. Empty response bodies come back as
    /// `null`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), E2eError> {
        let mut builder = Request::builder().method(method).uri(format!("/api{path}"));
        if let Some(token) = token {
            builder = builder.header(HEADER_NAME_SESSION, token);
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        if bytes.is_empty() {
            return Ok((status, Value::Null));
        }
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    pub async fn get(&self, path: &str, token: &str) -> Result<(StatusCode, Value), E2eError> {
        self.call(Method::GET, path, Some(token), None).await
    }

    pub async fn post(
        &self,
        path: &str,
        token: &str,
        body: Value,
    ) -> Result<(StatusCode, Value), E2eError> {
        self.call(Method::POST, path, Some(token), Some(body)).await
    }

    /// Like [`TestApi::call`], but anything outside 2xx is an error.
    pub async fn ok(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value, E2eError> {
        let (status, body) = self.call(method, path, token, body).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(E2eError::Unexpected { status, body })
        }
    }

    /// Joins as a player and returns the session token.
    pub async fn join(&self, display_name: &str) -> Result<String, E2eError> {
        let body = self
            .ok(
                Method::POST,
                "/join",
                None,
                Some(serde_json::json!({ "display_name": display_name })),
            )
            .await?;
        token_of(body)
    }

    pub async fn instructor_login(&self, password: &str) -> Result<String, E2eError> {
        let body = self
            .ok(
                Method::POST,
                "/instructor/login",
                None,
                Some(serde_json::json!({ "display_name": "Instructor", "password": password })),
            )
            .await?;
        token_of(body)
    }
}

fn token_of(body: Value) -> Result<String, E2eError> {
    match body.get("token").and_then(Value::as_str) {
        Some(token) => Ok(token.to_owned()),
        None => Err(E2eError::Unexpected {
            status: StatusCode::OK,
            body,
        }),
    }
}
