use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, Request};
use http_body_util::{BodyExt as _, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use joke_market_engine::batch::{BatchSubmission, GradingSubmission};
use joke_market_engine::error::ApiError;
use joke_market_engine::market::PurchaseReceipt;
use joke_market_engine::models::{Batch, BatchId, JokeId, RoundId};
use joke_market_engine::roster::JoinedSession;
use joke_market_engine::views::SessionSnapshot;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::trace;

use crate::error::ClientError;
use crate::transport::Transport;

pub const HEADER_NAME_SESSION: &str = "x-session-token";

/// Talks JSON to a running server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is scheme and authority, e.g. `http://127.0.0.1:3000`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<T, ClientError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("{}/api{path}", self.base_url))
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            builder = builder.header(HEADER_NAME_SESSION, token);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(serde_json::to_vec(body)?))
            }
            None => Full::new(Bytes::new()),
        };

        let response = self.client.request(builder.body(body)?).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        trace!(%status, path, "response");
        if status.is_success() {
            return Ok(serde_json::from_slice(&bytes)?);
        }
        serde_json::from_slice::<ApiError>(&bytes).map_or_else(
            |_| {
                Err(ClientError::Transport(format!(
                    "unexpected status {status} for {path}"
                )))
            },
            |api_error| Err(api_error.into()),
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn join(&self, display_name: &str) -> Result<JoinedSession, ClientError> {
        self.request(
            Method::POST,
            "/join",
            None,
            Some(&json!({ "display_name": display_name })),
        )
        .await
    }

    async fn instructor_login(
        &self,
        display_name: &str,
        password: &str,
    ) -> Result<JoinedSession, ClientError> {
        self.request(
            Method::POST,
            "/instructor/login",
            None,
            Some(&json!({ "display_name": display_name, "password": password })),
        )
        .await
    }

    async fn session(&self, token: &str) -> Result<SessionSnapshot, ClientError> {
        self.request(Method::GET, "/session", Some(token), None::<&()>)
            .await
    }

    async fn submit_batch(
        &self,
        token: &str,
        round_id: RoundId,
        submission: BatchSubmission,
    ) -> Result<Batch, ClientError> {
        self.request(
            Method::POST,
            &format!("/rounds/{round_id}/batches"),
            Some(token),
            Some(&submission),
        )
        .await
    }

    async fn submit_grading(
        &self,
        token: &str,
        batch_id: BatchId,
        submission: GradingSubmission,
    ) -> Result<Batch, ClientError> {
        self.request(
            Method::POST,
            &format!("/batches/{batch_id}/grading"),
            Some(token),
            Some(&submission),
        )
        .await
    }

    async fn buy(
        &self,
        token: &str,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, ClientError> {
        self.request(
            Method::POST,
            &format!("/rounds/{round_id}/purchases"),
            Some(token),
            Some(&json!({ "joke_id": joke_id })),
        )
        .await
    }

    async fn return_purchase(
        &self,
        token: &str,
        round_id: RoundId,
        joke_id: JokeId,
    ) -> Result<PurchaseReceipt, ClientError> {
        self.request(
            Method::POST,
            &format!("/rounds/{round_id}/returns"),
            Some(token),
            Some(&json!({ "joke_id": joke_id })),
        )
        .await
    }
}
