//! HTTP binding of the joke market engine: JSON over axum, one engine per
//! process, sessions carried in a cookie or an `x-session-token` header.

pub mod error;
pub mod extract;
pub mod routes;
pub mod session;

use std::future::Future;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, patch, post};
use axum::Router;
use error::AppError;
use joke_market_config::Config;
use joke_market_engine::{Engine, EngineSettings};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

use crate::routes::{batches, market, rounds, roster};

#[derive(Clone, FromRef)]
pub struct MyState {
    pub engine: Arc<Engine>,
}

#[must_use]
pub fn engine_settings(config: &Config) -> EngineSettings {
    EngineSettings {
        instructor_password: config.instructor_password.clone(),
        default_team_count: config.default_team_count,
        pass_threshold: config.pass_threshold,
        default_batch_size: config.default_batch_size,
        default_customer_budget: config.default_customer_budget,
    }
}

fn layers(app: Router<MyState>, engine: Arc<Engine>) -> Router<()> {
    // layers are in reverse order
    let app: Router<()> = app.with_state(MyState { engine });
    let app = app.layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CatchPanicLayer::new()),
    );
    app.layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[must_use]
pub fn setup_server(engine: Arc<Engine>) -> Router<()> {
    let api = Router::new()
        .route("/join", post(routes::session::join))
        .route("/instructor/login", post(routes::session::instructor_login))
        .route("/me", get(routes::session::me))
        .route("/session", get(routes::session::session))
        .route(
            "/rounds",
            get(rounds::list_rounds).post(rounds::configure_round),
        )
        .route("/rounds/active", get(rounds::active_round))
        .route("/rounds/:id/start", post(rounds::start_round))
        .route("/rounds/:id/end", post(rounds::end_round))
        .route("/rounds/:id/reveal", post(rounds::set_reveal_flag))
        .route("/rounds/:id/batches", post(batches::submit_batch))
        .route("/rounds/:id/grading/next", get(batches::next_for_grading))
        .route("/rounds/:id/market", get(market::list_market))
        .route("/rounds/:id/budget", get(market::budget))
        .route("/rounds/:id/purchases", post(market::buy))
        .route("/rounds/:id/returns", post(market::return_purchase))
        .route("/rounds/:id/leaderboard", get(market::leaderboard))
        .route("/batches/:id/grading", post(batches::submit_grading))
        .route("/participants", get(roster::roster))
        .route(
            "/participants/:id",
            patch(roster::patch_participant).delete(roster::delete_participant),
        )
        .route(
            "/assignments/feasible",
            get(roster::feasible_customer_counts),
        )
        .route("/assignments/auto", post(roster::auto_assign))
        .route(
            "/teams/:id",
            get(roster::team_summary).patch(roster::rename_team),
        )
        .route("/teams/:id/batches", get(roster::team_batches))
        .route("/reset", post(roster::reset));

    layers(Router::new().nest("/api", api), engine)
}

/// Binds the listener and returns the future serving it until Ctrl+C or
/// SIGTERM.
pub async fn run_server(
    config: &Config,
) -> Result<impl Future<Output = Result<(), AppError>>, AppError> {
    info!("starting up server...");
    if config.instructor_password == joke_market_config::DEFAULT_INSTRUCTOR_PASSWORD {
        warn!("the default instructor password is in use, set JOKE_MARKET_INSTRUCTOR_PASSWORD");
    }

    let engine = Arc::new(Engine::new(engine_settings(config)));
    let app = setup_server(engine);
    let listener = TcpListener::bind(config.listen_address).await?;
    info!("listening on {}", listener.local_addr()?);

    Ok(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        warn!("shut down");
        Ok(())
    })
}

#[allow(clippy::redundant_pub_crate)]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
    use http::{Request, StatusCode};
    use http_body_util::BodyExt as _;
    use serde_json::{json, Value};
    use tower::ServiceExt as _;

    use super::*;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn join_sets_a_cookie_that_authenticates() {
        let app = setup_server(Arc::new(Engine::default()));

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/join")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "display_name": "Ada" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key("x-request-id"));
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_owned();
        assert!(cookie.starts_with(session::COOKIE_NAME_SESSION));
        let pair = cookie.split(';').next().unwrap().to_owned();

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/me")
                    .header(COOKIE, pair)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["participant"]["display_name"], "Ada");

        let response = app
            .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "SESSION_LOST");
    }

    #[tokio::test]
    async fn malformed_bodies_are_validation_errors() {
        let app = setup_server(Arc::new(Engine::default()));
        let response = app
            .oneshot(
                Request::post("/api/join")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"display_name\": 7}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "VALIDATION");
        assert_eq!(body["kind"], "validation");
    }
}
