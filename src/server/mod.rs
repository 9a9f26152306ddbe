//! HTTP front end: `/dashboard`, `/stats` and `/version`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ServerConfig;
use crate::engine::StatsEngine;
use crate::error::Error;
use crate::metrics::{DashboardSummary, StatsResult};
use crate::window::FilterWindow;

// ── Error handling ─────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    status: bool,
    #[serde(rename = "errorMsg")]
    error_msg: String,
}

/// Wrapper to make `Error` usable as an axum error response.
struct ApiErr(Error);

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            log::error!("Request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(ErrorBody {
                status: false,
                error_msg: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<Error> for ApiErr {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

// ── Handlers ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StatsQuery {
    filter: Option<String>,
    limit: Option<String>,
}

impl StatsQuery {
    fn window(&self, engine: &StatsEngine) -> Result<FilterWindow, Error> {
        match self.filter.as_deref().filter(|f| !f.is_empty()) {
            Some(filter) => filter.parse(),
            None => Ok(engine.default_window()),
        }
    }

    fn limit(&self, engine: &StatsEngine) -> Result<Option<usize>, Error> {
        match self.limit.as_deref().filter(|l| !l.is_empty()) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Error::InvalidLimit(format!("expected a non-negative integer, got {raw:?}"))),
            None => Ok(engine.default_limit()),
        }
    }
}

#[derive(Serialize)]
struct VersionInfo {
    version: &'static str,
    status: bool,
}

async fn get_dashboard(State(engine): State<Arc<StatsEngine>>) -> Result<Json<DashboardSummary>, ApiErr> {
    Ok(Json(engine.dashboard().await?))
}

async fn get_stats(
    State(engine): State<Arc<StatsEngine>>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<StatsResult>, ApiErr> {
    let window = params.window(&engine)?;
    let limit = params.limit(&engine)?;
    Ok(Json(engine.stats(window, limit).await?))
}

async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        status: true,
    })
}

// ── Router ─────────────────────────────────────────────────────────

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed = started.elapsed();
    if status.is_server_error() {
        log::error!("{method} {uri} -> {} in {elapsed:?}", status.as_u16());
    } else {
        log::info!("{method} {uri} -> {} in {elapsed:?}", status.as_u16());
    }
    response
}

fn cors_layer(config: &ServerConfig) -> Result<CorsLayer, Error> {
    let layer = CorsLayer::new().allow_methods([Method::GET]);
    if config.allowed_origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let origins = config
        .allowed_origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).map_err(|_| Error::Config(format!("invalid CORS origin {o:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

pub fn router(engine: Arc<StatsEngine>, config: &ServerConfig) -> Result<Router, Error> {
    Ok(Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/stats", get(get_stats))
        .route("/version", get(get_version))
        .with_state(engine)
        .layer(cors_layer(config)?)
        .layer(middleware::from_fn(log_requests)))
}

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(engine: Arc<StatsEngine>, config: &ServerConfig) -> Result<(), Error> {
    let app = router(engine, config)?;
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|e| Error::Config(format!("failed to bind {}: {e}", config.bind)))?;

    log::info!("Listening on http://{}", config.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await
        .map_err(|e| Error::Other(format!("server error: {e}")))
}
