//! HTTP surface: routing, page handlers, and the traffic-log middleware.

mod handlers;

use crate::cache::{AudioSource, Cache, SheetMusicSource};
use crate::metrics::SharedMetrics;
use crate::traffic::{RequestEntry, TrafficLog};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub audio_cache: Arc<Cache<AudioSource>>,
    pub sheet_cache: Arc<Cache<SheetMusicSource>>,
    pub metrics: SharedMetrics,
    pub blog_dir: String,
    pub resume_url: Option<String>,
    /// Absent when the traffic database could not be opened.
    pub traffic: Option<Arc<TrafficLog>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/music", get(handlers::music))
        .route("/sheet-music", get(handlers::sheet_music))
        .route("/blog", get(handlers::blog))
        .route("/kod", get(handlers::key_of_day))
        .route("/resume", get(handlers::resume))
        .route("/static/main.css", get(handlers::stylesheet))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Record every request in the traffic log before handling it.
async fn track_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(log) = &state.traffic {
        let entry = RequestEntry {
            path: req.uri().path().to_string(),
            ip: client_ip(&req),
            user_agent: header_value(&req, header::USER_AGENT),
            referrer: header_value(&req, header::REFERER),
        };
        log.record(entry).await;
    }
    next.run(req).await
}

/// Forwarded-for header first (proxy deployments), then the socket address.
fn client_ip(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_value(req: &Request, name: header::HeaderName) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
