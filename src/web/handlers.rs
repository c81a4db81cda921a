use crate::blog::BlogPost;
use crate::cache::{AudioRecord, SheetMusicRecord};
use crate::web::AppState;
use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use tracing::error;

#[derive(Template)]
#[template(path = "home.html")]
struct HomePage;

#[derive(Template)]
#[template(path = "music.html")]
struct MusicPage {
    songs: Vec<AudioRecord>,
}

#[derive(Template)]
#[template(path = "sheetmusic.html")]
struct SheetMusicPage {
    sheets: Vec<SheetMusicRecord>,
}

#[derive(Template)]
#[template(path = "blog.html")]
struct BlogPage {
    posts: Vec<BlogPost>,
}

#[derive(Template)]
#[template(path = "keyofday.html")]
struct KeyOfDayPage {
    key: &'static str,
}

fn render<T: Template>(template: T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "Template rendering failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn home() -> Response {
    render(HomePage)
}

pub async fn music(State(state): State<AppState>) -> Response {
    let snapshot = state.audio_cache.get().await;
    render(MusicPage {
        songs: snapshot.as_ref().clone(),
    })
}

pub async fn sheet_music(State(state): State<AppState>) -> Response {
    let snapshot = state.sheet_cache.get().await;
    render(SheetMusicPage {
        sheets: snapshot.as_ref().clone(),
    })
}

pub async fn blog(State(state): State<AppState>) -> Response {
    match crate::blog::load_posts(&state.blog_dir) {
        Ok(posts) => render(BlogPage { posts }),
        Err(e) => {
            error!(error = %e, "Failed loading blog posts");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn key_of_day() -> Response {
    render(KeyOfDayPage {
        key: crate::keyofday::key_of_day(),
    })
}

pub async fn resume(State(state): State<AppState>) -> Response {
    match &state.resume_url {
        Some(url) => Redirect::permanent(url).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn stylesheet() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css")],
        include_str!("../../static/main.css"),
    )
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let songs = state.audio_cache.get().await.len();
    let sheets = state.sheet_cache.get().await.len();
    let traffic = state.traffic.as_ref().and_then(|log| log.summary().ok());

    let status = if songs > 0 || sheets > 0 {
        "healthy"
    } else {
        "degraded"
    };

    let body = serde_json::json!({
        "status": status,
        "songs": songs,
        "sheets": sheets,
        "requests_logged": traffic.map(|t| t.total),
        "suspicious_requests": traffic.map(|t| t.suspicious),
        "version": env!("CARGO_PKG_VERSION"),
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
