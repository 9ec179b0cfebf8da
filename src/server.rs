// src/server.rs

//! Development server with live reload.
//!
//! Serves the destination root as static files. HTML responses get a small
//! script appended that listens on `/__livereload` (server-sent events) and
//! reloads the page whenever a build run finishes. Built files on disk are
//! never modified.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, info};

use crate::config::ServerSection;
use crate::engine::ReloadSender;
use crate::errors::{PipelineError, Result};

/// Path of the live-reload event stream.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Appended to served HTML pages.
pub const LIVERELOAD_SCRIPT: &str = r#"<script>
(function () {
  var source = new EventSource('/__livereload');
  source.onmessage = function (event) {
    if (event.data === 'reload') window.location.reload();
  };
})();
</script>
"#;

#[derive(Clone)]
struct ServerState {
    root: Arc<PathBuf>,
    reload_tx: ReloadSender,
}

/// A sender with room for a few pending reloads.
pub fn reload_channel() -> ReloadSender {
    broadcast::channel(16).0
}

pub fn router(root: impl Into<PathBuf>, reload_tx: ReloadSender) -> Router {
    let state = ServerState {
        root: Arc::new(root.into()),
        reload_tx,
    };
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload_handler))
        .fallback(serve_file)
        .with_state(state)
}

/// Bind the configured address. Failing here is fatal for the process.
pub async fn bind(section: &ServerSection) -> Result<TcpListener> {
    let addr = format!("{}:{}", section.host, section.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| PipelineError::ConfigError(format!("cannot bind dev server to {addr}: {e}")))
}

/// Serve `root` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    root: PathBuf,
    reload_tx: ReloadSender,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let local: SocketAddr = listener.local_addr()?;
    info!(address = %local, root = ?root, "dev server listening on http://{local}");

    axum::serve(listener, router(root, reload_tx))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("dev server stopped");
    Ok(())
}

async fn livereload_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    debug!("live reload client connected");
    let stream = BroadcastStream::new(state.reload_tx.subscribe())
        // Lagged receivers just skip the missed notifications.
        .filter_map(|msg| msg.ok().map(|()| Ok(Event::default().data("reload"))));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("ping"))
}

async fn serve_file(State(state): State<ServerState>, req: Request) -> Response {
    if req.method() == Method::GET {
        if let Some(page) = html_target(&state.root, req.uri().path()).await {
            return match tokio::fs::read_to_string(&page).await {
                Ok(html) => Html(inject_livereload(&html)).into_response(),
                Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
            };
        }
    }

    match ServeDir::new(state.root.as_path()).oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// The HTML file a request path resolves to, if any.
///
/// Directories resolve to their `index.html`. Paths that try to leave the
/// root, or that need percent-decoding, are left to `ServeDir`.
async fn html_target(root: &Path, uri_path: &str) -> Option<PathBuf> {
    if uri_path.contains('%') {
        return None;
    }
    let rel = Path::new(uri_path.trim_start_matches('/'));
    if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }

    let mut target = root.join(rel);
    if tokio::fs::metadata(&target).await.ok()?.is_dir() {
        target.push("index.html");
    }
    let is_html = target
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));
    if !is_html {
        return None;
    }
    tokio::fs::metadata(&target).await.ok()?.is_file().then_some(target)
}

/// Insert the live-reload script before the last `</body>`, or append it.
pub fn inject_livereload(html: &str) -> String {
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], LIVERELOAD_SCRIPT, &html[idx..]),
        None => format!("{html}{LIVERELOAD_SCRIPT}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let req = axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap();
        let res = router.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[test]
    fn script_goes_before_closing_body() {
        let out = inject_livereload("<html><BODY><p>x</p></BODY></html>");
        assert!(out.ends_with("</script>\n</BODY></html>"));
        assert!(inject_livereload("<p>bare</p>").ends_with(LIVERELOAD_SCRIPT));
    }

    #[tokio::test]
    async fn html_is_injected_but_other_files_are_served_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<body>home</body>").unwrap();
        std::fs::create_dir(dir.path().join("styles")).unwrap();
        std::fs::write(dir.path().join("styles/styles.css"), "a{}").unwrap();
        let router = router(dir.path(), reload_channel());

        let (status, body) = get(router.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("EventSource('/__livereload')"));

        let (status, body) = get(router.clone(), "/styles/styles.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "a{}");

        let (status, _) = get(router, "/missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let on_disk = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert_eq!(on_disk, "<body>home</body>");
    }

    #[tokio::test]
    async fn binds_an_ephemeral_port() {
        let section = ServerSection {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let listener = bind(&section).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn traversal_is_not_resolved_as_html() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(html_target(dir.path(), "/../etc/passwd.html").await, None);
    }
}
