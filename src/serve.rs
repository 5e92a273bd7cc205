//! The request-handling flow and the server lifecycle.
//!
//! Each request runs the same sequence: parse the `Range` header,
//! translate the URL path to a filesystem path, handle directories
//! (redirect, index substitution, or the player listing), then hand an
//! opened file to the range responder. `GET` and `HEAD` share the whole
//! decision path; `HEAD` drops the body at the very end.

use std::future::IntoFuture;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::fs::File;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::listing::render_player_page;
use crate::{RangeSpec, Ranged, SizedBody};

const INDEX_FILES: &[&str] = &["index.html", "index.htm"];

/// URL marker for the server's own assets (the player script and
/// stylesheet), which live outside the shared directory.
const STATIC_MARKER: &str = "_static_";

static PLAYER_CSS: &str = include_str!("../assets/player.css");
static PLAYER_JS: &str = include_str!("../assets/player_control.js");

/// Fatal server errors. Everything else surfaces as an HTTP status.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Build the application router over a shared [`Config`].
pub fn router(config: Arc<Config>) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/{*path}", get(serve_path))
        .with_state(config)
}

/// Bind the listener and serve until a shutdown signal arrives.
///
/// SIGINT/SIGTERM stop the accept loop; in-flight transfers are
/// abandoned with their file handles released by drop. Bind failure is
/// the only fatal startup error.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let port = config.port;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|source| ServerError::Bind { port, source })?;
    info!(
        port,
        pid = std::process::id(),
        root = %config.root.display(),
        "serving",
    );

    let app = router(Arc::new(config));
    tokio::select! {
        result = axum::serve(listener, app).into_future() => result.map_err(ServerError::from)?,
        () = shutdown_signal() => info!("shutdown signal received, closing listener"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("installing the Ctrl-C handler cannot fail after startup");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing the SIGTERM handler cannot fail after startup")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn serve_root(
    State(config): State<Arc<Config>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    handle(config, method, uri, headers, String::new()).await
}

async fn serve_path(
    State(config): State<Arc<Config>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    UrlPath(path): UrlPath<String>,
) -> Response {
    handle(config, method, uri, headers, path).await
}

async fn handle(
    config: Arc<Config>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    rel: String,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let spec = if config.range_support {
        RangeSpec::parse(headers.get(header::RANGE).and_then(|v| v.to_str().ok()))
    } else {
        RangeSpec::None
    };

    let path = translate_path(&config.root, &rel);

    let mut response = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => serve_directory(&config, &path, uri.path(), spec).await,
        Ok(_) => serve_file(&path, spec).await,
        Err(_) => serve_fallback(&config, &rel, spec).await,
    };

    // HEAD shares every decision with GET; only the copy step is skipped
    if method == Method::HEAD {
        *response.body_mut() = Body::empty();
    }
    response
}

/// Map a decoded URL path to a filesystem path under `root`.
///
/// Traversal components are discarded rather than resolved, so the
/// result can never escape `root`.
fn translate_path(root: &Path, rel: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in Path::new(rel).components() {
        if let Component::Normal(part) = component {
            path.push(part);
        }
    }
    path
}

async fn serve_directory(
    config: &Config,
    path: &Path,
    url_path: &str,
    spec: RangeSpec,
) -> Response {
    if !url_path.ends_with('/') {
        // redirect browser, doing basically what apache does
        let location = format!("{url_path}/");
        return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
    }

    for index in INDEX_FILES {
        let candidate = path.join(index);
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return serve_file(&candidate, spec).await;
        }
    }

    list_directory(config, path).await
}

async fn list_directory(config: &Config, path: &Path) -> Response {
    let mut dir = match tokio::fs::read_dir(path).await {
        Ok(dir) => dir,
        Err(err) => {
            warn!(%err, path = %path.display(), "no permission to list directory");
            return (StatusCode::NOT_FOUND, "No permission to list directory").into_response();
        }
    };

    let mut names = Vec::new();
    while let Ok(Some(entry)) = dir.next_entry().await {
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort_by_key(|name| name.to_lowercase());

    let dir_name = path.display().to_string();
    let page = render_player_page(
        &names,
        Some(&dir_name),
        &config.audio_formats,
        config.client_debug,
    );
    Html(page).into_response()
}

async fn serve_file(path: &Path, spec: RangeSpec) -> Response {
    // opened per request; dropped with the body stream on every exit path
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            debug!(%err, path = %path.display(), "cannot open file");
            return not_found();
        }
    };
    let body = match SizedBody::file(file).await {
        Ok(body) => body,
        Err(err) => {
            debug!(%err, path = %path.display(), "cannot stat file");
            return not_found();
        }
    };

    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    Ranged::new(spec, body, Some(content_type.essence_str().to_owned())).into_response()
}

/// Nothing at the translated path. The player page references assets the
/// shared directory does not contain; resolve those against our own
/// resources before giving up.
async fn serve_fallback(config: &Config, rel: &str, spec: RangeSpec) -> Response {
    if rel.contains(STATIC_MARKER) {
        let Some(basename) = rel.rsplit('/').next().filter(|b| !b.is_empty()) else {
            return not_found();
        };
        if let Some(static_root) = &config.static_asset_root {
            return serve_file(&static_root.join(basename), spec).await;
        }
        if let Some((content, content_type)) = builtin_asset(basename) {
            let body = SizedBody::sized(Cursor::new(content.as_bytes()), content.len() as u64);
            return Ranged::new(spec, body, Some(content_type.to_owned())).into_response();
        }
    }
    not_found()
}

fn builtin_asset(name: &str) -> Option<(&'static str, &'static str)> {
    match name {
        "player.css" => Some((PLAYER_CSS, "text/css")),
        "player_control.js" => Some((PLAYER_JS, "text/javascript")),
        _ => None,
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{builtin_asset, translate_path};

    #[test]
    fn translate_joins_under_the_root() {
        assert_eq!(
            PathBuf::from("/srv/music/album/track.mp3"),
            translate_path(Path::new("/srv/music"), "album/track.mp3"),
        );
    }

    #[test]
    fn translate_discards_traversal_components() {
        assert_eq!(
            PathBuf::from("/srv/music/etc/passwd"),
            translate_path(Path::new("/srv/music"), "../../etc/passwd"),
        );
        assert_eq!(
            PathBuf::from("/srv/music/a/b"),
            translate_path(Path::new("/srv/music"), "a/.././b"),
        );
        assert_eq!(
            PathBuf::from("/srv/music/abs"),
            translate_path(Path::new("/srv/music"), "/abs"),
        );
    }

    #[test]
    fn builtin_assets_cover_the_player_files() {
        assert!(builtin_asset("player.css").is_some());
        assert!(builtin_asset("player_control.js").is_some());
        assert!(builtin_asset("player.js").is_none());
    }
}
