//! # musicshare
//!
//! A small HTTP server for sharing a directory of music files with
//! browsers that support HTML5 audio. Mobile media players seek inside
//! audio files by issuing `Range` requests, so the heart of the crate is
//! correct single-range partial content: parse the header, resolve it
//! against the file size, answer with the right status and headers, and
//! transfer exactly the requested span of bytes.
//!
//! The range machinery is generic over any body implementing the
//! [`RangeBody`] trait. Any type implementing both [`AsyncRead`] and
//! [`AsyncSeekStart`] can be used via the [`SizedBody`] adapter; for
//! [`tokio::fs::File`] see [`SizedBody::file`].
//!
//! ```no_run
//! use axum::Router;
//! use axum::http::HeaderMap;
//! use axum::http::header::RANGE;
//! use axum::routing::get;
//!
//! use musicshare::{Ranged, RangeSpec, SizedBody};
//!
//! async fn track(headers: HeaderMap) -> Ranged<SizedBody<tokio::fs::File>> {
//!     let file = tokio::fs::File::open("track.mp3").await.unwrap();
//!     let body = SizedBody::file(file).await.unwrap();
//!     let spec = RangeSpec::parse(headers.get(RANGE).and_then(|v| v.to_str().ok()));
//!     Ranged::new(spec, body, Some("audio/mpeg".to_owned()))
//! }
//!
//! let _app: Router = Router::new().route("/track.mp3", get(track));
//! ```

pub mod config;
pub mod listing;
pub mod range;
pub mod serve;

mod file;
mod stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{HeaderMapExt, LastModified};
use tokio::io::{AsyncRead, AsyncSeek};

pub use file::SizedBody;
pub use range::{ByteWindow, RangeSpec, Resolution};
pub use stream::RangedStream;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
///
/// One instance backs exactly one response; it is opened per request and
/// released by drop on every exit path, including mid-transfer failure.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying resource, snapshotted when the
    /// handle was opened. The size may change on disk afterwards; the
    /// transfer tolerates that by truncating at EOF.
    fn byte_size(&self) -> u64;

    /// Modification time of the resource, if known. Emitted as the
    /// `Last-Modified` response header.
    fn modified(&self) -> Option<SystemTime> {
        None
    }
}

/// The main responder type. Implements [`IntoResponse`].
///
/// Couples a parsed [`RangeSpec`] with the body it applies to and decides
/// between a `200` full response, a `206` partial response, and a `416`.
pub struct Ranged<B: RangeBody + Send + 'static> {
    spec: RangeSpec,
    body: B,
    content_type: Option<String>,
}

impl<B: RangeBody + Send + 'static> Ranged<B> {
    /// Construct a ranged response over any type implementing
    /// [`RangeBody`] and a [`RangeSpec`] parsed from the request.
    pub fn new(spec: RangeSpec, body: B, content_type: Option<String>) -> Self {
        Ranged { spec, body, content_type }
    }

    /// Resolve the range against the body size and plan the response.
    /// Returns [`RangeNotSatisfiable`] if the range can select no bytes.
    pub fn try_respond(self) -> Result<RangedResponse<B>, RangeNotSatisfiable> {
        let total_size = self.body.byte_size();
        let modified = self.body.modified();
        let content_type = self.content_type;

        match self.spec.resolve(total_size) {
            Resolution::Full => Ok(RangedResponse::Full {
                content_length: total_size,
                content_type,
                modified,
                stream: RangedStream::new(self.body, 0, total_size),
            }),
            Resolution::Window(window) => Ok(RangedResponse::Partial {
                window,
                total_size,
                content_type,
                modified,
                stream: RangedStream::new(self.body, window.start, window.len()),
            }),
            Resolution::Unsatisfiable => Err(RangeNotSatisfiable(total_size)),
        }
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for Ranged<B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable.
/// Carries the total resource size for the `Content-Range: bytes */n`
/// header. Implements [`IntoResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeNotSatisfiable(pub u64);

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes */{}", self.0))
                .expect("ascii header value cannot fail to parse"),
        );
        (StatusCode::RANGE_NOT_SATISFIABLE, headers, ()).into_response()
    }
}

/// Data type containing computed headers and body for a range response.
/// Implements [`IntoResponse`].
pub enum RangedResponse<B> {
    /// Full content, no range requested (or the request degraded to one).
    Full {
        content_length: u64,
        content_type: Option<String>,
        modified: Option<SystemTime>,
        stream: RangedStream<B>,
    },
    /// Partial content for a single resolved window.
    ///
    /// The declared window is the one the client asked for: an end past
    /// EOF is reported as requested while the body carries only the bytes
    /// that exist.
    Partial {
        window: ByteWindow,
        total_size: u64,
        content_type: Option<String>,
        modified: Option<SystemTime>,
        stream: RangedStream<B>,
    },
}

fn common_headers(
    content_length: u64,
    content_type: Option<String>,
    modified: Option<SystemTime>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    let content_type = content_type.as_deref().unwrap_or("application/octet-stream");
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(modified) = modified {
        headers.typed_insert(LastModified::from(modified));
    }
    headers
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedResponse<B> {
    fn into_response(self) -> Response {
        match self {
            RangedResponse::Full { content_length, content_type, modified, stream } => {
                let headers = common_headers(content_length, content_type, modified);
                (StatusCode::OK, headers, stream).into_response()
            }
            RangedResponse::Partial { window, total_size, content_type, modified, stream } => {
                let mut headers = common_headers(window.len(), content_type, modified);
                headers.insert(
                    header::CONTENT_RANGE,
                    HeaderValue::from_str(&format!(
                        "bytes {}-{}/{}",
                        window.start, window.end, total_size,
                    ))
                    .expect("ascii header value cannot fail to parse"),
                );
                (StatusCode::PARTIAL_CONTENT, headers, stream).into_response()
            }
        }
    }
}
