use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, ReadBuf};

use crate::{AsyncSeekStart, RangeBody};

/// Implements [`RangeBody`] for any [`AsyncRead`] and [`AsyncSeekStart`],
/// constructed with a fixed byte size and an optional modification time.
///
/// The size is a snapshot taken at construction. A file that grows or
/// shrinks afterwards is tolerated: the transfer truncates at EOF rather
/// than erroring.
#[pin_project]
pub struct SizedBody<B: AsyncRead + AsyncSeekStart> {
    byte_size: u64,
    modified: Option<SystemTime>,
    #[pin]
    body: B,
}

impl SizedBody<tokio::fs::File> {
    /// Calls [`tokio::fs::File::metadata`] to snapshot the file size and
    /// modification time.
    pub async fn file(file: tokio::fs::File) -> io::Result<SizedBody<tokio::fs::File>> {
        let metadata = file.metadata().await?;
        Ok(SizedBody {
            byte_size: metadata.len(),
            modified: metadata.modified().ok(),
            body: file,
        })
    }
}

impl<B: AsyncRead + AsyncSeekStart> SizedBody<B> {
    /// Construct a [`SizedBody`] with a byte size supplied manually.
    pub fn sized(body: B, byte_size: u64) -> Self {
        SizedBody { byte_size, modified: None, body }
    }
}

impl<B: AsyncRead + AsyncSeek + Unpin> SizedBody<B> {
    /// Determines the size by seeking to the end and taking the stream
    /// position there.
    pub async fn seek(mut body: B) -> io::Result<SizedBody<B>> {
        let byte_size = Pin::new(&mut body).seek(io::SeekFrom::End(0)).await?;
        Ok(SizedBody { byte_size, modified: None, body })
    }
}

impl<B: AsyncRead + AsyncSeekStart> AsyncRead for SizedBody<B> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().body.poll_read(cx, buf)
    }
}

impl<B: AsyncRead + AsyncSeekStart> AsyncSeekStart for SizedBody<B> {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        self.project().body.start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().body.poll_complete(cx)
    }
}

impl<B: AsyncRead + AsyncSeekStart> RangeBody for SizedBody<B> {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }

    fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}
