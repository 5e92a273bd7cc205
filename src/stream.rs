use std::{io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::RangeBody;

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Response body stream carrying at most `length` bytes starting at a
/// byte offset. Implements [`Stream`], [`Body`], and [`IntoResponse`].
///
/// The stream seeks once, then reads until either the byte budget is
/// spent or the source reaches EOF. A short source ends the stream early
/// without error; that is how a range overshooting the file produces a
/// truncated body. The source is never closed here, it is dropped along
/// with the stream.
#[pin_project]
pub struct RangedStream<B> {
    state: StreamState,
    length: u64,
    #[pin]
    body: B,
}

impl<B: RangeBody + Send + 'static> RangedStream<B> {
    pub(crate) fn new(body: B, start: u64, length: u64) -> Self {
        RangedStream {
            state: StreamState::Seek { start },
            length,
            body,
        }
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<Frame<Bytes>>>> {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if let StreamState::Seek { start } = *this.state {
            match this.body.as_mut().start_seek(start) {
                Err(e) => return Poll::Ready(Some(Err(e))),
                Ok(()) => {
                    let remaining = *this.length;
                    *this.state = StreamState::Seeking { remaining };
                }
            }
        }

        if let StreamState::Seeking { remaining } = *this.state {
            match this.body.as_mut().poll_complete(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(Ok(())) => {
                    let buffer = allocate_buffer();
                    *this.state = StreamState::Reading { buffer, remaining };
                }
            }
        }

        if let StreamState::Reading { buffer, remaining } = this.state {
            if *remaining == 0 {
                return Poll::Ready(None);
            }

            let uninit = buffer.spare_capacity_mut();

            // read no more than the remaining budget in this iteration
            let nbytes = std::cmp::min(
                uninit.len(),
                usize::try_from(*remaining).unwrap_or(usize::MAX),
            );

            let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

            match this.body.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(Ok(())) => {
                    match read_buf.filled().len() {
                        // a zero-byte read is EOF; the budget may be unspent
                        0 => return Poll::Ready(None),
                        n => {
                            // SAFETY: poll_read has filled the buffer with
                            // `n` additional initialized bytes
                            unsafe {
                                buffer.set_len(buffer.len() + n);
                            }

                            let chunk = mem::replace(buffer, allocate_buffer());

                            // n <= remaining thanks to the cmp::min above,
                            // so this conversion and subtraction hold
                            *remaining -= u64::try_from(n).unwrap();

                            return Poll::Ready(Some(Ok(chunk.freeze())));
                        }
                    }
                }
            }
        }

        unreachable!();
    }
}

fn allocate_buffer() -> BytesMut {
    BytesMut::with_capacity(IO_BUFFER_SIZE)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use futures::{pin_mut, StreamExt};

    use crate::SizedBody;
    use super::RangedStream;

    async fn collect(stream: RangedStream<SizedBody<Cursor<&'static [u8]>>>) -> Vec<u8> {
        let mut out = Vec::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    fn digits() -> SizedBody<Cursor<&'static [u8]>> {
        SizedBody::sized(Cursor::new(&b"0123456789"[..]), 10)
    }

    #[tokio::test]
    async fn copies_exactly_the_budget() {
        let stream = RangedStream::new(digits(), 2, 4);
        assert_eq!(b"2345", &collect(stream).await[..]);
    }

    #[tokio::test]
    async fn stops_at_eof_when_budget_overshoots() {
        let stream = RangedStream::new(digits(), 8, 100);
        assert_eq!(b"89", &collect(stream).await[..]);
    }

    #[tokio::test]
    async fn start_past_eof_yields_nothing() {
        let stream = RangedStream::new(digits(), 20, 10);
        assert_eq!(b"", &collect(stream).await[..]);
    }

    #[tokio::test]
    async fn zero_budget_yields_nothing() {
        let stream = RangedStream::new(digits(), 0, 0);
        assert_eq!(b"", &collect(stream).await[..]);
    }
}
