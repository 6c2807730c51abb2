//! Low level poll based read/write helpers over [`AsyncRead`]/[`AsyncWrite`].
use bytes::BytesMut;
use std::{
    io,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Read as much as is immediately available into `buf`, appending.
///
/// Returns `Poll::Ready(Ok(n))` with `n` the number of bytes read; `n == 0`
/// means the peer closed the connection.
pub fn poll_read<IO: AsyncRead + Unpin>(
    io: &mut IO,
    cx: &mut Context,
    buf: &mut BytesMut,
) -> Poll<io::Result<usize>> {
    let dst = buf.spare_capacity_mut();
    if dst.is_empty() {
        buf.reserve(4096);
    }
    let dst = buf.spare_capacity_mut();

    // SAFETY: `ReadBuf::uninit` never assumes the memory is initialized;
    // we only publish bytes `poll_read` itself reports as initialized.
    let mut read_buf = ReadBuf::uninit(dst);
    let ptr = read_buf.filled().as_ptr();

    ready!(std::pin::Pin::new(&mut *io).poll_read(cx, &mut read_buf)?);

    assert_eq!(ptr, read_buf.filled().as_ptr(), "poll_read must not move the buffer");
    let n = read_buf.filled().len();

    // SAFETY: `poll_read` reported these bytes as filled.
    unsafe { buf.set_len(buf.len() + n) };

    Poll::Ready(Ok(n))
}

/// Write out all of `buf`, advancing it as bytes are accepted, preferring
/// a single vectored write when the underlying IO supports it.
pub fn poll_write_all<IO: AsyncWrite + Unpin>(
    io: &mut IO,
    cx: &mut Context,
    buf: &mut BytesMut,
) -> Poll<io::Result<()>> {
    use bytes::Buf;

    while !buf.is_empty() {
        let n = ready!(std::pin::Pin::new(&mut *io).poll_write(cx, buf))?;
        if n == 0 {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer")));
        }
        buf.advance(n);
    }

    Poll::Ready(Ok(()))
}
