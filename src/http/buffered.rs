//! Read side of a connection with its look-ahead buffer.
//!
//! Heads are parsed straight out of the buffer; whatever follows the head
//! (body bytes, pipelined requests) stays buffered and is served before the
//! socket is read again.

use crate::error::HeadError;
use crate::http::parser::ParseError;
use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// How much unread client data [`BufferedReader::closed`] will hold while
/// watching for a disconnect.
const WATCH_LIMIT: usize = 64 * 1024;

pub struct BufferedReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> BufferedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Bytes read but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Reads more data into the buffer. Returns 0 at end of stream.
    pub async fn fill(&mut self) -> io::Result<usize> {
        self.buf.reserve(READ_CHUNK);
        self.inner.read_buf(&mut self.buf).await
    }

    /// Reads until `parse` yields a complete head.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before any byte of a
    /// new head arrives.
    pub async fn read_head<T, F>(&mut self, parse: F) -> Result<Option<T>, HeadError>
    where
        F: Fn(&[u8]) -> Result<(T, usize), ParseError>,
    {
        loop {
            if !self.buf.is_empty() {
                match parse(&self.buf) {
                    Ok((head, consumed)) => {
                        self.buf.advance(consumed);
                        return Ok(Some(head));
                    }
                    Err(ParseError::Incomplete) => {}
                    Err(e) => return Err(HeadError::Parse(e)),
                }
            }

            if self.fill().await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(HeadError::Io(io::ErrorKind::UnexpectedEof.into()));
            }
        }
    }

    /// Reads one line, without its line terminator.
    pub async fn read_line(&mut self, limit: usize) -> io::Result<BytesMut> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(pos);
                if line.ends_with(b"\r") {
                    line.truncate(line.len() - 1);
                }
                return Ok(line);
            }

            if self.buf.len() > limit {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
            }

            if self.fill().await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
        }
    }

    /// Copies buffered bytes into `dst`, or reads straight from the stream
    /// when the buffer is empty.
    pub async fn read_into(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if !self.buf.is_empty() {
            let n = self.buf.len().min(dst.len());
            dst[..n].copy_from_slice(&self.buf[..n]);
            self.buf.advance(n);
            return Ok(n);
        }
        self.inner.read(dst).await
    }

    /// Resolves once the peer has gone away (end of stream or read error).
    ///
    /// Anything the peer sends meanwhile is kept for later reads. Once
    /// [`WATCH_LIMIT`] bytes are pending this stops reading and never
    /// resolves. Cancel safe.
    pub async fn closed(&mut self) {
        loop {
            if self.buf.len() >= WATCH_LIMIT {
                std::future::pending::<()>().await;
            }
            match self.fill().await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }
}
