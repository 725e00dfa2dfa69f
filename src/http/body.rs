//! Message body framing: decoding what a peer sends and re-encoding it for
//! the other side, one buffer at a time.

use crate::http::buffered::BufferedReader;
use crate::http::request::{Method, Request};
use crate::http::response::ResponseHead;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Longest chunk-size or trailer line accepted.
const MAX_LINE: usize = 8 * 1024;

/// How a message body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Length(u64),
    Chunked,
    /// Body runs until the sender closes the connection (responses only).
    UntilClose,
}

impl BodyKind {
    pub fn for_request(request: &Request) -> Self {
        if request.headers.is_chunked() {
            return BodyKind::Chunked;
        }
        match request.content_length() {
            Some(0) | None => BodyKind::Empty,
            Some(n) => BodyKind::Length(n),
        }
    }

    pub fn for_response(head: &ResponseHead, method: Method) -> Self {
        if method == Method::HEAD || head.status.forbids_body() {
            return BodyKind::Empty;
        }
        if head.headers.is_chunked() {
            return BodyKind::Chunked;
        }
        if head.headers.contains("Transfer-Encoding") {
            return BodyKind::UntilClose;
        }
        match head.headers.content_length() {
            Some(0) => BodyKind::Empty,
            Some(n) => BodyKind::Length(n),
            None => BodyKind::UntilClose,
        }
    }

    pub fn has_body(&self) -> bool {
        *self != BodyKind::Empty
    }
}

#[derive(Debug, Clone, Copy)]
enum Decode {
    Length(u64),
    ChunkSize,
    ChunkData(u64),
    ChunkEnd,
    Trailers,
    UntilClose,
    Done,
}

/// Incremental body decoder. Yields payload bytes only; chunk framing and
/// trailers are consumed and dropped.
#[derive(Debug)]
pub struct BodyReader {
    state: Decode,
}

impl BodyReader {
    pub fn new(kind: BodyKind) -> Self {
        let state = match kind {
            BodyKind::Empty | BodyKind::Length(0) => Decode::Done,
            BodyKind::Length(n) => Decode::Length(n),
            BodyKind::Chunked => Decode::ChunkSize,
            BodyKind::UntilClose => Decode::UntilClose,
        };
        Self { state }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, Decode::Done)
    }

    /// Reads the next piece of payload into `dst`. Returns 0 once the body
    /// is complete; a stream that ends early is an `UnexpectedEof` error.
    pub async fn read<R>(&mut self, src: &mut BufferedReader<R>, dst: &mut [u8]) -> io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        if dst.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty read buffer"));
        }

        loop {
            match self.state {
                Decode::Done => return Ok(0),
                Decode::Length(remaining) => {
                    let n = read_some(src, dst, remaining).await?;
                    let left = remaining - n as u64;
                    self.state = if left == 0 { Decode::Done } else { Decode::Length(left) };
                    return Ok(n);
                }
                Decode::ChunkSize => {
                    let line = src.read_line(MAX_LINE).await?;
                    let size = parse_chunk_size(&line)?;
                    self.state = if size == 0 { Decode::Trailers } else { Decode::ChunkData(size) };
                }
                Decode::ChunkData(remaining) => {
                    let n = read_some(src, dst, remaining).await?;
                    let left = remaining - n as u64;
                    self.state = if left == 0 { Decode::ChunkEnd } else { Decode::ChunkData(left) };
                    return Ok(n);
                }
                Decode::ChunkEnd => {
                    if !src.read_line(MAX_LINE).await?.is_empty() {
                        return Err(invalid("missing CRLF after chunk data"));
                    }
                    self.state = Decode::ChunkSize;
                }
                Decode::Trailers => {
                    if src.read_line(MAX_LINE).await?.is_empty() {
                        self.state = Decode::Done;
                    }
                }
                Decode::UntilClose => {
                    let n = src.read_into(dst).await?;
                    if n == 0 {
                        self.state = Decode::Done;
                    }
                    return Ok(n);
                }
            }
        }
    }
}

/// Body encoder for the outgoing side. Every write is flushed so the peer
/// sees each piece as soon as it arrives.
#[derive(Debug)]
pub struct BodyWriter {
    chunked: bool,
}

impl BodyWriter {
    pub fn new(kind: BodyKind) -> Self {
        Self {
            chunked: kind == BodyKind::Chunked,
        }
    }

    pub async fn write<W>(&mut self, dst: &mut W, data: &[u8]) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        // a zero-size chunk would end the body
        if data.is_empty() {
            return Ok(());
        }

        if self.chunked {
            dst.write_all(format!("{:x}\r\n", data.len()).as_bytes()).await?;
            dst.write_all(data).await?;
            dst.write_all(b"\r\n").await?;
        } else {
            dst.write_all(data).await?;
        }
        dst.flush().await
    }

    pub async fn finish<W>(&mut self, dst: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if self.chunked {
            dst.write_all(b"0\r\n\r\n").await?;
        }
        dst.flush().await
    }
}

/// Which side of a [`relay`] failed.
#[derive(Debug)]
pub enum RelayError {
    Read(io::Error),
    Write(io::Error),
}

/// Streams a whole body from `src` to `dst` through `buf`.
///
/// Returns the number of payload bytes relayed.
pub async fn relay<R, W>(
    reader: &mut BodyReader,
    src: &mut BufferedReader<R>,
    writer: &mut BodyWriter,
    dst: &mut W,
    buf: &mut [u8],
) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    loop {
        let n = reader.read(src, buf).await.map_err(RelayError::Read)?;
        if n == 0 {
            break;
        }
        writer
            .write(dst, &buf[..n])
            .await
            .map_err(RelayError::Write)?;
        total += n as u64;
    }
    writer.finish(dst).await.map_err(RelayError::Write)?;
    Ok(total)
}

async fn read_some<R>(src: &mut BufferedReader<R>, dst: &mut [u8], remaining: u64) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let want = usize::try_from(remaining).map_or(dst.len(), |r| r.min(dst.len()));
    let n = src.read_into(&mut dst[..want]).await?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended before the body was complete",
        ));
    }
    Ok(n)
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let line = std::str::from_utf8(line).map_err(|_| invalid("chunk size is not ASCII"))?;
    let size = line.split_once(';').map_or(line, |(size, _)| size).trim();
    u64::from_str_radix(size, 16).map_err(|_| invalid("invalid chunk size"))
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_ignores_extensions() {
        assert_eq!(parse_chunk_size(b"1A;name=value").unwrap(), 26);
        assert_eq!(parse_chunk_size(b"0").unwrap(), 0);
        assert!(parse_chunk_size(b"zz").is_err());
    }
}
