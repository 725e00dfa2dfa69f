use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::headers::Headers;
use crate::http::parser::write_text;
use crate::http::response::{Response, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a status line and headers, ending with the blank line.
pub fn serialize_head(status: StatusCode, reason: &str, headers: &Headers) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    // Status line
    let reason = if reason.is_empty() { status.reason_phrase() } else { reason };
    buf.extend_from_slice(format!("{} {} ", HTTP_VERSION, status.as_u16()).as_bytes());
    write_text(&mut buf, reason);
    buf.extend_from_slice(b"\r\n");

    // Headers
    for (k, v) in headers.iter() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        write_text(&mut buf, v);
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = serialize_head(resp.status, "", &resp.headers);
    buf.extend_from_slice(&resp.body);
    buf
}

/// A fully serialized proxy-generated response, written out in one go.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    pub async fn write_to<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
