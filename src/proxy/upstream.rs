//! Upstream connection and request framing
//!
//! An [`Upstream`] knows how to reach one backend: where to dial, how long
//! to wait, and how to rewrite a client request so the backend sees its own
//! base path while keeping the client's method, path, query and headers.

use crate::error::{ForwardError, HeadError};
use crate::http::body::BodyKind;
use crate::http::buffered::BufferedReader;
use crate::http::parser::{parse_response_head, write_text};
use crate::http::request::Request;
use crate::http::response::{ResponseHead, StatusCode};
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

#[derive(Debug, Clone)]
pub struct Upstream {
    /// host:port to dial
    addr: String,

    /// Host header value used when the client sent none
    authority: String,

    /// Path of the base URI, prefixed to every request path
    base_path: String,

    /// Query of the base URI, merged with every request query
    base_query: Option<String>,

    connect_timeout: Duration,

    /// Wait for the response head, counted from the end of the request
    header_timeout: Option<Duration>,
}

impl Upstream {
    /// Returns `None` if `base` has no host.
    pub fn new(base: &Url, connect_timeout: Duration, header_timeout: Option<Duration>) -> Option<Self> {
        let host = base.host_str().filter(|h| !h.is_empty())?;
        let port = base.port_or_known_default().unwrap_or(80);

        let authority = match base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Some(Self {
            addr: format!("{}:{}", host, port),
            authority,
            base_path: base.path().to_string(),
            base_query: base.query().filter(|q| !q.is_empty()).map(str::to_string),
            connect_timeout,
            header_timeout,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn header_timeout(&self) -> Option<Duration> {
        self.header_timeout
    }

    /// Connect to the backend with timeout.
    pub async fn connect(&self) -> Result<TcpStream, ForwardError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| ForwardError::Timeout {
                stage: "connect",
                after: self.connect_timeout,
            })?
            .map_err(|source| ForwardError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        // Chunks are flushed as they arrive; don't let Nagle hold them back.
        stream.set_nodelay(true).map_err(ForwardError::Upstream)?;

        tracing::trace!(addr = %self.addr, "Connected to backend");
        Ok(stream)
    }

    /// The request target the backend sees: base path joined with the
    /// request path, base query merged with the request query.
    pub fn target_for(&self, request_target: &str) -> String {
        let (path, query) = match request_target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (request_target, None),
        };

        let mut target = join_paths(&self.base_path, path);

        let query = match (self.base_query.as_deref(), query.filter(|q| !q.is_empty())) {
            (Some(base), Some(query)) => Some(format!("{}&{}", base, query)),
            (Some(base), None) => Some(base.to_string()),
            (None, Some(query)) => Some(query.to_string()),
            (None, None) => None,
        };

        if let Some(query) = query {
            target.push('?');
            target.push_str(&query);
        }

        target
    }

    /// Build the request head sent to the backend.
    ///
    /// Hop-by-hop headers are dropped, body framing is restated for the
    /// body that will actually follow, `X-Forwarded-For` gains the client
    /// address, and every upstream connection is single-use.
    pub fn request_head(&self, request: &Request, client_ip: Option<IpAddr>) -> Vec<u8> {
        let mut headers = request.headers.clone();
        headers.strip_hop_by_hop();
        headers.remove("Expect");

        if !headers.contains("Host") {
            headers.append("Host", self.authority.as_str());
        }

        match BodyKind::for_request(request) {
            BodyKind::Chunked => {
                let mut codings = request.headers.transfer_codings();
                codings.push("chunked");
                headers.remove("Content-Length");
                headers.append("Transfer-Encoding", codings.join(", "));
            }
            BodyKind::Length(n) => headers.insert("Content-Length", n.to_string()),
            BodyKind::Empty | BodyKind::UntilClose => {}
        }

        if let Some(ip) = client_ip {
            let forwarded = match headers.get_all("X-Forwarded-For").collect::<Vec<_>>() {
                prior if prior.is_empty() => ip.to_string(),
                prior => format!("{}, {}", prior.join(", "), ip),
            };
            headers.insert("X-Forwarded-For", forwarded);
        }

        headers.append("Connection", "close");

        let mut buffer = Vec::with_capacity(512);

        // Request line
        buffer.extend_from_slice(format!("{} ", request.method).as_bytes());
        write_text(&mut buffer, &self.target_for(request.origin_form()));
        buffer.extend_from_slice(b" HTTP/1.1\r\n");

        for (key, value) in headers.iter() {
            buffer.extend_from_slice(key.as_bytes());
            buffer.extend_from_slice(b": ");
            write_text(&mut buffer, value);
            buffer.extend_from_slice(b"\r\n");
        }

        // End of headers
        buffer.extend_from_slice(b"\r\n");

        buffer
    }

    /// Reads the backend's final response head, skipping interim 1xx
    /// responses other than 101.
    pub async fn read_response_head<R>(&self, src: &mut BufferedReader<R>) -> Result<ResponseHead, ForwardError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let head = match src.read_head(parse_response_head).await {
                Ok(Some(head)) => head,
                Ok(None) => {
                    return Err(ForwardError::BadResponse(
                        "connection closed before a response was received".to_string(),
                    ));
                }
                Err(HeadError::Io(e)) => return Err(ForwardError::Upstream(e)),
                Err(HeadError::Parse(e)) => return Err(ForwardError::BadResponse(e.to_string())),
            };

            if head.status.is_informational() && head.status != StatusCode::SWITCHING_PROTOCOLS {
                tracing::trace!(status = head.status.as_u16(), "Skipping interim response");
                continue;
            }

            return Ok(head);
        }
    }
}

fn join_paths(base: &str, path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}
