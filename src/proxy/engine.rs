//! Streaming forward of one request to one backend.
//!
//! A forward moves through `AdmissionPending → Forwarding → {Completed |
//! Failed | Cancelled}`. Once admitted, the request is uploaded and the
//! response downloaded concurrently, each through its own pooled buffer,
//! so a backend that answers while still reading (an echo, say) never
//! deadlocks against us. There is exactly one backend attempt per request.

use crate::error::ForwardError;
use crate::http::body::{relay, BodyKind, BodyReader, BodyWriter, RelayError};
use crate::http::buffered::BufferedReader;
use crate::http::connection::{Client, Disposition};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseHead};
use crate::http::writer::{serialize_head, ResponseWriter};
use crate::proxy::admission::{AdmissionController, AdmissionPermit};
use crate::proxy::backend::{Backend, Ticket};
use crate::proxy::pool::BufferPool;
use crate::proxy::upstream::Upstream;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, warn};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Forwards requests to the backend picked for them.
#[derive(Debug)]
pub struct ProxyEngine {
    admission: AdmissionController,
    pool: Arc<BufferPool>,
    admission_timeout: Option<Duration>,
}

/// Progress shared between the upload and download halves of a forward.
#[derive(Default)]
struct Exchange {
    /// Some of the response head may have reached the client
    head_sent: AtomicBool,
    /// The whole request body has been read from the client
    uploaded: AtomicBool,
    request_sent: Notify,
}

enum UploadError {
    Client(ForwardError),
    Backend(io::Error),
}

impl ProxyEngine {
    pub fn new(admission: AdmissionController, pool: Arc<BufferPool>, admission_timeout: Option<Duration>) -> Self {
        Self {
            admission,
            pool,
            admission_timeout,
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Forwards `request` to `backend` and streams the answer to `client`.
    ///
    /// Always writes at most one response. Failures before the response
    /// head went out become a gateway error page; failures after it close
    /// the connection.
    pub async fn forward<R, W>(
        &self,
        ticket: Ticket,
        backend: &Backend,
        request: &Request,
        client: &mut Client<R, W>,
    ) -> Disposition
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        debug!(
            backend = backend.display_name(),
            ticket = ticket.number,
            method = %request.method,
            path = %request.path,
            "START"
        );

        let exchange = Exchange::default();
        let result = self.try_forward(backend, request, client, &exchange).await;

        debug!(
            backend = backend.display_name(),
            ticket = ticket.number,
            method = %request.method,
            path = %request.path,
            "END"
        );

        let error = match result {
            Ok(disposition) => return disposition,
            Err(error) => error,
        };

        if let ForwardError::ClientGone = error {
            debug!(backend = backend.display_name(), ticket = ticket.number, "Client went away mid-forward");
            return Disposition::Close;
        }

        if error.is_backend_failure() {
            warn!(
                backend = backend.display_name(),
                ticket = ticket.number,
                error = %error,
                method = %request.method,
                path = %request.path,
                "Failed to proxy request to backend"
            );
        } else {
            debug!(backend = backend.display_name(), error = %error, "Forward aborted");
        }

        if !exchange.head_sent.load(Ordering::Relaxed) {
            if let Some(status) = error.status() {
                let page = Response::error(status, error_detail(&error));
                if let Err(e) = ResponseWriter::new(&page).write_to(&mut client.writer).await {
                    debug!(error = %e, "Could not deliver error response");
                }
            }
        }

        Disposition::Close
    }

    async fn try_forward<R, W>(
        &self,
        backend: &Backend,
        request: &Request,
        client: &mut Client<R, W>,
        exchange: &Exchange,
    ) -> Result<Disposition, ForwardError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let Client { reader, writer, peer } = client;

        let _permit = self.admit(backend.index, reader).await?;

        let stream = backend.upstream.connect().await?;
        let (upstream_rd, mut upstream_wr) = stream.into_split();

        let body = BodyKind::for_request(request);
        if body.has_body() && request.expects_continue() {
            writer.write_all(CONTINUE).await.map_err(|_| ForwardError::ClientGone)?;
            writer.flush().await.map_err(|_| ForwardError::ClientGone)?;
        }

        let head = backend.upstream.request_head(request, peer.map(|addr| addr.ip()));

        let upload = upload(&head, body, reader, &mut upstream_wr, &self.pool, exchange);
        let download = self.download(&backend.upstream, request, upstream_rd, writer, exchange);

        tokio::select! {
            result = download => {
                let disposition = result?;
                if exchange.uploaded.load(Ordering::Relaxed) {
                    Ok(disposition)
                } else {
                    // unread request body is still on the connection
                    Ok(Disposition::Close)
                }
            }
            error = upload => Err(error),
        }
    }

    /// Waits for a slot on backend `index`, giving up if the client leaves.
    async fn admit<R>(&self, index: usize, client: &mut BufferedReader<R>) -> Result<AdmissionPermit, ForwardError>
    where
        R: AsyncRead + Unpin,
    {
        if !self.admission.is_enabled() {
            return self
                .admission
                .acquire(index)
                .await
                .map_err(|_| ForwardError::AdmissionClosed);
        }

        let wait = async {
            let acquire = self.admission.acquire(index);
            let permit = match self.admission_timeout {
                Some(limit) => timeout(limit, acquire)
                    .await
                    .map_err(|_| ForwardError::AdmissionTimeout(limit))?,
                None => acquire.await,
            };
            permit.map_err(|_| ForwardError::AdmissionClosed)
        };

        tokio::select! {
            permit = wait => permit,
            _ = client.closed() => Err(ForwardError::ClientGone),
        }
    }

    /// Reads the backend's response and streams it to the client.
    async fn download<W>(
        &self,
        upstream: &Upstream,
        request: &Request,
        upstream_rd: OwnedReadHalf,
        client: &mut W,
        exchange: &Exchange,
    ) -> Result<Disposition, ForwardError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut source = BufferedReader::new(upstream_rd);

        let head = match upstream.header_timeout() {
            None => upstream.read_response_head(&mut source).await?,
            Some(limit) => {
                let read = upstream.read_response_head(&mut source);
                tokio::pin!(read);
                tokio::select! {
                    head = &mut read => head?,
                    _ = exchange.request_sent.notified() => {
                        timeout(limit, &mut read).await.map_err(|_| ForwardError::Timeout {
                            stage: "response header",
                            after: limit,
                        })??
                    }
                }
            }
        };

        let body = BodyKind::for_response(&head, request.method);
        let framing = match body {
            BodyKind::Chunked | BodyKind::UntilClose if request.version == "HTTP/1.1" => BodyKind::Chunked,
            other => other,
        };
        let keep_alive = request.keep_alive() && framing != BodyKind::UntilClose;

        let bytes = client_head(&head, body, framing, keep_alive, &request.version);
        exchange.head_sent.store(true, Ordering::Relaxed);
        client.write_all(&bytes).await.map_err(|_| ForwardError::ClientGone)?;
        client.flush().await.map_err(|_| ForwardError::ClientGone)?;

        if body.has_body() {
            let mut buf = self.pool.get();
            let mut reader = BodyReader::new(body);
            let mut writer = BodyWriter::new(framing);
            relay(&mut reader, &mut source, &mut writer, client, &mut buf)
                .await
                .map_err(|e| match e {
                    RelayError::Read(e) => ForwardError::Upstream(e),
                    RelayError::Write(_) => ForwardError::ClientGone,
                })?;
        }

        Ok(if keep_alive {
            Disposition::KeepAlive
        } else {
            Disposition::Close
        })
    }
}

/// Sends the request head and body, then watches the client for a
/// disconnect. Only ever completes with the error that ends the forward.
async fn upload<R>(
    head: &[u8],
    body: BodyKind,
    client: &mut BufferedReader<R>,
    upstream: &mut OwnedWriteHalf,
    pool: &Arc<BufferPool>,
    exchange: &Exchange,
) -> ForwardError
where
    R: AsyncRead + Unpin,
{
    match send_request(head, body, client, upstream, pool).await {
        Ok(()) => {
            exchange.uploaded.store(true, Ordering::Relaxed);
            exchange.request_sent.notify_one();
        }
        Err(UploadError::Client(error)) => return error,
        Err(UploadError::Backend(error)) => {
            // The backend may still answer (e.g. 413 before reading the
            // body); let the download side decide the outcome.
            debug!(error = %error, "Backend stopped accepting the request");
            return std::future::pending().await;
        }
    }

    client.closed().await;
    ForwardError::ClientGone
}

async fn send_request<R>(
    head: &[u8],
    body: BodyKind,
    client: &mut BufferedReader<R>,
    upstream: &mut OwnedWriteHalf,
    pool: &Arc<BufferPool>,
) -> Result<(), UploadError>
where
    R: AsyncRead + Unpin,
{
    upstream.write_all(head).await.map_err(UploadError::Backend)?;

    if body.has_body() {
        let mut buf = pool.get();
        let mut reader = BodyReader::new(body);
        let mut writer = BodyWriter::new(body);
        relay(&mut reader, client, &mut writer, upstream, &mut buf)
            .await
            .map_err(|e| match e {
                RelayError::Read(e) => UploadError::Client(ForwardError::from_client_read(e)),
                RelayError::Write(e) => UploadError::Backend(e),
            })?;
    }

    upstream.flush().await.map_err(UploadError::Backend)
}

/// The response head as the client sees it: hop-by-hop headers dropped and
/// framing restated for how the body is actually sent.
fn client_head(head: &ResponseHead, body: BodyKind, framing: BodyKind, keep_alive: bool, client_version: &str) -> Vec<u8> {
    let mut headers = head.headers.clone();
    headers.strip_hop_by_hop();

    // Codings other than chunked describe the payload and must reach the client.
    let mut codings = head.headers.transfer_codings();
    match (body, framing) {
        (_, BodyKind::Chunked) => {
            headers.remove("Content-Length");
            codings.push("chunked");
            headers.append("Transfer-Encoding", codings.join(", "));
        }
        (_, BodyKind::UntilClose) => {
            headers.remove("Content-Length");
            if !codings.is_empty() {
                headers.append("Transfer-Encoding", codings.join(", "));
            }
        }
        _ => {}
    }

    if !keep_alive {
        headers.append("Connection", "close");
    } else if client_version == "HTTP/1.0" {
        headers.append("Connection", "keep-alive");
    }

    serialize_head(head.status, &head.reason, &headers)
}

fn error_detail(error: &ForwardError) -> &'static str {
    match error {
        ForwardError::Timeout { .. } => "The backend server did not respond in time.",
        ForwardError::AdmissionTimeout(_) | ForwardError::AdmissionClosed => {
            "No backend connection became available in time."
        }
        ForwardError::ClientBody(_) => "Malformed request body.",
        _ => "Failed to connect to backend server.",
    }
}
