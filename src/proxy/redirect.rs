//! Redirect mode: instead of proxying, point the client at the selected
//! backend with the configured status code.

use crate::http::body::BodyKind;
use crate::http::connection::{Client, Disposition};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::proxy::backend::{Backend, Ticket};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RedirectEngine {
    code: StatusCode,
}

impl RedirectEngine {
    pub fn new(code: StatusCode) -> Self {
        Self { code }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// Backend base URI with the request target appended as-is.
    pub fn location(&self, backend: &Backend, request: &Request) -> String {
        format!("{}{}", backend.url, request.origin_form())
    }

    /// The redirect response for `request`. HEAD advertises the length of
    /// the body a GET would have received.
    pub fn response(&self, backend: &Backend, request: &Request) -> Response {
        let location = self.location(backend, request);
        match request.method {
            Method::GET => Response::redirect(self.code, &location, true),
            Method::HEAD => {
                let mut response = Response::redirect(self.code, &location, true);
                response.body.clear();
                response
            }
            _ => Response::redirect(self.code, &location, false),
        }
    }

    pub async fn redirect<R, W>(
        &self,
        ticket: Ticket,
        backend: &Backend,
        request: &Request,
        client: &mut Client<R, W>,
    ) -> Disposition
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // the request body is never read, so the connection can't be reused
        let keep_alive = request.keep_alive() && !BodyKind::for_request(request).has_body();

        let mut response = self.response(backend, request);
        if !keep_alive {
            response.headers.insert("Connection", "close");
        } else if request.version == "HTTP/1.0" {
            response.headers.insert("Connection", "keep-alive");
        }

        debug!(
            backend = backend.display_name(),
            ticket = ticket.number,
            code = self.code.as_u16(),
            method = %request.method,
            path = %request.path,
            "REDIRECT"
        );

        if let Err(e) = ResponseWriter::new(&response).write_to(&mut client.writer).await {
            debug!(error = %e, "Failed to write redirect");
            return Disposition::Close;
        }

        if keep_alive {
            Disposition::KeepAlive
        } else {
            Disposition::Close
        }
    }
}
