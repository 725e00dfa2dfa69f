use crate::http::headers::Headers;

/// HTTP status code.
///
/// Any three-digit code is representable because backend statuses and the
/// configured redirect code are passed through verbatim; the associated
/// constants name the ones this crate produces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const CONTINUE: StatusCode = StatusCode(100);
    pub const SWITCHING_PROTOCOLS: StatusCode = StatusCode(101);
    pub const OK: StatusCode = StatusCode(200);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(307);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const REQUEST_HEADER_FIELDS_TOO_LARGE: StatusCode = StatusCode(431);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const BAD_GATEWAY: StatusCode = StatusCode(502);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);
    pub const GATEWAY_TIMEOUT: StatusCode = StatusCode(504);

    /// Accepts any three-digit code.
    pub fn from_u16(code: u16) -> Option<Self> {
        (100..=999).contains(&code).then_some(StatusCode(code))
    }

    /// Returns the numeric HTTP status code.
    ///
    /// ```
    /// # use fanout::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::BAD_GATEWAY.as_u16(), 502);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.0)
    }

    /// Responses that never carry a body regardless of framing headers.
    pub fn forbids_body(&self) -> bool {
        self.is_informational() || self.0 == 204 || self.0 == 304
    }

    /// Returns the standard reason phrase, or "" for unregistered codes.
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            300 => "Multiple Choices",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            413 => "Payload Too Large",
            429 => "Too Many Requests",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "",
        }
    }
}

/// A complete response generated by the proxy itself (errors, redirects).
/// Relayed backend responses are streamed and never materialised as one.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Head of a response read from a backend.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: String,
    pub status: StatusCode,
    pub reason: String,
    pub headers: Headers,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(b"{}".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Builds the final Response.
    ///
    /// Adds `Content-Length` from the body size unless already present.
    pub fn build(mut self) -> Response {
        if !self.headers.contains("Content-Length") {
            self.headers
                .append("Content-Length", self.body.len().to_string());
        }

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Plain-text error page; the connection is closed afterwards.
    pub fn error(status: StatusCode, detail: &str) -> Self {
        let body = format!(
            "{} {}\r\n\r\n{}",
            status.as_u16(),
            status.reason_phrase(),
            detail
        );
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .header("Connection", "close")
            .body(body.into_bytes())
            .build()
    }

    /// 400 for requests that could not be parsed.
    pub fn bad_request() -> Self {
        Self::error(StatusCode::BAD_REQUEST, "Malformed HTTP request.")
    }

    /// Redirect to `location`. GET and HEAD get a short HTML body linking the
    /// target (HEAD only advertises its length); other methods get none.
    pub fn redirect(status: StatusCode, location: &str, with_body: bool) -> Self {
        let builder = ResponseBuilder::new(status).header("Location", location);
        if !with_body {
            return builder.build();
        }

        let body = format!(
            "<a href=\"{}\">{}</a>.\n",
            html_escape(location),
            status.reason_phrase()
        );
        builder
            .header("Content-Type", "text/html; charset=utf-8")
            .body(body.into_bytes())
            .build()
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
