use crate::http::headers::Headers;
use std::fmt;

/// HTTP request methods.
///
/// Every method is forwarded as-is; `CONNECT` is not supported because
/// tunnelling is outside what a fan-out proxy does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// TRACE - Loop-back test
    TRACE,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// Method names are case-sensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use fanout::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            "TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::TRACE => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Head of a client request. The body is never buffered here; it stays on
/// the connection and is streamed by whoever handles the request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Raw request target, path plus query (e.g. "/search?q=rust")
    pub path: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    pub headers: Headers,
}

/// Builder for constructing Request objects.
#[derive(Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    version: Option<String>,
    headers: Headers,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
        })
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Content-Length as declared by the client, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.content_length()
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 is persistent unless `Connection: close` is sent; HTTP/1.0 is
    /// persistent only with an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        if self.version.eq_ignore_ascii_case("HTTP/1.0") {
            self.headers.has_token("Connection", "keep-alive")
        } else {
            !self.headers.has_token("Connection", "close")
        }
    }

    /// Client asked to see `100 Continue` before sending its body.
    pub fn expects_continue(&self) -> bool {
        self.headers
            .get("Expect")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
    }

    /// The request target in origin form: absolute-form targets
    /// (`http://host/path?q`) are reduced to `/path?q`.
    pub fn origin_form(&self) -> &str {
        let target = self.path.as_str();
        let Some((_, rest)) = target.split_once("://") else {
            return if target.is_empty() { "/" } else { target };
        };
        match rest.find(['/', '?']) {
            Some(i) if rest[i..].starts_with('/') => &rest[i..],
            _ => "/",
        }
    }
}
