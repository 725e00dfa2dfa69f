use crate::http::headers::Headers;
use crate::http::request::{Method, Request};
use crate::http::response::{ResponseHead, StatusCode};

/// Largest message head accepted from either side.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

const OWS: [char; 2] = [' ', '\t'];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid request line")]
    InvalidRequest,
    #[error("unsupported method")]
    InvalidMethod,
    #[error("malformed header")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("invalid status line")]
    InvalidStatus,
    #[error("message head exceeds {MAX_HEAD_SIZE} bytes")]
    HeadersTooLarge,
    #[error("incomplete message head")]
    Incomplete,
}

/// Parses a request head. The body, if any, is left unconsumed.
///
/// Returns the request and the number of bytes consumed.
pub fn parse_request_head(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    // Stray line breaks before the request line count toward the head limit.
    let skipped = leading_blank_lines(buf);
    if skipped > MAX_HEAD_SIZE {
        return Err(ParseError::HeadersTooLarge);
    }
    let (head, consumed) = split_head(&buf[skipped..], MAX_HEAD_SIZE - skipped)?;

    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_ascii_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;
    let headers = parse_header_lines(lines)?;

    if headers.contains("Transfer-Encoding") && !headers.is_chunked() {
        return Err(ParseError::InvalidHeader);
    }

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
    };

    Ok((request, skipped + consumed))
}

/// Parses a response head from a backend.
pub fn parse_response_head(buf: &[u8]) -> Result<(ResponseHead, usize), ParseError> {
    let (head, consumed) = split_head(buf, MAX_HEAD_SIZE)?;

    let mut lines = head.split("\r\n");

    let status_line = lines.next().ok_or(ParseError::InvalidStatus)?;
    let mut parts = status_line.splitn(3, ' ');

    let version = parts.next().ok_or(ParseError::InvalidStatus)?;
    if !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidStatus);
    }

    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(StatusCode::from_u16)
        .ok_or(ParseError::InvalidStatus)?;
    let reason = parts.next().unwrap_or("").trim_matches(OWS);

    let headers = parse_header_lines(lines)?;

    let head = ResponseHead {
        version: version.to_string(),
        status,
        reason: reason.to_string(),
        headers,
    };

    Ok((head, consumed))
}

/// Locates the end of the head and returns it as text (without the blank
/// line) along with the bytes consumed including the blank line.
///
/// Each byte maps to the char of the same value, so obs-text in header
/// values survives a parse and [`write_text`] unchanged.
fn split_head(buf: &[u8], limit: usize) -> Result<(String, usize), ParseError> {
    let Some(headers_end) = find_headers_end(buf) else {
        return Err(if buf.len() > limit {
            ParseError::HeadersTooLarge
        } else {
            ParseError::Incomplete
        });
    };

    if headers_end > limit {
        return Err(ParseError::HeadersTooLarge);
    }

    let head = buf[..headers_end].iter().copied().map(char::from).collect();
    Ok((head, headers_end + 4))
}

/// Appends head text produced by the parser back as the original bytes.
///
/// Chars above U+00FF can only come from configuration and are written
/// as UTF-8.
pub fn write_text(buf: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match u8::try_from(ch) {
            Ok(byte) => buf.push(byte),
            Err(_) => buf.extend_from_slice(ch.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }
}

fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Headers, ParseError> {
    let mut headers = Headers::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let key = key.trim_matches(OWS);
        if key.is_empty() || key.contains(|c: char| !c.is_ascii_graphic()) {
            return Err(ParseError::InvalidHeader);
        }

        headers.append(key, value.trim_matches(OWS));
    }

    // Conflicting or non-numeric lengths make the body boundary ambiguous.
    {
        let mut lengths = headers.get_all("Content-Length").map(str::trim);
        if let Some(first) = lengths.next() {
            first
                .parse::<u64>()
                .map_err(|_| ParseError::InvalidContentLength)?;
            if lengths.any(|other| other != first) {
                return Err(ParseError::InvalidContentLength);
            }
        }
    }

    Ok(headers)
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
}

fn leading_blank_lines(buf: &[u8]) -> usize {
    buf.iter().take_while(|&&b| b == b'\r' || b == b'\n').count()
}
