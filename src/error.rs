//! Error taxonomy for configuration and request forwarding.

use crate::http::parser::ParseError;
use crate::http::response::StatusCode;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Startup errors. Any of these stops the process before it starts serving.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no backends configured; specify one or more servers (format: \"http://<host>:<port>\")")]
    NoBackends,
    #[error("invalid backend URI {uri:?}: {reason}")]
    InvalidBackend { uri: String, reason: String },
    #[error("unsupported scheme {scheme:?} in backend URI {uri:?}; only http is supported")]
    UnsupportedScheme { uri: String, scheme: String },
    #[error("redirect code {0} is not a valid HTTP status code (expected 100-999)")]
    InvalidRedirectCode(u16),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{0}")]
    Args(String),
}

/// Failure while forwarding a single request. Never outlives the request.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to connect to backend {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
    #[error("backend I/O error: {0}")]
    Upstream(#[source] io::Error),
    #[error("invalid response from backend: {0}")]
    BadResponse(String),
    #[error("timed out after {0:?} waiting for a free backend connection")]
    AdmissionTimeout(Duration),
    #[error("admission limiter closed")]
    AdmissionClosed,
    #[error("malformed request body: {0}")]
    ClientBody(String),
    #[error("client disconnected")]
    ClientGone,
}

impl ForwardError {
    /// Maps a failed read from the client side of the exchange.
    pub fn from_client_read(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::InvalidData => ForwardError::ClientBody(error.to_string()),
            _ => ForwardError::ClientGone,
        }
    }

    /// Status reported to the client, if the client is still there to receive one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ForwardError::Connect { .. }
            | ForwardError::Upstream(_)
            | ForwardError::BadResponse(_) => Some(StatusCode::BAD_GATEWAY),
            ForwardError::Timeout { .. } => Some(StatusCode::GATEWAY_TIMEOUT),
            ForwardError::AdmissionTimeout(_) | ForwardError::AdmissionClosed => {
                Some(StatusCode::SERVICE_UNAVAILABLE)
            }
            ForwardError::ClientBody(_) => Some(StatusCode::BAD_REQUEST),
            ForwardError::ClientGone => None,
        }
    }

    /// True when the backend (not the client) is at fault.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            ForwardError::Connect { .. }
                | ForwardError::Timeout { .. }
                | ForwardError::Upstream(_)
                | ForwardError::BadResponse(_)
        )
    }
}

/// Failure while reading a request or response head off a stream.
#[derive(Debug, thiserror::Error)]
pub enum HeadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed message head: {0}")]
    Parse(ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failures_map_to_gateway_statuses() {
        let refused = ForwardError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::ErrorKind::ConnectionRefused.into(),
        };
        assert_eq!(refused.status(), Some(StatusCode::BAD_GATEWAY));
        assert!(refused.is_backend_failure());

        let slow = ForwardError::Timeout {
            stage: "connect",
            after: Duration::from_secs(1),
        };
        assert_eq!(slow.status(), Some(StatusCode::GATEWAY_TIMEOUT));
    }

    #[test]
    fn client_side_errors_are_not_backend_failures() {
        assert_eq!(ForwardError::ClientGone.status(), None);
        assert!(!ForwardError::ClientGone.is_backend_failure());

        let garbled = ForwardError::from_client_read(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad chunk size",
        ));
        assert_eq!(garbled.status(), Some(StatusCode::BAD_REQUEST));

        let eof = ForwardError::from_client_read(io::ErrorKind::UnexpectedEof.into());
        assert!(matches!(eof, ForwardError::ClientGone));
    }
}
