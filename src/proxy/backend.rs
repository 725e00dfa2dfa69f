//! Backend descriptors and round-robin selection.
//!
//! The backend list is fixed at startup. The only thing that changes while
//! serving is the dispatch ticket, a wrapping atomic counter that every
//! request bumps exactly once; `ticket mod N` picks the backend.

use crate::config::{parse_backend_uri, Config};
use crate::error::ConfigError;
use crate::proxy::upstream::Upstream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use url::Url;

/// Represents a backend server. Read-only once built.
#[derive(Debug, Clone)]
pub struct Backend {
    /// Position in the configured list
    pub index: usize,

    /// Backend URI exactly as configured (e.g. "http://localhost:3000")
    pub url: String,

    /// Parsed form of `url`
    pub base: Url,

    /// Transport used to reach it
    pub upstream: Upstream,
}

impl Backend {
    pub fn new(
        index: usize,
        url: &str,
        connect_timeout: Duration,
        header_timeout: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let base = parse_backend_uri(url)?;
        let upstream = Upstream::new(&base, connect_timeout, header_timeout).ok_or_else(|| {
            ConfigError::InvalidBackend {
                uri: url.to_string(),
                reason: "missing host".to_string(),
            }
        })?;

        Ok(Self {
            index,
            url: url.to_string(),
            base,
            upstream,
        })
    }

    /// Name used in logs.
    pub fn display_name(&self) -> &str {
        &self.url
    }
}

/// One dispatch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub number: u32,
    pub index: usize,
}

/// Hands out tickets and maps them onto backend indices.
#[derive(Debug)]
pub struct BackendSelector {
    next: AtomicU32,
    backends: usize,
}

impl BackendSelector {
    pub fn new(backends: usize) -> Result<Self, ConfigError> {
        Self::starting_at(backends, 0)
    }

    /// A selector whose first ticket is `ticket`.
    pub fn starting_at(backends: usize, ticket: u32) -> Result<Self, ConfigError> {
        if backends == 0 {
            return Err(ConfigError::NoBackends);
        }
        Ok(Self {
            next: AtomicU32::new(ticket),
            backends,
        })
    }

    /// Takes the next ticket. Every call gets a distinct ticket until the
    /// counter wraps at `u32::MAX`.
    pub fn select(&self) -> Ticket {
        let number = self.next.fetch_add(1, Ordering::Relaxed);
        Ticket {
            number,
            index: number as usize % self.backends,
        }
    }

    /// The ticket the next call to `select` will return.
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    pub fn backends(&self) -> usize {
        self.backends
    }
}

/// The configured backends plus their selector.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Backend>,
    selector: BackendSelector,
}

impl BackendPool {
    pub fn new(backends: Vec<Backend>) -> Result<Self, ConfigError> {
        let selector = BackendSelector::new(backends.len())?;
        Ok(Self { backends, selector })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let backends = config
            .backends
            .iter()
            .enumerate()
            .map(|(index, url)| {
                Backend::new(index, url, config.connect_timeout, config.header_timeout)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(backends)
    }

    /// Select the next backend using round-robin.
    pub fn select(&self) -> (Ticket, &Backend) {
        let ticket = self.selector.select();
        (ticket, &self.backends[ticket.index])
    }

    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    pub fn get(&self, index: usize) -> Option<&Backend> {
        self.backends.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
