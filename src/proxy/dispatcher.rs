//! The immutable context every connection shares: backends, selector and
//! the engine chosen at startup.

use crate::config::{Config, Mode};
use crate::error::ConfigError;
use crate::http::connection::{Client, Disposition};
use crate::http::request::Request;
use crate::http::response::StatusCode;
use crate::proxy::admission::AdmissionController;
use crate::proxy::backend::BackendPool;
use crate::proxy::engine::ProxyEngine;
use crate::proxy::pool::BufferPool;
use crate::proxy::redirect::RedirectEngine;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug)]
pub enum Engine {
    Proxy(ProxyEngine),
    Redirect(RedirectEngine),
}

#[derive(Debug)]
pub struct Dispatcher {
    backends: BackendPool,
    engine: Engine,
}

impl Dispatcher {
    pub fn new(backends: BackendPool, engine: Engine) -> Self {
        Self { backends, engine }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let backends = BackendPool::from_config(config)?;

        let engine = match config.mode() {
            Mode::Proxy => {
                let admission = AdmissionController::new(backends.len(), config.max_conns_per_backend);
                let pool = Arc::new(BufferPool::new(config.buffer_size));
                Engine::Proxy(ProxyEngine::new(admission, pool, config.admission_timeout))
            }
            Mode::Redirect(code) => {
                let code = StatusCode::from_u16(code).ok_or(ConfigError::InvalidRedirectCode(code))?;
                Engine::Redirect(RedirectEngine::new(code))
            }
        };

        Ok(Self::new(backends, engine))
    }

    pub fn mode(&self) -> Mode {
        match &self.engine {
            Engine::Proxy(_) => Mode::Proxy,
            Engine::Redirect(redirect) => Mode::Redirect(redirect.code().as_u16()),
        }
    }

    pub fn backends(&self) -> &BackendPool {
        &self.backends
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The proxy's buffer pool, when pooling is in effect.
    pub fn buffer_pool(&self) -> Option<&Arc<BufferPool>> {
        match &self.engine {
            Engine::Proxy(proxy) if proxy.buffer_pool().is_enabled() => Some(proxy.buffer_pool()),
            _ => None,
        }
    }

    /// Answers one request: takes a ticket, picks the backend and hands the
    /// request to the engine. Writes exactly one response to `client`.
    pub async fn dispatch<R, W>(&self, request: &Request, client: &mut Client<R, W>) -> Disposition
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let (ticket, backend) = self.backends.select();

        match &self.engine {
            Engine::Proxy(proxy) => proxy.forward(ticket, backend, request, client).await,
            Engine::Redirect(redirect) => redirect.redirect(ticket, backend, request, client).await,
        }
    }
}
