//! Fan-out core
//!
//! Round-robin backend selection, per-backend admission control, the shared
//! buffer pool, and the two engines (proxy and redirect) that answer a
//! request once its backend has been chosen.

pub mod admission;
pub mod backend;
pub mod dispatcher;
pub mod engine;
pub mod pool;
pub mod redirect;
pub mod upstream;

pub use backend::{Backend, BackendPool, BackendSelector, Ticket};
pub use dispatcher::{Dispatcher, Engine};
pub use engine::ProxyEngine;
pub use redirect::RedirectEngine;
