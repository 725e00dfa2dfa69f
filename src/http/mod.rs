//! HTTP/1.1 wire layer.
//!
//! Heads are parsed into owned values; bodies are never buffered whole but
//! streamed between client and backend with their framing decoded and
//! re-encoded on the way.
//!
//! # Architecture
//!
//! - **`connection`**: Per-client request loop implementing the state machine below
//! - **`buffered`**: Read half of a connection with its look-ahead buffer
//! - **`parser`**: Parses request and response heads from byte buffers
//! - **`headers`**: Ordered, case-insensitive header map with hop-by-hop handling
//! - **`request`**: HTTP request head representation
//! - **`response`**: Status codes, backend response heads and locally generated responses
//! - **`body`**: Body framing (`Content-Length`, chunked, close-delimited)
//! - **`writer`**: Serializes response heads and full responses
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for the next request head
//!        └──────┬──────┘
//!               │ Request received            │ Malformed
//!               ▼                             ▼
//!        ┌──────────────────┐          ┌──────────────┐
//!        │   Processing     │          │   Writing    │ ← 400 / 431
//!        └──────┬───────────┘          └──────┬───────┘
//!               │ Dispatched                  │
//!               ├─ Keep-Alive → Reading       │
//!               └─ Close → Closed  ◄──────────┘
//! ```

pub mod body;
pub mod buffered;
pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
