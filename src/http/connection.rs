use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::HeadError;
use crate::http::buffered::BufferedReader;
use crate::http::parser::{parse_request_head, ParseError};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::proxy::Dispatcher;

/// The client side of a connection as handed to the engines.
pub struct Client<R, W> {
    pub reader: BufferedReader<R>,
    pub writer: W,
    pub peer: Option<SocketAddr>,
}

impl<R: AsyncRead + Unpin, W> Client<R, W> {
    pub fn new(reader: R, writer: W, peer: Option<SocketAddr>) -> Self {
        Self {
            reader: BufferedReader::new(reader),
            writer,
            peer,
        }
    }
}

/// What happens to the connection once a response has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    KeepAlive,
    Close,
}

pub struct Connection<R, W> {
    client: Client<R, W>,
    dispatcher: Arc<Dispatcher>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl Connection<OwnedReadHalf, OwnedWriteHalf> {
    pub fn from_tcp(stream: TcpStream, peer: SocketAddr, dispatcher: Arc<Dispatcher>) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, Some(peer), dispatcher)
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, peer: Option<SocketAddr>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            client: Client::new(reader, writer, peer),
            dispatcher,
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = self.read_request().await;
                }

                ConnectionState::Processing(req) => {
                    let disposition = self.dispatcher.dispatch(&req, &mut self.client).await;

                    self.state = match disposition {
                        Disposition::KeepAlive => ConnectionState::Reading, // go back for next request
                        Disposition::Close => ConnectionState::Closed,
                    };
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to(&mut self.client.writer).await?;

                    if keep_alive {
                        self.state = ConnectionState::Reading;
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    // Peer may already be gone
                    let _ = self.client.writer.shutdown().await;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reads the next request head and decides the next state.
    async fn read_request(&mut self) -> ConnectionState {
        match self.client.reader.read_head(parse_request_head).await {
            Ok(Some(req)) => ConnectionState::Processing(req),

            // Client closed connection
            Ok(None) => ConnectionState::Closed,

            Err(HeadError::Parse(ParseError::HeadersTooLarge)) => {
                let response = Response::error(
                    StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                    "Request header is too large.",
                );
                ConnectionState::Writing(ResponseWriter::new(&response), false)
            }

            Err(HeadError::Parse(e)) => {
                debug!(peer = ?self.client.peer, error = %e, "Malformed request");
                ConnectionState::Writing(ResponseWriter::new(&Response::bad_request()), false)
            }

            Err(HeadError::Io(e)) => {
                debug!(peer = ?self.client.peer, error = %e, "Failed to read request");
                ConnectionState::Closed
            }
        }
    }
}
