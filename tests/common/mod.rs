//! Loopback backends and a client for end-to-end tests.

#![allow(dead_code)]

use fanout::config::Config;
use fanout::http::body::{BodyKind, BodyReader};
use fanout::http::buffered::BufferedReader;
use fanout::http::parser::{parse_request_head, parse_response_head};
use fanout::http::request::{Method, Request};
use fanout::http::response::ResponseHead;
use fanout::proxy::Dispatcher;
use fanout::server::listener::serve;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

pub fn config(backends: &[SocketAddr]) -> Config {
    Config {
        backends: backends.iter().map(|addr| format!("http://{}", addr)).collect(),
        ..Config::default()
    }
}

/// Starts the proxy on an ephemeral port.
pub async fn start_proxy(config: Config) -> SocketAddr {
    let dispatcher = Arc::new(Dispatcher::from_config(&config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, dispatcher));
    addr
}

/// An address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A backend that runs `handle` for every accepted connection.
pub async fn spawn_backend<F, Fut>(handle: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handle(socket));
        }
    });
    addr
}

/// Reads one request head and drains its body.
pub async fn read_request<R>(reader: &mut BufferedReader<R>) -> Option<Request>
where
    R: AsyncRead + Unpin,
{
    let request = reader.read_head(parse_request_head).await.ok()??;
    let mut body = BodyReader::new(BodyKind::for_request(&request));
    let mut buf = [0u8; 4096];
    while body.read(reader, &mut buf).await.ok()? > 0 {}
    Some(request)
}

/// Replies with its name, the request line it saw, then every header.
pub async fn spawn_named_backend(name: &'static str) -> SocketAddr {
    spawn_backend(move |socket| async move {
        let (rd, mut wr) = socket.into_split();
        let mut reader = BufferedReader::new(rd);
        let Some(request) = read_request(&mut reader).await else {
            return;
        };
        let _ = wr.write_all(&describe(name, &request)).await;
    })
    .await
}

pub fn describe(name: &str, request: &Request) -> Vec<u8> {
    let mut body = format!("{} {} {}\n", name, request.method, request.path);
    for (key, value) in request.headers.iter() {
        body.push_str(&format!("{}: {}\n", key, value));
    }
    let mut out = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

/// Streams the request body straight back without declaring a length.
pub async fn spawn_echo_backend() -> SocketAddr {
    spawn_backend(|socket| async move {
        let (rd, mut wr) = socket.into_split();
        let mut reader = BufferedReader::new(rd);
        let Ok(Some(request)) = reader.read_head(parse_request_head).await else {
            return;
        };
        if wr
            .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
            .await
            .is_err()
        {
            return;
        }

        let mut body = BodyReader::new(BodyKind::for_request(&request));
        let mut buf = vec![0u8; 8192];
        loop {
            match body.read(&mut reader, &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if wr.write_all(&buf[..n]).await.is_err() {
                        return;
                    }
                }
            }
        }
        let _ = wr.shutdown().await;
    })
    .await
}

/// Counts requests in flight, remembering the highest count seen.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
    total: AtomicUsize,
}

impl InFlight {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Holds every request for `delay` before answering.
pub async fn spawn_slow_backend(delay: Duration) -> (SocketAddr, Arc<InFlight>) {
    let tracker = Arc::new(InFlight::default());
    let shared = Arc::clone(&tracker);
    let addr = spawn_backend(move |socket| {
        let tracker = Arc::clone(&shared);
        async move {
            let (rd, mut wr) = socket.into_split();
            let mut reader = BufferedReader::new(rd);
            let Some(request) = read_request(&mut reader).await else {
                return;
            };

            let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
            tracker.max.fetch_max(now, Ordering::SeqCst);
            tracker.total.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(delay).await;

            tracker.current.fetch_sub(1, Ordering::SeqCst);
            let _ = wr.write_all(&describe("slow", &request)).await;
        }
    })
    .await;
    (addr, tracker)
}

/// A connected client with its halves split.
pub struct TestClient {
    pub reader: BufferedReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rd, wr) = stream.into_split();
        Self {
            reader: BufferedReader::new(rd),
            writer: wr,
        }
    }

    pub async fn send(&mut self, raw: &[u8]) {
        self.writer.write_all(raw).await.unwrap();
    }

    /// Reads one full response to a request made with `method`.
    pub async fn response(&mut self, method: Method) -> (ResponseHead, Vec<u8>) {
        let head = self
            .reader
            .read_head(parse_response_head)
            .await
            .unwrap()
            .expect("connection closed before a response");
        let body = read_body(&mut self.reader, BodyKind::for_response(&head, method)).await;
        (head, body)
    }

    pub async fn get(&mut self, path: &str) -> (ResponseHead, Vec<u8>) {
        self.send(format!("GET {} HTTP/1.1\r\nHost: proxy.test\r\n\r\n", path).as_bytes())
            .await;
        self.response(Method::GET).await
    }
}

pub async fn read_body<R>(reader: &mut BufferedReader<R>, kind: BodyKind) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut body = BodyReader::new(kind);
    let mut out = Vec::new();
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = body.read(reader, &mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

/// One GET on a fresh connection.
pub async fn get(proxy: SocketAddr, path: &str) -> (ResponseHead, Vec<u8>) {
    TestClient::connect(proxy).await.get(path).await
}
