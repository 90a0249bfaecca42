//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use forward_proxy::{ProxyConfig, ProxyServer, Shutdown};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A proxy running its event loop on a dedicated thread.
pub struct RunningProxy {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    handle: Option<JoinHandle<forward_proxy::Result<()>>>,
}

impl RunningProxy {
    /// Stop the loop and return what `run` returned.
    pub fn stop(mut self) -> forward_proxy::Result<()> {
        self.shutdown.trigger().unwrap();
        self.handle.take().unwrap().join().unwrap()
    }
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown.trigger();
            let _ = handle.join();
        }
    }
}

/// Start a proxy on an ephemeral port, letting the caller adjust the config.
pub fn start_proxy(configure: impl FnOnce(&mut ProxyConfig)) -> RunningProxy {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    configure(&mut config);

    let server = ProxyServer::bind(config).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let handle = std::thread::spawn(move || server.run());

    RunningProxy {
        addr,
        shutdown,
        handle: Some(handle),
    }
}

/// Mock origin server answering every request on a kept-alive connection.
pub struct Origin {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    requests: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Origin {
    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections the proxy has closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Next request header block the origin received.
    pub async fn next_request(&mut self) -> Vec<u8> {
        tokio::time::timeout(IO_TIMEOUT, self.requests.recv())
            .await
            .expect("origin received no request")
            .expect("origin stopped")
    }
}

/// Response bytes a [`start_origin`] origin sends for `body`.
pub fn origin_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nServer: mock-origin\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

/// Start an origin that replies with a fixed Content-Length framed body.
pub async fn start_origin(body: &'static str) -> Origin {
    spawn_origin(Some(body)).await
}

/// Start an origin that records requests and never answers.
pub async fn start_silent_origin() -> Origin {
    spawn_origin(None).await
}

async fn spawn_origin(body: Option<&'static str>) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let (tx, requests) = mpsc::unbounded_channel();

    let accept_counter = accepted.clone();
    let close_counter = closed.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            accept_counter.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            let close_counter = close_counter.clone();
            tokio::spawn(async move {
                while let Some(head) = read_head(&mut socket).await {
                    let _ = tx.send(head);
                    if let Some(body) = body {
                        if socket.write_all(&origin_response(body)).await.is_err() {
                            break;
                        }
                    }
                }
                close_counter.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    Origin {
        addr,
        accepted,
        closed,
        requests,
    }
}

/// Start an origin that writes `raw` after the first request and closes.
pub async fn start_closing_origin(raw: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_head(&mut socket).await.is_some() {
                    let _ = socket.write_all(raw).await;
                    let _ = socket.shutdown().await;
                }
            });
        }
    });

    addr
}

/// Start a TCP echo server.
pub async fn start_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub fn closed_port() -> SocketAddr {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

/// Read one header block, terminator included. `None` on EOF.
pub async fn read_head(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => head.push(byte[0]),
        }
    }
    Some(head)
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    tokio::time::timeout(IO_TIMEOUT, TcpStream::connect(addr))
        .await
        .expect("connect timed out")
        .unwrap()
}

/// Read exactly `len` bytes.
pub async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .unwrap();
    buf
}

/// Read until the peer closes.
pub async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut buf))
        .await
        .expect("peer never closed")
        .unwrap_or_default();
    buf
}

/// Poll `condition` until it holds, failing after [`IO_TIMEOUT`].
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Body of `len` bytes with a repeating pattern, leaked for `'static` use.
pub fn patterned_body(len: usize) -> &'static str {
    let body: String = (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect();
    Box::leak(body.into_boxed_str())
}

pub fn get_request(origin: SocketAddr, path: &str) -> String {
    format!(
        "GET http://{origin}{path} HTTP/1.1\r\nHost: {origin}\r\nAccept: */*\r\nUser-Agent: integration-test\r\n\r\n"
    )
}
