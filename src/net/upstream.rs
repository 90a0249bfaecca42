//! Upstream origin connection establishment.
//!
//! The connect is blocking with a bounded timeout, then the socket is
//! switched to non-blocking mode for the event loop. Resolution walks every
//! address the host resolves to, keeping the last failure.

use std::net::{TcpStream as StdTcpStream, ToSocketAddrs};
use std::time::Duration;

use mio::net::TcpStream;

use crate::error::{ProxyError, Result};

/// Connect to `host:port` within `timeout` per resolved address.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<(TcpStream, std::net::SocketAddr)> {
    let resolve_error = || ProxyError::Resolve {
        host: host.to_string(),
        port,
    };
    let addrs = (host, port).to_socket_addrs().map_err(|_| resolve_error())?;

    let mut last_error = None;
    for addr in addrs {
        match StdTcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nonblocking(true)?;
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::trace!(error = %e, "Failed to set TCP_NODELAY");
                }
                return Ok((TcpStream::from_std(stream), addr));
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                last_error = Some(ProxyError::ConnectTimeout {
                    host: host.to_string(),
                    port,
                    timeout,
                });
            }
            Err(source) => last_error = Some(ProxyError::Connect { addr, source }),
        }
    }

    Err(last_error.unwrap_or_else(resolve_error))
}
