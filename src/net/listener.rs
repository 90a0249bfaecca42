//! Non-blocking TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Register with the poller for accept readiness
//! - Report the connection limit enforced by the event loop

use std::io;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};

use crate::config::ListenerConfig;
use crate::error::{ProxyError, Result};

/// Listening socket accepting plaintext client connections.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address.
    pub fn bind(config: &ListenerConfig) -> Result<Self> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ProxyError::InvalidAddress(config.bind_address.clone()))?;

        let inner = TcpListener::bind(addr).map_err(|source| ProxyError::Bind { addr, source })?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| ProxyError::Bind { addr, source })?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            max_connections: config.max_connections,
        })
    }

    /// Register for readable (accept) readiness under `token`.
    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.inner, token, Interest::READABLE)
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.inner)
    }

    /// Accept one pending connection. `WouldBlock` means the queue is empty.
    pub fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}
