//! Readiness event loop.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::lifecycle::Shutdown;
use crate::net::{Connection, Listener};
use crate::observability::metrics;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

/// Upper bound on a poll wait while idle connections are being tracked.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Single-threaded forward proxy.
pub struct ProxyServer {
    pub(super) poll: Poll,
    pub(super) listener: Listener,
    pub(super) connections: HashMap<Token, Connection>,
    next_token: usize,
    /// Clients reset to Idle whose next request may already be waiting.
    pub(super) rereads: VecDeque<Token>,
    pub(super) config: ProxyConfig,
    shutdown: Shutdown,
}

impl ProxyServer {
    /// Bind the listener and prepare the poller.
    pub fn bind(config: ProxyConfig) -> Result<Self> {
        let poll = Poll::new().map_err(ProxyError::Poll)?;
        let mut listener = Listener::bind(&config.listener)?;
        listener
            .register(poll.registry(), LISTENER)
            .map_err(ProxyError::Register)?;
        let waker = Waker::new(poll.registry(), WAKER).map_err(ProxyError::Register)?;

        Ok(Self {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            rereads: VecDeque::new(),
            config,
            shutdown: Shutdown::new(waker),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that stops [`ProxyServer::run`] from another thread.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the event loop until shut down.
    ///
    /// Per-connection failures close that connection (or pair) and never
    /// stop the loop. A failing poll is returned as [`ProxyError::Poll`].
    pub fn run(mut self) -> Result<()> {
        let mut events = Events::with_capacity(self.config.poll.events_capacity);
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(address = %addr, "Proxy event loop running");
        }

        loop {
            let timeout = self.poll_timeout();
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(error = %e, "Poll failed");
                return Err(ProxyError::Poll(e));
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_all(),
                    WAKER => {}
                    token => self.dispatch(token, event),
                }
            }

            if self.shutdown.is_triggered() {
                self.close_all();
                tracing::info!("Proxy event loop stopped");
                return Ok(());
            }

            self.sweep_idle();
        }
    }

    fn poll_timeout(&self) -> Option<Duration> {
        match self.config.timeouts.idle_timeout() {
            Some(idle) if !self.connections.is_empty() => Some(idle.min(SWEEP_INTERVAL)),
            _ => None,
        }
    }

    fn dispatch(&mut self, token: Token, event: &Event) {
        if !self.connections.contains_key(&token) {
            tracing::trace!(connection = token.0, "Event for closed connection, skipping");
            return;
        }

        if event.is_readable() || event.is_read_closed() || event.is_error() {
            self.on_readable(token);
        }
        if event.is_writable() && self.connections.contains_key(&token) {
            self.on_writable(token);
        }
        self.drain_rereads();
    }

    fn accept_all(&mut self) {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "TCP accept error");
                    return;
                }
            };

            if self.connections.len() >= self.listener.max_connections() {
                tracing::warn!(peer = %peer, "Connection limit reached, rejecting");
                continue;
            }

            let conn = Connection::client(stream, peer, self.config.buffer.initial_capacity);
            match self.insert(conn) {
                Ok(token) => {
                    metrics::record_accepted();
                    tracing::debug!(connection = token.0, peer = %peer, "Connection accepted");
                }
                Err(e) => tracing::warn!(peer = %peer, error = %e, "Failed to register client"),
            }
        }
    }

    fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Register a connection for read and write readiness and add it to the
    /// arena.
    pub(super) fn insert(&mut self, mut conn: Connection) -> Result<Token> {
        let token = self.next_token();
        self.poll
            .registry()
            .register(&mut conn.stream, token, Interest::READABLE | Interest::WRITABLE)
            .map_err(ProxyError::Register)?;
        self.connections.insert(token, conn);
        metrics::record_active_connections(self.connections.len());
        Ok(token)
    }

    /// Log `error` and close the connection it belongs to.
    pub(super) fn fail(&mut self, token: Token, error: ProxyError) {
        match &error {
            ProxyError::Io(e)
                if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::BrokenPipe) =>
            {
                tracing::debug!(connection = token.0, error = %error, "Peer reset connection");
            }
            _ => tracing::warn!(connection = token.0, error = %error, "Closing connection"),
        }
        self.close(token);
    }

    /// Remove a connection from the arena and close its socket.
    ///
    /// The counterpart is not closed here; its next write attempt finds the
    /// token gone and closes itself, which is triggered right away.
    pub(super) fn close(&mut self, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            tracing::trace!(connection = token.0, error = %e, "Deregister failed");
        }
        metrics::record_active_connections(self.connections.len());
        tracing::debug!(
            connection = token.0,
            role = conn.role().as_str(),
            peer = %conn.peer(),
            state = ?conn.state(),
            bytes_read = conn.bytes_read,
            bytes_written = conn.bytes_written,
            "Connection closed"
        );

        let counterpart = conn.counterpart();
        drop(conn);
        if let Some(counterpart) = counterpart {
            self.on_writable(counterpart);
        }
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            if let Some(mut conn) = self.connections.remove(&token) {
                // best-effort; the socket closes on drop either way
                let _ = self.poll.registry().deregister(&mut conn.stream);
            }
        }
        self.rereads.clear();
        if let Err(e) = self.listener.deregister(self.poll.registry()) {
            tracing::trace!(error = %e, "Listener deregister failed");
        }
        metrics::record_active_connections(0);
    }

    fn sweep_idle(&mut self) {
        let Some(limit) = self.config.timeouts.idle_timeout() else {
            return;
        };
        let now = Instant::now();
        let expired: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| now.duration_since(conn.last_activity) >= limit)
            .map(|(token, _)| *token)
            .collect();

        for token in expired {
            tracing::debug!(connection = token.0, idle_secs = limit.as_secs(), "Idle timeout");
            self.close(token);
        }
    }
}
