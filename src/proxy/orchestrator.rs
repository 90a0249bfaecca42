//! Request orchestration: header parsing, upstream selection, pairing and
//! exchange reset.

use mio::Token;

use super::server::ProxyServer;
use crate::error::{ProxyError, Result};
use crate::http::{end_of_header_block, Request, RequestKind, Response, CONNECT_ESTABLISHED};
use crate::net::{upstream, Connection, ConnectionState, Role};
use crate::observability::metrics;

fn kind_label(kind: &RequestKind) -> &'static str {
    match kind {
        RequestKind::Get => "get",
        RequestKind::Connect => "connect",
        RequestKind::Unsupported(_) => "unsupported",
    }
}

impl ProxyServer {
    /// Parse a header block once it is complete at the front of the buffer.
    pub(super) fn process(&mut self, token: Token) -> Result<()> {
        let Some(conn) = self.connections.get_mut(&token) else {
            return Ok(());
        };

        match (conn.role(), conn.state()) {
            (Role::Client, ConnectionState::Idle) => {
                let Some(end) = end_of_header_block(conn.buffer.filled(), conn.buffer.len()) else {
                    return Ok(());
                };
                let request = Request::parse(&conn.buffer.filled()[..end])?;
                conn.buffer.clear();
                self.on_request(token, request)
            }
            (Role::Upstream, ConnectionState::Forwarding) if conn.response.is_none() => {
                let Some(end) = end_of_header_block(conn.buffer.filled(), conn.buffer.len()) else {
                    return Ok(());
                };
                let response = Response::parse(&conn.buffer.filled()[..end])?;
                tracing::debug!(
                    upstream = token.0,
                    status = response.status,
                    header_length = response.header_length,
                    content_length = ?response.content_length,
                    "Response header parsed"
                );
                if response.content_length.is_none() {
                    tracing::debug!(
                        upstream = token.0,
                        "No Content-Length; exchange ends with upstream close or idle timeout"
                    );
                }
                conn.response = Some(response);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_request(&mut self, client: Token, request: Request) -> Result<()> {
        metrics::record_request(kind_label(&request.kind));

        match &request.kind {
            RequestKind::Get => {
                let outbound = request.build_forward_request();
                self.begin_forwarding(client, request, outbound)
            }
            RequestKind::Connect => self.begin_tunneling(client, request),
            RequestKind::Unsupported(method) => {
                tracing::warn!(connection = client.0, method = %method, "Unsupported request method, closing");
                self.close(client);
                Ok(())
            }
        }
    }

    /// Idle → Forwarding: send a rebuilt GET over a reused or new upstream.
    fn begin_forwarding(&mut self, client: Token, request: Request, outbound: Vec<u8>) -> Result<()> {
        let upstream = self.resolve_upstream(client, &request)?;

        tracing::info!(
            connection = client.0,
            upstream = upstream.0,
            host = %request.host,
            port = request.port,
            path = request.path.as_deref().unwrap_or("/"),
            "Forwarding GET"
        );

        if let Some(conn) = self.connections.get_mut(&upstream) {
            conn.reset(ConnectionState::Forwarding);
        }
        if let Some(conn) = self.connections.get_mut(&client) {
            conn.buffer.clear();
            conn.buffer.extend_from_slice(&outbound);
            conn.state = ConnectionState::Forwarding;
            conn.request = Some(request);
        }
        Ok(())
    }

    /// Idle → Tunneling: open the target and queue the established frame
    /// on the client's outbound path.
    fn begin_tunneling(&mut self, client: Token, request: Request) -> Result<()> {
        let upstream = self.open_upstream(&request)?;
        self.pair(client, upstream);

        tracing::info!(
            connection = client.0,
            upstream = upstream.0,
            host = %request.host,
            port = request.port,
            "Tunnel established"
        );

        if let Some(conn) = self.connections.get_mut(&upstream) {
            conn.reset(ConnectionState::Tunneling);
            conn.buffer.extend_from_slice(CONNECT_ESTABLISHED);
        }
        if let Some(conn) = self.connections.get_mut(&client) {
            conn.buffer.clear();
            conn.state = ConnectionState::Tunneling;
            conn.request = Some(request);
        }
        Ok(())
    }

    /// Reuse the paired upstream when the previous GET on this client went to
    /// the same (host, port); otherwise open and pair a new one.
    fn resolve_upstream(&mut self, client: Token, request: &Request) -> Result<Token> {
        let reusable = self
            .connections
            .get(&client)
            .and_then(|conn| {
                let previous = conn.request.as_ref()?;
                let upstream = conn.counterpart()?;
                (previous.kind == RequestKind::Get && previous.same_target(request))
                    .then_some(upstream)
            })
            .filter(|upstream| {
                self.connections
                    .get(upstream)
                    .is_some_and(|conn| !conn.peer_closed)
            });

        if let Some(upstream) = reusable {
            tracing::debug!(connection = client.0, upstream = upstream.0, "Reusing upstream connection");
            metrics::record_upstream_connect("reused");
            return Ok(upstream);
        }

        let upstream = self.open_upstream(request)?;
        self.pair(client, upstream);
        Ok(upstream)
    }

    fn open_upstream(&mut self, request: &Request) -> Result<Token> {
        let timeout = self.config.timeouts.connect_timeout();
        let (stream, addr) = match upstream::connect(&request.host, request.port, timeout) {
            Ok(connected) => connected,
            Err(e) => {
                let result = match e {
                    ProxyError::ConnectTimeout { .. } => "timeout",
                    _ => "error",
                };
                metrics::record_upstream_connect(result);
                return Err(e);
            }
        };

        let token = self.insert(Connection::upstream(
            stream,
            addr,
            self.config.buffer.initial_capacity,
        ))?;
        metrics::record_upstream_connect("opened");
        tracing::debug!(
            upstream = token.0,
            host = %request.host,
            port = request.port,
            address = %addr,
            "Upstream connected"
        );
        Ok(token)
    }

    /// Pair `client` with `upstream`, tearing down any previous upstream so
    /// each side has exactly one counterpart.
    fn pair(&mut self, client: Token, upstream: Token) {
        let previous = self
            .connections
            .get(&client)
            .and_then(Connection::counterpart)
            .filter(|previous| *previous != upstream);
        if let Some(previous) = previous {
            if let Some(conn) = self.connections.get_mut(&previous) {
                conn.counterpart = None;
            }
            tracing::debug!(connection = client.0, upstream = previous.0, "Replacing upstream connection");
            self.close(previous);
        }

        if let Some(conn) = self.connections.get_mut(&client) {
            conn.counterpart = Some(upstream);
        }
        if let Some(conn) = self.connections.get_mut(&upstream) {
            conn.counterpart = Some(client);
        }
    }

    /// Forwarding → Idle once the upstream's framed response has been fully
    /// written to the client.
    pub(super) fn complete_exchange(&mut self, client: Token, upstream: Token) {
        let mut transferred = 0;
        if let Some(conn) = self.connections.get_mut(&upstream) {
            transferred = conn.bytes_written;
            conn.reset(ConnectionState::Idle);
        }
        if let Some(conn) = self.connections.get_mut(&client) {
            conn.state = ConnectionState::Idle;
        }
        tracing::info!(
            connection = client.0,
            upstream = upstream.0,
            bytes = transferred,
            "Exchange complete"
        );
        self.rereads.push_back(client);
    }
}
