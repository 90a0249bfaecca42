//! Read and write paths.
//!
//! A readable socket fills its own buffer; a writable socket drains its
//! counterpart's buffer. Readiness is edge-triggered, so every handler that
//! makes bytes available pushes them on immediately instead of waiting for
//! another wake-up.

use mio::Token;

use super::server::ProxyServer;
use crate::error::Result;
use crate::net::{Connection, ConnectionState, Role};
use crate::observability::metrics;

impl ProxyServer {
    pub(super) fn on_readable(&mut self, token: Token) {
        if let Err(e) = self.fill(token) {
            self.fail(token, e);
            return;
        }
        self.relay_from(token);

        // processing may have queued bytes for this socket (CONNECT frame)
        if let Some(counterpart) = self.connections.get(&token).and_then(Connection::counterpart) {
            self.relay_from(counterpart);
        }
    }

    pub(super) fn on_writable(&mut self, token: Token) {
        let Some(conn) = self.connections.get(&token) else {
            return;
        };
        // unpaired: nothing to send yet
        let Some(source) = conn.counterpart() else {
            return;
        };
        if !self.connections.contains_key(&source) {
            tracing::debug!(
                connection = token.0,
                role = conn.role().as_str(),
                "Counterpart closed, closing"
            );
            self.close(token);
            return;
        }
        self.relay_from(source);
    }

    /// Read into the connection's buffer, then parse whatever became
    /// complete. Returns the number of bytes read.
    pub(super) fn fill(&mut self, token: Token) -> Result<usize> {
        let max_capacity = self.config.buffer.max_capacity;
        let read = match self.connections.get_mut(&token) {
            Some(conn) => conn.fill_buffer(max_capacity)?,
            None => return Ok(0),
        };
        self.process(token)?;
        Ok(read)
    }

    /// Move `source`'s buffered bytes to its counterpart's socket, resuming
    /// reads on `source` while draining frees space. Closes `source` once
    /// its peer has closed and nothing is left to deliver.
    pub(super) fn relay_from(&mut self, source: Token) {
        loop {
            let Some(dest) = self.connections.get(&source).and_then(Connection::counterpart) else {
                break;
            };
            match self.drain(dest) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    self.fail(dest, e);
                    return;
                }
            }

            let paused = self
                .connections
                .get(&source)
                .is_some_and(|conn| conn.read_paused);
            if !paused {
                break;
            }
            match self.fill(source) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    self.fail(source, e);
                    return;
                }
            }
        }
        self.close_if_spent(source);
    }

    /// Write the counterpart's deliverable bytes to `dest`'s socket.
    ///
    /// A partial write leaves the remainder at the front of the counterpart's
    /// buffer. Returns the number of bytes written.
    pub(super) fn drain(&mut self, dest: Token) -> Result<usize> {
        let Some(source) = self.connections.get(&dest).and_then(Connection::counterpart) else {
            return Ok(0);
        };
        let Some(source_conn) = self.connections.get_mut(&source) else {
            tracing::debug!(connection = dest.0, "Counterpart closed, closing");
            self.close(dest);
            return Ok(0);
        };

        let deliverable = source_conn.deliverable();
        if deliverable == 0 {
            return Ok(0);
        }
        let direction = match source_conn.role() {
            Role::Client => "upstream",
            Role::Upstream => "client",
        };
        let mut pending = std::mem::take(&mut source_conn.buffer);

        let result = match self.connections.get_mut(&dest) {
            Some(conn) => conn.write_nonblocking(&pending.filled()[..deliverable]),
            None => Ok(0),
        };
        let written = result.as_ref().copied().unwrap_or(0);
        pending.consume(written);

        let Some(source_conn) = self.connections.get_mut(&source) else {
            return Ok(0);
        };
        source_conn.buffer = pending;
        source_conn.bytes_written += written as u64;
        let complete = source_conn.role() == Role::Upstream
            && source_conn.state() == ConnectionState::Forwarding
            && source_conn.is_write_complete();

        result?;
        if written > 0 {
            metrics::record_bytes_relayed(direction, written);
        }
        if complete {
            self.complete_exchange(dest, source);
        }
        Ok(written)
    }

    fn close_if_spent(&mut self, token: Token) {
        let spent = self
            .connections
            .get(&token)
            .is_some_and(Connection::is_spent);
        if spent {
            tracing::debug!(connection = token.0, "Peer closed and buffer drained");
            self.close(token);
        }
    }

    /// Re-read clients that went back to Idle; their next request may have
    /// arrived while the previous exchange was in flight.
    pub(super) fn drain_rereads(&mut self) {
        while let Some(token) = self.rereads.pop_front() {
            if self.connections.contains_key(&token) {
                self.on_readable(token);
            }
        }
    }
}
