//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (non-blocking accept)
//!     → connection.rs (buffer, counters, exchange state, counterpart token)
//!
//! Outgoing origin connection
//!     → upstream.rs (bounded connect, then non-blocking)
//!     → connection.rs
//!
//! Connection States:
//!     Idle → Forwarding → Idle
//!     Idle → Tunneling (until closed)
//! ```

pub mod buffer;
pub mod connection;
pub mod listener;
pub mod upstream;

pub use buffer::Buffer;
pub use connection::{Connection, ConnectionState, Role};
pub use listener::Listener;
