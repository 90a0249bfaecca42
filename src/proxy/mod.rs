//! Forward proxy core.
//!
//! # Data Flow
//! ```text
//! poll wake-up
//!     → server.rs (accept / read / write dispatch, close, idle sweep)
//!     → relay.rs (fill buffers, drain counterpart buffers, back-pressure)
//!     → orchestrator.rs (parse headers, open or reuse upstream, pair, reset)
//!
//! Client Idle ──GET──────▶ Forwarding ──response written──▶ Idle
//!      │
//!      └──────CONNECT────▶ Tunneling (blind relay until closed)
//! ```
//!
//! Connections live in an arena keyed by [`mio::Token`]. A connection names
//! its counterpart by token only; a token missing from the arena means the
//! counterpart is gone. Tokens are never reused.
//!
//! Everything runs on the thread that calls [`ProxyServer::run`]. The write
//! path reads the counterpart's buffer directly, which is sound only because
//! no other thread touches the arena.

mod orchestrator;
mod relay;
mod server;

pub use server::ProxyServer;
