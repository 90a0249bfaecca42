//! Single-threaded forward HTTP proxy.
//!
//! Clients send `GET http://…` or `CONNECT host:port`. GET requests are
//! rebuilt and forwarded over a kept-alive upstream connection, with the
//! response framed by Content-Length; CONNECT opens a blind tunnel. All
//! sockets are multiplexed on one thread by readiness polling.
//!
//! ```no_run
//! use forward_proxy::{ProxyConfig, ProxyServer};
//!
//! let server = ProxyServer::bind(ProxyConfig::default())?;
//! server.run()?;
//! # Ok::<(), forward_proxy::ProxyError>(())
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, Result};
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;
