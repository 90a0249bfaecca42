//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Bind listener → Run loop
//!
//! Shutdown (shutdown.rs):
//!     trigger() → wake poller → close every connection → run() returns
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The loop itself never stops on per-connection errors

pub mod shutdown;

pub use shutdown::Shutdown;
