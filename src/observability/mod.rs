//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Event loop and orchestrator produce:
//!     → logging.rs (tracing subscriber, structured events)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
