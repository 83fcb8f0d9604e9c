//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engines, bridge and socket drivers produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every event carries the engine name so output is comparable across engines
//! - Recording metrics without an installed exporter is a no-op

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
