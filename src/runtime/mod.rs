//! Runtime (engine) detection.
//!
//! # Data Flow
//! ```text
//! serve(options)
//!     → detect.rs (UNISERVE_ENGINE env + compiled-in engines)
//!     → Runtime::{Axum, Hyper, Evented, Unknown}
//!     → dispatcher picks the matching Engine implementation
//! ```
//!
//! # Design Decisions
//! - Detection never fails; misconfiguration yields `Unknown`
//! - The dispatcher owns the error for `Unknown`

pub mod detect;

pub use detect::{Runtime, ENGINE_ENV};
