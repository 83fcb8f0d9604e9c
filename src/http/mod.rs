//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Native request (axum / hyper / evented engine)
//!     → bridge.rs (normalize into request.rs, body.rs)
//!     → handler.rs (user handler, may request an upgrade)
//!     → bridge.rs (response.rs → native response, or hand over to ws)
//!     → Send to client
//! ```

pub mod body;
pub mod handler;
pub mod request;
pub mod response;

pub(crate) mod bridge;

pub use body::{Body, BodyAccumulator, BodyError, BodyEvent, BodyStream};
pub use handler::{Handler, HandlerContext};
pub use request::{Request, RequestError};
pub use response::Response;
