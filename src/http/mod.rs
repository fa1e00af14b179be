//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup)
//!     → request.rs (add request ID)
//!     → transform (token moved from path into header, or redirect)
//!     → server.rs (forward to upstream, stream response back)
//! ```

pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
pub use server::{HttpServer, ServerError, Upstream, UpstreamError};
