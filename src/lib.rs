//! Path token proxy library.
//!
//! Moves an authorization token embedded in the request path into a header,
//! strips it from the path and hands the request to the next handler.
//!
//! ```text
//! GET /sk/abc123/v1/models
//!     → Authorization: Bearer abc123
//!     → GET /v1/models
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod transform;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use transform::{path_token_middleware, ConfigurationError, Decision, PathTokenTransformer};
