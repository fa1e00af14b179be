//! Path token transformation subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → matcher.rs (apply compiled pattern, locate token)
//!     → rewrite.rs (compute path without the token segment)
//!     → header.rs (prefix + token into the configured header)
//!     → path_token.rs (mutate request in place, decide next step)
//!     → middleware.rs (delegate to next handler, or 302 on no match)
//! ```
//!
//! # Design Decisions
//! - Pattern compiled once at construction, shared read-only across requests
//! - Reloads build a new transformer and swap it in whole
//! - Header is always overwritten, never appended
//! - Tokens never appear in logs, only their length

pub mod header;
pub mod matcher;
pub mod middleware;
pub mod path_token;
pub mod rewrite;

pub use middleware::{hot_swap_middleware, path_token_middleware, SharedTransformer};
pub use path_token::{ConfigurationError, Decision, PathTokenTransformer, TokenMatch};
