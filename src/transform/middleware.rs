//! Axum adapters for the path token transformer.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::PathTokenTransformer;

/// Transformer handle that can be replaced while requests are in flight.
pub type SharedTransformer = Arc<ArcSwap<PathTokenTransformer>>;

/// Wrap a transformer for [`hot_swap_middleware`].
pub fn shared(transformer: PathTokenTransformer) -> SharedTransformer {
    Arc::new(ArcSwap::from_pointee(transformer))
}

/// Middleware for a fixed transformer.
///
/// ```ignore
/// let app = Router::new()
///     .route("/{*path}", any(handler))
///     .layer(middleware::from_fn_with_state(Arc::new(transformer), path_token_middleware));
/// ```
pub async fn path_token_middleware(
    State(transformer): State<Arc<PathTokenTransformer>>,
    request: Request,
    next: Next,
) -> Response {
    transformer.process(request, |req| next.run(req)).await
}

/// Middleware for a reloadable transformer.
///
/// Each request loads the current transformer once and keeps it until the
/// response is produced, so a reload never splits a request.
pub async fn hot_swap_middleware(
    State(transformer): State<SharedTransformer>,
    request: Request,
    next: Next,
) -> Response {
    let transformer = transformer.load_full();
    transformer.process(request, |req| next.run(req)).await
}
