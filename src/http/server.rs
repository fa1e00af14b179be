//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding handler
//! - Wire up middleware (request ID, tracing, timeout, path token transform)
//! - Bind server to listener
//! - Forward transformed requests to the upstream
//! - Swap in reloaded transformers without dropping traffic

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, InvalidUri, PathAndQuery, Scheme},
        Request, StatusCode, Uri,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::config::ProxyConfig;
use crate::http::request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
use crate::observability::metrics;
use crate::transform::{
    hot_swap_middleware, middleware::shared, ConfigurationError, PathTokenTransformer,
    SharedTransformer,
};

/// Errors raised while parsing the upstream URL.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported scheme `{0}`, only http is supported")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("URL must not carry a path, query or fragment: `{0}`")]
    UnexpectedPath(String),

    #[error("invalid authority: {0}")]
    InvalidAuthority(#[from] InvalidUri),
}

/// Errors raised while building the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("transform configuration: {0}")]
    Transform(#[from] ConfigurationError),

    #[error("upstream configuration: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Where forwarded requests are sent.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
}

impl Upstream {
    /// Parse an upstream base URL such as `http://127.0.0.1:3000`.
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let url = Url::parse(raw)?;

        if url.scheme() != "http" {
            return Err(UpstreamError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url.host_str().ok_or(UpstreamError::MissingHost)?;
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(UpstreamError::UnexpectedPath(raw.to_string()));
        }

        let authority = match url.port() {
            Some(port) => Authority::from_str(&format!("{}:{}", host, port))?,
            None => Authority::from_str(host)?,
        };

        Ok(Self {
            scheme: Scheme::HTTP,
            authority,
        })
    }

    /// Upstream authority (`host[:port]`).
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Re-target `uri` at the upstream, keeping its path and query.
    fn target(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Ok(Uri::from_parts(parts)?)
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Arc<Upstream>,
}

/// HTTP server for the path token proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    transformer: SharedTransformer,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let transformer = shared(PathTokenTransformer::new(&config.transform)?);
        let upstream = Arc::new(Upstream::parse(&config.upstream.url)?);

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState { client, upstream };
        let router = Self::build_router(&config, state, transformer.clone());

        Ok(Self {
            router,
            config,
            transformer,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState, transformer: SharedTransformer) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(transformer, hot_swap_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Every configuration received on `config_updates` rebuilds the
    /// transformer; a configuration that fails to compile is rejected and the
    /// running transformer stays in place.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            "HTTP server starting"
        );

        tokio::spawn(apply_config_updates(
            self.transformer.clone(),
            self.config.clone(),
            config_updates,
        ));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Handle to the live transformer.
    pub fn transformer(&self) -> SharedTransformer {
        self.transformer.clone()
    }
}

/// Span for one request.
///
/// The URI is left out: until the transformer runs, its path still carries
/// the token.
fn request_span(request: &Request<Body>) -> tracing::Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        request_id = %request.request_id(),
    )
}

/// Rebuild and swap the transformer for every configuration update.
async fn apply_config_updates(
    transformer: SharedTransformer,
    mut current: ProxyConfig,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
) {
    while let Some(new_config) = updates.recv().await {
        if new_config.listener.bind_address != current.listener.bind_address
            || new_config.upstream.url != current.upstream.url
            || new_config.timeouts.request_secs != current.timeouts.request_secs
        {
            tracing::warn!("Listener, upstream and timeout changes take effect after a restart");
        }

        match PathTokenTransformer::new(&new_config.transform) {
            Ok(next) => {
                transformer.store(Arc::new(next));
                current.transform = new_config.transform;
                tracing::info!("Path token transformer reloaded");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Rejected transformer reload, keeping current configuration"
                );
            }
        }
    }
}

/// Forward the (already transformed) request to the upstream.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request.request_id().to_string();
    let method = request.method().to_string();

    let (mut parts, body) = request.into_parts();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %parts.uri.path(),
        "Forwarding request"
    );

    parts.uri = match state.upstream.target(&parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Cannot build upstream URI");
            metrics::record_request(&method, 400, start_time);
            return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
        }
    };

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let response: Response<Incoming> = response;
            metrics::record_request(&method, response.status().as_u16(), start_time);

            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                upstream = %state.upstream.authority(),
                error = %e,
                "Upstream error"
            );
            metrics::record_request(&method, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
