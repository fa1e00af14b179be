//! The path token transformer.

use std::future::Future;

use axum::{
    body::Body,
    http::{header, uri::PathAndQuery, HeaderName, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::{debug, trace, warn};

use super::header::HeaderInjector;
use super::matcher::{PathMatcher, TokenGroup};
use super::rewrite::PathRewrite;
use crate::config::schema::{NoMatchPolicy, TransformConfig};
use crate::observability::metrics;

/// Errors raised while building a transformer.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("pattern `{0}` has no capturing group to extract a token from")]
    MissingCaptureGroup(String),

    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    #[error("header prefix `{0}` is not a valid header value")]
    InvalidHeaderPrefix(String),

    #[error("replacement `{replacement}` contains {character:?}, which is not allowed in a path")]
    InvalidReplacement { replacement: String, character: char },

    #[error("fallback location `{0}` is not a valid header value")]
    InvalidFallbackLocation(String),
}

/// Result of matching a path: the token and the path to forward to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch<'p> {
    /// Token as it appears in the path. `None` when the group captured nothing.
    pub token: Option<&'p str>,
    /// Path with the token segment removed.
    pub rewritten_path: String,
}

/// What the transformer decided for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand the request to the next handler.
    Forward {
        /// Whether the header and path were rewritten.
        rewritten: bool,
    },
    /// Answer with a redirect to the fallback location.
    Redirect,
}

impl Decision {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Forward { rewritten: true } => "rewritten",
            Decision::Forward { rewritten: false } => "passed_through",
            Decision::Redirect => "redirected",
        }
    }
}

/// Moves a token embedded in the request path into a request header.
///
/// Built once from a [`TransformConfig`] and then shared read-only between
/// requests; see [`crate::transform::path_token_middleware`] for the axum
/// adapter.
#[derive(Debug)]
pub struct PathTokenTransformer {
    matcher: PathMatcher,
    rewrite: PathRewrite,
    header: HeaderInjector,
    on_no_match: NoMatchPolicy,
    fallback_location: HeaderValue,
}

impl PathTokenTransformer {
    /// Compile the configuration into a transformer.
    pub fn new(config: &TransformConfig) -> Result<Self, ConfigurationError> {
        let matcher = PathMatcher::compile(&config.pattern)?;
        let rewrite = PathRewrite::from_config(config.rewrite_mode, &config.replacement)?;
        let header = HeaderInjector::new(&config.header_name, &config.header_prefix)?;
        let fallback_location = HeaderValue::from_str(&config.fallback_location).map_err(|_| {
            ConfigurationError::InvalidFallbackLocation(config.fallback_location.clone())
        })?;

        debug!(
            pattern = %config.pattern,
            replacement = %config.replacement,
            rewrite_mode = ?config.rewrite_mode,
            token_group = ?matcher.token_group(),
            header_name = %header.name(),
            has_prefix = !config.header_prefix.is_empty(),
            on_no_match = ?config.on_no_match,
            "Path token transformer initialized"
        );

        Ok(Self {
            matcher,
            rewrite,
            header,
            on_no_match: config.on_no_match,
            fallback_location,
        })
    }

    /// Header the token is written to.
    pub fn header_name(&self) -> &HeaderName {
        self.header.name()
    }

    /// Which capture group the token is read from.
    pub fn token_group(&self) -> TokenGroup {
        self.matcher.token_group()
    }

    /// Configured no-match behavior.
    pub fn no_match_policy(&self) -> NoMatchPolicy {
        self.on_no_match
    }

    /// Match `path` and compute the rewritten path.
    pub fn match_path<'p>(&self, path: &'p str) -> Option<TokenMatch<'p>> {
        let location = self.matcher.locate(path)?;
        let rewritten_path = self.rewrite.apply(self.matcher.regex(), path, &location);

        Some(TokenMatch {
            token: location.token,
            rewritten_path,
        })
    }

    /// Header value for a token (the prefix alone when there is none).
    pub fn header_value(&self, token: Option<&str>) -> HeaderValue {
        self.header.value_for(token)
    }

    /// Rewrite the request in place and decide where it goes next.
    ///
    /// On a match the header is set and the path replaced, keeping the
    /// original query string. Otherwise the request is left untouched.
    pub fn apply<B>(&self, request: &mut Request<B>) -> Decision {
        let (value, uri, token_len) = {
            let Some(found) = self.match_path(request.uri().path()) else {
                return self.no_match();
            };

            let uri = match rewrite_uri(request.uri(), &found.rewritten_path) {
                Ok(uri) => uri,
                Err(e) => {
                    warn!(
                        rewritten_path = %found.rewritten_path,
                        error = %e,
                        "Rewritten path is not a valid URI, treating request as unmatched"
                    );
                    return self.no_match();
                }
            };

            (
                self.header.value_for(found.token),
                uri,
                found.token.map_or(0, str::len),
            )
        };

        self.header.inject(request, value);
        *request.uri_mut() = uri;

        debug!(
            header = %self.header.name(),
            token_len,
            rewritten_path = %request.uri().path(),
            "Moved path token into header"
        );

        Decision::Forward { rewritten: true }
    }

    /// Apply the transformation, then either delegate to `next` exactly once
    /// or answer with the fallback redirect.
    pub async fn process<F, Fut>(&self, mut request: Request<Body>, next: F) -> Response
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let decision = self.apply(&mut request);
        metrics::record_decision(&decision);

        match decision {
            Decision::Forward { .. } => next(request).await,
            Decision::Redirect => self.redirect_response(),
        }
    }

    /// `302 Found` pointing at the fallback location.
    pub fn redirect_response(&self) -> Response {
        (
            StatusCode::FOUND,
            [(header::LOCATION, self.fallback_location.clone())],
        )
            .into_response()
    }

    fn no_match(&self) -> Decision {
        match self.on_no_match {
            NoMatchPolicy::PassThrough => {
                trace!("Path did not match, passing through");
                Decision::Forward { rewritten: false }
            }
            NoMatchPolicy::Redirect => {
                debug!(location = ?self.fallback_location, "Path did not match, redirecting");
                Decision::Redirect
            }
        }
    }
}

/// Replace the path of `original`, keeping scheme, authority and query.
fn rewrite_uri(original: &Uri, path: &str) -> Result<Uri, axum::http::Error> {
    let path_and_query = match original.query() {
        Some(query) => PathAndQuery::try_from(format!("{}?{}", path, query))?,
        None => PathAndQuery::try_from(path)?,
    };

    let mut parts = original.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Ok(Uri::from_parts(parts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RewriteMode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn bearer_config() -> TransformConfig {
        TransformConfig {
            pattern: "/sk/(?P<token>[^/]+)(.*)".to_string(),
            replacement: "$2".to_string(),
            header_name: "Authorization".to_string(),
            header_prefix: "Bearer ".to_string(),
            ..TransformConfig::default()
        }
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_match_path() {
        let transformer = PathTokenTransformer::new(&bearer_config()).unwrap();
        let found = transformer.match_path("/sk/validtoken123/resource").unwrap();
        assert_eq!(found.token, Some("validtoken123"));
        assert_eq!(found.rewritten_path, "/resource");

        assert!(transformer.match_path("/invalid/path").is_none());
    }

    #[test]
    fn test_apply_sets_header_and_path() {
        let transformer = PathTokenTransformer::new(&bearer_config()).unwrap();
        let mut req = request("/sk/validtoken123/resource");

        let decision = transformer.apply(&mut req);

        assert_eq!(decision, Decision::Forward { rewritten: true });
        assert_eq!(req.headers()["authorization"], "Bearer validtoken123");
        assert_eq!(req.uri().path(), "/resource");
    }

    #[test]
    fn test_apply_keeps_query_string() {
        let transformer = PathTokenTransformer::new(&bearer_config()).unwrap();
        let mut req = request("/sk/token789/api?param1=value1&param2=value2");

        transformer.apply(&mut req);

        assert_eq!(req.headers()["authorization"], "Bearer token789");
        assert_eq!(req.uri().path(), "/api");
        assert_eq!(req.uri().query(), Some("param1=value1&param2=value2"));
    }

    #[test]
    fn test_apply_keeps_absolute_uri_authority() {
        let transformer = PathTokenTransformer::new(&bearer_config()).unwrap();
        let mut req = request("http://example.com/sk/abc/v1/models");

        transformer.apply(&mut req);

        assert_eq!(req.uri().to_string(), "http://example.com/v1/models");
    }

    #[test]
    fn test_apply_no_match_pass_through() {
        let transformer = PathTokenTransformer::new(&bearer_config()).unwrap();
        let mut req = request("/invalid/path");

        let decision = transformer.apply(&mut req);

        assert_eq!(decision, Decision::Forward { rewritten: false });
        assert!(req.headers().get("authorization").is_none());
        assert_eq!(req.uri().path(), "/invalid/path");
    }

    #[test]
    fn test_apply_is_not_idempotent() {
        let transformer = PathTokenTransformer::new(&bearer_config()).unwrap();
        let mut req = request("/sk/abc/resource");

        assert_eq!(transformer.apply(&mut req), Decision::Forward { rewritten: true });
        assert_eq!(transformer.apply(&mut req), Decision::Forward { rewritten: false });
        assert_eq!(req.headers()["authorization"], "Bearer abc");
        assert_eq!(req.uri().path(), "/resource");
    }

    #[test]
    fn test_empty_named_capture_sets_prefix_only() {
        let config = TransformConfig {
            pattern: "^/sk/(?P<token>[^/]*)(.*)$".to_string(),
            ..bearer_config()
        };
        let transformer = PathTokenTransformer::new(&config).unwrap();
        let mut req = request("/sk//resource");

        transformer.apply(&mut req);

        assert_eq!(req.headers()["authorization"], "Bearer ");
        assert_eq!(req.uri().path(), "/resource");
    }

    #[test]
    fn test_token_never_repeated_in_header() {
        let transformer = PathTokenTransformer::new(&bearer_config()).unwrap();
        let mut req = request("/sk/abc/sk/abc/x");

        transformer.apply(&mut req);

        let value = req.headers()["authorization"].to_str().unwrap();
        assert_eq!(value.matches("abc").count(), 1);
    }

    #[test]
    fn test_strip_token_mode() {
        let config = TransformConfig {
            pattern: "^/sk/(?P<token>[^/]+)".to_string(),
            replacement: "/v2".to_string(),
            rewrite_mode: RewriteMode::StripToken,
            ..bearer_config()
        };
        let transformer = PathTokenTransformer::new(&config).unwrap();
        let mut req = request("/sk/abc/users?page=2");

        transformer.apply(&mut req);

        assert_eq!(req.headers()["authorization"], "Bearer abc");
        assert_eq!(req.uri().path(), "/v2/users");
        assert_eq!(req.uri().query(), Some("page=2"));
    }

    #[test]
    fn test_redirect_decision() {
        let config = TransformConfig {
            pattern: "^/sk/(?P<token>[^/]+).*$".to_string(),
            on_no_match: NoMatchPolicy::Redirect,
            fallback_location: "/".to_string(),
            ..bearer_config()
        };
        let transformer = PathTokenTransformer::new(&config).unwrap();
        let mut req = request("/invalid/path");

        assert_eq!(transformer.apply(&mut req), Decision::Redirect);

        let response = transformer.redirect_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn test_process_delegates_once() {
        let transformer = PathTokenTransformer::new(&bearer_config()).unwrap();
        let calls = AtomicU32::new(0);

        let response = transformer
            .process(request("/sk/abc/resource"), |req| {
                calls.fetch_add(1, Ordering::SeqCst);
                let path = req.uri().path().to_string();
                async move { (StatusCode::OK, path).into_response() }
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_process_redirect_skips_delegate() {
        let config = TransformConfig {
            on_no_match: NoMatchPolicy::Redirect,
            fallback_location: "/login".to_string(),
            ..bearer_config()
        };
        let transformer = PathTokenTransformer::new(&config).unwrap();
        let calls = AtomicU32::new(0);

        let response = transformer
            .process(request("/invalid/path"), |_req| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::OK.into_response() }
            })
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_configuration() {
        let config = TransformConfig {
            pattern: "/sk/(?P<token>[^/]+".to_string(),
            ..bearer_config()
        };
        assert!(matches!(
            PathTokenTransformer::new(&config),
            Err(ConfigurationError::InvalidPattern(_))
        ));

        let config = TransformConfig {
            fallback_location: "/\n".to_string(),
            ..bearer_config()
        };
        assert!(matches!(
            PathTokenTransformer::new(&config),
            Err(ConfigurationError::InvalidFallbackLocation(_))
        ));
    }

    #[test]
    fn test_transformer_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PathTokenTransformer>();
    }
}
