//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the path token proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream server that receives the rewritten requests.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Path token transformation rule.
    pub transform: TransformConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream (e.g., "http://127.0.0.1:3000").
    /// Only the scheme and authority are used.
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// How the rewritten path is computed once the pattern matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// `replacement` is a template applied to every match of the pattern,
    /// with `$1`, `${name}` style capture references.
    #[default]
    Template,
    /// `replacement` is a base prefix; the new path is the base followed by
    /// everything after the token.
    StripToken,
}

/// What happens to requests whose path does not match the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchPolicy {
    /// Forward the request untouched.
    #[default]
    PassThrough,
    /// Answer with `302 Found` pointing at `fallback_location`.
    Redirect,
}

/// Path token transformation rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Regular expression applied to the request path. The token is taken
    /// from the group named `token`, or the first capturing group.
    pub pattern: String,

    /// Rewrite template or base prefix, depending on `rewrite_mode`.
    pub replacement: String,

    /// Rewrite strategy.
    pub rewrite_mode: RewriteMode,

    /// Header receiving the token.
    pub header_name: String,

    /// Prepended verbatim to the token (e.g. "Bearer ").
    pub header_prefix: String,

    /// Behavior for paths that do not match.
    pub on_no_match: NoMatchPolicy,

    /// Redirect target used by `NoMatchPolicy::Redirect`.
    pub fallback_location: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            pattern: "/sk/(?P<token>[^/]+)(.*)".to_string(),
            replacement: "$2".to_string(),
            rewrite_mode: RewriteMode::Template,
            header_name: "Authorization".to_string(),
            header_prefix: String::new(),
            on_no_match: NoMatchPolicy::PassThrough,
            fallback_location: "/".to_string(),
        }
    }
}
