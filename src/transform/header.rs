//! Header value construction and injection.

use std::borrow::Cow;

use axum::http::{HeaderName, HeaderValue, Request};

use super::ConfigurationError;

/// Writes the extracted token into the configured request header.
#[derive(Debug, Clone)]
pub struct HeaderInjector {
    name: HeaderName,
    prefix: String,
    /// Used when the token group matched nothing: the prefix alone.
    fallback: HeaderValue,
}

impl HeaderInjector {
    /// Validate the header name and prefix.
    pub fn new(name: &str, prefix: &str) -> Result<Self, ConfigurationError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigurationError::InvalidHeaderName(name.to_string()))?;
        let fallback = HeaderValue::from_str(prefix)
            .map_err(|_| ConfigurationError::InvalidHeaderPrefix(prefix.to_string()))?;

        Ok(Self {
            name,
            prefix: prefix.to_string(),
            fallback,
        })
    }

    /// Target header name.
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// Build `prefix + token`, or the prefix alone when there is no token.
    ///
    /// Percent-encoded tokens are decoded first. If the decoded text is not a
    /// legal header value the token is used exactly as it appeared in the path.
    pub fn value_for(&self, token: Option<&str>) -> HeaderValue {
        let Some(token) = token else {
            return self.fallback.clone();
        };

        let decoded = urlencoding::decode(token).unwrap_or(Cow::Borrowed(token));
        HeaderValue::from_str(&format!("{}{}", self.prefix, decoded))
            .or_else(|_| HeaderValue::from_str(&format!("{}{}", self.prefix, token)))
            .unwrap_or_else(|_| self.fallback.clone())
    }

    /// Set the header, replacing every earlier value.
    pub fn inject<B>(&self, request: &mut Request<B>, value: HeaderValue) {
        request.headers_mut().insert(self.name.clone(), value);
    }
}
