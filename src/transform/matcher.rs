//! Path pattern compilation and token lookup.
//!
//! # Responsibilities
//! - Compile the configured pattern once
//! - Decide which capture group carries the token
//! - Locate the token inside a matching path
//!
//! # Design Decisions
//! - A group named `token` wins over positional groups
//! - Patterns without any capturing group are rejected up front
//! - Matching is unanchored unless the pattern anchors itself

use regex::{Captures, Regex};

use super::ConfigurationError;

/// Name of the capture group that carries the token.
pub const TOKEN_GROUP: &str = "token";

/// Which capture group the token is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGroup {
    /// The group named `token`.
    Named,
    /// The first positional capturing group.
    First,
}

/// A compiled path pattern.
#[derive(Debug)]
pub struct PathMatcher {
    regex: Regex,
    group: TokenGroup,
}

/// Where the token sits inside a matched path.
#[derive(Debug)]
pub struct TokenLocation<'p> {
    /// All captures of the first match.
    pub captures: Captures<'p>,
    /// The token text, `None` when the group is absent or empty.
    pub token: Option<&'p str>,
    /// Byte offset just past the token, or past the whole match when the
    /// token group did not participate.
    pub token_end: usize,
}

impl PathMatcher {
    /// Compile a path pattern.
    pub fn compile(pattern: &str) -> Result<Self, ConfigurationError> {
        let regex = Regex::new(pattern)?;

        // Group 0 is the whole match and is always present.
        if regex.captures_len() < 2 {
            return Err(ConfigurationError::MissingCaptureGroup(pattern.to_string()));
        }

        let group = if regex.capture_names().flatten().any(|name| name == TOKEN_GROUP) {
            TokenGroup::Named
        } else {
            TokenGroup::First
        };

        Ok(Self { regex, group })
    }

    /// The compiled regex.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Which group carries the token.
    pub fn token_group(&self) -> TokenGroup {
        self.group
    }

    /// Apply the pattern to `path` and locate the token.
    pub fn locate<'p>(&self, path: &'p str) -> Option<TokenLocation<'p>> {
        let captures = self.regex.captures(path)?;

        let group = match self.group {
            TokenGroup::Named => captures.name(TOKEN_GROUP),
            TokenGroup::First => captures.get(1),
        };

        let token_end = match group {
            Some(m) => m.end(),
            None => captures.get(0).map_or(0, |m| m.end()),
        };
        let token = group.map(|m| m.as_str()).filter(|t| !t.is_empty());

        Some(TokenLocation {
            captures,
            token,
            token_end,
        })
    }
}
