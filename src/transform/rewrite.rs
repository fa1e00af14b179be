//! Rewritten path computation.

use std::sync::OnceLock;

use regex::Regex;

use super::matcher::TokenLocation;
use super::ConfigurationError;
use crate::config::schema::RewriteMode;

/// Capture references accepted in templates: `$$`, `${name}`, `$name`.
fn template_reference() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| {
        Regex::new(r"\$(?:\$|\{[^}]*\}|[0-9A-Za-z_]+)").expect("static template reference pattern")
    })
}

/// Compiled rewrite strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRewrite {
    /// Replace every match of the pattern with the expanded template.
    Template(String),
    /// Base prefix followed by everything after the token.
    StripToken { base: String },
}

impl PathRewrite {
    /// Build the rewrite strategy, rejecting literal text that cannot appear
    /// in a URI path.
    pub fn from_config(mode: RewriteMode, replacement: &str) -> Result<Self, ConfigurationError> {
        let literal = match mode {
            RewriteMode::Template => template_reference().replace_all(replacement, ""),
            RewriteMode::StripToken => replacement.into(),
        };

        if let Some(c) = literal.chars().find(|c| !is_path_char(*c)) {
            return Err(ConfigurationError::InvalidReplacement {
                replacement: replacement.to_string(),
                character: c,
            });
        }

        Ok(match mode {
            RewriteMode::Template => Self::Template(replacement.to_string()),
            RewriteMode::StripToken => Self::StripToken {
                base: replacement.to_string(),
            },
        })
    }

    /// Compute the rewritten path for a matched `path`.
    ///
    /// The result always starts with `/`.
    pub fn apply(&self, regex: &Regex, path: &str, location: &TokenLocation<'_>) -> String {
        let rewritten = match self {
            Self::Template(template) => regex.replace_all(path, template.as_str()).into_owned(),
            Self::StripToken { base } => format!("{}{}", base, &path[location.token_end..]),
        };

        if rewritten.starts_with('/') {
            rewritten
        } else {
            format!("/{}", rewritten)
        }
    }
}

/// Characters a rewritten path may carry verbatim.
///
/// `?` and `#` are excluded: the query string is carried over separately.
fn is_path_char(c: char) -> bool {
    c.is_ascii_graphic() && !matches!(c, '?' | '#' | '"' | '<' | '>' | '\\' | '^' | '`' | '{' | '|' | '}')
}
