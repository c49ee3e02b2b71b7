//! Error types for coinpress.
//!
//! Library crates use [`CoinpressError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all coinpress operations.
#[derive(Debug, thiserror::Error)]
pub enum CoinpressError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error (mail API, remote checks).
    #[error("network error: {0}")]
    Network(String),

    /// Front matter or other structured text could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Content validation error (missing fields, bad dates, duplicate slugs).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// External build process error (spawn, wait, output capture).
    #[error("build error: {0}")]
    Build(String),

    /// Search index construction or (de)serialization error.
    #[error("search error: {0}")]
    Search(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CoinpressError>;

impl CoinpressError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a build error from any displayable message.
    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CoinpressError::config("missing base_url");
        assert_eq!(err.to_string(), "config error: missing base_url");

        let err = CoinpressError::validation("posts/a.mdx is missing: title, author");
        assert!(err.to_string().contains("missing: title, author"));

        let err = CoinpressError::build("failed to spawn npm");
        assert_eq!(err.to_string(), "build error: failed to spawn npm");
    }

    #[test]
    fn io_error_keeps_path() {
        let err = CoinpressError::io(
            "content/posts",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("content/posts"));
    }
}
