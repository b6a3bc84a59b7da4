//! Error types shared by the fetch, parse and crawl layers.
//!
//! Ordinary network failures never show up here: the [`Fetcher`] turns them
//! into an empty body. What remains are caller mistakes (bad base URL,
//! misused queue, unknown strategy name), malformed requests, and selector
//! errors that extractors log and skip.
//!
//! [`Fetcher`]: crate::fetcher::Fetcher

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid base url {0:?}: expected an address starting with http, https or ftp")]
    InvalidBaseUrl(String),

    #[error("url queue should only contain the start url, found {0} entries")]
    QueueNotProperlyInitialized(usize),

    #[error("unknown {family} strategy {name:?}")]
    UnknownStrategy { family: &'static str, name: String },

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("request could not be built for {url}: {message}")]
    Request { url: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to evaluate one extraction rule's selector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectorError {
    #[error("invalid css selector {expression:?}: {message}")]
    Css { expression: String, message: String },

    #[error("invalid xpath {expression:?} at offset {offset}: {message}")]
    XPath {
        expression: String,
        offset: usize,
        message: String,
    },

    #[error("invalid regex {expression:?}: {message}")]
    Regex { expression: String, message: String },
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_message() {
        let e = EngineError::QueueNotProperlyInitialized(2);
        assert_eq!(
            e.to_string(),
            "url queue should only contain the start url, found 2 entries"
        );
    }

    #[test]
    fn test_selector_error_converts() {
        let e: EngineError = SelectorError::Regex {
            expression: "(".into(),
            message: "unclosed group".into(),
        }
        .into();
        assert!(matches!(e, EngineError::Selector(SelectorError::Regex { .. })));
    }
}
