//! Library error type.

use super::parser::ValidationError;
use super::tokens::ResolveError;
use crate::graph::SortError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("{} validation error(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    #[error("unknown artifact type '{kind}' for '{id}'")]
    UnknownKind { id: String, kind: String },

    #[error("invalid properties for {kind} '{id}': {message}")]
    Properties {
        id: String,
        kind: String,
        message: String,
    },

    #[error("{context}: {source}")]
    Ordering {
        context: String,
        #[source]
        source: SortError<String>,
    },

    #[error("stack '{stack}': {source}")]
    Resolve {
        stack: String,
        #[source]
        source: ResolveError,
    },

    #[error("unknown artifact '{0}'")]
    UnknownArtifact(String),

    #[error("no artifacts match {0}")]
    NoMatch(String),

    #[error("invalid stack selector '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn ordering(context: impl Into<String>, source: SortError<String>) -> Self {
        Self::Ordering {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn resolve(stack: &str, source: ResolveError) -> Self {
        Self::Resolve {
            stack: stack.to_string(),
            source,
        }
    }

    /// Stuck keys when this error is a dependency cycle.
    pub fn cycle_members(&self) -> Option<&[String]> {
        match self {
            Self::Ordering { source, .. } => source.stuck(),
            _ => None,
        }
    }
}
