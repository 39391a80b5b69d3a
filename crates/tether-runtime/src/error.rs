//! Error types for bindings, command configuration and command execution.

use std::sync::Arc;

use tether_core::Cancelled;
use thiserror::Error;

/// A property path expression that is not a plain chain of member accesses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("property path is empty")]
    Empty,

    #[error("empty member name at position {position} in `{path}`")]
    EmptySegment { path: String, position: usize },

    #[error("`{segment}` is not a member name")]
    InvalidIdentifier { segment: String },

    #[error("`{body}` is not rooted at lambda parameter `{param}`")]
    NotRooted { param: String, body: String },

    #[error("`{expression}` does not access any member")]
    NoMemberAccess { expression: String },
}

/// Failure to set up a reactive cell or effect over property paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// `index` is the zero-based position of the offending binding.
    #[error("binding {index} has a malformed path `{path}`: {source}")]
    MalformedPath {
        index: usize,
        path: String,
        #[source]
        source: PathError,
    },
}

/// Incompatible command configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("command `{command}` belongs to an exclusion group and cannot execute concurrently")]
    ConcurrentInGroup { command: String },

    #[error("command `{command}` executes concurrently and cannot join an exclusion group")]
    GroupedConcurrent { command: String },
}

/// Outcome of a command operation that did not run to completion.
///
/// Captured into the command's [`Execution`](crate::command::Execution);
/// never raised from `execute`.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// The operation observed its cancellation token and stopped.
    #[error("operation cancelled")]
    Cancelled,

    #[error("{message}")]
    Failed { message: String },

    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync>),

    #[error("operation panicked: {message}")]
    Panicked { message: String },

    /// The background worker could not be started or went away.
    #[error("worker thread failed: {message}")]
    Worker { message: String },
}

impl CommandError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Arc::new(error))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<Cancelled> for CommandError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
