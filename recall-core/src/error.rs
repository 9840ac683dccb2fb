//! Error types for declaration and invocation.

use std::error::Error as StdError;
use std::sync::Arc;

/// A user computation error, shared between every caller that joined the
/// same invocation.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors produced by class declaration and cached-method invocation.
///
/// The type is `Clone` because a single computation failure is handed to
/// every caller that joined the failing invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// A cached method was declared on a member that cannot be invoked.
    #[error("member `{member}` of `{class}` is a tracked property, not an invocable computation")]
    NotInvocable { class: Arc<str>, member: Arc<str> },

    /// The same member name was declared twice on one class.
    #[error("member `{member}` is declared more than once on `{class}`")]
    DuplicateMember { class: Arc<str>, member: Arc<str> },

    /// A dependency names something the class never declared.
    #[error("cached method `{method}` of `{class}` depends on undeclared member `{dependency}`")]
    UnknownDependency {
        class: Arc<str>,
        method: Arc<str>,
        dependency: Arc<str>,
    },

    /// The declared dependencies form a cycle and the class disallows cycles.
    #[error("dependency cycle on `{class}`: {}", .path.join(" -> "))]
    DependencyCycle { class: Arc<str>, path: Vec<Arc<str>> },

    /// Class options could not be parsed.
    #[error("invalid class options: {0}")]
    InvalidOptions(Arc<serde_json::Error>),

    /// The underlying computation returned an error.
    #[error("computation of `{method}` failed: {source}")]
    Computation {
        method: Arc<str>,
        #[source]
        source: SharedError,
    },

    /// The underlying computation panicked.
    #[error("computation of `{method}` panicked")]
    Panicked { method: Arc<str> },

    /// The computation task was torn down before it finished.
    #[error("computation of `{method}` was aborted")]
    Aborted { method: Arc<str> },

    /// A computation awaited its own result on the same instance.
    #[error("cached method `{method}` awaited itself on the same instance")]
    Reentrant { method: Arc<str> },

    /// A cached method was called outside of a tokio runtime.
    #[error("cached method `{method}` was called outside of a tokio runtime")]
    NoRuntime { method: Arc<str> },

    /// A stored value did not have the type the handle expects.
    #[error("stored value for `{member}` has an unexpected type")]
    TypeMismatch { member: Arc<str> },
}

impl CacheError {
    /// Whether this error was raised while declaring or building a class.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotInvocable { .. }
                | Self::DuplicateMember { .. }
                | Self::UnknownDependency { .. }
                | Self::DependencyCycle { .. }
                | Self::InvalidOptions(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidOptions(Arc::new(err))
    }
}

/// Result alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = CacheError::DependencyCycle {
            class: "Person".into(),
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle on `Person`: a -> b -> a");
        assert!(err.is_configuration());
    }

    #[test]
    fn computation_errors_are_not_configuration() {
        let err = CacheError::Panicked { method: "m".into() };
        assert!(!err.is_configuration());
    }
}
