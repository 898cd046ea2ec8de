use crate::subject::EntityKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid {kind} id: id must be non-zero")]
    InvalidId { kind: EntityKind },
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("invalid edge: {0}")]
    InvalidEdge(String),
    #[error("policy engine failed to {context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: casbin::Error,
    },
}

impl AuthzError {
    /// Wrap a casbin failure with the operation that triggered it.
    pub fn engine(context: impl Into<String>) -> impl FnOnce(casbin::Error) -> AuthzError {
        let context = context.into();
        move |source| AuthzError::Engine { context, source }
    }

    /// Report a failure from a backend that is not casbin itself.
    pub fn backend(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> AuthzError {
        AuthzError::Engine {
            context: context.into(),
            source: casbin::Error::AdapterError(casbin::error::AdapterError(source.into())),
        }
    }

    pub fn is_validation(&self) -> bool {
        !matches!(self, AuthzError::Engine { .. })
    }
}

pub type AuthzResult<T> = Result<T, AuthzError>;
