//! Error types for modelsql

use thiserror::Error;

/// Result type alias for modelsql operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Error types for schema compilation, SQL building and execution
#[derive(Debug, Error)]
pub enum ModelError {
    /// SQL operator outside the allowlist
    #[error("The operator \"{0}\" is not permitted")]
    Operator(String),

    /// Builder misuse detected at build time
    #[error("Cannot generate SQL, {0}")]
    Builder(String),

    /// Schema shape rejected at the load boundary
    #[error("Schema error: {0}")]
    Compile(String),

    /// Migration state or artifact error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Statement execution failure, original driver error preserved
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

impl ModelError {
    /// Create an operator rejection error
    pub fn operator(op: impl Into<String>) -> Self {
        Self::Operator(op.into())
    }

    /// Create a builder misuse error
    pub fn builder(message: impl Into<String>) -> Self {
        Self::Builder(message.into())
    }

    /// Create a schema compile error
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    /// Create a migration error
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration(message.into())
    }

    /// Wrap a driver failure, keeping the source error
    pub fn execution(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Check if this is an operator rejection
    pub fn is_operator(&self) -> bool {
        matches!(self, Self::Operator(_))
    }

    /// Check if this is a builder misuse error
    pub fn is_builder(&self) -> bool {
        matches!(self, Self::Builder(_))
    }
}

impl From<tokio_postgres::Error> for ModelError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Execution {
            message: err.to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for ModelError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
