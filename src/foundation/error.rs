/// Convenience result type used across tilefilter.
pub type TileResult<T> = Result<T, TileError>;

/// Top-level error taxonomy for the fallible boundaries of the engine.
///
/// The reconciliation pipeline itself never surfaces these to the host page; they are returned
/// from parsing, configuration and persistence entry points and logged everywhere else.
#[derive(thiserror::Error, Debug)]
pub enum TileError {
    /// A match rule could not be parsed.
    #[error("match rule error: {0}")]
    Rule(String),

    /// The persistent store or the message bus is unreachable, or rejected a write.
    #[error("store error: {0}")]
    Store(String),

    /// The rendering surface rejected an operation (detached node, unknown handle).
    #[error("surface error: {0}")]
    Surface(String),

    /// Invalid reconciler options.
    #[error("config error: {0}")]
    Config(String),

    /// Errors when serializing or deserializing persisted or replayed data.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TileError {
    /// Build a [`TileError::Rule`] value.
    pub fn rule(msg: impl Into<String>) -> Self {
        Self::Rule(msg.into())
    }

    /// Build a [`TileError::Store`] value.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Build a [`TileError::Surface`] value.
    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    /// Build a [`TileError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`TileError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for failures the engine treats as transient unavailability.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
