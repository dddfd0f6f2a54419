use shared::{
    domain::EntityKey,
    error::{ErrorCode, ErrorReport},
    protocol::MutationTag,
};
use storage::Table;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(EntityKey),
    #[error("invalid move: {0}")]
    InvalidMove(String),
    /// The write failed and its completed steps were undone; local state was
    /// rolled back.
    #[error("persisting {mutation} failed: {source}")]
    Persistence {
        mutation: MutationTag,
        source: anyhow::Error,
    },
    /// Step `failed_step` failed with `cause` and undoing the earlier steps
    /// failed too, so storage holds a partial cascade. Local state was
    /// rolled back.
    #[error("{mutation} left storage partially applied at step {failed_step} ({cause}): {source}")]
    CascadeIntegrity {
        mutation: MutationTag,
        failed_step: usize,
        cause: String,
        source: anyhow::Error,
    },
    #[error("failed to load board state: {source}")]
    Load { source: anyhow::Error },
    /// The store rejected a new row. Nothing changed locally.
    #[error("failed to create a row in {table}: {source}")]
    Create { table: Table, source: anyhow::Error },
    #[error("background write for {0} was aborted")]
    Aborted(MutationTag),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NotFound(_) => ErrorCode::NotFound,
            EngineError::InvalidMove(_) => ErrorCode::InvalidMove,
            EngineError::Persistence { .. } => ErrorCode::Persistence,
            EngineError::CascadeIntegrity { .. } => ErrorCode::CascadeIntegrity,
            EngineError::Load { .. } => ErrorCode::Load,
            EngineError::Create { .. } => ErrorCode::Create,
            EngineError::Aborted(_) => ErrorCode::Internal,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::new(self.code(), self.to_string())
    }

    pub(crate) fn invalid_move(message: impl Into<String>) -> Self {
        EngineError::InvalidMove(message.into())
    }
}
