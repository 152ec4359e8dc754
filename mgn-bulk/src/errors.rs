use mgn_client::ClientError;
use thiserror::Error;

/// Why one unit of an executor run produced no value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError<E> {
    /// The operation returned an error
    #[error("{0}")]
    Failed(E),

    /// The operation panicked; carries the panic message
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// The run was cancelled before this unit was started
    #[error("cancelled before start")]
    Cancelled,
}

impl<E> UnitError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UnitError::Cancelled)
    }
}

/// Error types for bulk operations as a whole
#[derive(Error, Debug)]
pub enum BulkError {
    /// The task folding unit outcomes into the progress died
    #[error("Progress aggregation failed: {0}")]
    Aggregator(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}
