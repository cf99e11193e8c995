use ulid::Ulid;

use crate::model::InvalidInput;

#[derive(Debug)]
pub enum EngineError {
    InvalidInput(String),
    NotFound(Ulid),
    /// The slot is missing, locked or out of capacity. Nothing was mutated.
    SlotNotAvailable(Ulid),
    LimitExceeded(&'static str),
    StoreUnavailable(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::SlotNotAvailable(id) => write!(f, "slot not available: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<InvalidInput> for EngineError {
    fn from(e: InvalidInput) -> Self {
        EngineError::InvalidInput(e.0)
    }
}
