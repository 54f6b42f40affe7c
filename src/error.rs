//! Error types for deployment records, sessions and placement

use thiserror::Error;

use crate::address::Address;
use crate::schema::DataType;

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;

/// Deployment errors
///
/// Every variant aborts the operation that raised it. Nothing is written to
/// the store, the ledger or the placement protocol before the error surfaces.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Schema violation at '{path}': {reason}")]
    SchemaViolation { path: String, reason: String },

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Type mismatch at '{path}': registered as {registered}, accessed as {requested}")]
    TypeMismatch {
        path: String,
        registered: DataType,
        requested: DataType,
    },

    #[error("Key has never been set: {0}")]
    KeyNotSet(String),

    #[error("A non-empty key is required")]
    KeyRequired,

    #[error("Key already used: {key} resolves to {existing}")]
    KeyAlreadyUsed { key: String, existing: Address },

    #[error("Caller {caller} is not the authorized operator")]
    UnauthorizedOperator { caller: Address },

    #[error("No operator has been configured")]
    OperatorRequired,

    #[error("Caller {caller} is not the owner")]
    NotOwner { caller: Address },

    #[error("Commitment hash must not be zero")]
    CommitmentMismatch,

    #[error("Commitment already pending: {0}")]
    CommitmentAlreadyExists(String),

    #[error("No pending commitment: {0}")]
    UnknownCommitment(String),

    #[error("Value mismatch: expected {expected}, got {actual}")]
    ValueMismatch { expected: u128, actual: u128 },

    #[error("Deployment of '{key}' failed: {reason}")]
    DeploymentFailed { key: String, reason: String },

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Resume target not found: {0}")]
    ResumeTargetNotFound(String),

    #[error("No active session")]
    SessionNotActive,

    #[error("Session already active for {network}/{salt}")]
    SessionAlreadyActive { network: String, salt: String },

    #[error("Invalid deployment document: {0}")]
    InvalidDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    pub(crate) fn violation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        DeployError::SchemaViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for failures raised by the ledger while executing a unit's code.
    pub fn is_revert(&self) -> bool {
        matches!(self, DeployError::Reverted(_))
    }
}
