use serde::{Deserialize, Serialize};

pub mod unit_of_work;
pub use unit_of_work::UnitOfWork;

/// Error codes for structured error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Resource Not Found (2xxx)
    EntityNotFound = 2001,
    MultipleMatches = 2002,

    // Data & Persistence (4xxx)
    PersistenceError = 4001,
    DatabaseConstraintViolation = 4002,
    ConcurrencyConflict = 4003,
    SerializationError = 4004,

    // Infrastructure (5xxx)
    InfrastructureError = 5001,
    Cancelled = 5002,

    // Validation (6xxx)
    InvalidQuery = 6001,
    InvalidInput = 6002,
}

impl ErrorCode {
    /// Get error code as integer
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get error severity
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ErrorCode::EntityNotFound | ErrorCode::Cancelled => ErrorSeverity::Info,

            ErrorCode::MultipleMatches
            | ErrorCode::ConcurrencyConflict
            | ErrorCode::InvalidQuery
            | ErrorCode::InvalidInput => ErrorSeverity::Warning,

            ErrorCode::PersistenceError
            | ErrorCode::DatabaseConstraintViolation
            | ErrorCode::SerializationError => ErrorSeverity::Error,

            ErrorCode::InfrastructureError => ErrorSeverity::Critical,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::PersistenceError | ErrorCode::ConcurrencyConflict | ErrorCode::Cancelled
        )
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Multiple matches: {0}")]
    MultipleMatches(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Concurrency conflict: {0}")]
    Concurrency(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Get error code
    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::NotFound(_) => ErrorCode::EntityNotFound,
            DomainError::MultipleMatches(_) => ErrorCode::MultipleMatches,
            DomainError::Persistence(_) => ErrorCode::PersistenceError,
            DomainError::ConstraintViolation(_) => ErrorCode::DatabaseConstraintViolation,
            DomainError::Concurrency(_) => ErrorCode::ConcurrencyConflict,
            DomainError::Serialization(_) => ErrorCode::SerializationError,
            DomainError::InvalidQuery(_) => ErrorCode::InvalidQuery,
            DomainError::InvalidInput(_) => ErrorCode::InvalidInput,
            DomainError::Cancelled(_) => ErrorCode::Cancelled,
            DomainError::Infrastructure(_) => ErrorCode::InfrastructureError,
        }
    }

    /// Get error message
    pub fn message(&self) -> &str {
        match self {
            DomainError::NotFound(msg)
            | DomainError::MultipleMatches(msg)
            | DomainError::Persistence(msg)
            | DomainError::ConstraintViolation(msg)
            | DomainError::Concurrency(msg)
            | DomainError::Serialization(msg)
            | DomainError::InvalidQuery(msg)
            | DomainError::InvalidInput(msg)
            | DomainError::Cancelled(msg)
            | DomainError::Infrastructure(msg) => msg,
        }
    }

    /// Get error severity
    pub fn severity(&self) -> ErrorSeverity {
        self.code().severity()
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        self.code().is_recoverable()
    }

    /// True for lookups that matched nothing (or not exactly one entity).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::NotFound(_) | DomainError::MultipleMatches(_)
        )
    }

    /// True when the store rejected a commit.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            DomainError::Persistence(_)
                | DomainError::ConstraintViolation(_)
                | DomainError::Concurrency(_)
        )
    }

    /// Format error with code
    pub fn format_with_code(&self) -> String {
        format!("[{}] {}", self.code().code(), self)
    }
}
