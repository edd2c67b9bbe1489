use repokit_domain::DomainError;
use sqlx::error::ErrorKind;
use tracing::error;

/// Maps storage and serialization failures onto `DomainError`.
pub struct RepositoryErrorMapper;

impl RepositoryErrorMapper {
    pub fn map_sqlx_error(err: sqlx::Error, operation: &str) -> DomainError {
        let mapped = match &err {
            sqlx::Error::RowNotFound => DomainError::NotFound(format!("{}: no rows", operation)),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    DomainError::ConstraintViolation(format!("{}: {}", operation, db_err))
                }
                _ => DomainError::Persistence(format!("{}: {}", operation, db_err)),
            },
            other => DomainError::Persistence(format!("{}: {}", operation, other)),
        };

        error!(operation, error = %err, code = mapped.code().code(), "Database operation failed");
        mapped
    }

    pub fn map_json_error(err: serde_json::Error, operation: &str) -> DomainError {
        error!(operation, error = %err, "Document serialization failed");
        DomainError::Serialization(format!("{}: {}", operation, err))
    }
}
