use repokit_domain::DomainError;

use super::RepositoryErrorMapper;

/// Extension trait for sqlx and serde results to simplify error handling
/// Usage: `query.fetch_all(pool).await.map_repo_error("Load documents")?`
pub trait ResultExt<T> {
    fn map_repo_error(self, operation: &str) -> Result<T, DomainError>;
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn map_repo_error(self, operation: &str) -> Result<T, DomainError> {
        self.map_err(|e| RepositoryErrorMapper::map_sqlx_error(e, operation))
    }
}

impl<T> ResultExt<T> for Result<T, serde_json::Error> {
    fn map_repo_error(self, operation: &str) -> Result<T, DomainError> {
        self.map_err(|e| RepositoryErrorMapper::map_json_error(e, operation))
    }
}
