use domain::{ConnectionId, DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("persistence error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    #[error("connection {0} is not bound to an identity")]
    Unbound(ConnectionId),
}

impl ApplicationError {
    /// 存储不可用等持久化失败，区别于可以直接丢弃的校验失败
    pub fn is_persistence(&self) -> bool {
        matches!(self, ApplicationError::Repository(_))
    }
}
