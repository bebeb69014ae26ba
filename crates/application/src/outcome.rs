use domain::ConnectionId;

use crate::error::ApplicationError;

/// 单个入站事件的处理结果。没有任何结果会终止连接。
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled,
    /// 校验失败，静默丢弃
    Ignored(ApplicationError),
    /// 持久化失败，消息未投递
    Failed(ApplicationError),
    /// 无法解析的帧
    Rejected(String),
}

impl DispatchOutcome {
    pub fn from_result(result: Result<(), ApplicationError>) -> Self {
        match result {
            Ok(()) => DispatchOutcome::Handled,
            Err(error) if error.is_persistence() => DispatchOutcome::Failed(error),
            Err(error) => DispatchOutcome::Ignored(error),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        DispatchOutcome::Rejected(reason.into())
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled)
    }

    /// 日志出口
    pub fn log(&self, connection_id: ConnectionId, event: &str) {
        match self {
            DispatchOutcome::Handled => {
                tracing::trace!(connection_id = %connection_id, event, "事件已处理");
            }
            DispatchOutcome::Ignored(error) => {
                tracing::debug!(connection_id = %connection_id, event, error = %error, "事件被忽略");
            }
            DispatchOutcome::Failed(error) => {
                tracing::error!(connection_id = %connection_id, event, error = %error, "事件处理失败");
            }
            DispatchOutcome::Rejected(reason) => {
                tracing::warn!(connection_id = %connection_id, event, reason = %reason, "协议错误");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DomainError, RepositoryError};

    #[test]
    fn errors_are_classified_by_kind() {
        let ignored = DispatchOutcome::from_result(Err(
            DomainError::validation_error("identity", "不能为空").into()
        ));
        assert!(matches!(ignored, DispatchOutcome::Ignored(_)));

        let failed =
            DispatchOutcome::from_result(Err(RepositoryError::storage("timeout").into()));
        assert!(matches!(failed, DispatchOutcome::Failed(_)));

        assert!(DispatchOutcome::from_result(Ok(())).is_handled());
    }
}
