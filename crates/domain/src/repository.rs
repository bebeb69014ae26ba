//! 会话持久化接口
//!
//! 内层定义接口，基础设施层提供内存与 PostgreSQL 两种实现。

use async_trait::async_trait;

use crate::conversation::{ChatMessage, Conversation, ParticipantPair};
use crate::errors::RepositoryResult;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 按参与者查找会话
    async fn find_by_participants(
        &self,
        participants: &ParticipantPair,
    ) -> RepositoryResult<Option<Conversation>>;

    /// 查找或创建参与者对应的会话，在末尾追加消息并返回更新后的会话。
    ///
    /// 同一对参与者最多只有一个会话，实现必须保证查找与创建的原子性。
    async fn append_message(
        &self,
        participants: &ParticipantPair,
        message: ChatMessage,
    ) -> RepositoryResult<Conversation>;
}
