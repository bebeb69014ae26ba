//! 会话存储服务
//!
//! 在仓储之上补充参与者校验与服务端时间戳。调用方不得在持有 hub 锁时调用。

use std::sync::Arc;

use domain::{
    ChatMessage, Conversation, ConversationRepository, DomainError, Identity, ParticipantPair,
};

use crate::clock::Clock;
use crate::error::ApplicationError;

pub struct ConversationStore {
    repository: Arc<dyn ConversationRepository>,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(repository: Arc<dyn ConversationRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// 找到或创建 `{a, b}` 的会话并追加一条消息，返回更新后的会话
    pub async fn append_message(
        &self,
        a: &Identity,
        b: &Identity,
        sender: &Identity,
        text: &str,
    ) -> Result<Conversation, ApplicationError> {
        let participants = ParticipantPair::new(a.clone(), b.clone())?;
        if !participants.contains(sender) {
            return Err(DomainError::business_rule_violation("消息发送者必须是会话参与者").into());
        }

        let message = ChatMessage::new(sender.clone(), text, self.clock.now());
        match self.repository.append_message(&participants, message).await {
            Ok(conversation) => {
                tracing::debug!(
                    conversation_id = %conversation.id,
                    sender = %sender,
                    messages = conversation.messages.len(),
                    "消息已持久化"
                );
                Ok(conversation)
            }
            Err(error) => {
                tracing::warn!(
                    sender = %sender,
                    low = %participants.low(),
                    high = %participants.high(),
                    error = %error,
                    "消息持久化失败"
                );
                Err(error.into())
            }
        }
    }

    pub async fn conversation_between(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Option<Conversation>, ApplicationError> {
        let participants = ParticipantPair::new(a.clone(), b.clone())?;
        Ok(self.repository.find_by_participants(&participants).await?)
    }
}

#[cfg(test)]
mod tests {
    use domain::{MockConversationRepository, RepositoryError};
    use infrastructure::InMemoryConversationRepository;
    use time::macros::datetime;

    use super::*;
    use crate::clock::FixedClock;
    use crate::test_support::id;

    fn store_with(repository: Arc<dyn ConversationRepository>) -> ConversationStore {
        ConversationStore::new(repository, Arc::new(FixedClock(datetime!(2025-02-01 12:00 UTC))))
    }

    #[tokio::test]
    async fn both_orderings_share_one_conversation() {
        let store = store_with(Arc::new(InMemoryConversationRepository::new()));
        let (alice, bob) = (id("alice"), id("bob"));

        let first = store.append_message(&alice, &bob, &alice, "m1").await.unwrap();
        let second = store.append_message(&bob, &alice, &bob, "m2").await.unwrap();

        assert_eq!(first.id, second.id);
        let texts: Vec<_> = second.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m1", "m2"]);
        assert_eq!(second.messages[0].sent_at, datetime!(2025-02-01 12:00 UTC));

        let loaded = store.conversation_between(&bob, &alice).await.unwrap().unwrap();
        assert_eq!(loaded, second);
    }

    #[tokio::test]
    async fn missing_conversation_reads_as_none() {
        let store = store_with(Arc::new(InMemoryConversationRepository::new()));
        assert!(store
            .conversation_between(&id("alice"), &id("bob"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn outsider_sender_is_rejected_before_storage() {
        let mut repository = MockConversationRepository::new();
        repository.expect_append_message().never();
        let store = store_with(Arc::new(repository));

        let result = store
            .append_message(&id("alice"), &id("bob"), &id("mallory"), "hi")
            .await;
        assert!(matches!(result, Err(ApplicationError::Domain(_))));
    }

    #[tokio::test]
    async fn self_conversation_is_rejected() {
        let mut repository = MockConversationRepository::new();
        repository.expect_append_message().never();
        let store = store_with(Arc::new(repository));

        let alice = id("alice");
        let result = store.append_message(&alice, &alice, &alice, "hi").await;
        assert!(matches!(result, Err(ApplicationError::Domain(_))));
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_persistence_error() {
        let mut repository = MockConversationRepository::new();
        repository
            .expect_append_message()
            .times(1)
            .returning(|_, _| Err(RepositoryError::storage("connection refused")));
        let store = store_with(Arc::new(repository));

        let error = store
            .append_message(&id("alice"), &id("bob"), &id("alice"), "hi")
            .await
            .unwrap_err();
        assert!(error.is_persistence());
    }
}
