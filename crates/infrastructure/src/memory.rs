//! 进程内会话仓储，未配置数据库时使用

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    ChatMessage, Conversation, ConversationRepository, ParticipantPair, RepositoryError,
    RepositoryResult,
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<ParticipantPair, Conversation>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_participants(
        &self,
        participants: &ParticipantPair,
    ) -> RepositoryResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(participants).cloned())
    }

    async fn append_message(
        &self,
        participants: &ParticipantPair,
        message: ChatMessage,
    ) -> RepositoryResult<Conversation> {
        // 查找与创建在同一把写锁内完成
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(participants.clone())
            .or_insert_with(|| Conversation::start(participants.clone(), message.sent_at));

        conversation
            .append(message)
            .map_err(|err| RepositoryError::storage(err.to_string()))?;
        Ok(conversation.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use domain::Identity;
    use time::OffsetDateTime;

    use super::*;

    fn pair(a: &str, b: &str) -> ParticipantPair {
        ParticipantPair::new(Identity::parse(a).unwrap(), Identity::parse(b).unwrap()).unwrap()
    }

    fn message(sender: &str, text: &str) -> ChatMessage {
        ChatMessage::new(Identity::parse(sender).unwrap(), text, OffsetDateTime::now_utc())
    }

    #[tokio::test]
    async fn appends_preserve_order() {
        let repository = InMemoryConversationRepository::new();
        let participants = pair("alice", "bob");

        repository
            .append_message(&participants, message("alice", "m1"))
            .await
            .unwrap();
        let conversation = repository
            .append_message(&pair("bob", "alice"), message("bob", "m2"))
            .await
            .unwrap();

        let texts: Vec<_> = conversation.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m1", "m2"]);
        assert_eq!(repository.conversation_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_writes_create_one_conversation() {
        let repository = Arc::new(InMemoryConversationRepository::new());

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let repository = repository.clone();
                tokio::spawn(async move {
                    let sender = if i % 2 == 0 { "alice" } else { "bob" };
                    repository
                        .append_message(&pair("alice", "bob"), message(sender, &format!("m{i}")))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(repository.conversation_count().await, 1);
        let conversation = repository
            .find_by_participants(&pair("alice", "bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.messages.len(), 32);
    }

    #[tokio::test]
    async fn outsider_message_is_refused() {
        let repository = InMemoryConversationRepository::new();
        let result = repository
            .append_message(&pair("alice", "bob"), message("mallory", "hi"))
            .await;
        assert!(result.is_err());
    }
}
