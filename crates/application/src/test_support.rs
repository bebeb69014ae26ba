use domain::{ConversationRepository, Identity, ParticipantPair};

pub fn id(value: &str) -> Identity {
    Identity::parse(value).unwrap()
}

/// 读取两人会话中的全部消息文本，会话不存在时为空
pub async fn messages_between(
    repository: &dyn ConversationRepository,
    a: &str,
    b: &str,
) -> Vec<String> {
    let pair = ParticipantPair::new(id(a), id(b)).unwrap();
    repository
        .find_by_participants(&pair)
        .await
        .unwrap()
        .map(|conversation| conversation.messages.iter().map(|m| m.text.clone()).collect())
        .unwrap_or_default()
}
