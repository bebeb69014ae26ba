use domain::{ChatMessage, Conversation, Identity, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub sender: Identity,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: Timestamp,
}

impl From<&ChatMessage> for MessageDto {
    fn from(message: &ChatMessage) -> Self {
        Self {
            sender: message.sender.clone(),
            text: message.text.clone(),
            sent_at: message.sent_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: Uuid,
    pub participants: [Identity; 2],
    pub messages: Vec<MessageDto>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: Timestamp,
}

impl From<&Conversation> for ConversationDto {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: Uuid::from(conversation.id),
            participants: [
                conversation.participants.low().clone(),
                conversation.participants.high().clone(),
            ],
            messages: conversation.messages.iter().map(MessageDto::from).collect(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceDto {
    pub identity: Identity,
    pub online: bool,
}
