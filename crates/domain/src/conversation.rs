//! 会话与消息实体

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, Identity, Timestamp};

/// 无序的参与者二元组，内部按字典序保存 (low, high)。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantPair {
    low: Identity,
    high: Identity,
}

impl ParticipantPair {
    pub fn new(a: Identity, b: Identity) -> Result<Self, DomainError> {
        if a == b {
            return Err(DomainError::validation_error(
                "targetIdentity",
                "会话需要两个不同的参与者",
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn low(&self) -> &Identity {
        &self.low
    }

    pub fn high(&self) -> &Identity {
        &self.high
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        &self.low == identity || &self.high == identity
    }

    /// 返回另一位参与者
    pub fn other(&self, identity: &Identity) -> Option<&Identity> {
        if &self.low == identity {
            Some(&self.high)
        } else if &self.high == identity {
            Some(&self.low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Identity,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: Timestamp,
}

impl ChatMessage {
    pub fn new(sender: Identity, text: impl Into<String>, sent_at: Timestamp) -> Self {
        Self {
            sender,
            text: text.into(),
            sent_at,
        }
    }
}

/// 两位参与者之间的持久化会话，消息按追加顺序排列。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: ParticipantPair,
    pub messages: Vec<ChatMessage>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: Timestamp,
}

impl Conversation {
    pub fn start(participants: ParticipantPair, at: Timestamp) -> Self {
        Self {
            id: ConversationId::new(),
            participants,
            messages: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn restore(
        id: ConversationId,
        participants: ParticipantPair,
        messages: Vec<ChatMessage>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            participants,
            messages,
            created_at,
            updated_at,
        }
    }

    pub fn append(&mut self, message: ChatMessage) -> Result<(), DomainError> {
        if !self.participants.contains(&message.sender) {
            return Err(DomainError::business_rule_violation(
                "消息发送者必须是会话参与者",
            ));
        }
        self.updated_at = message.sent_at;
        self.messages.push(message);
        Ok(())
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// 根据客户端附带的姓名计算展示名，缺省时退回身份标识。
pub fn display_name(identity: &Identity, first_name: Option<&str>, last_name: Option<&str>) -> String {
    let joined = [first_name, last_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.is_empty() {
        identity.to_string()
    } else {
        joined
    }
}
