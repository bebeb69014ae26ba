//! 实时在线状态与私聊系统的领域模型
//!
//! 包含身份、私聊房间标识、会话与消息实体、WebSocket 协议事件以及持久化接口。

pub mod conversation;
pub mod errors;
pub mod protocol;
pub mod repository;
pub mod room;
pub mod value_objects;

// 重新导出常用类型
pub use conversation::{display_name, ChatMessage, Conversation, ParticipantPair};
pub use errors::{DomainError, DomainResult, RepositoryError, RepositoryResult};
pub use protocol::{ClientEvent, ServerEvent};
pub use repository::ConversationRepository;
#[cfg(feature = "testing")]
pub use repository::MockConversationRepository;
pub use room::RoomId;
pub use value_objects::{ConnectionId, ConversationId, Identity, Timestamp};
