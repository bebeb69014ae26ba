//! 应用层实现。
//!
//! 进程内的实时状态（连接、在线身份、私聊房间）集中在 [`RealtimeHub`]，
//! [`ChatService`] 负责把客户端事件分发到 hub 与会话存储。

pub mod clock;
pub mod conversation_store;
pub mod dto;
pub mod error;
pub mod hub;
pub mod notification;
pub mod outcome;
pub mod presence;
pub mod registry;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use conversation_store::ConversationStore;
pub use dto::{ConversationDto, MessageDto, PresenceDto};
pub use error::ApplicationError;
pub use hub::{BindOutcome, OutboundReceiver, OutboundSender, RealtimeHub};
pub use notification::{NotificationDecision, NotificationRouter, RoomMembership};
pub use outcome::DispatchOutcome;
pub use presence::{PresenceChange, PresenceHint, PresenceTracker};
pub use registry::ConnectionRegistry;
pub use services::{ChatService, ChatServiceDependencies};
