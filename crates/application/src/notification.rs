//! 离线通知路由
//!
//! 消息在房间内广播之后，判断接收方是否还需要一条身份级别的通知：
//! 只要接收方有一条连接已加入该房间，房间广播就足够了。

use domain::{ConnectionId, Identity, RoomId};

/// 路由判定所需的只读视图，由 hub 在持锁期间提供
pub trait RoomMembership {
    fn handles_for(&self, identity: &Identity) -> Vec<ConnectionId>;
    fn has_joined(&self, connection_id: ConnectionId, room_id: &RoomId) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationDecision {
    /// 接收方至少有一条连接在房间内
    InRoom,
    /// 需要通知接收方的全部连接
    Notify(Vec<ConnectionId>),
    /// 接收方没有存活连接
    Unreachable,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationRouter;

impl NotificationRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route<M: RoomMembership + ?Sized>(
        &self,
        membership: &M,
        recipient: &Identity,
        room_id: &RoomId,
    ) -> NotificationDecision {
        let handles = membership.handles_for(recipient);
        if handles.is_empty() {
            return NotificationDecision::Unreachable;
        }
        if handles
            .iter()
            .any(|handle| membership.has_joined(*handle, room_id))
        {
            return NotificationDecision::InRoom;
        }
        NotificationDecision::Notify(handles)
    }
}
