//! 在线状态跟踪
//!
//! 身份在线当且仅当它在注册表中至少有一条连接。跟踪器只负责判定状态迁移并
//! 生成对应的广播事件，真正的扇出由 hub 在同一把锁内完成。

use domain::{ConnectionId, Identity, ServerEvent};

use crate::registry::ConnectionRegistry;

/// 一次注册/注销引起的在线状态变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    /// 0 -> 1
    CameOnline(Identity),
    /// N -> 0
    WentOffline(Identity),
    Unchanged,
}

impl PresenceChange {
    /// 需要广播给其他连接的事件
    pub fn broadcast_event(&self) -> Option<ServerEvent> {
        match self {
            PresenceChange::CameOnline(identity) => Some(ServerEvent::UserOnline {
                identity: identity.clone(),
            }),
            PresenceChange::WentOffline(identity) => Some(ServerEvent::UserOffline {
                identity: identity.clone(),
            }),
            PresenceChange::Unchanged => None,
        }
    }
}

/// 客户端主动上报的在线/离线提示的处理结果。
///
/// 在线状态由连接数推导，提示永远不会修改状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceHint {
    /// 身份本来就在线，提示是冗余的
    AlreadyOnline,
    /// 身份仍有存活连接，离线提示被忽略
    StillConnected,
    /// 身份没有任何连接，提示与实际状态一致
    AlreadyOffline,
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    registry: ConnectionRegistry,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, identity: &Identity, handle: ConnectionId) -> PresenceChange {
        if self.registry.register(identity, handle) {
            tracing::info!(identity = %identity, connection_id = %handle, "用户上线");
            PresenceChange::CameOnline(identity.clone())
        } else {
            tracing::debug!(identity = %identity, connection_id = %handle, "用户新增连接");
            PresenceChange::Unchanged
        }
    }

    pub fn disconnect(&mut self, identity: &Identity, handle: ConnectionId) -> PresenceChange {
        if self.registry.deregister(identity, handle) {
            tracing::info!(identity = %identity, connection_id = %handle, "用户下线");
            PresenceChange::WentOffline(identity.clone())
        } else {
            tracing::debug!(identity = %identity, connection_id = %handle, "用户关闭一条连接");
            PresenceChange::Unchanged
        }
    }

    pub fn is_online(&self, identity: &Identity) -> bool {
        self.registry.is_online(identity)
    }

    pub fn handles_for(&self, identity: &Identity) -> Vec<ConnectionId> {
        self.registry.handles_for(identity).into_iter().collect()
    }

    /// 当前在线身份，按字典序排列
    pub fn snapshot(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self.registry.online_identities().cloned().collect();
        identities.sort();
        identities
    }

    /// 发送给刚绑定连接的快照：刚刚上线的身份不包含自己
    pub fn snapshot_for(&self, identity: &Identity, change: &PresenceChange) -> Vec<Identity> {
        let mut identities = self.snapshot();
        if matches!(change, PresenceChange::CameOnline(_)) {
            identities.retain(|online| online != identity);
        }
        identities
    }

    pub fn hint(&self, identity: &Identity, online: bool) -> PresenceHint {
        match (online, self.is_online(identity)) {
            (true, true) => PresenceHint::AlreadyOnline,
            (false, true) => PresenceHint::StillConnected,
            (_, false) => PresenceHint::AlreadyOffline,
        }
    }

    pub fn online_count(&self) -> usize {
        self.registry.online_count()
    }
}
