//! 身份到连接句柄的注册表
//!
//! 一个身份可能同时拥有多条连接（多设备、多标签页）。注册表只保存连接标识，
//! 连接本身由 [`crate::hub::RealtimeHub`] 持有。注册表不加锁，
//! 并发保护由持有它的 hub 统一负责。

use std::collections::{HashMap, HashSet};

use domain::{ConnectionId, Identity};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    handles: HashMap<Identity, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记连接，返回该身份是否由此从 0 条连接变为 1 条
    pub fn register(&mut self, identity: &Identity, handle: ConnectionId) -> bool {
        let handles = self.handles.entry(identity.clone()).or_default();
        let was_empty = handles.is_empty();
        handles.insert(handle);
        was_empty
    }

    /// 注销连接，返回该身份是否因此不再有任何连接
    pub fn deregister(&mut self, identity: &Identity, handle: ConnectionId) -> bool {
        let Some(handles) = self.handles.get_mut(identity) else {
            return false;
        };
        if !handles.remove(&handle) {
            return false;
        }
        if handles.is_empty() {
            self.handles.remove(identity);
            return true;
        }
        false
    }

    pub fn is_online(&self, identity: &Identity) -> bool {
        self.handles
            .get(identity)
            .is_some_and(|handles| !handles.is_empty())
    }

    pub fn handles_for(&self, identity: &Identity) -> HashSet<ConnectionId> {
        self.handles.get(identity).cloned().unwrap_or_default()
    }

    pub fn online_identities(&self) -> impl Iterator<Item = &Identity> {
        self.handles.keys()
    }

    pub fn online_count(&self) -> usize {
        self.handles.len()
    }
}
