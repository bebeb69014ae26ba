//! 实时连接中心
//!
//! 进程内唯一的共享可变状态：连接表、身份注册表（在线集合由它推导）、
//! 房间分组。全部放在同一把 `RwLock` 之后，广播的接收者集合在持锁期间确定。
//! 出站事件写入每条连接的无界 mpsc 通道，不会阻塞，因此可以在锁内发送；
//! 持久化等 I/O 一律在锁外进行。

use std::collections::{HashMap, HashSet};

use domain::{ConnectionId, Identity, RoomId, ServerEvent};
use tokio::sync::{mpsc, RwLock};

use crate::error::ApplicationError;
use crate::notification::{NotificationDecision, NotificationRouter, RoomMembership};
use crate::presence::{PresenceChange, PresenceHint, PresenceTracker};

/// 连接出站事件的发送端
pub type OutboundSender = mpsc::UnboundedSender<ServerEvent>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<ServerEvent>;

struct ConnectionEntry {
    identity: Option<Identity>,
    rooms: HashSet<RoomId>,
    outbound: OutboundSender,
}

#[derive(Default)]
struct HubState {
    presence: PresenceTracker,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl HubState {
    fn send_to(&self, connection_id: ConnectionId, event: &ServerEvent) -> bool {
        let Some(entry) = self.connections.get(&connection_id) else {
            return false;
        };
        if entry.outbound.send(event.clone()).is_err() {
            // 接收端已经退出，连接正在清理
            tracing::debug!(connection_id = %connection_id, "出站通道已关闭，丢弃事件");
            return false;
        }
        true
    }

    /// 发送给除 `except` 之外所有已绑定身份的连接
    fn broadcast_to_bound(&self, except: Option<ConnectionId>, event: &ServerEvent) -> usize {
        let recipients: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(id, entry)| Some(**id) != except && entry.identity.is_some())
            .map(|(id, _)| *id)
            .collect();

        recipients
            .into_iter()
            .filter(|id| self.send_to(*id, event))
            .count()
    }

    fn leave_all_rooms(&mut self, connection_id: ConnectionId) {
        let rooms = match self.connections.get_mut(&connection_id) {
            Some(entry) => std::mem::take(&mut entry.rooms),
            None => return,
        };
        for room in rooms {
            if let Some(members) = self.rooms.get_mut(&room) {
                members.remove(&connection_id);
                if members.is_empty() {
                    self.rooms.remove(&room);
                }
            }
        }
    }

    fn publish(&self, change: &PresenceChange, except: Option<ConnectionId>) {
        if let Some(event) = change.broadcast_event() {
            let delivered = self.broadcast_to_bound(except, &event);
            tracing::debug!(?change, delivered, "广播在线状态变化");
        }
    }
}

impl RoomMembership for HubState {
    fn handles_for(&self, identity: &Identity) -> Vec<ConnectionId> {
        self.presence.handles_for(identity)
    }

    fn has_joined(&self, connection_id: ConnectionId, room_id: &RoomId) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|entry| entry.rooms.contains(room_id))
    }
}

/// 一次绑定操作引起的状态变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    /// 新身份的在线变化
    pub change: PresenceChange,
    /// 换绑时旧身份的在线变化
    pub released: PresenceChange,
}

#[derive(Default)]
pub struct RealtimeHub {
    state: RwLock<HubState>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 传输层建立连接，进入未绑定状态
    pub async fn open(&self, outbound: OutboundSender) -> ConnectionId {
        let connection_id = ConnectionId::new();
        let mut state = self.state.write().await;
        state.connections.insert(
            connection_id,
            ConnectionEntry {
                identity: None,
                rooms: HashSet::new(),
                outbound,
            },
        );
        tracing::debug!(connection_id = %connection_id, connections = state.connections.len(), "连接已登记");
        connection_id
    }

    /// 将连接绑定到身份。
    ///
    /// 重复绑定同一身份只会重发在线快照；换绑到另一身份时先注销旧身份
    /// （可能触发旧身份下线广播），并清空由旧身份推导出的房间。
    pub async fn bind(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
    ) -> Result<BindOutcome, ApplicationError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let previous = state
            .connections
            .get_mut(&connection_id)
            .ok_or(ApplicationError::ConnectionClosed(connection_id))?
            .identity
            .replace(identity.clone());

        let mut released = PresenceChange::Unchanged;
        if let Some(previous) = previous {
            if previous == identity {
                let users = state.presence.snapshot();
                state.send_to(connection_id, &ServerEvent::OnlineUsers { users });
                return Ok(BindOutcome {
                    change: PresenceChange::Unchanged,
                    released,
                });
            }

            tracing::info!(
                connection_id = %connection_id,
                previous = %previous,
                identity = %identity,
                "连接换绑身份"
            );
            state.leave_all_rooms(connection_id);
            released = state.presence.disconnect(&previous, connection_id);
            state.publish(&released, Some(connection_id));
        }

        let change = state.presence.connect(&identity, connection_id);
        state.publish(&change, Some(connection_id));

        let users = state.presence.snapshot_for(&identity, &change);
        state.send_to(connection_id, &ServerEvent::OnlineUsers { users });

        Ok(BindOutcome { change, released })
    }

    /// 连接加入自己与目标身份的私聊房间
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        target: &Identity,
    ) -> Result<RoomId, ApplicationError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let entry = state
            .connections
            .get_mut(&connection_id)
            .ok_or(ApplicationError::ConnectionClosed(connection_id))?;
        let own = entry
            .identity
            .as_ref()
            .ok_or(ApplicationError::Unbound(connection_id))?;

        let room_id = RoomId::for_pair(own, target);
        entry.rooms.insert(room_id.clone());
        state
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(connection_id);

        Ok(room_id)
    }

    pub async fn bound_identity(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Identity, ApplicationError> {
        let state = self.state.read().await;
        state
            .connections
            .get(&connection_id)
            .ok_or(ApplicationError::ConnectionClosed(connection_id))?
            .identity
            .clone()
            .ok_or(ApplicationError::Unbound(connection_id))
    }

    /// 发送给当前加入房间的全部连接，返回送达的连接数
    pub async fn broadcast_to_room(&self, room_id: &RoomId, event: ServerEvent) -> usize {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room_id) else {
            return 0;
        };
        members
            .iter()
            .filter(|connection_id| state.send_to(**connection_id, &event))
            .count()
    }

    /// 按当前房间成员关系判定并投递通知
    pub async fn notify(
        &self,
        router: &NotificationRouter,
        recipient: &Identity,
        room_id: &RoomId,
        event: ServerEvent,
    ) -> NotificationDecision {
        let state = self.state.read().await;
        let decision = router.route(&*state, recipient, room_id);
        if let NotificationDecision::Notify(handles) = &decision {
            for handle in handles {
                state.send_to(*handle, &event);
            }
        }
        decision
    }

    /// 传输层断开。幂等：已关闭的连接返回 `Unchanged`。
    pub async fn close(&self, connection_id: ConnectionId) -> PresenceChange {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        state.leave_all_rooms(connection_id);
        let Some(entry) = state.connections.remove(&connection_id) else {
            return PresenceChange::Unchanged;
        };

        let change = match entry.identity {
            Some(identity) => state.presence.disconnect(&identity, connection_id),
            None => PresenceChange::Unchanged,
        };
        state.publish(&change, None);
        change
    }

    pub async fn presence_hint(&self, identity: &Identity, online: bool) -> PresenceHint {
        self.state.read().await.presence.hint(identity, online)
    }

    pub async fn online_identities(&self) -> Vec<Identity> {
        self.state.read().await.presence.snapshot()
    }

    pub async fn is_online(&self, identity: &Identity) -> bool {
        self.state.read().await.presence.is_online(identity)
    }

    pub async fn handles_for(&self, identity: &Identity) -> Vec<ConnectionId> {
        self.state.read().await.presence.handles_for(identity)
    }

    pub async fn joined_rooms(&self, connection_id: ConnectionId) -> Vec<RoomId> {
        let state = self.state.read().await;
        state
            .connections
            .get(&connection_id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}
