use std::sync::Arc;

use domain::{display_name, ClientEvent, ConnectionId, DomainError, Identity, RoomId, ServerEvent};

use crate::{
    conversation_store::ConversationStore,
    error::ApplicationError,
    hub::{OutboundSender, RealtimeHub},
    notification::{NotificationDecision, NotificationRouter},
    outcome::DispatchOutcome,
    presence::{PresenceChange, PresenceHint},
};

pub struct ChatServiceDependencies {
    pub hub: Arc<RealtimeHub>,
    pub store: Arc<ConversationStore>,
    pub router: NotificationRouter,
}

/// 连接事件的分发入口，供每条 WebSocket 连接的接收任务调用
pub struct ChatService {
    deps: ChatServiceDependencies,
}

#[derive(Debug, Clone)]
struct SendMessageRequest {
    sender_identity: Option<String>,
    target_identity: Option<String>,
    text: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.deps.hub
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.deps.store
    }

    pub async fn connect(&self, outbound: OutboundSender) -> ConnectionId {
        self.deps.hub.open(outbound).await
    }

    /// 连接终止时调用，任何终止路径都必须走到这里
    pub async fn disconnect(&self, connection_id: ConnectionId) -> PresenceChange {
        self.deps.hub.close(connection_id).await
    }

    pub async fn dispatch(&self, connection_id: ConnectionId, event: ClientEvent) -> DispatchOutcome {
        let result = match event {
            ClientEvent::BindIdentity { identity } => self.bind_identity(connection_id, identity).await,
            ClientEvent::JoinRoom {
                identity,
                target_identity,
            } => self.join_room(connection_id, identity, target_identity).await,
            ClientEvent::SendMessage {
                sender_identity,
                target_identity,
                text,
                first_name,
                last_name,
            } => {
                self.send_message(
                    connection_id,
                    SendMessageRequest {
                        sender_identity,
                        target_identity,
                        text,
                        first_name,
                        last_name,
                    },
                )
                .await
            }
            ClientEvent::UserOnline { identity } => {
                self.presence_hint(connection_id, identity, true).await
            }
            ClientEvent::UserOffline { identity } => {
                self.presence_hint(connection_id, identity, false).await
            }
        };
        DispatchOutcome::from_result(result)
    }

    async fn bind_identity(
        &self,
        connection_id: ConnectionId,
        identity: Option<String>,
    ) -> Result<(), ApplicationError> {
        let identity = required_identity("identity", identity)?;
        let outcome = self.deps.hub.bind(connection_id, identity.clone()).await?;
        tracing::debug!(
            connection_id = %connection_id,
            identity = %identity,
            change = ?outcome.change,
            "连接已绑定身份"
        );
        Ok(())
    }

    async fn join_room(
        &self,
        connection_id: ConnectionId,
        identity: Option<String>,
        target_identity: Option<String>,
    ) -> Result<(), ApplicationError> {
        let target = required_identity("targetIdentity", target_identity)?;
        let bound = self.deps.hub.bound_identity(connection_id).await?;

        if let Some(claimed) = identity.filter(|claimed| claimed.trim() != bound.as_str()) {
            tracing::debug!(
                connection_id = %connection_id,
                bound = %bound,
                claimed = %claimed,
                "joinRoom 携带的身份与绑定身份不一致，按绑定身份处理"
            );
        }

        let room_id = self.deps.hub.join_room(connection_id, &target).await?;
        tracing::debug!(connection_id = %connection_id, room_id = %room_id, "加入私聊房间");
        Ok(())
    }

    async fn send_message(
        &self,
        connection_id: ConnectionId,
        request: SendMessageRequest,
    ) -> Result<(), ApplicationError> {
        let sender = self.deps.hub.bound_identity(connection_id).await?;
        let claimed = required_identity("senderIdentity", request.sender_identity)?;
        if claimed != sender {
            return Err(
                DomainError::validation_error("senderIdentity", "与连接绑定的身份不一致").into(),
            );
        }
        let target = required_identity("targetIdentity", request.target_identity)?;
        let text = request
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| DomainError::validation_error("text", "不能为空"))?;

        // 持久化期间不持有 hub 锁
        let conversation = self
            .deps
            .store
            .append_message(&sender, &target, &sender, &text)
            .await?;
        let sent_at = conversation
            .last_message()
            .map(|message| message.sent_at)
            .unwrap_or(conversation.updated_at);

        let sender_display_name = display_name(
            &sender,
            request.first_name.as_deref(),
            request.last_name.as_deref(),
        );
        let room_id = RoomId::for_pair(&sender, &target);

        let delivered = self
            .deps
            .hub
            .broadcast_to_room(
                &room_id,
                ServerEvent::MessageReceived {
                    sender_identity: sender.clone(),
                    sender_display_name: sender_display_name.clone(),
                    text: text.clone(),
                },
            )
            .await;

        let decision = self
            .deps
            .hub
            .notify(
                &self.deps.router,
                &target,
                &room_id,
                ServerEvent::ChatNotification {
                    from_identity: sender.clone(),
                    from_display_name: sender_display_name,
                    message: text,
                    timestamp: sent_at,
                },
            )
            .await;

        tracing::info!(
            conversation_id = %conversation.id,
            sender = %sender,
            target = %target,
            room_id = %room_id,
            delivered,
            notified = matches!(decision, NotificationDecision::Notify(_)),
            "私聊消息已投递"
        );
        Ok(())
    }

    async fn presence_hint(
        &self,
        connection_id: ConnectionId,
        identity: Option<String>,
        online: bool,
    ) -> Result<(), ApplicationError> {
        let identity = required_identity("identity", identity)?;
        let hint = self.deps.hub.presence_hint(&identity, online).await;
        match hint {
            PresenceHint::StillConnected => tracing::debug!(
                connection_id = %connection_id,
                identity = %identity,
                "身份仍有存活连接，忽略离线提示"
            ),
            PresenceHint::AlreadyOnline | PresenceHint::AlreadyOffline => tracing::debug!(
                connection_id = %connection_id,
                identity = %identity,
                online,
                ?hint,
                "收到在线状态提示"
            ),
        }
        Ok(())
    }
}

fn required_identity(field: &str, value: Option<String>) -> Result<Identity, DomainError> {
    let value = value.ok_or_else(|| DomainError::validation_error(field, "缺少字段"))?;
    Identity::parse(value).map_err(|_| DomainError::validation_error(field, "不能为空"))
}
