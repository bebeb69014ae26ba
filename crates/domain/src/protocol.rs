//! WebSocket 协议事件
//!
//! 客户端与服务端之间的文本帧都是带 `type` 标签的 JSON 对象，字段采用 camelCase。
//! 入站事件的字段全部是可选的：缺字段属于校验失败，由应用层静默丢弃，
//! 而不是在反序列化阶段当作协议错误。

use serde::{Deserialize, Serialize};

use crate::value_objects::{Identity, Timestamp};

/// 客户端发送的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// 将连接绑定到身份
    BindIdentity { identity: Option<String> },
    /// 加入与目标身份的私聊房间
    JoinRoom {
        identity: Option<String>,
        target_identity: Option<String>,
    },
    /// 发送私聊消息
    SendMessage {
        sender_identity: Option<String>,
        target_identity: Option<String>,
        text: Option<String>,
        first_name: Option<String>,
        last_name: Option<String>,
    },
    /// 客户端上报的在线提示
    UserOnline { identity: Option<String> },
    /// 客户端上报的离线提示
    UserOffline { identity: Option<String> },
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::BindIdentity { .. } => "bindIdentity",
            ClientEvent::JoinRoom { .. } => "joinRoom",
            ClientEvent::SendMessage { .. } => "sendMessage",
            ClientEvent::UserOnline { .. } => "userOnline",
            ClientEvent::UserOffline { .. } => "userOffline",
        }
    }
}

/// 服务端推送的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// 绑定成功后发送给该连接的在线快照
    OnlineUsers { users: Vec<Identity> },
    UserOnline { identity: Identity },
    UserOffline { identity: Identity },
    /// 房间内广播的新消息
    MessageReceived {
        sender_identity: Identity,
        sender_display_name: String,
        text: String,
    },
    /// 接收方未在房间内时的通知
    ChatNotification {
        from_identity: Identity,
        from_display_name: String,
        message: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: Timestamp,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn missing_fields_deserialize_as_none() {
        let event = ClientEvent::from_json(r#"{"type":"sendMessage","text":"hi"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                sender_identity: None,
                target_identity: None,
                text: Some("hi".into()),
                first_name: None,
                last_name: None,
            }
        );
    }

    #[test]
    fn unknown_event_type_is_a_protocol_error() {
        assert!(ClientEvent::from_json(r#"{"type":"deleteEverything"}"#).is_err());
        assert!(ClientEvent::from_json("not json").is_err());
    }

    #[test]
    fn join_room_uses_camel_case_fields() {
        let event =
            ClientEvent::from_json(r#"{"type":"joinRoom","identity":"u1","targetIdentity":"u2"}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                identity: Some("u1".into()),
                target_identity: Some("u2".into()),
            }
        );
    }

    #[test]
    fn chat_notification_wire_shape() {
        let event = ServerEvent::ChatNotification {
            from_identity: Identity::parse("u1").unwrap(),
            from_display_name: "Ada Lovelace".into(),
            message: "hello".into(),
            timestamp: datetime!(2025-03-01 08:30 UTC),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "chatNotification",
                "fromIdentity": "u1",
                "fromDisplayName": "Ada Lovelace",
                "message": "hello",
                "timestamp": "2025-03-01T08:30:00Z"
            })
        );
    }

    #[test]
    fn online_users_wire_shape() {
        let event = ServerEvent::OnlineUsers {
            users: vec![Identity::parse("u2").unwrap()],
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "onlineUsers", "users": ["u2"]}));
    }
}
