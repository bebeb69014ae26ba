#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    ChatService, ChatServiceDependencies, ConversationStore, NotificationRouter, RealtimeHub,
    SystemClock,
};
use config::RealtimeConfig;
use domain::ConversationRepository;
use futures_util::{SinkExt, StreamExt};
use infrastructure::InMemoryConversationRepository;
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self) -> WsClient {
        let (ws, _) = connect_async(format!("ws://{}/api/v1/ws", self.addr))
            .await
            .expect("websocket connect");
        ws
    }

    /// 连接并绑定身份，返回前已收到 onlineUsers 快照
    pub async fn bound(&self, identity: &str) -> (WsClient, Value) {
        let mut ws = self.connect().await;
        send_json(
            &mut ws,
            serde_json::json!({"type": "bindIdentity", "identity": identity}),
        )
        .await;
        let snapshot = next_event(&mut ws).await;
        assert_eq!(snapshot["type"], "onlineUsers");
        (ws, snapshot)
    }

    /// 加入房间并等待服务端处理完成。
    ///
    /// 同一连接的事件按顺序处理，随后的重复绑定会回送 onlineUsers，
    /// 收到它即说明 joinRoom 已生效。
    pub async fn join_room(&self, ws: &mut WsClient, identity: &str, target: &str) {
        send_json(
            ws,
            serde_json::json!({"type": "joinRoom", "identity": identity, "targetIdentity": target}),
        )
        .await;
        send_json(
            ws,
            serde_json::json!({"type": "bindIdentity", "identity": identity}),
        )
        .await;
        loop {
            if next_event(ws).await["type"] == "onlineUsers" {
                return;
            }
        }
    }

    /// 轮询会话历史直到出现，超时返回 None
    pub async fn wait_for_conversation(&self, identity: &str, target: &str) -> Option<Value> {
        let url = self.http(&format!("/api/v1/conversations/{identity}/{target}"));
        for _ in 0..40 {
            let response = reqwest::get(&url).await.expect("history request");
            if response.status() == reqwest::StatusCode::OK {
                return Some(response.json().await.expect("history json"));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        None
    }
}

pub fn build_state(repository: Arc<dyn ConversationRepository>) -> AppState {
    let store = ConversationStore::new(repository, Arc::new(SystemClock));
    let chat_service = ChatService::new(ChatServiceDependencies {
        hub: Arc::new(RealtimeHub::new()),
        store: Arc::new(store),
        router: NotificationRouter::new(),
    });
    let realtime = RealtimeConfig {
        outbound_buffer_warn: 1024,
        outbound_buffer_limit: 8192,
    };
    AppState::new(Arc::new(chat_service), &realtime)
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with(Arc::new(InMemoryConversationRepository::new())).await
}

pub async fn spawn_server_with(repository: Arc<dyn ConversationRepository>) -> TestServer {
    let router = router(build_state(repository));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        _shutdown: shutdown_tx,
    }
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一条文本事件，超时视为失败
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("event json");
        }
    }
}

/// 断言一段时间内没有收到任何文本事件
pub async fn expect_silence(ws: &mut WsClient, millis: u64) {
    let deadline = Duration::from_millis(millis);
    match timeout(deadline, async {
        loop {
            match ws.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await
    {
        Ok(Some(text)) => panic!("unexpected event: {text}"),
        Ok(None) | Err(_) => {}
    }
}
