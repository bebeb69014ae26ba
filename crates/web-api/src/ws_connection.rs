use std::ops::ControlFlow;

use application::{ChatService, DispatchOutcome, OutboundReceiver};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ConnectionId};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::state::AppState;

/// WebSocket 连接管理器
///
/// 每条连接由一对任务驱动：
/// - 发送任务：把 hub 推送的事件写回客户端
/// - 接收任务：解析客户端帧并交给 [`ChatService::dispatch`]
///
/// 发送任务先结束时，接收任务在下一个帧边界停止，正在处理的事件
/// （包括消息持久化）不会被取消。两者都结束后执行注销。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    connection_id: ConnectionId,
    outbound: OutboundReceiver,
}

#[derive(Debug, Clone, Copy)]
struct OutboundLimits {
    warn_at: usize,
    limit: usize,
}

/// 发送任务的结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendEnd {
    /// hub 一侧已释放发送端
    Drained,
    /// 写入客户端失败
    PeerGone,
    /// 积压达到上限
    Overflow,
}

impl WebSocketConnection {
    pub async fn new(socket: WebSocket, state: AppState) -> Self {
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let connection_id = state.chat_service.connect(outbound_tx).await;

        tracing::info!(connection_id = %connection_id, "WebSocket 连接已建立");

        Self {
            socket,
            state,
            connection_id,
            outbound,
        }
    }

    /// 运行连接主循环，返回时连接已从 hub 注销
    pub async fn run(self) {
        let Self {
            socket,
            state,
            connection_id,
            outbound,
        } = self;

        let (sender, mut incoming) = socket.split();
        let limits = OutboundLimits {
            warn_at: state.outbound_buffer_warn,
            limit: state.outbound_buffer_limit,
        };

        let mut send_task = tokio::spawn(async move {
            let end = forward_outbound(sender, outbound, limits, connection_id).await;
            tracing::debug!(connection_id = %connection_id, ?end, "WebSocket发送任务结束");
            end
        });

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let service = state.chat_service.clone();
        let mut recv_task = tokio::spawn(async move {
            loop {
                // 停止信号只在等待下一帧时生效
                let frame = tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    frame = incoming.next() => frame,
                };
                let message = match frame {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %connection_id, error = %err, "WebSocket读取失败");
                        break;
                    }
                    None => break,
                };
                if handle_incoming(&service, connection_id, message)
                    .await
                    .is_break()
                {
                    break;
                }
            }
            tracing::debug!(connection_id = %connection_id, "WebSocket接收任务结束");
        });

        let send_finished_first = tokio::select! {
            _ = &mut send_task => true,
            _ = &mut recv_task => false,
        };

        if send_finished_first {
            let _ = stop_tx.send(());
            if let Err(err) = recv_task.await {
                tracing::warn!(connection_id = %connection_id, error = %err, "接收任务异常退出");
            }
        } else {
            send_task.abort();
        }

        let change = state.chat_service.disconnect(connection_id).await;
        tracing::info!(connection_id = %connection_id, ?change, "WebSocket连接已断开，在线状态已清理");
    }
}

async fn handle_incoming(
    service: &ChatService,
    connection_id: ConnectionId,
    message: WsMessage,
) -> ControlFlow<()> {
    match message {
        WsMessage::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "WebSocket收到关闭消息");
            return ControlFlow::Break(());
        }
        // Pong 由协议层自动回复
        WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        WsMessage::Text(text) => match ClientEvent::from_json(text.as_str()) {
            Ok(event) => {
                let kind = event.kind();
                service.dispatch(connection_id, event).await.log(connection_id, kind);
            }
            Err(err) => DispatchOutcome::rejected(err.to_string()).log(connection_id, "text"),
        },
        WsMessage::Binary(_) => {
            DispatchOutcome::rejected("binary frames are not supported")
                .log(connection_id, "binary");
        }
    }
    ControlFlow::Continue(())
}

async fn forward_outbound<S>(
    mut sink: S,
    mut outbound: OutboundReceiver,
    limits: OutboundLimits,
    connection_id: ConnectionId,
) -> SendEnd
where
    S: Sink<WsMessage> + Unpin,
{
    while let Some(event) = outbound.recv().await {
        let backlog = outbound.len();
        if backlog >= limits.limit {
            tracing::error!(
                connection_id = %connection_id,
                backlog,
                limit = limits.limit,
                "出站队列超过上限，断开连接"
            );
            return SendEnd::Overflow;
        }
        if backlog >= limits.warn_at {
            tracing::warn!(connection_id = %connection_id, backlog, "出站队列积压");
        }

        let payload = match event.to_json() {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize websocket payload");
                continue;
            }
        };
        if sink.send(WsMessage::Text(payload.into())).await.is_err() {
            tracing::debug!(connection_id = %connection_id, "客户端已断开，停止发送");
            return SendEnd::PeerGone;
        }
    }
    SendEnd::Drained
}
