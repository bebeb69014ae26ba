//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 实时通道，以及在线状态与会话历史的只读接口。

mod cors;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use cors::cors_layer;
pub use error::ApiError;
pub use routes::{app, router};
pub use state::AppState;
pub use ws_connection::WebSocketConnection;
