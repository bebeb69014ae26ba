use std::sync::Arc;

use application::ChatService;
use config::RealtimeConfig;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    /// 出站队列积压告警阈值
    pub outbound_buffer_warn: usize,
    /// 出站队列积压上限，达到即断开连接
    pub outbound_buffer_limit: usize,
}

impl AppState {
    pub fn new(chat_service: Arc<ChatService>, realtime: &RealtimeConfig) -> Self {
        Self {
            chat_service,
            outbound_buffer_warn: realtime.outbound_buffer_warn,
            outbound_buffer_limit: realtime.outbound_buffer_limit,
        }
    }
}
