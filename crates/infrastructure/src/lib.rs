//! 基础设施层实现。
//!
//! 提供会话仓储的内存与 PostgreSQL 两种实现，以及数据库迁移。

pub mod memory;
pub mod migrations;
pub mod repository;

pub use memory::InMemoryConversationRepository;
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgConversationRepository};
