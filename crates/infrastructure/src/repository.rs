use async_trait::async_trait;
use domain::{
    ChatMessage, Conversation, ConversationId, ConversationRepository, Identity, ParticipantPair,
    RepositoryError, RepositoryResult,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn parse_identity(value: String) -> Result<Identity, RepositoryError> {
    Identity::parse(value).map_err(|err| invalid_data(err.to_string()))
}

#[derive(Debug, FromRow)]
struct ConversationRecord {
    id: Uuid,
    participant_low: String,
    participant_high: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    sender: String,
    body: String,
    sent_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        Ok(ChatMessage::new(
            parse_identity(value.sender)?,
            value.body,
            value.sent_at,
        ))
    }
}

impl ConversationRecord {
    fn into_conversation(self, messages: Vec<ChatMessage>) -> Result<Conversation, RepositoryError> {
        let participants = ParticipantPair::new(
            parse_identity(self.participant_low)?,
            parse_identity(self.participant_high)?,
        )
        .map_err(|err| invalid_data(err.to_string()))?;

        Ok(Conversation::restore(
            ConversationId::from(self.id),
            participants,
            messages,
            self.created_at,
            self.updated_at,
        ))
    }
}

async fn load_conversation(
    conn: &mut PgConnection,
    participants: &ParticipantPair,
) -> RepositoryResult<Option<Conversation>> {
    let record = sqlx::query_as::<_, ConversationRecord>(
        r#"SELECT id, participant_low, participant_high, created_at, updated_at
        FROM conversations
        WHERE participant_low = $1 AND participant_high = $2"#,
    )
    .bind(participants.low().as_str())
    .bind(participants.high().as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_err)?;

    let Some(record) = record else {
        return Ok(None);
    };

    let messages = sqlx::query_as::<_, MessageRecord>(
        r#"SELECT sender, body, sent_at
        FROM conversation_messages
        WHERE conversation_id = $1
        ORDER BY id ASC"#,
    )
    .bind(record.id)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx_err)?
    .into_iter()
    .map(ChatMessage::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    record.into_conversation(messages).map(Some)
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find_by_participants(
        &self,
        participants: &ParticipantPair,
    ) -> RepositoryResult<Option<Conversation>> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_err)?;
        load_conversation(&mut conn, participants).await
    }

    async fn append_message(
        &self,
        participants: &ParticipantPair,
        message: ChatMessage,
    ) -> RepositoryResult<Conversation> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 唯一约束保证并发的首次写入只会创建一个会话
        let conversation_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (participant_low, participant_high)
            DO UPDATE SET updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(participants.low().as_str())
        .bind(participants.high().as_str())
        .bind(message.sent_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"INSERT INTO conversation_messages (conversation_id, sender, body, sent_at)
            VALUES ($1, $2, $3, $4)"#,
        )
        .bind(conversation_id)
        .bind(message.sender.as_str())
        .bind(&message.text)
        .bind(message.sent_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let conversation = load_conversation(&mut tx, participants)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(conversation)
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
