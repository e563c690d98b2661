//! SQLite backend for cards, conversations and messages.
//!
//! Three tables:
//! - `cards` the catalog, keyed by (business_id, id)
//! - `conversations` working state, one row per conversation
//! - `messages` append-only history with citations stored as JSON
//!
//! Appending a user message and committing a turn each run in a single
//! transaction, so the sequence number and message count never diverge.

use async_trait::async_trait;
use cardwise_core::card::{Card, CardRecord, CardType, Citation};
use cardwise_core::error::StoreError;
use cardwise_core::message::{
    ConversationId, ConversationState, Message, NewConversation, Role, TurnCommit,
};
use cardwise_core::store::{CardCatalog, ConversationStore};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A durable store backed by a single SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database; it is held on a
    /// single connection so every query sees the same data.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cards (
                business_id  TEXT NOT NULL,
                id           TEXT NOT NULL,
                card_type    TEXT NOT NULL,
                title        TEXT NOT NULL,
                description  TEXT NOT NULL DEFAULT '',
                metadata     TEXT,
                priority     INTEGER,
                order_index  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (business_id, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("cards table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id                  TEXT PRIMARY KEY,
                business_id         TEXT NOT NULL,
                has_knowledge_base  INTEGER NOT NULL DEFAULT 0,
                active_card_ids     TEXT NOT NULL DEFAULT '[]',
                context_summary     TEXT,
                message_count       INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id               TEXT PRIMARY KEY,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role             TEXT NOT NULL,
                content          TEXT NOT NULL,
                sequence_number  INTEGER NOT NULL,
                citations        TEXT NOT NULL DEFAULT '[]',
                confidence       INTEGER,
                created_at       TEXT NOT NULL,
                UNIQUE (conversation_id, sequence_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cards_order ON cards(business_id, order_index, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("cards index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Insert or update catalog cards for a business. Returns the number written.
    pub async fn import_cards(
        &self,
        business_id: &str,
        records: Vec<CardRecord>,
    ) -> Result<usize, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        for record in &records {
            let metadata = record
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| StoreError::InvalidCard(format!("{}: {e}", record.id)))?;

            sqlx::query(
                r#"
                INSERT INTO cards (business_id, id, card_type, title, description, metadata, priority, order_index)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(business_id, id) DO UPDATE SET
                    card_type = excluded.card_type,
                    title = excluded.title,
                    description = excluded.description,
                    metadata = excluded.metadata,
                    priority = excluded.priority,
                    order_index = excluded.order_index
                "#,
            )
            .bind(business_id)
            .bind(&record.id)
            .bind(record.card_type.as_str())
            .bind(&record.title)
            .bind(&record.description)
            .bind(metadata)
            .bind(record.priority)
            .bind(record.order_index)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("card upsert failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(business_id, count = records.len(), "Imported cards");
        Ok(records.len())
    }

    fn row_to_card(row: &sqlx::sqlite::SqliteRow) -> Result<Card, StoreError> {
        let col = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let metadata_json: Option<String> = row.try_get("metadata").map_err(|e| col("metadata", e))?;
        let metadata = metadata_json
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .map_err(|e| StoreError::InvalidCard(format!("metadata JSON: {e}")))?;

        let card_type: String = row.try_get("card_type").map_err(|e| col("card_type", e))?;

        Ok(Card::from_record(CardRecord {
            id: row.try_get("id").map_err(|e| col("id", e))?,
            card_type: CardType::from(card_type),
            title: row.try_get("title").map_err(|e| col("title", e))?,
            description: row.try_get("description").map_err(|e| col("description", e))?,
            metadata,
            priority: row.try_get("priority").map_err(|e| col("priority", e))?,
            order_index: row.try_get("order_index").map_err(|e| col("order_index", e))?,
        }))
    }

    fn row_to_state(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationState, StoreError> {
        let col = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| col("id", e))?;
        let active_json: String = row.try_get("active_card_ids").map_err(|e| col("active_card_ids", e))?;
        let message_count: i64 = row.try_get("message_count").map_err(|e| col("message_count", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| col("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| col("updated_at", e))?;

        Ok(ConversationState {
            id: ConversationId(id),
            business_id: row.try_get("business_id").map_err(|e| col("business_id", e))?,
            has_knowledge_base: row
                .try_get("has_knowledge_base")
                .map_err(|e| col("has_knowledge_base", e))?,
            active_card_ids: serde_json::from_str(&active_json).unwrap_or_default(),
            context_summary: row.try_get("context_summary").map_err(|e| col("context_summary", e))?,
            message_count: message_count.max(0) as u64,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let col = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let role: String = row.try_get("role").map_err(|e| col("role", e))?;
        let role = Role::parse(&role)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown message role '{role}'")))?;
        let sequence_number: i64 = row.try_get("sequence_number").map_err(|e| col("sequence_number", e))?;
        let citations_json: String = row.try_get("citations").map_err(|e| col("citations", e))?;
        let citations: Vec<Citation> = serde_json::from_str(&citations_json).unwrap_or_default();
        let confidence: Option<i64> = row.try_get("confidence").map_err(|e| col("confidence", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| col("created_at", e))?;

        Ok(Message {
            id: row.try_get("id").map_err(|e| col("id", e))?,
            role,
            content: row.try_get("content").map_err(|e| col("content", e))?,
            sequence_number: sequence_number.max(0) as u64,
            citations,
            confidence: confidence.map(|c| c.clamp(0, 100) as u8),
            timestamp: parse_timestamp(&created_at),
        })
    }

    async fn insert_message(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<(), StoreError> {
        let citations = serde_json::to_string(&message.citations)
            .map_err(|e| StoreError::Storage(format!("citations serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, sequence_number, citations, confidence, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&message.id)
        .bind(conversation_id.as_str())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.sequence_number as i64)
        .bind(citations)
        .bind(message.confidence.map(i64::from))
        .bind(message.timestamp.to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Storage(format!("message INSERT failed: {e}")))?;

        Ok(())
    }

    /// Read the current count inside `tx`, failing if the conversation is missing.
    async fn current_count(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: &ConversationId,
    ) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT message_count FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("count lookup: {e}")))?
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        let count: i64 = row
            .try_get("message_count")
            .map_err(|e| StoreError::QueryFailed(format!("message_count column: {e}")))?;
        Ok(count.max(0) as u64)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl CardCatalog for SqliteStore {
    async fn cards(&self, business_id: &str) -> Result<Vec<Card>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM cards WHERE business_id = ?1 ORDER BY order_index ASC, id ASC",
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("card lookup: {e}")))?;

        rows.iter().map(Self::row_to_card).collect()
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(
        &self,
        new: NewConversation,
    ) -> Result<ConversationState, StoreError> {
        let state = ConversationState::new(new);

        sqlx::query(
            r#"
            INSERT INTO conversations (id, business_id, has_knowledge_base, active_card_ids, context_summary, message_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, '[]', NULL, 0, ?4, ?5)
            "#,
        )
        .bind(state.id.as_str())
        .bind(&state.business_id)
        .bind(state.has_knowledge_base)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("conversation INSERT failed: {e}")))?;

        debug!(conversation_id = %state.id, "Created conversation");
        Ok(state)
    }

    async fn state(&self, id: &ConversationId) -> Result<ConversationState, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("state lookup: {e}")))?
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        Self::row_to_state(&row)
    }

    async fn append_user_message(
        &self,
        id: &ConversationId,
        content: &str,
    ) -> Result<Message, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let count = Self::current_count(&mut tx, id).await? + 1;
        let message = Message::user(content, count);
        Self::insert_message(&mut tx, id, &message).await?;

        sqlx::query("UPDATE conversations SET message_count = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(count as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("count UPDATE failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(message)
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM messages WHERE conversation_id = ?1
                ORDER BY sequence_number DESC LIMIT ?2
            ) ORDER BY sequence_number ASC
            "#,
        )
        .bind(id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("message lookup: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn commit_turn(
        &self,
        id: &ConversationId,
        commit: TurnCommit,
    ) -> Result<Message, StoreError> {
        let active = serde_json::to_string(&commit.active_card_ids)
            .map_err(|e| StoreError::Storage(format!("active set serialization: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let count = Self::current_count(&mut tx, id).await? + 1;
        let message = Message::assistant(commit.content, count, commit.citations, commit.confidence);
        Self::insert_message(&mut tx, id, &message).await?;

        sqlx::query(
            r#"
            UPDATE conversations
            SET message_count = ?1, active_card_ids = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(count as i64)
        .bind(active)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("state UPDATE failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(message)
    }

    async fn replace_summary(&self, id: &ConversationId, summary: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE conversations SET context_summary = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(summary)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("summary UPDATE failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }
}
