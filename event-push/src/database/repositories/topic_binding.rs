//! Topic binding repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::Result;
use crate::binder::BindOutcome;
use crate::domain::EventId;

/// Storage for `(token, topic) -> bound_at`.
#[async_trait]
pub trait TopicBindingRepository: Send + Sync {
    /// Bind a token to the event's topic. Re-binding is a no-op success.
    async fn bind(&self, token: &str, event_id: &EventId) -> Result<BindOutcome>;

    /// All tokens bound to the event's topic, oldest binding first.
    async fn tokens_for_topic(&self, event_id: &EventId) -> Result<Vec<String>>;

    /// Remove one binding. Returns whether it existed.
    async fn unbind(&self, token: &str, event_id: &EventId) -> Result<bool>;

    /// Remove every binding of a token (the token is dead).
    /// Returns the number of bindings deleted.
    async fn remove_token(&self, token: &str) -> Result<u64>;

    async fn count_for_topic(&self, event_id: &EventId) -> Result<i64>;
}

/// SQLx implementation of TopicBindingRepository.
#[derive(Debug, Clone)]
pub struct SqlxTopicBindingRepository {
    pool: SqlitePool,
}

impl SqlxTopicBindingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TopicBindingRepository for SqlxTopicBindingRepository {
    async fn bind(&self, token: &str, event_id: &EventId) -> Result<BindOutcome> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO topic_binding (token, topic, bound_at)
            VALUES (?, ?, ?)
            ON CONFLICT(token, topic) DO NOTHING
            "#,
        )
        .bind(token)
        .bind(event_id.topic())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(BindOutcome::AlreadyBound)
        } else {
            Ok(BindOutcome::Created)
        }
    }

    async fn tokens_for_topic(&self, event_id: &EventId) -> Result<Vec<String>> {
        let tokens = sqlx::query_scalar::<_, String>(
            "SELECT token FROM topic_binding WHERE topic = ? ORDER BY bound_at, token",
        )
        .bind(event_id.topic())
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }

    async fn unbind(&self, token: &str, event_id: &EventId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM topic_binding WHERE token = ? AND topic = ?")
            .bind(token)
            .bind(event_id.topic())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_token(&self, token: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM topic_binding WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_for_topic(&self, event_id: &EventId) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM topic_binding WHERE topic = ?")
                .bind(event_id.topic())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
