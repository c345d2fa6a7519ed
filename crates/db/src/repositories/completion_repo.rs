//! Repository for the `completions` table.

use crate::models::completion::{CompletionRow, NewCompletion};
use crate::DbPool;

const COLUMNS: &str = "\
    id, file_type, file_name, object_count, \
    entry_count, exit_count, net_count, created_at";

/// Provides query operations for completion records.
pub struct CompletionRepo;

impl CompletionRepo {
    /// Insert a completion record. Returns the new row id.
    pub async fn insert(pool: &DbPool, completion: &NewCompletion) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO completions \
             (file_type, file_name, object_count, entry_count, exit_count, net_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&completion.file_type)
        .bind(&completion.file_name)
        .bind(completion.object_count)
        .bind(completion.entry_count)
        .bind(completion.exit_count)
        .bind(completion.net_count)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// List completion records, newest first.
    pub async fn list(pool: &DbPool, limit: i64) -> Result<Vec<CompletionRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM completions ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        sqlx::query_as::<_, CompletionRow>(&sql)
            .bind(limit.clamp(1, 1000))
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    #[tokio::test]
    async fn insert_and_list() {
        let pool = test_pool().await;
        let id = CompletionRepo::insert(
            &pool,
            &NewCompletion {
                file_type: "video".into(),
                file_name: "clip.mp4".into(),
                object_count: 3,
                entry_count: 2,
                exit_count: 1,
                net_count: 1,
            },
        )
        .await
        .unwrap();
        assert!(id > 0);

        let rows = CompletionRepo::list(&pool, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_type, "video");
        assert_eq!(rows[0].net_count, 1);
    }
}
