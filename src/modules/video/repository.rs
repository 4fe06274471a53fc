use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{NewVideo, VideoAsset, VideoStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("video not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Persistence contract the pipeline needs for video assets. Storage
/// technology is up to the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Inserts a `Processing` asset and returns it with its storage-assigned
    /// id and a fresh uuid.
    async fn create(&self, video: NewVideo) -> RepoResult<VideoAsset>;

    /// Compare-and-set. Returns `false` when the row exists but is not in
    /// `from`, `NotFound` when there is no such row.
    async fn update_status(&self, id: i64, from: VideoStatus, to: VideoStatus) -> RepoResult<bool>;

    async fn get_by_id(&self, id: i64) -> RepoResult<VideoAsset>;

    async fn get_by_uuid(&self, uuid: Uuid) -> RepoResult<VideoAsset>;

    /// Most recent asset stored under `content_hash`.
    async fn get_by_hash(&self, content_hash: &str) -> RepoResult<VideoAsset>;

    /// Assets that are not soft-deleted, newest first.
    async fn list(&self, status: Option<VideoStatus>) -> RepoResult<Vec<VideoAsset>>;

    async fn update_info(&self, id: i64, name: &str, description: &str) -> RepoResult<VideoAsset>;

    async fn soft_delete(&self, id: i64) -> RepoResult<()>;

    async fn delete(&self, id: i64) -> RepoResult<()>;
}

#[derive(Debug, FromRow)]
struct VideoRow {
    id: i64,
    uuid: Uuid,
    name: String,
    description: String,
    hash_name: String,
    status: String,
    duration: f64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<VideoRow> for VideoAsset {
    type Error = RepositoryError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<VideoStatus>()
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        Ok(VideoAsset {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            description: row.description,
            content_hash: row.hash_name,
            status,
            duration: row.duration,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

const VIDEO_COLUMNS: &str =
    "id, uuid, name, description, hash_name, status, duration, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn create(&self, video: NewVideo) -> RepoResult<VideoAsset> {
        let sql = format!(
            r#"
            INSERT INTO videos (uuid, name, description, hash_name, status, duration)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {VIDEO_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, VideoRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&video.name)
            .bind(&video.description)
            .bind(&video.content_hash)
            .bind(VideoStatus::Processing.as_str())
            .bind(video.duration)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn update_status(&self, id: i64, from: VideoStatus, to: VideoStatus) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE videos SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish a lost race from a missing row.
        self.get_by_id(id).await.map(|_| false)
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<VideoAsset> {
        let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1");

        let row = sqlx::query_as::<_, VideoRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> RepoResult<VideoAsset> {
        let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE uuid = $1");

        let row = sqlx::query_as::<_, VideoRow>(&sql)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn get_by_hash(&self, content_hash: &str) -> RepoResult<VideoAsset> {
        let sql = format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE hash_name = $1 ORDER BY id DESC LIMIT 1"
        );

        let row = sqlx::query_as::<_, VideoRow>(&sql)
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn list(&self, status: Option<VideoStatus>) -> RepoResult<Vec<VideoAsset>> {
        let sql = format!(
            r#"
            SELECT {VIDEO_COLUMNS} FROM videos
            WHERE deleted_at IS NULL
              AND ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            "#
        );

        sqlx::query_as::<_, VideoRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(VideoAsset::try_from)
            .collect()
    }

    async fn update_info(&self, id: i64, name: &str, description: &str) -> RepoResult<VideoAsset> {
        let sql = format!(
            r#"
            UPDATE videos SET name = $1, description = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {VIDEO_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, VideoRow>(&sql)
            .bind(name)
            .bind(description)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn soft_delete(&self, id: i64) -> RepoResult<()> {
        let result = sqlx::query("UPDATE videos SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
