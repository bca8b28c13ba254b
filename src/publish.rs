//! Destination for finished articles.
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::db::{db_time, Pool};
use crate::error::PersistenceError;
use crate::model::{ArticleId, GeneratedArticle};

/// Status given to articles waiting for their publish time.
pub const STATUS_SCHEDULED: &str = "future";

#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Durably schedule `article`. Either the whole article is stored or an
    /// error is returned. A failed image attachment does not fail the call.
    async fn schedule(&self, article: GeneratedArticle) -> Result<ArticleId, PersistenceError>;
}

/// Stores scheduled articles in the local `articles` table.
#[derive(Debug, Clone)]
pub struct SqlitePublishSink {
    pool: Pool,
}

impl SqlitePublishSink {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn attach_image(&self, id: ArticleId, url: &str) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE articles SET featured_image_url = ? WHERE id = ?")
            .bind(url)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PublishSink for SqlitePublishSink {
    #[instrument(skip_all, fields(publish_at = %article.publish_at))]
    async fn schedule(&self, article: GeneratedArticle) -> Result<ArticleId, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO articles (title, body, status, publish_at, author_id, category_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&article.title)
        .bind(&article.body)
        .bind(STATUS_SCHEDULED)
        .bind(db_time(article.publish_at))
        .bind(article.author_id)
        .bind(article.category_id)
        .bind(db_time(Utc::now()))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let id = ArticleId(id);
        info!(article_id = id.0, title = %article.title, "scheduled article");

        if let Some(url) = article.image_url.as_deref() {
            if let Err(e) = self.attach_image(id, url).await {
                warn!(article_id = id.0, error = %e, "failed to attach featured image");
            }
        }
        Ok(id)
    }
}
