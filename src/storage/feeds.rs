use super::schema::{now_millis, Database};
use super::types::{DatabaseError, Feed, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id`.
    ///
    /// Returns `DatabaseError::Conflict` if a feed with this URL already exists.
    pub async fn create_feed(
        &self,
        user_id: i64,
        name: &str,
        url: &str,
    ) -> Result<Feed, DatabaseError> {
        let now = now_millis();
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(feed)
    }

    /// Look up a feed by its URL. Returns `DatabaseError::NotFound` if absent.
    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(url)
        .fetch_one(&self.pool)
        .await?;

        Ok(feed)
    }

    /// All feeds in creation order
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// All feeds with the name of the user who added them
    pub async fn get_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.id, f.name, f.url, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// The feed that has waited longest for a fetch.
    ///
    /// Never-fetched feeds come first, then the oldest `last_fetched_at`;
    /// ties go to the lower id. Returns `DatabaseError::NotFound` when no
    /// feeds exist.
    pub async fn get_next_feed_to_fetch(&self) -> Result<Feed, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, id ASC
            LIMIT 1
        "#
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(feed)
    }

    /// Stamp a feed as fetched and return the stamp written.
    ///
    /// Stamps are strictly increasing across all feeds: when the clock has not
    /// moved past the newest stamp, the newest stamp plus one is used instead.
    /// Runs as a single UPDATE so the read of the newest stamp and the write
    /// cannot interleave with another writer.
    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let now = now_millis();
        let (stamp,): (i64,) = sqlx::query_as(
            r#"
            UPDATE feeds
            SET last_fetched_at = MAX(?1, COALESCE((SELECT MAX(last_fetched_at) FROM feeds), 0) + 1),
                updated_at = ?1
            WHERE id = ?2
            RETURNING last_fetched_at
        "#,
        )
        .bind(now)
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stamp)
    }
}
