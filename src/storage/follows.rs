use super::schema::{now_millis, Database};
use super::types::{DatabaseError, FeedFollow, FollowedFeed};

impl Database {
    // ========================================================================
    // Feed Follow Operations
    // ========================================================================

    /// Record that `user_id` follows `feed_id`.
    ///
    /// Returns `DatabaseError::Conflict` if the pair already exists
    /// (`unique_user_feed`).
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, DatabaseError> {
        let now = now_millis();
        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, feed_id, created_at, updated_at
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(follow)
    }

    /// The follow row for (user, feed), if any
    pub async fn get_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<Option<FeedFollow>, DatabaseError> {
        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT id, user_id, feed_id, created_at, updated_at
            FROM feed_follows
            WHERE user_id = ? AND feed_id = ?
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follow)
    }

    /// Feeds followed by a user, in the order they were followed
    pub async fn get_feed_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FollowedFeed>, DatabaseError> {
        let follows = sqlx::query_as::<_, FollowedFeed>(
            r#"
            SELECT ff.id AS follow_id, f.id AS feed_id, f.name AS feed_name,
                   f.url AS feed_url, u.name AS user_name
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            JOIN users u ON u.id = ff.user_id
            WHERE ff.user_id = ?
            ORDER BY ff.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(follows)
    }

    /// Remove the follow for (user, feed). Returns how many rows were removed.
    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed, User};

    async fn setup() -> (Database, User, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed(user.id, "Feed", "https://example.com/rss")
            .await
            .unwrap();
        (db, user, feed)
    }

    #[tokio::test]
    async fn test_create_follow_and_list() {
        let (db, user, feed) = setup().await;
        let follow = db.create_feed_follow(user.id, feed.id).await.unwrap();
        assert_eq!(follow.user_id, user.id);
        assert_eq!(follow.feed_id, feed.id);

        let follows = db.get_feed_follows_for_user(user.id).await.unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].feed_name, "Feed");
        assert_eq!(follows[0].user_name, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_follow_is_conflict() {
        let (db, user, feed) = setup().await;
        db.create_feed_follow(user.id, feed.id).await.unwrap();

        let err = db.create_feed_follow(user.id, feed.id).await.unwrap_err();
        assert!(err.is_conflict(), "expected Conflict, got {:?}", err);
        assert_eq!(db.get_feed_follows_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_feed_follow() {
        let (db, user, feed) = setup().await;
        assert!(db.get_feed_follow(user.id, feed.id).await.unwrap().is_none());

        let created = db.create_feed_follow(user.id, feed.id).await.unwrap();
        let found = db.get_feed_follow(user.id, feed.id).await.unwrap();
        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn test_delete_follow() {
        let (db, user, feed) = setup().await;
        db.create_feed_follow(user.id, feed.id).await.unwrap();

        assert_eq!(db.delete_feed_follow(user.id, feed.id).await.unwrap(), 1);
        assert_eq!(db.delete_feed_follow(user.id, feed.id).await.unwrap(), 0);
        assert!(db.get_feed_follows_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_follows_are_per_user() {
        let (db, alice, feed) = setup().await;
        let bob = db.create_user("bob").await.unwrap();
        db.create_feed_follow(alice.id, feed.id).await.unwrap();
        db.create_feed_follow(bob.id, feed.id).await.unwrap();

        db.delete_feed_follow(bob.id, feed.id).await.unwrap();

        assert_eq!(db.get_feed_follows_for_user(alice.id).await.unwrap().len(), 1);
        assert!(db.get_feed_follows_for_user(bob.id).await.unwrap().is_empty());
    }
}
