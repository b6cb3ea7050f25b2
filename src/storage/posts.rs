use super::schema::{now_millis, Database};
use super::types::{DatabaseError, NewPost, Post, PostWithFeed};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post for a feed.
    ///
    /// The link is unique across every feed. Inserting a link that is already
    /// stored returns `DatabaseError::Conflict` and leaves the existing row
    /// untouched, which is what makes re-fetching a feed idempotent.
    pub async fn create_post(&self, feed_id: i64, post: &NewPost) -> Result<Post, DatabaseError> {
        let now = now_millis();
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (title, url, description, published_at, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, title, url, description, published_at, feed_id, created_at, updated_at
        "#,
        )
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(post)
    }

    /// Newest posts across every feed the user follows.
    ///
    /// Ordered by publish time descending; posts without a publish time sort
    /// last, newest insert first among equals.
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostWithFeed>, DatabaseError> {
        let posts = sqlx::query_as::<_, PostWithFeed>(
            r#"
            SELECT p.id, p.title, p.url, p.description, p.published_at, f.name AS feed_name
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at IS NULL, p.published_at DESC, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// Number of posts stored for a feed
    pub async fn count_posts_for_feed(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of posts stored across all feeds
    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed, NewPost, User};
    use pretty_assertions::assert_eq;

    async fn setup() -> (Database, User, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed(user.id, "Feed A", "https://a.example.com/rss")
            .await
            .unwrap();
        (db, user, feed)
    }

    fn test_post(slug: &str, published_at: Option<i64>) -> NewPost {
        NewPost {
            title: format!("Post {}", slug),
            url: format!("https://example.com/{}", slug),
            description: Some("Test description".to_string()),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_create_post() {
        let (db, _, feed) = setup().await;
        let post = db
            .create_post(feed.id, &test_post("1", Some(1_704_067_200_000)))
            .await
            .unwrap();
        assert_eq!(post.feed_id, feed.id);
        assert_eq!(post.title, "Post 1");
        assert_eq!(post.published_at, Some(1_704_067_200_000));
        assert_eq!(db.count_posts_for_feed(feed.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_link_is_conflict_and_keeps_original() {
        let (db, _, feed) = setup().await;
        db.create_post(feed.id, &test_post("1", None)).await.unwrap();

        let mut changed = test_post("1", None);
        changed.title = "Changed".to_string();
        let err = db.create_post(feed.id, &changed).await.unwrap_err();
        assert!(err.is_conflict(), "expected Conflict, got {:?}", err);

        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_link_unique_across_feeds() {
        let (db, user, feed) = setup().await;
        let other = db
            .create_feed(user.id, "Feed B", "https://b.example.com/rss")
            .await
            .unwrap();
        db.create_post(feed.id, &test_post("shared", None))
            .await
            .unwrap();

        let err = db
            .create_post(other.id, &test_post("shared", None))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(db.count_posts_for_feed(other.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_posts_for_user_only_followed_feeds() {
        let (db, user, feed) = setup().await;
        let unfollowed = db
            .create_feed(user.id, "Feed B", "https://b.example.com/rss")
            .await
            .unwrap();
        db.create_feed_follow(user.id, feed.id).await.unwrap();

        db.create_post(feed.id, &test_post("1", Some(1_000))).await.unwrap();
        db.create_post(unfollowed.id, &test_post("2", Some(2_000)))
            .await
            .unwrap();

        let posts = db.get_posts_for_user(user.id, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].feed_name, "Feed A");
    }

    #[tokio::test]
    async fn test_posts_for_user_newest_first_unpublished_last() {
        let (db, user, feed) = setup().await;
        db.create_feed_follow(user.id, feed.id).await.unwrap();

        db.create_post(feed.id, &test_post("undated", None)).await.unwrap();
        db.create_post(feed.id, &test_post("old", Some(1_000))).await.unwrap();
        db.create_post(feed.id, &test_post("new", Some(3_000))).await.unwrap();
        db.create_post(feed.id, &test_post("mid", Some(2_000))).await.unwrap();

        let titles: Vec<String> = db
            .get_posts_for_user(user.id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(
            titles,
            vec!["Post new", "Post mid", "Post old", "Post undated"]
        );
    }

    #[tokio::test]
    async fn test_posts_for_user_respects_limit() {
        let (db, user, feed) = setup().await;
        db.create_feed_follow(user.id, feed.id).await.unwrap();
        for i in 0..5 {
            db.create_post(feed.id, &test_post(&i.to_string(), Some(i)))
                .await
                .unwrap();
        }

        let posts = db.get_posts_for_user(user.id, 2).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "Post 4");
    }
}
