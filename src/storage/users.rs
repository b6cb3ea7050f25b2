use super::schema::{now_millis, Database};
use super::types::{DatabaseError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. Returns `DatabaseError::Conflict` if the name is taken.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = now_millis();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// Look up a user by name. Returns `DatabaseError::NotFound` if absent.
    pub async fn get_user(&self, name: &str) -> Result<User, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// All users ordered by name
    pub async fn get_users(&self) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Delete every user. Feeds, follows and posts go with them (ON DELETE CASCADE).
    ///
    /// Returns the number of users removed.
    pub async fn reset_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
