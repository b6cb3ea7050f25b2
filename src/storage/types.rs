use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database errors classified by what the caller can do about them.
///
/// Constraint failures are recognized from the driver's structured error
/// kind, never from message text, so callers can treat duplicates as benign.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The database stayed locked past the busy timeout
    #[error("Database is busy: another gator process is holding a write lock. Try again.")]
    Busy,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A uniqueness or primary key constraint rejected the write
    #[error("Record already exists ({0})")]
    Conflict(String),

    /// A lookup that must return a row found nothing
    #[error("Record not found")]
    NotFound,

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[source] sqlx::Error),
}

impl DatabaseError {
    /// True when the write was rejected as a duplicate.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Conflict(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    DatabaseError::Conflict(db_err.message().to_string())
                }
                _ => {
                    // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
                    let code = db_err.code();
                    let primary = code
                        .as_deref()
                        .and_then(|c| c.parse::<i32>().ok())
                        .map(|c| c & 0xff);
                    if matches!(primary, Some(5) | Some(6)) {
                        DatabaseError::Busy
                    } else {
                        DatabaseError::Other(sqlx::Error::Database(db_err))
                    }
                }
            },
            other => DatabaseError::Other(other),
        }
    }
}

// ============================================================================
// Write Types
// ============================================================================

/// A post parsed out of a feed, ready to be inserted
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed data from database
///
/// `last_fetched_at` is `None` until the scheduler has picked the feed once.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed joined with the name of the user who added it
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub owner_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A follow row joined with the feed and user names
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FollowedFeed {
    pub follow_id: i64,
    pub feed_id: i64,
    pub feed_name: String,
    pub feed_url: String,
    pub user_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub feed_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Post with the name of the feed it came from (browse listing)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostWithFeed {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub feed_name: String,
}
