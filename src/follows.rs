//! Feed registration and per-user follows.
//!
//! Uniqueness lives in the store (`feeds.url`, `unique_user_feed`); this
//! module turns those constraint hits into domain outcomes.
use thiserror::Error;

use crate::storage::{Database, DatabaseError, Feed, FeedFollow, FollowedFeed, User};
use crate::util::{validate_feed_url, UrlValidationError};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Could not create feed {0}: feed may already exist")]
    FeedExists(String),
    #[error("No feed with URL {0}. Add it with `gator addfeed <name> <url>`")]
    FeedNotFound(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result of a follow request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed(FeedFollow),
    AlreadyFollowing,
}

/// Register a feed owned by `user` and follow it on their behalf.
///
/// The feed row and the follow are separate inserts; if the follow fails the
/// feed stays registered and can be followed later.
pub async fn add_feed(
    db: &Database,
    user: &User,
    name: &str,
    url: &str,
) -> Result<(Feed, FeedFollow), FollowError> {
    let url = url.trim();
    validate_feed_url(url)?;

    let feed = match db.create_feed(user.id, name, url).await {
        Ok(feed) => feed,
        Err(e) if e.is_conflict() => return Err(FollowError::FeedExists(url.to_string())),
        Err(e) => return Err(e.into()),
    };
    tracing::info!(feed_id = feed.id, user = %user.name, url = %feed.url, "Feed added");

    let follow = db.create_feed_follow(user.id, feed.id).await?;
    Ok((feed, follow))
}

/// Resolve a feed by the URL it was added with.
async fn feed_for_url(db: &Database, url: &str) -> Result<Feed, FollowError> {
    match db.get_feed_by_url(url.trim()).await {
        Ok(feed) => Ok(feed),
        Err(DatabaseError::NotFound) => Err(FollowError::FeedNotFound(url.trim().to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Follow an existing feed. Following twice is not an error.
pub async fn follow(
    db: &Database,
    user: &User,
    url: &str,
) -> Result<(Feed, FollowOutcome), FollowError> {
    let feed = feed_for_url(db, url).await?;

    if db.get_feed_follow(user.id, feed.id).await?.is_some() {
        return Ok((feed, FollowOutcome::AlreadyFollowing));
    }

    // Another process may have inserted the same pair since the check
    let outcome = match db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => FollowOutcome::Followed(follow),
        Err(e) if e.is_conflict() => FollowOutcome::AlreadyFollowing,
        Err(e) => return Err(e.into()),
    };
    tracing::debug!(user = %user.name, feed_id = feed.id, ?outcome, "Follow");
    Ok((feed, outcome))
}

/// Stop following a feed. Unfollowing a feed that was not followed succeeds.
pub async fn unfollow(db: &Database, user: &User, url: &str) -> Result<Feed, FollowError> {
    let feed = feed_for_url(db, url).await?;
    let removed = db.delete_feed_follow(user.id, feed.id).await?;
    tracing::debug!(user = %user.name, feed_id = feed.id, removed, "Unfollow");
    Ok(feed)
}

pub async fn list_follows(db: &Database, user: &User) -> Result<Vec<FollowedFeed>, FollowError> {
    Ok(db.get_feed_follows_for_user(user.id).await?)
}
