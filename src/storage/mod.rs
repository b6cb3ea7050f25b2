//! SQLite persistence for users, feeds, follows and posts.
//!
//! Every uniqueness rule (user name, feed URL, the (user, feed) follow pair,
//! post link) is a table constraint. Writes are single-row statements; a
//! constraint failure surfaces as [`DatabaseError::Conflict`].

mod feeds;
mod follows;
mod posts;
mod schema;
mod types;
mod users;

pub use schema::Database;
pub use types::{
    DatabaseError, Feed, FeedFollow, FeedWithOwner, FollowedFeed, NewPost, Post, PostWithFeed,
    User,
};
