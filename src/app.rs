use chrono::DateTime;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::feed::{FeedClient, FetchError};
use crate::follows::{self, FollowError, FollowOutcome};
use crate::scheduler::{parse_interval, Scheduler};
use crate::storage::{Database, DatabaseError, PostWithFeed, User};
use crate::util::{strip_control_chars, truncate_to_width};

/// Posts shown by `browse` when no usable limit is given
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

/// Column budget for a post description in `browse` output
const DESCRIPTION_WIDTH: usize = 200;

// ============================================================================
// Error Types
// ============================================================================

/// Why a command failed. `Display` is the message printed after `Error: `.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("User {0:?} does not exist. Register with `gator register {0}`")]
    UserNotFound(String),
    #[error("User {0:?} already exists")]
    UserExists(String),
    #[error("User name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Follow(#[from] FollowError),
    #[error("Could not build HTTP client: {0}")]
    Client(#[from] FetchError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Could not write output: {0}")]
    Output(#[from] std::io::Error),
}

// ============================================================================
// Application State
// ============================================================================

/// Everything a command handler needs: the loaded config, where to write it
/// back, and the open store.
///
/// Handlers write user-facing output to `out` so they can be tested without
/// a terminal.
pub struct App {
    config: Config,
    config_path: PathBuf,
    db: Database,
}

impl App {
    pub fn new(config: Config, config_path: PathBuf, db: Database) -> Self {
        Self {
            config,
            config_path,
            db,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Resolve the logged-in user, for commands that act on their behalf.
    async fn current_user(&self) -> Result<User, CommandError> {
        let name = self.config.current_user()?;
        match self.db.get_user(name).await {
            Ok(user) => Ok(user),
            Err(DatabaseError::NotFound) => Err(CommandError::UserNotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    pub async fn register(&mut self, name: &str, out: &mut impl Write) -> Result<(), CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::EmptyName);
        }

        let user = match self.db.create_user(name).await {
            Ok(user) => user,
            Err(e) if e.is_conflict() => return Err(CommandError::UserExists(name.to_string())),
            Err(e) => return Err(e.into()),
        };
        self.config.set_user(&user.name, &self.config_path)?;

        tracing::info!(user_id = user.id, user = %user.name, "Registered user");
        writeln!(out, "User created: {}", strip_control_chars(&user.name))?;
        Ok(())
    }

    pub async fn login(&mut self, name: &str, out: &mut impl Write) -> Result<(), CommandError> {
        let user = match self.db.get_user(name.trim()).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound) => {
                return Err(CommandError::UserNotFound(name.trim().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        self.config.set_user(&user.name, &self.config_path)?;

        writeln!(out, "Logged in as {}", strip_control_chars(&user.name))?;
        Ok(())
    }

    /// Delete every user; feeds, follows and posts go with them.
    pub async fn reset(&mut self, out: &mut impl Write) -> Result<(), CommandError> {
        let removed = self.db.reset_users().await?;
        tracing::info!(removed, "Reset users");
        writeln!(out, "Deleted {} user(s)", removed)?;
        Ok(())
    }

    pub async fn users(&self, out: &mut impl Write) -> Result<(), CommandError> {
        let current = self.config.current_user_name.as_deref();
        for user in self.db.get_users().await? {
            if current == Some(user.name.as_str()) {
                writeln!(out, "* {} (current)", strip_control_chars(&user.name))?;
            } else {
                writeln!(out, "* {}", strip_control_chars(&user.name))?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Feeds and follows
    // ------------------------------------------------------------------------

    pub async fn feeds(&self, out: &mut impl Write) -> Result<(), CommandError> {
        let feeds = self.db.get_feeds_with_owner().await?;
        if feeds.is_empty() {
            writeln!(out, "No feeds yet. Add one with `gator addfeed <name> <url>`")?;
            return Ok(());
        }
        for feed in feeds {
            writeln!(
                out,
                "* {} ({}) added by {}",
                strip_control_chars(&feed.name),
                strip_control_chars(&feed.url),
                strip_control_chars(&feed.owner_name)
            )?;
        }
        Ok(())
    }

    pub async fn add_feed(
        &self,
        name: &str,
        url: &str,
        out: &mut impl Write,
    ) -> Result<(), CommandError> {
        let user = self.current_user().await?;
        let (feed, _) = follows::add_feed(&self.db, &user, name, url).await?;

        writeln!(out, "Feed added:")?;
        writeln!(out, "  ID:    {}", feed.id)?;
        writeln!(out, "  Name:  {}", strip_control_chars(&feed.name))?;
        writeln!(out, "  URL:   {}", strip_control_chars(&feed.url))?;
        writeln!(
            out,
            "{} now follows {}",
            strip_control_chars(&user.name),
            strip_control_chars(&feed.name)
        )?;
        Ok(())
    }

    pub async fn follow(&self, url: &str, out: &mut impl Write) -> Result<(), CommandError> {
        let user = self.current_user().await?;
        let (feed, outcome) = follows::follow(&self.db, &user, url).await?;
        let verb = match outcome {
            FollowOutcome::Followed(_) => "now follows",
            FollowOutcome::AlreadyFollowing => "already follows",
        };
        writeln!(
            out,
            "{} {} {}",
            strip_control_chars(&user.name),
            verb,
            strip_control_chars(&feed.name)
        )?;
        Ok(())
    }

    pub async fn following(&self, out: &mut impl Write) -> Result<(), CommandError> {
        let user = self.current_user().await?;
        let follows = follows::list_follows(&self.db, &user).await?;
        if follows.is_empty() {
            writeln!(out, "{} is not following any feeds", strip_control_chars(&user.name))?;
            return Ok(());
        }
        writeln!(out, "Feeds followed by {}:", strip_control_chars(&user.name))?;
        for f in follows {
            writeln!(
                out,
                "* {} ({})",
                strip_control_chars(&f.feed_name),
                strip_control_chars(&f.feed_url)
            )?;
        }
        Ok(())
    }

    pub async fn unfollow(&self, url: &str, out: &mut impl Write) -> Result<(), CommandError> {
        let user = self.current_user().await?;
        let feed = follows::unfollow(&self.db, &user, url).await?;
        writeln!(
            out,
            "{} unfollowed {}",
            strip_control_chars(&user.name),
            strip_control_chars(&feed.name)
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------------

    /// Print the newest posts from the feeds the current user follows.
    pub async fn browse(
        &self,
        limit: Option<&str>,
        out: &mut impl Write,
    ) -> Result<(), CommandError> {
        let user = self.current_user().await?;
        let limit = parse_browse_limit(limit);
        let posts = self.db.get_posts_for_user(user.id, limit).await?;

        if posts.is_empty() {
            writeln!(out, "No posts yet. Run `gator agg <interval>` to collect some")?;
            return Ok(());
        }

        writeln!(
            out,
            "Found {} post(s) for {}:",
            posts.len(),
            strip_control_chars(&user.name)
        )?;
        for post in &posts {
            write_post(out, post)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------------

    /// Collect feeds every `interval` until the process is killed.
    pub async fn agg(&self, interval: &str, out: &mut impl Write) -> Result<(), CommandError> {
        let interval = parse_interval(interval)?;
        let client = FeedClient::new(self.config.fetch_timeout())?;

        writeln!(
            out,
            "Collecting feeds every {}",
            humantime::format_duration(interval)
        )?;
        out.flush()?;

        Scheduler::new(self.db.clone(), client, interval).run().await;
        Ok(())
    }
}

/// Limit for `browse`: a positive integer, otherwise the default.
pub fn parse_browse_limit(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return DEFAULT_BROWSE_LIMIT;
    };
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => n,
        _ => {
            tracing::warn!(limit = %raw, "Invalid browse limit");
            eprintln!(
                "Invalid limit {:?}, showing {} posts",
                raw, DEFAULT_BROWSE_LIMIT
            );
            DEFAULT_BROWSE_LIMIT
        }
    }
}

fn write_post(out: &mut impl Write, post: &PostWithFeed) -> std::io::Result<()> {
    let published = post
        .published_at
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.format("%a %b %e %Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown date".to_string());

    writeln!(out)?;
    writeln!(out, "{} from {}", published, strip_control_chars(&post.feed_name))?;
    writeln!(out, "--- {} ---", strip_control_chars(&post.title))?;
    if let Some(description) = post.description.as_deref() {
        let flat = strip_control_chars(description)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !flat.is_empty() {
            writeln!(out, "    {}", truncate_to_width(&flat, DESCRIPTION_WIDTH))?;
        }
    }
    writeln!(out, "Link: {}", strip_control_chars(&post.url))?;
    writeln!(out, "=====================================")
}
