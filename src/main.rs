use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use gator::app::App;
use gator::config::{self, Config};
use gator::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Command-line RSS aggregator")]
struct Args {
    /// Config file to use instead of ~/.gatorconfig.json
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch to an existing user
    Login { name: String },
    /// Delete every user along with their feeds, follows and posts
    Reset,
    /// List users
    Users,
    /// Fetch feeds forever, one per interval (e.g. 30s, 1m, 1h)
    Agg { interval: String },
    /// Add a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List every feed with the user who added it
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List the feeds the current user follows
    Following,
    /// Stop following a feed by URL
    Unfollow { url: String },
    /// Show the newest posts from followed feeds (default 2)
    Browse {
        #[arg(allow_hyphen_values = true)]
        limit: Option<String>,
    },
}

/// Create the parent directory of a file database, user-only on Unix.
fn ensure_db_dir(db_url: &str) -> Result<()> {
    if db_url.starts_with("sqlite:") || db_url.contains(":memory:") {
        return Ok(());
    }
    let Some(dir) = Path::new(db_url).parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(());
    };
    if dir.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create database directory {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set database directory permissions to 0700"
            );
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => config::default_path()?,
    };
    let config = Config::read(&config_path)?;

    ensure_db_dir(&config.db_url)?;
    let db = Database::open(&config.db_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.db_url))?;

    let mut app = App::new(config, config_path, db);
    let mut out = std::io::stdout();

    match args.command {
        Command::Register { name } => app.register(&name, &mut out).await?,
        Command::Login { name } => app.login(&name, &mut out).await?,
        Command::Reset => app.reset(&mut out).await?,
        Command::Users => app.users(&mut out).await?,
        Command::Agg { interval } => app.agg(&interval, &mut out).await?,
        Command::AddFeed { name, url } => app.add_feed(&name, &url, &mut out).await?,
        Command::Feeds => app.feeds(&mut out).await?,
        Command::Follow { url } => app.follow(&url, &mut out).await?,
        Command::Following => app.following(&mut out).await?,
        Command::Unfollow { url } => app.unfollow(&url, &mut out).await?,
        Command::Browse { limit } => app.browse(limit.as_deref(), &mut out).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::debug!(error = ?e, "Command failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
