use std::fmt;
use thiserror::Error;

use crate::feed::fetcher::{FeedClient, FetchError};
use crate::feed::parser::{parse_feed, ParseError, ParseResult, ParsedEntry};
use crate::storage::{Database, DatabaseError, Feed, NewPost};

/// Errors that end an ingestion cycle.
///
/// Per-entry persistence failures are not here: they are counted in the
/// [`IngestReport`] and the rest of the batch continues.
#[derive(Debug, Error)]
pub enum IngestError {
    /// There is no feed to fetch yet
    #[error("No feeds to fetch. Add one with `gator addfeed <name> <url>`")]
    NoFeeds,
    #[error("Could not fetch feed {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("Could not parse feed {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Outcome of one successful ingestion cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub feed_id: i64,
    pub feed_name: String,
    pub feed_url: String,
    /// Titles of posts inserted this cycle, in feed order
    pub saved: Vec<String>,
    /// Entries whose link was already stored
    pub duplicates: usize,
    /// Entries that failed to store for a reason other than a duplicate link
    pub failed: usize,
    /// Items the parser dropped because they had no link
    pub skipped: usize,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fetched feed: {} ({} new, {} already stored",
            self.feed_name,
            self.saved.len(),
            self.duplicates
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} without a link", self.skipped)?;
        }
        write!(f, ")")
    }
}

/// Runs one ingestion cycle against the least-recently-fetched feed.
///
/// Steps run strictly in order: select, mark fetched, fetch, parse, persist.
/// The feed is stamped before the network fetch so a slow or failing feed
/// goes to the back of the rotation instead of being retried every tick.
pub async fn scrape_next_feed(
    db: &Database,
    client: &FeedClient,
) -> Result<IngestReport, IngestError> {
    let feed = match db.get_next_feed_to_fetch().await {
        Ok(feed) => feed,
        Err(DatabaseError::NotFound) => return Err(IngestError::NoFeeds),
        Err(e) => return Err(e.into()),
    };

    db.mark_feed_fetched(feed.id).await?;
    tracing::debug!(feed_id = feed.id, url = %feed.url, "Fetching feed");

    let bytes = client
        .fetch(&feed.url)
        .await
        .map_err(|source| IngestError::Fetch {
            url: feed.url.clone(),
            source,
        })?;

    let parsed = parse_feed(&bytes).map_err(|source| IngestError::Parse {
        url: feed.url.clone(),
        source,
    })?;

    let report = store_entries(db, &feed, parsed).await;
    tracing::info!(
        feed_id = report.feed_id,
        feed = %report.feed_name,
        saved = report.saved.len(),
        duplicates = report.duplicates,
        failed = report.failed,
        skipped = report.skipped,
        "Feed ingested"
    );
    Ok(report)
}

/// Persists parsed entries as posts, one insert per entry.
///
/// A duplicate link is the expected outcome of re-fetching an unchanged feed
/// and is counted, not reported. Any other failure is logged for that entry
/// and the remaining entries are still attempted.
pub async fn store_entries(db: &Database, feed: &Feed, parsed: ParseResult) -> IngestReport {
    let mut report = IngestReport {
        feed_id: feed.id,
        feed_name: feed.name.clone(),
        feed_url: feed.url.clone(),
        saved: Vec::new(),
        duplicates: 0,
        failed: 0,
        skipped: parsed.skipped,
    };

    for entry in parsed.entries {
        let post = new_post(entry);
        match db.create_post(feed.id, &post).await {
            Ok(stored) => report.saved.push(stored.title),
            Err(e) if e.is_conflict() => report.duplicates += 1,
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    link = %post.url,
                    error = %e,
                    "Failed to store post"
                );
                report.failed += 1;
            }
        }
    }

    report
}

fn new_post(entry: ParsedEntry) -> NewPost {
    NewPost {
        title: entry.title,
        url: entry.link,
        description: entry.description,
        published_at: entry.published_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::User;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TWO_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>A</title>
    <item><title>Item A</title><link>http://a.test/1</link><pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate></item>
    <item><title>Item B</title><link>http://a.test/2</link></item>
</channel></rss>"#;

    async fn setup(url: &str) -> (Database, User, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db.create_feed(user.id, "Feed A", url).await.unwrap();
        (db, user, feed)
    }

    fn client() -> FeedClient {
        FeedClient::new(Duration::from_secs(5)).unwrap()
    }

    async fn serve(body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_scrape_saves_posts() {
        let server = serve(TWO_ITEMS).await;
        let (db, _, feed) = setup(&format!("{}/rss", server.uri())).await;

        let report = scrape_next_feed(&db, &client()).await.unwrap();
        assert_eq!(report.feed_id, feed.id);
        assert_eq!(report.saved, vec!["Item A", "Item B"]);
        assert_eq!(report.duplicates, 0);
        assert_eq!(db.count_posts_for_feed(feed.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_scrape_twice_is_idempotent() {
        let server = serve(TWO_ITEMS).await;
        let (db, _, feed) = setup(&format!("{}/rss", server.uri())).await;

        scrape_next_feed(&db, &client()).await.unwrap();
        let second = scrape_next_feed(&db, &client()).await.unwrap();

        assert!(second.saved.is_empty());
        assert_eq!(second.duplicates, 2);
        assert_eq!(db.count_posts_for_feed(feed.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_feeds() {
        let db = Database::open(":memory:").await.unwrap();
        let err = scrape_next_feed(&db, &client()).await.unwrap_err();
        assert!(matches!(err, IngestError::NoFeeds));
    }

    #[tokio::test]
    async fn test_failed_fetch_still_marks_fetched() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        let (db, _, _) = setup(&format!("{}/rss", mock_server.uri())).await;

        let err = scrape_next_feed(&db, &client()).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Fetch {
                source: FetchError::HttpStatus(503),
                ..
            }
        ));

        let feed = db
            .get_feed_by_url(&format!("{}/rss", mock_server.uri()))
            .await
            .unwrap();
        assert!(feed.last_fetched_at.is_some());
        assert_eq!(db.count_posts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_feed_is_parse_error() {
        let server = serve("<rss><channel><item></channel>").await;
        let (db, _, _) = setup(&format!("{}/rss", server.uri())).await;

        let err = scrape_next_feed(&db, &client()).await.unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_link_owned_by_other_feed_counts_as_duplicate() {
        let server = serve(TWO_ITEMS).await;
        let (db, user, feed) = setup(&format!("{}/rss", server.uri())).await;
        let other = db
            .create_feed(user.id, "Other", "https://other.example.com/rss")
            .await
            .unwrap();
        db.create_post(
            other.id,
            &NewPost {
                title: "Already here".into(),
                url: "http://a.test/1".into(),
                description: None,
                published_at: None,
            },
        )
        .await
        .unwrap();

        let report = scrape_next_feed(&db, &client()).await.unwrap();
        assert_eq!(report.feed_id, feed.id);
        assert_eq!(report.saved, vec!["Item B"]);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn test_report_display() {
        let report = IngestReport {
            feed_id: 1,
            feed_name: "Feed A".into(),
            feed_url: "http://a.test/rss".into(),
            saved: vec!["x".into()],
            duplicates: 2,
            failed: 1,
            skipped: 0,
        };
        assert_eq!(
            report.to_string(),
            "Fetched feed: Feed A (1 new, 2 already stored, 1 failed)"
        );
    }
}
