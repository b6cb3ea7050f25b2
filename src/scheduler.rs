//! The `agg` loop: one ingestion cycle per tick, forever.
//!
//! Exactly one feed is fetched per tick, always the one that has waited
//! longest. With N feeds every feed is visited once every N ticks; fetches
//! are never run in parallel.

use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::config::ConfigError;
use crate::feed::{scrape_next_feed, FeedClient, IngestError, IngestReport};
use crate::storage::Database;

/// Parses the user-supplied interval between fetch cycles.
///
/// Accepts `humantime` durations (`30s`, `1m`, `1h 30m`, `1h30m`, `500ms`).
/// Zero is rejected: the loop needs a positive period.
pub fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    let interval = humantime::parse_duration(raw.trim()).map_err(|e| {
        ConfigError::InvalidInterval {
            value: raw.to_string(),
            reason: e.to_string(),
        }
    })?;

    if interval.is_zero() {
        return Err(ConfigError::InvalidInterval {
            value: raw.to_string(),
            reason: "interval must be greater than zero".to_string(),
        });
    }

    Ok(interval)
}

/// Drives ingestion cycles at a fixed interval.
pub struct Scheduler {
    db: Database,
    client: FeedClient,
    interval: Duration,
}

impl Scheduler {
    pub fn new(db: Database, client: FeedClient, interval: Duration) -> Self {
        Self {
            db,
            client,
            interval,
        }
    }

    /// Runs one ingestion cycle, reporting the outcome.
    ///
    /// A failed cycle is logged and printed to stderr, never propagated.
    pub async fn tick(&self) -> Result<IngestReport, IngestError> {
        let outcome = scrape_next_feed(&self.db, &self.client).await;
        match &outcome {
            Ok(report) => {
                println!("{}", report);
                for title in &report.saved {
                    println!("- Saved post: {}", title);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ingestion cycle failed");
                eprintln!("Error scraping feeds: {}", e);
            }
        }
        outcome
    }

    /// Runs a cycle immediately, then one per interval, until the process exits.
    ///
    /// If a cycle overruns the interval the next one starts as soon as it
    /// finishes and later ticks are pushed back, so cycles never overlap.
    pub async fn run(&self) {
        tracing::info!(interval = ?self.interval, "Starting feed collection");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately
            ticker.tick().await;
            let _ = self.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::User;
    use std::collections::HashSet;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EMPTY_RSS: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;

    async fn setup() -> (Database, User) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        (db, user)
    }

    fn client() -> FeedClient {
        FeedClient::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_interval_valid() {
        assert_eq!(parse_interval("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_interval("1h 30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_interval("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_interval_invalid() {
        for raw in ["", "soon", "10", "-5s", "1 fortnight"] {
            let err = parse_interval(raw).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidInterval { .. }),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_parse_interval_zero_rejected() {
        let err = parse_interval("0s").unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[tokio::test]
    async fn test_every_feed_visited_within_n_ticks() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_RSS))
            .mount(&mock_server)
            .await;

        let (db, user) = setup().await;
        let n = 5;
        for i in 0..n {
            db.create_feed(user.id, &format!("Feed {}", i), &format!("{}/feed/{}", mock_server.uri(), i))
                .await
                .unwrap();
        }

        let scheduler = Scheduler::new(db, client(), Duration::from_secs(60));
        for _round in 0..3 {
            let mut seen = HashSet::new();
            for _ in 0..n {
                let report = scheduler.tick().await.unwrap();
                seen.insert(report.feed_id);
            }
            assert_eq!(seen.len(), n, "each feed exactly once per round");
        }
    }

    #[tokio::test]
    async fn test_failing_feed_does_not_starve_others() {
        let mock_server = MockServer::start().await;
        Mock::given(wiremock::matchers::path("/bad"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        Mock::given(wiremock::matchers::path("/good"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_RSS))
            .mount(&mock_server)
            .await;

        let (db, user) = setup().await;
        let bad = db
            .create_feed(user.id, "Bad", &format!("{}/bad", mock_server.uri()))
            .await
            .unwrap();
        let good = db
            .create_feed(user.id, "Good", &format!("{}/good", mock_server.uri()))
            .await
            .unwrap();

        let scheduler = Scheduler::new(db, client(), Duration::from_secs(60));
        assert!(scheduler.tick().await.is_err());
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.feed_id, good.id);
        assert!(scheduler.tick().await.is_err(), "bad feed comes back around");
        assert_ne!(bad.id, good.id);
    }

    #[tokio::test]
    async fn test_run_survives_failing_cycles() {
        let (db, _) = setup().await;
        let scheduler = Scheduler::new(db, client(), Duration::from_millis(10));

        // No feeds: every cycle fails, the loop must keep going
        let result = tokio::time::timeout(Duration::from_millis(100), scheduler.run()).await;
        assert!(result.is_err(), "run() should only stop when cancelled");
    }
}
