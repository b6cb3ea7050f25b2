//! Feed ingestion: fetching, parsing and storing feed entries as posts.
//!
//! - [`parser`] turns RSS (and, through `feed-rs`, Atom/RDF) bytes into
//!   normalized entries
//! - [`fetcher`] retrieves feed documents over HTTP within a time bound
//! - [`ingest`] runs one select, mark, fetch, parse, persist cycle
//!
//! ```ignore
//! use gator::feed::{scrape_next_feed, FeedClient, DEFAULT_FETCH_TIMEOUT};
//!
//! let client = FeedClient::new(DEFAULT_FETCH_TIMEOUT)?;
//! let report = scrape_next_feed(&db, &client).await?;
//! println!("{}", report);
//! ```

mod fetcher;
mod ingest;
mod parser;

pub use fetcher::{FeedClient, FetchError, DEFAULT_FETCH_TIMEOUT};
pub use ingest::{scrape_next_feed, store_entries, IngestError, IngestReport};
pub use parser::{parse_feed, parse_pub_date, ParseError, ParseResult, ParsedEntry};
