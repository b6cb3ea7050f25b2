//! gator: a command-line RSS aggregator.
//!
//! Users follow feeds; the `agg` loop fetches one feed per tick and stores
//! its items as posts; `browse` prints the newest posts a user follows.

pub mod app;
pub mod config;
pub mod feed;
pub mod follows;
pub mod scheduler;
pub mod storage;
pub mod util;
