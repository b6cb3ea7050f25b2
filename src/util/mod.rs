//! Utility functions for common operations.
//!
//! - **URL validation**: feed URLs must be http(s) with a host
//! - **Text processing**: entity unescaping for feed text, terminal-safe
//!   output, Unicode-aware truncation

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_to_width, unescape_html};
pub(crate) use text::unescape_xml_lenient;
pub use url_validator::{validate_feed_url, UrlValidationError};
