use thiserror::Error;
use url::Url;

/// Errors that can occur during feed URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host to fetch from.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a feed source.
///
/// Only `http` and `https` URLs with a host are accepted. The URL is not
/// normalized: feeds are stored and looked up by the exact string the user
/// typed, so `follow` and `unfollow` must be given the same spelling as
/// `addfeed`.
///
/// ```
/// use gator::util::validate_feed_url;
///
/// let url = validate_feed_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// assert!(validate_feed_url("not a url").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}
