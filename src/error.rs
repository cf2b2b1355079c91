/// Errors that make a whole race log undecodable.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A field that must be an integer (word index, count, duration or the
    /// leading digits of a token) could not be parsed.
    #[error("invalid number in token '{token}'")]
    InvalidNumber { token: String },

    /// The token stream ended in the middle of a word group.
    #[error("log ended early, expected {expected}")]
    Truncated { expected: &'static str },
}

/// Errors that abandon a single race (or a single history page).
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    /// The page was fetched but did not have the shape we expect.
    #[error("could not extract {0} from page")]
    Parse(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}
