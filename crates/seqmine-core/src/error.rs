use thiserror::Error;

/// Errors surfaced to callers before or during miner construction.
///
/// Everything that can go wrong during mining itself (infrequent items,
/// sequences with no accepting run) is normal filtering, not an error.
/// Internal consistency violations are debug assertions, not `Error` values.
#[derive(Debug, Error)]
pub enum Error {
    /// An item reference did not resolve against the dictionary.
    #[error("unknown item: {0}")]
    NotFound(String),

    /// The pattern expression could not be parsed.
    #[error("syntax error in pattern expression at '{fragment}': {message}")]
    Syntax { fragment: String, message: String },

    /// A configuration value was rejected eagerly.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
