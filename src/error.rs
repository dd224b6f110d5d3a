use thiserror::Error;

/// Result type for Secomat operations
pub type Result<T> = std::result::Result<T, SecomatError>;

/// Result type for a single exchange with the Secomat cloud API
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A failed exchange with the Secomat cloud API
///
/// Every variant means the same thing to callers: this fetch or command
/// attempt failed and may be tried again later.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The API answered with a status other than 200
    #[error("API returned {0}")]
    Status(u16),

    /// Connection, DNS or TLS failure
    #[error("Connection error: {0}")]
    Connection(#[source] reqwest::Error),

    /// The request did not complete within the client timeout
    #[error("timeout")]
    Timeout,

    /// A 200 response whose body could not be decoded as JSON
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl RemoteError {
    /// HTTP status carried by this error, if the API answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status(code) => Some(*code),
            _ => None,
        }
    }

    /// Whether the API rejected the claim token (401 or 403)
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, RemoteError::Status(401) | RemoteError::Status(403))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Connection(err)
        }
    }
}

/// Errors that can occur when setting up or observing a Secomat
#[derive(Error, Debug)]
pub enum SecomatError {
    /// The cloud API exchange failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The claim token was not accepted during setup
    #[error("Claim token was rejected or returned no serial number")]
    InvalidCredential,

    /// The HTTP client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// All senders of a subscription were dropped
    #[error("Subscription closed")]
    SubscriptionClosed,

    /// A subscriber fell behind and missed refresh events
    #[error("Missed {0} refresh events")]
    Lagged(u64),
}
