use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Errors raised by the newsletter manager: Gmail calls, third-party
/// pages, the local store and configuration.
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404), or nothing matched a sender
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400) or invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Unique constraint hit in the store
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Filter error: {0}")]
    FilterError(String),

    /// Third-party page request failed (unsubscribe/subscribe flows)
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Local SQLite store failure
    #[error("Store error: {0}")]
    StoreError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Analysis cache missing or unreadable
    #[error("Cache error: {0}")]
    CacheError(String),

    /// User cancelled operation
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GmailError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GmailError::RateLimitExceeded { .. }
                | GmailError::ServerError { .. }
                | GmailError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Wait used when the server gives no Retry-After
const DEFAULT_RETRY_AFTER: u64 = 5;

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {

    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            // Try to parse as integer (delay-seconds format)
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            // Try to parse as HTTP date format
            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                // Calculate seconds until that time
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

/// Map an HTTP status from the Gmail API onto an error variant
fn from_status(status_code: u16, message: String, retry_after: u64) -> GmailError {
    match status_code {
        // Rate limiting - transient
        429 => GmailError::RateLimitExceeded { retry_after },
        404 => GmailError::NotFound("Resource not found".to_string()),
        400 => GmailError::BadRequest(message),
        403 => GmailError::Forbidden(message),
        // Server errors - transient
        500..=599 => GmailError::ServerError {
            status: status_code,
            message,
        },
        _ => GmailError::ApiError(message),
    }
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let message = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                );
                from_status(status.as_u16(), message, parse_retry_after_header(response))
            }
            // Non-success response with a JSON error body: {"error": {"code": .., "message": ..}}
            google_gmail1::Error::BadRequest(ref err) => {
                let code = err["error"]["code"]
                    .as_u64()
                    .and_then(|code| u16::try_from(code).ok());
                let message = err["error"]["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                match code {
                    Some(code) => from_status(code, format!("HTTP {}: {}", code, message), DEFAULT_RETRY_AFTER),
                    None => GmailError::BadRequest(message),
                }
            }
            // Network/connection errors - transient
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            // IO errors - transient
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            // All other errors
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}

impl From<reqwest::Error> for GmailError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GmailError::HttpError(format!("request timed out: {}", error))
        } else {
            GmailError::HttpError(error.to_string())
        }
    }
}

impl From<rusqlite::Error> for GmailError {
    fn from(error: rusqlite::Error) -> Self {
        GmailError::StoreError(error.to_string())
    }
}
