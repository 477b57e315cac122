use std::io::ErrorKind;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to load settings: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("service error: {0}")]
    Service(String),

    #[error("request aborted by the service (status {0})")]
    Aborted(String),

    #[error("transfer incomplete: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("year {year}: {source}")]
    Year {
        year: i32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether another attempt at the same submission may succeed.
    ///
    /// Network trouble, throttling, server-side faults and truncated transfers
    /// are retried. Authentication, malformed requests, local filesystem
    /// faults such as permission errors, and anything the service reported as
    /// an explicit `error` are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => {
                if let Some(status) = e.status() {
                    is_transient_status(status)
                } else {
                    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
                }
            }
            Error::Status { status, .. } => is_transient_status(*status),
            Error::SizeMismatch { .. } => true,
            Error::Io(e) => is_transient_io(e.kind()),
            Error::Year { source, .. } => source.is_transient(),
            Error::InvalidRequest(_)
            | Error::Config(_)
            | Error::ConfigLoad(_)
            | Error::Service(_)
            | Error::Aborted(_)
            | Error::Json(_)
            | Error::Url(_) => false,
        }
    }

    pub(crate) fn for_year(self, year: i32) -> Self {
        Error::Year {
            year,
            source: Box::new(self),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn is_transient_io(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_faults_are_transient() {
        let throttled = Error::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "queue full".into(),
        };
        let unavailable = Error::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: String::new(),
        };
        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(Error::SizeMismatch { expected: 10, actual: 3 }.is_transient());
    }

    #[test]
    fn auth_and_service_errors_are_permanent() {
        let forbidden = Error::Status {
            status: StatusCode::FORBIDDEN,
            message: "invalid key".into(),
        };
        assert!(!forbidden.is_transient());
        assert!(!Error::Service("bad param 999.128".into()).is_transient());
        assert!(!Error::Config("missing key".into()).is_transient());
    }

    #[test]
    fn io_errors_are_classified_by_kind() {
        let denied = Error::from(std::io::Error::new(ErrorKind::PermissionDenied, "read-only"));
        let missing = Error::from(std::io::Error::new(ErrorKind::NotFound, "no such dir"));
        let reset = Error::from(std::io::Error::new(ErrorKind::ConnectionReset, "peer reset"));
        let eof = Error::from(std::io::Error::new(ErrorKind::UnexpectedEof, "short read"));
        assert!(!denied.is_transient());
        assert!(!missing.is_transient());
        assert!(reset.is_transient());
        assert!(eof.is_transient());
    }

    #[test]
    fn year_context_keeps_classification_and_message() {
        let e = Error::SizeMismatch { expected: 2, actual: 1 }.for_year(1994);
        assert!(e.is_transient());
        assert!(e.to_string().starts_with("year 1994: "));
    }
}
