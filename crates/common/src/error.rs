use thiserror::Error;

use crate::RejectionReason;

/// HTTP-style status an exchange uses for "order/resource no longer exists".
pub const STATUS_NOT_FOUND: u16 = 404;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sequence error at token {position}: {message}")]
    Sequence { position: usize, message: String },

    #[error("Data error: {0}")]
    Data(String),

    #[error("Exchange API error (status {status:?}): {message}")]
    Exchange { status: Option<u16>, message: String },

    #[error("Order rejected: {reason}")]
    OrderRejected { reason: RejectionReason },

    #[error("Tool panicked: {0}")]
    Panic(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub fn exchange(status: Option<u16>, msg: impl Into<String>) -> Self {
        Error::Exchange {
            status,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::exchange(Some(STATUS_NOT_FOUND), msg)
    }

    pub fn rejected(reason: RejectionReason) -> Self {
        Error::OrderRejected { reason }
    }

    /// True when the exchange reported that the requested order no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Exchange {
                status: Some(STATUS_NOT_FOUND),
                ..
            }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_404_counts_as_not_found() {
        assert!(Error::not_found("gone").is_not_found());
        assert!(!Error::exchange(Some(500), "boom").is_not_found());
        assert!(!Error::exchange(None, "timeout").is_not_found());
        assert!(!Error::data("no ticker").is_not_found());
    }
}
