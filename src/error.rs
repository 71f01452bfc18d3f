//! Error types for itinerary-mesh.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for itinerary-mesh operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for itinerary-mesh.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown catalog item or reservation.
    #[error("{0} not found")]
    NotFound(String),

    /// Not enough remaining inventory for the request.
    #[error("not enough capacity for {item_id}: requested {requested}, only {available} left")]
    InsufficientCapacity {
        item_id: String,
        requested: u32,
        available: u32,
    },

    /// Quantity out of range (zero nights, zero passengers, ...).
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Malformed date or date in the past.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Reservation was already cancelled.
    #[error("booking {0} already cancelled")]
    AlreadyCancelled(String),

    /// Missing or malformed arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// No service declares the operation.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Transport failure or timeout reaching a service.
    #[error("service unreachable: {0}")]
    Unreachable(String),

    /// A peer answered with something that could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Oracle round limit hit for one user turn.
    #[error("orchestration exhausted after {rounds} rounds")]
    OrchestrationExhausted { rounds: usize },

    /// Decision oracle failed (unreachable, timed out, malformed decision).
    #[error("decision oracle error: {0}")]
    Oracle(String),

    /// User request was cancelled between rounds.
    #[error("request cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wire-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InsufficientCapacity { .. } => ErrorKind::InsufficientCapacity,
            Self::InvalidQuantity(_) => ErrorKind::InvalidQuantity,
            Self::InvalidDate(_) => ErrorKind::InvalidDate,
            Self::AlreadyCancelled(_) => ErrorKind::AlreadyCancelled,
            Self::Validation(_) | Self::Serialization(_) => ErrorKind::ValidationError,
            Self::UnknownOperation(_) => ErrorKind::UnknownOperation,
            Self::Unreachable(_) => ErrorKind::Unreachable,
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::OrchestrationExhausted { .. } => ErrorKind::OrchestrationExhausted,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Oracle(_) | Self::Config(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Error classification carried in result envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    InsufficientCapacity,
    InvalidQuantity,
    InvalidDate,
    AlreadyCancelled,
    ValidationError,
    UnknownOperation,
    Unreachable,
    Malformed,
    OrchestrationExhausted,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Whether resubmitting the same call may succeed.
    ///
    /// Only transport failures qualify; every other kind is terminal for
    /// the call that produced it.
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Unreachable)
    }
}
