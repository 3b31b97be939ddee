//! Error types for the ledger store

use thiserror::Error;

/// Result type for store and gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Store errors
///
/// Every failure leaves state untouched: a call either commits in full or
/// returns one of these without writing.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller is not in the authorized-caller set
    #[error("Unauthorized caller: {0}")]
    Unauthorized(String),

    /// Non-owner called an owner-gated entry point
    #[error("Owner only: {0}")]
    OwnerOnly(String),

    /// Operational flag is off
    #[error("Store is not operational")]
    NotOperational,

    /// Caller or target is not a registered airline
    #[error("Airline not registered: {0}")]
    NotRegistered(String),

    /// Funding precondition unmet
    #[error("Airline not funded: {0}")]
    NotFunded(String),

    /// Airline or flight already registered
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Voter already voted for this candidate
    #[error("Duplicate vote by {voter} for {candidate}")]
    DuplicateVote {
        /// Voter identity
        voter: String,
        /// Candidate identity
        candidate: String,
    },

    /// Passenger already holds a policy on this flight
    #[error("Duplicate policy: {0}")]
    DuplicatePolicy(String),

    /// Status already reported, or policy already paid
    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    /// Purchase attempted after the flight status was finalized
    #[error("Flight already resolved: {0}")]
    FlightAlreadyResolved(String),

    /// Flight key not recorded
    #[error("Unknown flight: {0}")]
    UnknownFlight(String),

    /// Deposit below the funding minimum
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Nothing to withdraw, or the transfer could not complete
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Malformed key or amount
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "unauthorized",
            Error::OwnerOnly(_) => "owner_only",
            Error::NotOperational => "not_operational",
            Error::NotRegistered(_) => "not_registered",
            Error::NotFunded(_) => "not_funded",
            Error::AlreadyRegistered(_) => "already_registered",
            Error::DuplicateVote { .. } => "duplicate_vote",
            Error::DuplicatePolicy(_) => "duplicate_policy",
            Error::AlreadyResolved(_) => "already_resolved",
            Error::FlightAlreadyResolved(_) => "flight_already_resolved",
            Error::UnknownFlight(_) => "unknown_flight",
            Error::InsufficientFunds(_) => "insufficient_funds",
            Error::InsufficientBalance(_) => "insufficient_balance",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
