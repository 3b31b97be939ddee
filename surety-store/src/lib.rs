//! Flight Surety Ledger Store
//!
//! Sole owner of the scheme's persisted state: airlines, registration
//! ballots, flight records, insurance policies, withdrawable balances, the
//! balance pool, the operational flag and the authorized-caller set.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task applies every mutation, in order
//! - **Gate**: Mutations require the operational flag and an authorized caller
//! - **Atomic Transactions**: A call's mutations commit as one RocksDB batch
//! - **Lock-free Reads**: Queries read the last committed state directly
//!
//! # Invariants
//!
//! - All-or-nothing: a rejected call writes nothing
//! - Write-once: a flight status leaves Unknown at most once
//! - Paid flag: a policy is credited at most once
//! - Uniqueness: one policy per (flight, passenger), one record per flight key

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use storage::Storage;
pub use store::LedgerStore;
pub use types::{
    majority_reached, AccountId, Airline, Ballot, Effect, FlightKey, FlightRecord, FlightStatus,
    MembershipStatus, Mutation, PendingWithdrawal, Policy,
};
