//! Flight Surety Gateway
//!
//! Business rules of the flight-delay insurance scheme, layered over the
//! [`surety_store::LedgerStore`]:
//!
//! - **Consensus voter**: airline registration, direct below four active
//!   airlines and by strict-majority ballot from then on
//! - **Funding gate**: only Registered and Funded airlines participate
//! - **Escrow ledger**: policy purchase, write-once status settlement with
//!   a 1.5x payout on airline-caused delays, and withdrawal
//! - **Status requests**: `fetch_flight_status` fans requests out to
//!   subscribed status collaborators
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use surety_gateway::{AccountId, Gateway, LedgerStore, PayoutJournal};
//!
//! # async fn example() -> surety_gateway::Result<()> {
//! let store = Arc::new(LedgerStore::open(Default::default()).await?);
//! let gateway = Gateway::new(
//!     AccountId::new("gateway"),
//!     store.clone(),
//!     Arc::new(PayoutJournal::new()),
//!     256,
//! )?;
//! store
//!     .authorize_caller(store.owner(), gateway.id().clone())
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod escrow;
pub mod funding;
pub mod gateway;
pub mod metrics;
pub mod oracle;
pub mod plan;
pub mod voter;

// Re-exports
pub use config::{Config, DeploymentRecord, NetworkAddresses};
pub use escrow::{
    CreditSummary, Disburser, PayoutJournal, StatusReport, MAX_POLICY_STAKE, PAYOUT_MULTIPLIER,
};
pub use funding::FundingOutcome;
pub use gateway::Gateway;
pub use metrics::Metrics;
pub use oracle::{OracleRequest, StatusRequests};
pub use voter::{RegistrationOutcome, REGISTRATION_THRESHOLD};

pub use surety_store::{
    AccountId, Airline, Error, FlightKey, FlightStatus, LedgerStore, MembershipStatus, Policy,
    Result,
};
