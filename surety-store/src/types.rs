//! Core types for the ledger store
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for stakes and balances)
//! - Stable key schemas (see [`FlightKey`] and [`Policy::storage_key`])

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Account identifier (owner, gateway, airline, passenger, oracle relay)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Empty identities are never valid callers or record keys
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Airline membership status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MembershipStatus {
    /// Never nominated
    Unregistered = 0,
    /// Nominated, ballot open
    PendingVote = 1,
    /// Member of the scheme
    Registered = 2,
}

/// Airline record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airline {
    /// Airline identity
    pub id: AccountId,

    /// Membership status
    pub status: MembershipStatus,

    /// Funded flag (one-way, set once the minimum stake is deposited)
    pub funded: bool,

    /// Total value deposited by this airline (excess over minimum retained)
    pub deposited: Decimal,

    /// When the airline became Registered
    pub registered_at: Option<DateTime<Utc>>,
}

impl Airline {
    /// New airline record in the given status, unfunded
    pub fn new(id: AccountId, status: MembershipStatus) -> Self {
        let registered_at = (status == MembershipStatus::Registered).then(Utc::now);
        Self {
            id,
            status,
            funded: false,
            deposited: Decimal::ZERO,
            registered_at,
        }
    }

    /// Registered member
    pub fn is_registered(&self) -> bool {
        self.status == MembershipStatus::Registered
    }

    /// Registered and funded: may vote, sponsor and register flights
    pub fn is_active(&self) -> bool {
        self.is_registered() && self.funded
    }

    /// Move to Registered
    pub fn promote(&mut self) {
        self.status = MembershipStatus::Registered;
        self.registered_at = Some(Utc::now());
    }
}

/// Simple majority: strictly more than half
pub fn majority_reached(votes: usize, members: usize) -> bool {
    votes * 2 > members
}

/// Registration ballot for a candidate airline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Candidate identity
    pub candidate: AccountId,

    /// Distinct voters
    pub votes: BTreeSet<AccountId>,

    /// Majority reached
    pub resolved: bool,
}

impl Ballot {
    /// Open an empty ballot
    pub fn open(candidate: AccountId) -> Self {
        Self {
            candidate,
            votes: BTreeSet::new(),
            resolved: false,
        }
    }

    /// Number of votes cast
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Whether `voter` already voted
    pub fn has_voted(&self, voter: &AccountId) -> bool {
        self.votes.contains(voter)
    }
}

/// Flight status code, numeric values match the oracle wire encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlightStatus {
    /// Not yet reported
    Unknown = 0,
    /// On time
    OnTime = 10,
    /// Late, airline at fault (pays out)
    LateAirline = 20,
    /// Late, weather
    LateWeather = 30,
    /// Late, technical
    LateTechnical = 40,
    /// Late, other cause
    LateOther = 50,
}

impl FlightStatus {
    /// Numeric code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FlightStatus::Unknown),
            10 => Some(FlightStatus::OnTime),
            20 => Some(FlightStatus::LateAirline),
            30 => Some(FlightStatus::LateWeather),
            40 => Some(FlightStatus::LateTechnical),
            50 => Some(FlightStatus::LateOther),
            _ => None,
        }
    }

    /// A status other than Unknown is final
    pub fn is_resolved(&self) -> bool {
        *self != FlightStatus::Unknown
    }

    /// Only airline-caused delays pay out
    pub fn pays_out(&self) -> bool {
        *self == FlightStatus::LateAirline
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Flight key: SHA-256 over (airline, designator, scheduled timestamp)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlightKey([u8; 32]);

impl FlightKey {
    /// Derive the key for a flight
    pub fn derive(airline: &AccountId, flight: &str, timestamp: i64) -> Self {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update((airline.as_bytes().len() as u32).to_be_bytes());
        hasher.update(airline.as_bytes());
        hasher.update((flight.len() as u32).to_be_bytes());
        hasher.update(flight.as_bytes());
        hasher.update(timestamp.to_be_bytes());
        Self(hasher.finalize().into())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..6] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Flight record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Derived key
    pub key: FlightKey,

    /// Operating airline
    pub airline: AccountId,

    /// Flight designator, e.g. "ND1309"
    pub flight: String,

    /// Scheduled departure (milliseconds since Unix epoch)
    pub timestamp: i64,

    /// Status code (write-once after Unknown)
    pub status: FlightStatus,

    /// When the status was reported
    pub resolved_at: Option<DateTime<Utc>>,
}

impl FlightRecord {
    /// New flight in Unknown status
    pub fn new(airline: AccountId, flight: impl Into<String>, timestamp: i64) -> Self {
        let flight = flight.into();
        Self {
            key: FlightKey::derive(&airline, &flight, timestamp),
            airline,
            flight,
            timestamp,
            status: FlightStatus::Unknown,
            resolved_at: None,
        }
    }
}

/// Insurance policy: one per (flight, passenger)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Insured flight
    pub flight: FlightKey,

    /// Buyer
    pub passenger: AccountId,

    /// Stake paid in
    pub stake: Decimal,

    /// Payout credited
    pub paid: bool,

    /// Purchase time
    pub purchased_at: DateTime<Utc>,
}

impl Policy {
    /// New unpaid policy
    pub fn new(flight: FlightKey, passenger: AccountId, stake: Decimal) -> Self {
        Self {
            flight,
            passenger,
            stake,
            paid: false,
            purchased_at: Utc::now(),
        }
    }

    /// Key: flight key || passenger
    pub fn storage_key(flight: &FlightKey, passenger: &AccountId) -> Vec<u8> {
        let mut key = flight.as_bytes().to_vec();
        key.extend_from_slice(passenger.as_bytes());
        key
    }
}

/// A withdrawal debited from a balance whose transfer has not been settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    /// Beneficiary
    pub account: AccountId,

    /// Amount debited from balance and pool
    pub amount: Decimal,

    /// Caller that started the withdrawal
    pub caller: AccountId,

    /// When the debit committed
    pub started_at: DateTime<Utc>,
}

/// A single state change applied by the store.
///
/// A call to [`crate::LedgerStore::apply`] commits a list of these as one
/// transaction: every guard passes and every write lands, or nothing does.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert or replace an airline record
    PutAirline(Airline),

    /// Insert or replace a ballot
    PutBallot(Ballot),

    /// Record a new flight (rejects an existing key)
    RecordFlight(FlightRecord),

    /// Write-once status update
    SetFlightStatus {
        /// Flight
        key: FlightKey,
        /// New status (must not be Unknown)
        status: FlightStatus,
    },

    /// Create a policy (rejects an existing (flight, passenger))
    CreatePolicy(Policy),

    /// Set the paid flag and credit the passenger's withdrawable balance
    MarkPolicyPaid {
        /// Flight
        flight: FlightKey,
        /// Insured passenger
        passenger: AccountId,
        /// Amount credited
        credit: Decimal,
    },

    /// Add value to the balance pool
    Deposit(Decimal),

    /// Credit a withdrawable balance without touching the pool
    Credit {
        /// Beneficiary
        account: AccountId,
        /// Amount
        amount: Decimal,
    },

    /// Debit a withdrawable balance and the pool, leaving a
    /// [`PendingWithdrawal`] until the transfer is settled
    Withdraw {
        /// Beneficiary
        account: AccountId,
        /// Amount
        amount: Decimal,
    },

    /// Nominate or vote for a candidate airline. With fewer than
    /// `direct_below` Registered and Funded airlines the candidate is
    /// registered outright; otherwise the vote lands on its ballot.
    CastVote {
        /// Candidate airline
        candidate: AccountId,
        /// Registered and funded airline casting the vote
        voter: AccountId,
        /// Active membership at which voting starts
        direct_below: usize,
    },

    /// Deposit by a registered airline: sets the funded flag, adds to its
    /// deposited total and to the pool
    Fund {
        /// Depositing airline
        airline: AccountId,
        /// Amount
        amount: Decimal,
    },
}

/// What one committed mutation did, reported in mutation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Written as requested
    Applied,

    /// Vote counted
    Vote {
        /// Candidate is now Registered
        resolved: bool,
        /// Votes on the candidate's ballot (1 when registered outright)
        votes: usize,
    },

    /// Deposit accepted
    Funded {
        /// This deposit set the funded flag
        newly_funded: bool,
        /// Airline's deposited total afterwards
        deposited: Decimal,
    },

    /// Balance debited, transfer pending
    Withdrawn {
        /// Amount debited
        amount: Decimal,
    },
}

impl Mutation {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::PutAirline(_) => "put_airline",
            Mutation::PutBallot(_) => "put_ballot",
            Mutation::RecordFlight(_) => "record_flight",
            Mutation::SetFlightStatus { .. } => "set_flight_status",
            Mutation::CreatePolicy(_) => "create_policy",
            Mutation::MarkPolicyPaid { .. } => "mark_policy_paid",
            Mutation::Deposit(_) => "deposit",
            Mutation::Credit { .. } => "credit",
            Mutation::Withdraw { .. } => "withdraw",
            Mutation::CastVote { .. } => "cast_vote",
            Mutation::Fund { .. } => "fund",
        }
    }
}
