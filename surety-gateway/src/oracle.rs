//! Flight status request fan-out
//!
//! `fetch_flight_status` does not resolve anything itself: it broadcasts an
//! [`OracleRequest`] to every subscribed status collaborator, which later
//! answers through the gateway's status-report entry point.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use surety_store::{AccountId, FlightKey};
use tokio::sync::broadcast;

/// Oracle indexes are drawn from `0..ORACLE_INDEX_RANGE`
pub const ORACLE_INDEX_RANGE: u8 = 10;

/// Status request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Index oracles must hold to answer
    pub index: u8,

    /// Operating airline
    pub airline: AccountId,

    /// Flight designator
    pub flight: String,

    /// Scheduled departure (ms since epoch)
    pub timestamp: i64,

    /// Derived flight key
    pub key: FlightKey,

    /// When the request was issued
    pub requested_at: DateTime<Utc>,
}

impl OracleRequest {
    /// New request with a random oracle index
    pub fn new(airline: AccountId, flight: impl Into<String>, timestamp: i64) -> Self {
        let flight = flight.into();
        Self {
            index: random_index(),
            key: FlightKey::derive(&airline, &flight, timestamp),
            airline,
            flight,
            timestamp,
            requested_at: Utc::now(),
        }
    }
}

/// Random oracle index
pub fn random_index() -> u8 {
    rand::thread_rng().gen_range(0..ORACLE_INDEX_RANGE)
}

/// Broadcast channel for status requests
#[derive(Debug, Clone)]
pub struct StatusRequests {
    sender: broadcast::Sender<OracleRequest>,
}

impl StatusRequests {
    /// Channel buffering up to `capacity` requests per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future requests
    pub fn subscribe(&self) -> broadcast::Receiver<OracleRequest> {
        self.sender.subscribe()
    }

    /// Publish a request; returns how many subscribers received it
    pub fn publish(&self, request: OracleRequest) -> usize {
        match self.sender.send(request) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(request)) => {
                tracing::debug!(
                    flight = %request.flight,
                    "No status collaborator subscribed, request dropped"
                );
                0
            }
        }
    }
}
