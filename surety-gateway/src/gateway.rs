//! Gateway: the business-rule entry points external actors call
//!
//! Every mutating entry point checks the operational flag, then plans its
//! transaction against committed state and commits it through the store
//! under the gateway's own caller identity. Planning and commit run under
//! one write lock per gateway. Rules over shared tallies (ballots, airline
//! deposits, balances) are re-evaluated by the store when the transaction
//! commits, so several gateways may share one store.
//!
//! ```text
//!  client ──► Gateway ──(plan: voter / funding / escrow)──► LedgerStore
//!                │                                              ▲
//!                └──► StatusRequests ──► status relay ──────────┘
//!                                         (report_flight_status)
//! ```

use crate::escrow::{self, CreditSummary, Disburser, StatusReport};
use crate::funding::{self, FundingOutcome};
use crate::metrics::Metrics;
use crate::oracle::{OracleRequest, StatusRequests};
use crate::plan::Plan;
use crate::voter::{self, RegistrationOutcome};
use rust_decimal::Decimal;
use std::sync::Arc;
use surety_store::{
    AccountId, Effect, Error, FlightKey, FlightRecord, FlightStatus, LedgerStore, Mutation, Policy,
    Result,
};
use tokio::sync::{broadcast, Mutex};

/// Longest accepted flight designator
pub const MAX_DESIGNATOR_LEN: usize = 32;

/// Business-rule gateway over a [`LedgerStore`]
#[derive(Debug)]
pub struct Gateway {
    /// Caller identity presented to the store
    id: AccountId,

    /// Ledger store (owns all state)
    store: Arc<LedgerStore>,

    /// Status request fan-out
    requests: StatusRequests,

    /// Value transfer for withdrawals
    disburser: Arc<dyn Disburser>,

    /// Metrics
    metrics: Metrics,

    /// Serializes read-check-commit sequences
    write_lock: Mutex<()>,
}

impl Gateway {
    /// Create a gateway. The store owner must still authorize `id` before
    /// any mutating entry point succeeds.
    pub fn new(
        id: AccountId,
        store: Arc<LedgerStore>,
        disburser: Arc<dyn Disburser>,
        status_request_capacity: usize,
    ) -> Result<Self> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("empty gateway identity".to_string()));
        }
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            id,
            store,
            requests: StatusRequests::new(status_request_capacity),
            disburser,
            metrics,
            write_lock: Mutex::new(()),
        })
    }

    /// Gateway caller identity
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Subscribe to status requests issued by `fetch_flight_status`
    pub fn subscribe_status_requests(&self) -> broadcast::Receiver<OracleRequest> {
        self.requests.subscribe()
    }

    // Views

    /// Operational flag
    pub fn is_operational(&self) -> Result<bool> {
        self.store.is_operational()
    }

    /// Registered airline
    pub fn is_airline(&self, id: &AccountId) -> Result<bool> {
        self.store.is_airline(id)
    }

    /// Status of a flight
    pub fn flight_status(
        &self,
        airline: &AccountId,
        flight: &str,
        timestamp: i64,
    ) -> Result<FlightStatus> {
        self.store
            .get_flight_status(&FlightKey::derive(airline, flight, timestamp))
    }

    /// Policy held by `passenger` on a flight
    pub fn policy(
        &self,
        passenger: &AccountId,
        airline: &AccountId,
        flight: &str,
        timestamp: i64,
    ) -> Result<Option<Policy>> {
        self.store
            .get_policy(&FlightKey::derive(airline, flight, timestamp), passenger)
    }

    /// Withdrawable balance
    pub fn balance_of(&self, account: &AccountId) -> Result<Decimal> {
        self.store.balance_of(account)
    }

    // Entry points

    /// Nominate or vote for `candidate`. Returns whether the candidate is now
    /// registered and how many votes it holds.
    pub async fn register_airline(
        &self,
        caller: &AccountId,
        candidate: &AccountId,
    ) -> Result<RegistrationOutcome> {
        let result = self
            .transact_effects(|store| voter::plan_nomination(store, caller, candidate))
            .await
            .and_then(|((), effects)| voter::registration_outcome(&effects));
        let outcome = self.observe("register_airline", result)?;

        if outcome.resolved {
            self.metrics.airlines_registered.inc();
        } else {
            self.metrics.votes_cast.inc();
        }
        tracing::info!(
            sponsor = %caller,
            candidate = %candidate,
            resolved = outcome.resolved,
            votes = outcome.votes,
            "Airline registration processed"
        );
        Ok(outcome)
    }

    /// Deposit `amount` on behalf of the calling airline
    pub async fn fund(&self, caller: &AccountId, amount: Decimal) -> Result<FundingOutcome> {
        let result = self
            .transact_effects(|store| funding::plan_funding(store, caller, amount))
            .await
            .and_then(|((), effects)| funding::funding_outcome(&effects));
        let outcome = self.observe("fund", result)?;

        if outcome.newly_funded {
            self.metrics.airlines_funded.inc();
        }
        tracing::info!(
            airline = %caller,
            amount = %amount,
            newly_funded = outcome.newly_funded,
            deposited = %outcome.deposited,
            "Airline funding accepted"
        );
        Ok(outcome)
    }

    /// Record a flight operated by the calling airline
    pub async fn register_flight(
        &self,
        caller: &AccountId,
        flight: &str,
        timestamp: i64,
    ) -> Result<FlightKey> {
        let result = self
            .transact(|store| {
                validate_designator(flight, timestamp)?;
                funding::require_active(store, caller)?;
                let record = FlightRecord::new(caller.clone(), flight, timestamp);
                let key = record.key;
                Ok(Plan::new(vec![Mutation::RecordFlight(record)], key))
            })
            .await;
        let key = self.observe("register_flight", result)?;

        self.metrics.flights_registered.inc();
        tracing::info!(airline = %caller, flight, timestamp, key = %key, "Flight registered");
        Ok(key)
    }

    /// Buy a policy on a flight
    pub async fn buy(
        &self,
        passenger: &AccountId,
        airline: &AccountId,
        flight: &str,
        timestamp: i64,
        stake: Decimal,
    ) -> Result<Policy> {
        let key = FlightKey::derive(airline, flight, timestamp);
        let result = self
            .transact(|store| escrow::plan_purchase(store, passenger, &key, stake))
            .await;
        let policy = self.observe("buy", result)?;

        self.metrics.policies_sold.inc();
        tracing::info!(passenger = %passenger, flight, stake = %stake, "Policy purchased");
        Ok(policy)
    }

    /// Ask status collaborators to resolve a flight. Does not resolve it.
    pub async fn fetch_flight_status(
        &self,
        caller: &AccountId,
        airline: &AccountId,
        flight: &str,
        timestamp: i64,
    ) -> Result<OracleRequest> {
        let result = self.prepare_status_request(airline, flight, timestamp);
        let request = self.observe("fetch_flight_status", result)?;

        let receivers = self.requests.publish(request.clone());
        tracing::info!(
            caller = %caller,
            airline = %airline,
            flight,
            timestamp,
            index = request.index,
            receivers,
            "Flight status requested"
        );
        Ok(request)
    }

    fn prepare_status_request(
        &self,
        airline: &AccountId,
        flight: &str,
        timestamp: i64,
    ) -> Result<OracleRequest> {
        self.require_operational()?;
        let request = OracleRequest::new(airline.clone(), flight, timestamp);
        let record = self
            .store
            .get_flight(&request.key)?
            .ok_or_else(|| Error::UnknownFlight(format!("{} at {}", flight, timestamp)))?;
        if record.status.is_resolved() {
            return Err(Error::AlreadyResolved(format!(
                "{} already reported {}",
                flight, record.status
            )));
        }
        Ok(request)
    }

    /// Status-report entry point for the status relay. The reporter must be
    /// an authorized caller of the store. Write-once per flight; an
    /// airline-caused delay credits insurees in the same commit.
    pub async fn report_flight_status(
        &self,
        reporter: &AccountId,
        airline: &AccountId,
        flight: &str,
        timestamp: i64,
        status_code: u8,
    ) -> Result<StatusReport> {
        let key = FlightKey::derive(airline, flight, timestamp);
        let result = self
            .transact(|store| {
                if !store.is_authorized(reporter)? {
                    return Err(Error::Unauthorized(reporter.to_string()));
                }
                let status = FlightStatus::from_code(status_code).ok_or_else(|| {
                    Error::InvalidArgument(format!("unknown status code {}", status_code))
                })?;
                escrow::plan_status_report(store, &key, status)
            })
            .await;
        let report = self.observe("report_flight_status", result)?;

        self.metrics.status_reports.inc();
        self.metrics
            .payouts_credited
            .inc_by(report.credited.policies as u64);
        tracing::info!(
            reporter = %reporter,
            flight,
            timestamp,
            status = %report.status,
            credited = report.credited.policies,
            amount = %report.credited.amount,
            "Flight status recorded"
        );
        Ok(report)
    }

    /// Credit every unpaid policy on a flight that resolved as an
    /// airline-caused delay. Repeat calls credit nothing further.
    pub async fn credit_insurees(
        &self,
        airline: &AccountId,
        flight: &str,
        timestamp: i64,
    ) -> Result<CreditSummary> {
        let key = FlightKey::derive(airline, flight, timestamp);
        let result = self
            .transact(|store| escrow::plan_credit_insurees(store, &key))
            .await;
        let summary = self.observe("credit_insurees", result)?;

        self.metrics.payouts_credited.inc_by(summary.policies as u64);
        tracing::info!(
            flight,
            timestamp,
            credited = summary.policies,
            amount = %summary.amount,
            "Insurees credited"
        );
        Ok(summary)
    }

    /// Withdraw the passenger's whole credited balance.
    ///
    /// The balance is zeroed before the transfer and the debit is held as a
    /// pending withdrawal. If the transfer fails the pending withdrawal is
    /// settled back into the balance, even if the store was paused or this
    /// gateway deauthorized in the meantime, and the call fails with
    /// `InsufficientBalance`.
    pub async fn pay(&self, passenger: &AccountId) -> Result<Decimal> {
        let result = self.withdraw(passenger).await;
        let amount = self.observe("pay", result)?;

        self.metrics.withdrawals.inc();
        tracing::info!(passenger = %passenger, amount = %amount, "Withdrawal completed");
        Ok(amount)
    }

    async fn withdraw(&self, passenger: &AccountId) -> Result<Decimal> {
        self.require_operational()?;
        let _guard = self.write_lock.lock().await;

        let amount = self.store.balance_of(passenger)?;
        if amount <= Decimal::ZERO {
            return Err(Error::InsufficientBalance(format!(
                "{} has nothing to withdraw",
                passenger
            )));
        }

        self.store
            .apply(
                &self.id,
                vec![Mutation::Withdraw {
                    account: passenger.clone(),
                    amount,
                }],
            )
            .await?;

        match self.disburser.transfer(passenger, amount) {
            Ok(()) => {
                if let Err(e) = self
                    .store
                    .settle_withdrawal(&self.id, passenger.clone(), true)
                    .await
                {
                    tracing::warn!(
                        passenger = %passenger,
                        amount = %amount,
                        error = %e,
                        "Transfer completed but withdrawal left pending"
                    );
                }
                Ok(amount)
            }
            Err(e) => {
                tracing::warn!(
                    passenger = %passenger,
                    amount = %amount,
                    error = %e,
                    "Transfer failed, restoring balance"
                );
                self.store
                    .settle_withdrawal(&self.id, passenger.clone(), false)
                    .await?;
                Err(Error::InsufficientBalance(format!(
                    "transfer of {} to {} failed: {}",
                    amount, passenger, e
                )))
            }
        }
    }

    // Internals

    fn require_operational(&self) -> Result<()> {
        if !self.store.is_operational()? {
            return Err(Error::NotOperational);
        }
        Ok(())
    }

    /// Plan and commit under the write lock
    async fn transact<T>(
        &self,
        plan: impl FnOnce(&LedgerStore) -> Result<Plan<T>>,
    ) -> Result<T> {
        let (outcome, _) = self.transact_effects(plan).await?;
        Ok(outcome)
    }

    /// Plan and commit under the write lock, keeping the store's effects
    async fn transact_effects<T>(
        &self,
        plan: impl FnOnce(&LedgerStore) -> Result<Plan<T>>,
    ) -> Result<(T, Vec<Effect>)> {
        self.require_operational()?;
        let _guard = self.write_lock.lock().await;

        let Plan { mutations, outcome } = plan(self.store.as_ref())?;
        let effects = if mutations.is_empty() {
            Vec::new()
        } else {
            self.store.apply(&self.id, mutations).await?
        };
        Ok((outcome, effects))
    }

    fn observe<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.metrics.record_rejection(operation, e.kind());
            tracing::warn!(operation, kind = e.kind(), error = %e, "Call rejected");
        }
        result
    }
}

fn validate_designator(flight: &str, timestamp: i64) -> Result<()> {
    let flight = flight.trim();
    if flight.is_empty() || flight.len() > MAX_DESIGNATOR_LEN {
        return Err(Error::InvalidArgument(format!(
            "flight designator must be 1..={} characters",
            MAX_DESIGNATOR_LEN
        )));
    }
    if timestamp <= 0 {
        return Err(Error::InvalidArgument(format!(
            "invalid scheduled timestamp {}",
            timestamp
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_designator() {
        assert!(validate_designator("ND1309", 1).is_ok());
        assert!(validate_designator("  ", 1).is_err());
        assert!(validate_designator("ND1309", 0).is_err());
        assert!(validate_designator(&"X".repeat(MAX_DESIGNATOR_LEN + 1), 1).is_err());
    }
}
