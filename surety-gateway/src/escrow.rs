//! Escrow ledger rules: policy purchase, status settlement, withdrawal
//!
//! Stakes go into the store's pool at purchase. A flight resolved as
//! [`FlightStatus::LateAirline`] credits every unpaid policy on it with
//! `stake × 1.5` in the same commit as the status; any other status pays
//! nothing and refunds nothing. Credited balances are withdrawn separately
//! through a [`Disburser`].

use crate::plan::Plan;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use surety_store::{
    AccountId, Error, FlightKey, FlightRecord, FlightStatus, LedgerStore, Mutation, Policy, Result,
};

/// Largest stake a single policy may carry
pub const MAX_POLICY_STAKE: Decimal = Decimal::ONE;

/// Payout per unit of stake on an airline-caused delay (1.5)
pub const PAYOUT_MULTIPLIER: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

/// Amount credited for a policy with `stake`
pub fn payout_for(stake: Decimal) -> Decimal {
    stake * PAYOUT_MULTIPLIER
}

/// Totals of a crediting pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CreditSummary {
    /// Policies credited
    pub policies: usize,

    /// Sum credited
    pub amount: Decimal,
}

/// Result of a status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Status now recorded
    pub status: FlightStatus,

    /// Policies credited by this report
    pub credited: CreditSummary,
}

/// Plan a policy purchase
pub fn plan_purchase(
    store: &LedgerStore,
    passenger: &AccountId,
    flight: &FlightKey,
    stake: Decimal,
) -> Result<Plan<Policy>> {
    if passenger.is_empty() {
        return Err(Error::InvalidArgument("empty passenger identity".to_string()));
    }
    if stake <= Decimal::ZERO || stake > MAX_POLICY_STAKE {
        return Err(Error::InvalidArgument(format!(
            "stake {} outside (0, {}]",
            stake, MAX_POLICY_STAKE
        )));
    }

    let record = require_flight(store, flight)?;
    if record.status.is_resolved() {
        return Err(Error::FlightAlreadyResolved(format!(
            "{} reported {}",
            record.flight, record.status
        )));
    }
    if store.get_policy(flight, passenger)?.is_some() {
        return Err(Error::DuplicatePolicy(format!(
            "{} on {}",
            passenger, record.flight
        )));
    }

    let policy = Policy::new(*flight, passenger.clone(), stake);
    Ok(Plan::new(
        vec![
            Mutation::CreatePolicy(policy.clone()),
            Mutation::Deposit(stake),
        ],
        policy,
    ))
}

/// Plan a write-once status report, crediting insurees when it pays out
pub fn plan_status_report(
    store: &LedgerStore,
    flight: &FlightKey,
    status: FlightStatus,
) -> Result<Plan<StatusReport>> {
    if !status.is_resolved() {
        return Err(Error::InvalidArgument(
            "cannot report Unknown status".to_string(),
        ));
    }

    let record = require_flight(store, flight)?;
    if record.status.is_resolved() {
        return Err(Error::AlreadyResolved(format!(
            "{} already reported {}",
            record.flight, record.status
        )));
    }

    let mut mutations = vec![Mutation::SetFlightStatus {
        key: *flight,
        status,
    }];

    let credited = if status.pays_out() {
        let (credits, summary) = credit_mutations(store, flight)?;
        mutations.extend(credits);
        summary
    } else {
        CreditSummary::default()
    };

    Ok(Plan::new(mutations, StatusReport { status, credited }))
}

/// Plan crediting of every unpaid policy on a paying flight.
///
/// Safe to repeat: paid policies are skipped, and a flight that did not
/// resolve as an airline-caused delay yields an empty plan.
pub fn plan_credit_insurees(
    store: &LedgerStore,
    flight: &FlightKey,
) -> Result<Plan<CreditSummary>> {
    let record = require_flight(store, flight)?;
    if !record.status.pays_out() {
        return Ok(Plan::noop(CreditSummary::default()));
    }

    let (mutations, summary) = credit_mutations(store, flight)?;
    Ok(Plan::new(mutations, summary))
}

fn credit_mutations(
    store: &LedgerStore,
    flight: &FlightKey,
) -> Result<(Vec<Mutation>, CreditSummary)> {
    let mut summary = CreditSummary::default();
    let mut mutations = Vec::new();

    for policy in store.flight_policies(flight)? {
        if policy.paid {
            continue;
        }
        let credit = payout_for(policy.stake);
        summary.policies += 1;
        summary.amount += credit;
        mutations.push(Mutation::MarkPolicyPaid {
            flight: *flight,
            passenger: policy.passenger,
            credit,
        });
    }

    Ok((mutations, summary))
}

fn require_flight(store: &LedgerStore, flight: &FlightKey) -> Result<FlightRecord> {
    store
        .get_flight(flight)?
        .ok_or_else(|| Error::UnknownFlight(flight.to_string()))
}

/// Moves value out of the scheme to a passenger
pub trait Disburser: Send + Sync + std::fmt::Debug {
    /// Transfer `amount` to `to`; an error means nothing was transferred
    fn transfer(&self, to: &AccountId, amount: Decimal) -> Result<()>;
}

/// One completed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    /// Recipient
    pub to: AccountId,

    /// Amount
    pub amount: Decimal,

    /// When it completed
    pub at: DateTime<Utc>,
}

/// In-memory disburser that records every transfer
#[derive(Debug, Default)]
pub struct PayoutJournal {
    transfers: Mutex<Vec<Transfer>>,
}

impl PayoutJournal {
    /// Empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfers so far
    pub fn transfers(&self) -> Vec<Transfer> {
        self.transfers.lock().clone()
    }

    /// Sum transferred to `to`
    pub fn total_to(&self, to: &AccountId) -> Decimal {
        self.transfers
            .lock()
            .iter()
            .filter(|t| &t.to == to)
            .map(|t| t.amount)
            .sum()
    }
}

impl Disburser for PayoutJournal {
    fn transfer(&self, to: &AccountId, amount: Decimal) -> Result<()> {
        self.transfers.lock().push(Transfer {
            to: to.clone(),
            amount,
            at: Utc::now(),
        });
        tracing::info!(to = %to, amount = %amount, "Payout transferred");
        Ok(())
    }
}
