//! Funding gate
//!
//! Only Registered and Funded airlines may nominate, vote or register
//! flights. Funding is one-way: a deposit of at least the store's minimum
//! flips an airline to funded; smaller deposits are rejected outright.
//! Deposits into an already-funded airline are accepted and retained in the
//! pool (no refund of the excess).
//!
//! The running total lives on the airline record and is advanced by
//! [`Mutation::Fund`] inside the store, never from a gateway's snapshot.

use crate::plan::Plan;
use rust_decimal::Decimal;
use serde::Serialize;
use surety_store::{AccountId, Airline, Effect, Error, LedgerStore, Mutation, Result};

/// Result of a funding call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FundingOutcome {
    /// This deposit flipped the airline to funded
    pub newly_funded: bool,

    /// Total deposited by the airline after this call
    pub deposited: Decimal,
}

/// Load `id` and require it to be Registered and Funded
pub fn require_active(store: &LedgerStore, id: &AccountId) -> Result<Airline> {
    let airline = require_registered(store, id)?;
    if !airline.funded {
        return Err(Error::NotFunded(id.to_string()));
    }
    Ok(airline)
}

/// Load `id` and require it to be Registered
pub fn require_registered(store: &LedgerStore, id: &AccountId) -> Result<Airline> {
    match store.get_airline(id)? {
        Some(airline) if airline.is_registered() => Ok(airline),
        _ => Err(Error::NotRegistered(id.to_string())),
    }
}

/// Plan a deposit by `airline`. The funded flag and running total are
/// updated by the store at commit time.
pub fn plan_funding(store: &LedgerStore, airline: &AccountId, amount: Decimal) -> Result<Plan<()>> {
    require_registered(store, airline)?;

    if amount <= Decimal::ZERO {
        return Err(Error::InvalidArgument(format!(
            "deposit must be positive, got {}",
            amount
        )));
    }

    let minimum = store.minimum_funding();
    if amount < minimum {
        return Err(Error::InsufficientFunds(format!(
            "deposit {} below minimum {}",
            amount, minimum
        )));
    }

    Ok(Plan::new(
        vec![Mutation::Fund {
            airline: airline.clone(),
            amount,
        }],
        (),
    ))
}

/// Read the committed funding result out of a deposit's effects
pub fn funding_outcome(effects: &[Effect]) -> Result<FundingOutcome> {
    effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Funded {
                newly_funded,
                deposited,
            } => Some(FundingOutcome {
                newly_funded: *newly_funded,
                deposited: *deposited,
            }),
            _ => None,
        })
        .ok_or_else(|| Error::Storage("deposit committed without a funding result".to_string()))
}
