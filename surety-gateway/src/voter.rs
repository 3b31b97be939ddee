//! Consensus voter: airline registration
//!
//! While fewer than [`REGISTRATION_THRESHOLD`] airlines are Registered and
//! Funded, any active airline registers a candidate on its own. From the
//! threshold on, a candidate needs a ballot: one vote per active airline,
//! resolved the moment votes strictly exceed half the active membership.
//! There is no separate tally step and ballots never expire.
//!
//! The gateway only pre-checks the sponsor and candidate. The tally itself
//! is a [`Mutation::CastVote`] that the store evaluates against its
//! committed ballot at commit time, so votes arriving through different
//! gateways are all counted.

use crate::funding::require_active;
use crate::plan::Plan;
use serde::Serialize;
use surety_store::{AccountId, Effect, Error, LedgerStore, Mutation, Result};

pub use surety_store::majority_reached;

/// Active membership at which registration switches to voting
pub const REGISTRATION_THRESHOLD: usize = 4;

/// Outcome of a nomination or vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    /// Candidate is now Registered
    pub resolved: bool,

    /// Votes counted for the candidate so far
    pub votes: usize,
}

/// Plan `sponsor`'s nomination of (or vote for) `candidate`
pub fn plan_nomination(
    store: &LedgerStore,
    sponsor: &AccountId,
    candidate: &AccountId,
) -> Result<Plan<()>> {
    if candidate.is_empty() {
        return Err(Error::InvalidArgument("empty candidate identity".to_string()));
    }

    require_active(store, sponsor)?;

    if store.is_airline(candidate)? {
        return Err(Error::AlreadyRegistered(candidate.to_string()));
    }

    Ok(Plan::new(
        vec![Mutation::CastVote {
            candidate: candidate.clone(),
            voter: sponsor.clone(),
            direct_below: REGISTRATION_THRESHOLD,
        }],
        (),
    ))
}

/// Read the committed tally out of a nomination's effects
pub fn registration_outcome(effects: &[Effect]) -> Result<RegistrationOutcome> {
    effects
        .iter()
        .find_map(|effect| match effect {
            Effect::Vote { resolved, votes } => Some(RegistrationOutcome {
                resolved: *resolved,
                votes: *votes,
            }),
            _ => None,
        })
        .ok_or_else(|| Error::Storage("nomination committed without a tally".to_string()))
}
