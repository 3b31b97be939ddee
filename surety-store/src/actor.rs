//! Actor-based concurrency for the ledger store
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task applies every mutation in arrival order
//! - Each message is checked, staged and committed before the next is read
//! - Async message passing with backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Gateway / owner tooling / status relay         │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               StoreHandle (Clone)                     │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              StoreActor (Single Task)                 │
//! │  gate: owner / operational / authorized caller        │
//! │  stage: guards read through the pending overlay       │
//! │                       │                               │
//! │                       ▼                               │
//! │             Storage::commit(WriteSet)                 │
//! │          (atomic write to RocksDB)                    │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Reads never go through the actor: they hit RocksDB directly and see the
//! last committed batch.

use crate::storage::{Storage, Write, WriteSet};
use crate::types::{
    majority_reached, AccountId, Airline, Ballot, Effect, FlightKey, FlightRecord,
    MembershipStatus, Mutation, PendingWithdrawal, Policy,
};
use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the store actor
#[derive(Debug)]
pub enum StoreMessage {
    /// Apply mutations as one transaction
    Apply {
        caller: AccountId,
        mutations: Vec<Mutation>,
        response: oneshot::Sender<Result<Vec<Effect>>>,
    },

    /// Clear a pending withdrawal, restoring it unless the transfer completed
    SettleWithdrawal {
        caller: AccountId,
        account: AccountId,
        completed: bool,
        response: oneshot::Sender<Result<Decimal>>,
    },

    /// Toggle the operational flag (owner only, bypasses the flag)
    SetOperational {
        caller: AccountId,
        mode: bool,
        response: oneshot::Sender<Result<()>>,
    },

    /// Add or remove an authorized caller (owner only)
    SetAuthorized {
        caller: AccountId,
        target: AccountId,
        allowed: bool,
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the write path
pub struct StoreActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Owner identity fixed at construction
    owner: AccountId,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<StoreMessage>,
}

impl StoreActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        owner: AccountId,
        mailbox: mpsc::Receiver<StoreMessage>,
    ) -> Self {
        Self {
            storage,
            owner,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                StoreMessage::Shutdown => break,
                StoreMessage::Apply {
                    caller,
                    mutations,
                    response,
                } => {
                    let result = self.apply(&caller, mutations);
                    let _ = response.send(result);
                }
                StoreMessage::SetOperational {
                    caller,
                    mode,
                    response,
                } => {
                    let result = self.set_operational(&caller, mode);
                    let _ = response.send(result);
                }
                StoreMessage::SetAuthorized {
                    caller,
                    target,
                    allowed,
                    response,
                } => {
                    let result = self.set_authorized(&caller, target, allowed);
                    let _ = response.send(result);
                }
                StoreMessage::SettleWithdrawal {
                    caller,
                    account,
                    completed,
                    response,
                } => {
                    let result = self.settle_withdrawal(&caller, &account, completed);
                    let _ = response.send(result);
                }
            }
        }

        tracing::info!("Store actor stopped");
    }

    fn require_owner(&self, caller: &AccountId, action: &str) -> Result<()> {
        if caller != &self.owner {
            tracing::warn!(caller = %caller, action, "Rejected non-owner call");
            return Err(Error::OwnerOnly(format!("{} may not {}", caller, action)));
        }
        Ok(())
    }

    fn require_operational(&self) -> Result<()> {
        if !self.storage.is_operational()? {
            return Err(Error::NotOperational);
        }
        Ok(())
    }

    fn set_operational(&self, caller: &AccountId, mode: bool) -> Result<()> {
        self.require_owner(caller, "set operational status")?;

        let mut set = WriteSet::new();
        set.push(Write::Operational(mode));
        self.storage.commit(&set)?;

        tracing::info!(operational = mode, "Operational status changed");
        Ok(())
    }

    fn set_authorized(&self, caller: &AccountId, target: AccountId, allowed: bool) -> Result<()> {
        self.require_owner(caller, "change authorized callers")?;
        self.require_operational()?;

        if target.is_empty() {
            return Err(Error::InvalidArgument("empty caller identity".to_string()));
        }

        let mut set = WriteSet::new();
        set.push(Write::Authorized(target.clone(), allowed));
        self.storage.commit(&set)?;

        tracing::info!(target = %target, allowed, "Authorized caller updated");
        Ok(())
    }

    /// Bypasses the operational and caller gates: it only finishes a
    /// withdrawal that already passed them.
    fn settle_withdrawal(
        &self,
        caller: &AccountId,
        account: &AccountId,
        completed: bool,
    ) -> Result<Decimal> {
        let pending = self.storage.get_withdrawal(account)?.ok_or_else(|| {
            Error::InvalidArgument(format!("no withdrawal in flight for {}", account))
        })?;
        if caller != &pending.caller && caller != &self.owner {
            tracing::warn!(caller = %caller, account = %account, "Rejected withdrawal settlement");
            return Err(Error::Unauthorized(caller.to_string()));
        }

        let mut set = WriteSet::new();
        set.push(Write::ClearWithdrawal(account.clone()));
        if !completed {
            let balance = self.storage.balance(account)?;
            let pool = self.storage.pool()?;
            set.push(Write::Balance(account.clone(), balance + pending.amount));
            set.push(Write::Pool(pool + pending.amount));
        }
        self.storage.commit(&set)?;

        tracing::info!(
            account = %account,
            amount = %pending.amount,
            completed,
            "Withdrawal settled"
        );
        Ok(pending.amount)
    }

    fn apply(&self, caller: &AccountId, mutations: Vec<Mutation>) -> Result<Vec<Effect>> {
        self.require_operational()?;

        if !self.storage.is_authorized(caller)? {
            tracing::warn!(caller = %caller, "Rejected unauthorized mutation");
            return Err(Error::Unauthorized(caller.to_string()));
        }

        if mutations.is_empty() {
            return Err(Error::InvalidArgument("empty transaction".to_string()));
        }

        let mut staging = Staging::new(&self.storage, caller);
        let mut effects = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let kind = mutation.kind();
            match staging.stage(mutation) {
                Ok(effect) => effects.push(effect),
                Err(e) => {
                    tracing::debug!(
                        caller = %caller,
                        mutation = kind,
                        error = %e,
                        "Transaction rejected"
                    );
                    return Err(e);
                }
            }
        }

        let set = staging.into_write_set();
        self.storage.commit(&set)?;

        tracing::debug!(
            caller = %caller,
            mutations = effects.len(),
            writes = set.len(),
            "Transaction committed"
        );
        Ok(effects)
    }
}

/// Pending writes of one transaction. Guards read through this overlay so a
/// later mutation sees the effect of an earlier one in the same call.
struct Staging<'a> {
    storage: &'a Storage,
    caller: &'a AccountId,
    airlines: HashMap<AccountId, Airline>,
    ballots: HashMap<AccountId, Ballot>,
    flights: HashMap<FlightKey, FlightRecord>,
    policies: HashMap<Vec<u8>, Policy>,
    balances: HashMap<AccountId, Decimal>,
    withdrawals: HashMap<AccountId, PendingWithdrawal>,
    pool: Option<Decimal>,
}

impl<'a> Staging<'a> {
    fn new(storage: &'a Storage, caller: &'a AccountId) -> Self {
        Self {
            storage,
            caller,
            airlines: HashMap::new(),
            ballots: HashMap::new(),
            flights: HashMap::new(),
            policies: HashMap::new(),
            balances: HashMap::new(),
            withdrawals: HashMap::new(),
            pool: None,
        }
    }

    fn airline(&self, id: &AccountId) -> Result<Option<Airline>> {
        match self.airlines.get(id) {
            Some(airline) => Ok(Some(airline.clone())),
            None => self.storage.get_airline(id),
        }
    }

    fn ballot(&self, candidate: &AccountId) -> Result<Option<Ballot>> {
        match self.ballots.get(candidate) {
            Some(ballot) => Ok(Some(ballot.clone())),
            None => self.storage.get_ballot(candidate),
        }
    }

    /// Registered and Funded airlines, staged records taking precedence
    fn active_members(&self) -> Result<usize> {
        let committed = self
            .storage
            .airlines()?
            .iter()
            .filter(|a| !self.airlines.contains_key(&a.id) && a.is_active())
            .count();
        let staged = self.airlines.values().filter(|a| a.is_active()).count();
        Ok(committed + staged)
    }

    fn withdrawal_pending(&self, account: &AccountId) -> Result<bool> {
        if self.withdrawals.contains_key(account) {
            return Ok(true);
        }
        Ok(self.storage.get_withdrawal(account)?.is_some())
    }

    fn registered(&self, id: &AccountId) -> Result<Airline> {
        match self.airline(id)? {
            Some(airline) if airline.is_registered() => Ok(airline),
            _ => Err(Error::NotRegistered(id.to_string())),
        }
    }

    fn flight(&self, key: &FlightKey) -> Result<Option<FlightRecord>> {
        match self.flights.get(key) {
            Some(flight) => Ok(Some(flight.clone())),
            None => self.storage.get_flight(key),
        }
    }

    fn policy(&self, flight: &FlightKey, passenger: &AccountId) -> Result<Option<Policy>> {
        match self.policies.get(&Policy::storage_key(flight, passenger)) {
            Some(policy) => Ok(Some(policy.clone())),
            None => self.storage.get_policy(flight, passenger),
        }
    }

    fn balance(&self, account: &AccountId) -> Result<Decimal> {
        match self.balances.get(account) {
            Some(balance) => Ok(*balance),
            None => self.storage.balance(account),
        }
    }

    fn pool(&self) -> Result<Decimal> {
        match self.pool {
            Some(pool) => Ok(pool),
            None => self.storage.pool(),
        }
    }

    fn require_positive(amount: Decimal, what: &str) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidArgument(format!(
                "{} must be positive, got {}",
                what, amount
            )));
        }
        Ok(())
    }

    fn stage(&mut self, mutation: Mutation) -> Result<Effect> {
        match mutation {
            Mutation::PutAirline(airline) => {
                if airline.id.is_empty() {
                    return Err(Error::InvalidArgument("empty airline identity".to_string()));
                }
                self.airlines.insert(airline.id.clone(), airline);
            }

            Mutation::PutBallot(ballot) => {
                if ballot.candidate.is_empty() {
                    return Err(Error::InvalidArgument("empty candidate identity".to_string()));
                }
                self.ballots.insert(ballot.candidate.clone(), ballot);
            }

            Mutation::RecordFlight(flight) => {
                if flight.flight.trim().is_empty() {
                    return Err(Error::InvalidArgument("empty flight designator".to_string()));
                }
                if flight.status.is_resolved() {
                    return Err(Error::InvalidArgument(
                        "new flights start in Unknown status".to_string(),
                    ));
                }
                if self.flight(&flight.key)?.is_some() {
                    return Err(Error::AlreadyRegistered(format!(
                        "flight {} at {}",
                        flight.flight, flight.timestamp
                    )));
                }
                self.flights.insert(flight.key, flight);
            }

            Mutation::SetFlightStatus { key, status } => {
                if !status.is_resolved() {
                    return Err(Error::InvalidArgument(
                        "cannot report Unknown status".to_string(),
                    ));
                }
                let mut flight = self
                    .flight(&key)?
                    .ok_or_else(|| Error::UnknownFlight(key.to_string()))?;
                if flight.status.is_resolved() {
                    return Err(Error::AlreadyResolved(format!(
                        "flight {} already reported {}",
                        flight.flight, flight.status
                    )));
                }
                flight.status = status;
                flight.resolved_at = Some(Utc::now());
                self.flights.insert(key, flight);
            }

            Mutation::CreatePolicy(policy) => {
                Self::require_positive(policy.stake, "stake")?;
                if policy.paid {
                    return Err(Error::InvalidArgument("new policies start unpaid".to_string()));
                }
                if self.flight(&policy.flight)?.is_none() {
                    return Err(Error::UnknownFlight(policy.flight.to_string()));
                }
                if self.policy(&policy.flight, &policy.passenger)?.is_some() {
                    return Err(Error::DuplicatePolicy(format!(
                        "{} on flight {}",
                        policy.passenger, policy.flight
                    )));
                }
                let key = Policy::storage_key(&policy.flight, &policy.passenger);
                self.policies.insert(key, policy);
            }

            Mutation::MarkPolicyPaid {
                flight,
                passenger,
                credit,
            } => {
                Self::require_positive(credit, "credit")?;
                let mut policy = self.policy(&flight, &passenger)?.ok_or_else(|| {
                    Error::InvalidArgument(format!("no policy for {} on {}", passenger, flight))
                })?;
                if policy.paid {
                    return Err(Error::AlreadyResolved(format!(
                        "policy for {} on {} already paid",
                        passenger, flight
                    )));
                }
                policy.paid = true;
                let balance = self.balance(&passenger)?;
                self.balances.insert(passenger.clone(), balance + credit);
                self.policies
                    .insert(Policy::storage_key(&flight, &passenger), policy);
            }

            Mutation::Deposit(amount) => {
                Self::require_positive(amount, "deposit")?;
                self.pool = Some(self.pool()? + amount);
            }

            Mutation::Credit { account, amount } => {
                Self::require_positive(amount, "credit")?;
                let balance = self.balance(&account)?;
                self.balances.insert(account, balance + amount);
            }

            Mutation::Withdraw { account, amount } => {
                Self::require_positive(amount, "withdrawal")?;
                let balance = self.balance(&account)?;
                if balance < amount {
                    return Err(Error::InsufficientBalance(format!(
                        "{} holds {}, requested {}",
                        account, balance, amount
                    )));
                }
                let pool = self.pool()?;
                if pool < amount {
                    return Err(Error::InsufficientBalance(format!(
                        "pool holds {}, requested {}",
                        pool, amount
                    )));
                }
                if self.withdrawal_pending(&account)? {
                    return Err(Error::InsufficientBalance(format!(
                        "withdrawal for {} already in flight",
                        account
                    )));
                }
                self.balances.insert(account.clone(), balance - amount);
                self.pool = Some(pool - amount);
                self.withdrawals.insert(
                    account.clone(),
                    PendingWithdrawal {
                        account,
                        amount,
                        caller: self.caller.clone(),
                        started_at: Utc::now(),
                    },
                );
                return Ok(Effect::Withdrawn { amount });
            }

            Mutation::CastVote {
                candidate,
                voter,
                direct_below,
            } => return self.cast_vote(candidate, voter, direct_below),

            Mutation::Fund { airline, amount } => {
                Self::require_positive(amount, "deposit")?;
                let mut record = self.registered(&airline)?;
                let newly_funded = !record.funded;
                record.funded = true;
                record.deposited += amount;
                let deposited = record.deposited;

                self.airlines.insert(airline, record);
                self.pool = Some(self.pool()? + amount);
                return Ok(Effect::Funded {
                    newly_funded,
                    deposited,
                });
            }
        }
        Ok(Effect::Applied)
    }

    fn cast_vote(
        &mut self,
        candidate: AccountId,
        voter: AccountId,
        direct_below: usize,
    ) -> Result<Effect> {
        if candidate.is_empty() {
            return Err(Error::InvalidArgument("empty candidate identity".to_string()));
        }
        if !self.registered(&voter)?.funded {
            return Err(Error::NotFunded(voter.to_string()));
        }

        let mut record = self
            .airline(&candidate)?
            .unwrap_or_else(|| Airline::new(candidate.clone(), MembershipStatus::Unregistered));
        if record.is_registered() {
            return Err(Error::AlreadyRegistered(candidate.to_string()));
        }

        let members = self.active_members()?;
        if members < direct_below {
            record.promote();
            self.airlines.insert(candidate, record);
            return Ok(Effect::Vote {
                resolved: true,
                votes: 1,
            });
        }

        let mut ballot = self
            .ballot(&candidate)?
            .unwrap_or_else(|| Ballot::open(candidate.clone()));
        if ballot.has_voted(&voter) {
            return Err(Error::DuplicateVote {
                voter: voter.to_string(),
                candidate: candidate.to_string(),
            });
        }
        ballot.votes.insert(voter);

        let votes = ballot.vote_count();
        let resolved = majority_reached(votes, members);
        ballot.resolved = resolved;
        if resolved {
            record.promote();
        } else {
            record.status = MembershipStatus::PendingVote;
        }

        self.ballots.insert(candidate.clone(), ballot);
        self.airlines.insert(candidate, record);
        Ok(Effect::Vote { resolved, votes })
    }

    fn into_write_set(self) -> WriteSet {
        let mut set = WriteSet::new();
        for airline in self.airlines.into_values() {
            set.push(Write::Airline(airline));
        }
        for ballot in self.ballots.into_values() {
            set.push(Write::Ballot(ballot));
        }
        for flight in self.flights.into_values() {
            set.push(Write::Flight(flight));
        }
        for policy in self.policies.into_values() {
            set.push(Write::Policy(policy));
        }
        for (account, balance) in self.balances {
            set.push(Write::Balance(account, balance));
        }
        for pending in self.withdrawals.into_values() {
            set.push(Write::Withdrawal(pending));
        }
        if let Some(pool) = self.pool {
            set.push(Write::Pool(pool));
        }
        set
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreMessage>,
}

impl StoreHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<StoreMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> StoreMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Apply mutations as one transaction
    pub async fn apply(&self, caller: AccountId, mutations: Vec<Mutation>) -> Result<Vec<Effect>> {
        self.request(|response| StoreMessage::Apply {
            caller,
            mutations,
            response,
        })
        .await
    }

    /// Toggle the operational flag
    pub async fn set_operational(&self, caller: AccountId, mode: bool) -> Result<()> {
        self.request(|response| StoreMessage::SetOperational {
            caller,
            mode,
            response,
        })
        .await
    }

    /// Add or remove an authorized caller
    pub async fn set_authorized(
        &self,
        caller: AccountId,
        target: AccountId,
        allowed: bool,
    ) -> Result<()> {
        self.request(|response| StoreMessage::SetAuthorized {
            caller,
            target,
            allowed,
            response,
        })
        .await
    }

    /// Settle a pending withdrawal
    pub async fn settle_withdrawal(
        &self,
        caller: AccountId,
        account: AccountId,
        completed: bool,
    ) -> Result<Decimal> {
        self.request(|response| StoreMessage::SettleWithdrawal {
            caller,
            account,
            completed,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(StoreMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the store actor
pub fn spawn_store_actor(storage: Arc<Storage>, owner: AccountId, capacity: usize) -> StoreHandle {
    let (tx, rx) = mpsc::channel(capacity);
    let actor = StoreActor::new(storage, owner, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    StoreHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlightStatus, MembershipStatus};
    use crate::Config;

    fn open_storage() -> (Arc<Storage>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        (Arc::new(Storage::open(&config).unwrap()), temp_dir)
    }

    fn owner() -> AccountId {
        AccountId::new("owner")
    }

    fn gateway() -> AccountId {
        AccountId::new("gateway")
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage, owner(), 8);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_apply_rejected() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);

        let airline = Airline::new(AccountId::new("air"), MembershipStatus::Registered);
        let result = handle
            .apply(gateway(), vec![Mutation::PutAirline(airline.clone())])
            .await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
        assert!(storage.get_airline(&airline.id).unwrap().is_none());

        handle.set_authorized(owner(), gateway(), true).await.unwrap();
        handle
            .apply(gateway(), vec![Mutation::PutAirline(airline.clone())])
            .await
            .unwrap();
        assert!(storage.get_airline(&airline.id).unwrap().is_some());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_guard_rolls_back_whole_transaction() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);
        handle.set_authorized(owner(), gateway(), true).await.unwrap();

        let airline = Airline::new(AccountId::new("air"), MembershipStatus::Registered);
        let unknown = FlightRecord::new(airline.id.clone(), "XX1", 1);

        // Deposit is fine on its own, the status update is not
        let result = handle
            .apply(
                gateway(),
                vec![
                    Mutation::PutAirline(airline.clone()),
                    Mutation::Deposit(Decimal::from(10)),
                    Mutation::SetFlightStatus {
                        key: unknown.key,
                        status: FlightStatus::OnTime,
                    },
                ],
            )
            .await;
        assert!(matches!(result, Err(Error::UnknownFlight(_))));
        assert!(storage.get_airline(&airline.id).unwrap().is_none());
        assert_eq!(storage.pool().unwrap(), Decimal::ZERO);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_staged_writes_visible_within_transaction() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);
        handle.set_authorized(owner(), gateway(), true).await.unwrap();

        let flight = FlightRecord::new(AccountId::new("air"), "AB1", 1);
        let passenger = AccountId::new("p1");

        // Flight recorded and insured in one call
        handle
            .apply(
                gateway(),
                vec![
                    Mutation::RecordFlight(flight.clone()),
                    Mutation::CreatePolicy(Policy::new(
                        flight.key,
                        passenger.clone(),
                        Decimal::ONE,
                    )),
                    Mutation::Deposit(Decimal::ONE),
                ],
            )
            .await
            .unwrap();

        // Same policy twice in one call trips the guard
        let other = AccountId::new("p2");
        let result = handle
            .apply(
                gateway(),
                vec![
                    Mutation::CreatePolicy(Policy::new(flight.key, other.clone(), Decimal::ONE)),
                    Mutation::CreatePolicy(Policy::new(flight.key, other.clone(), Decimal::ONE)),
                ],
            )
            .await;
        assert!(matches!(result, Err(Error::DuplicatePolicy(_))));
        assert!(storage.get_policy(&flight.key, &other).unwrap().is_none());
        assert_eq!(storage.flight_policies(&flight.key).unwrap().len(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_withdraw_requires_balance_and_pool() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);
        handle.set_authorized(owner(), gateway(), true).await.unwrap();

        let passenger = AccountId::new("p1");
        handle
            .apply(
                gateway(),
                vec![Mutation::Credit {
                    account: passenger.clone(),
                    amount: Decimal::from(2),
                }],
            )
            .await
            .unwrap();

        // Balance credited but the pool is empty
        let result = handle
            .apply(
                gateway(),
                vec![Mutation::Withdraw {
                    account: passenger.clone(),
                    amount: Decimal::from(2),
                }],
            )
            .await;
        assert!(matches!(result, Err(Error::InsufficientBalance(_))));
        assert_eq!(storage.balance(&passenger).unwrap(), Decimal::from(2));

        handle
            .apply(
                gateway(),
                vec![
                    Mutation::Deposit(Decimal::from(5)),
                    Mutation::Withdraw {
                        account: passenger.clone(),
                        amount: Decimal::from(2),
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(storage.balance(&passenger).unwrap(), Decimal::ZERO);
        assert_eq!(storage.pool().unwrap(), Decimal::from(3));

        handle.shutdown().await.unwrap();
    }

    async fn seed_members(handle: &StoreHandle, count: usize) {
        let mut mutations = Vec::new();
        for n in 1..=count {
            let mut airline = Airline::new(
                AccountId::new(format!("air-{}", n)),
                MembershipStatus::Registered,
            );
            airline.funded = true;
            mutations.push(Mutation::PutAirline(airline));
        }
        handle.apply(gateway(), mutations).await.unwrap();
    }

    fn vote(candidate: &str, voter: &str) -> Mutation {
        Mutation::CastVote {
            candidate: AccountId::new(candidate),
            voter: AccountId::new(voter),
            direct_below: 4,
        }
    }

    #[tokio::test]
    async fn test_votes_tally_against_committed_ballot() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);
        handle.set_authorized(owner(), gateway(), true).await.unwrap();
        handle.set_authorized(owner(), AccountId::new("gateway-2"), true).await.unwrap();
        seed_members(&handle, 4).await;

        // Two callers each planned against an empty ballot
        let first = handle.apply(gateway(), vec![vote("air-5", "air-1")]).await.unwrap();
        let second = handle
            .apply(AccountId::new("gateway-2"), vec![vote("air-5", "air-2")])
            .await
            .unwrap();
        assert_eq!(first, vec![Effect::Vote { resolved: false, votes: 1 }]);
        assert_eq!(second, vec![Effect::Vote { resolved: false, votes: 2 }]);

        let ballot = storage.get_ballot(&AccountId::new("air-5")).unwrap().unwrap();
        assert_eq!(ballot.vote_count(), 2);

        let result = handle.apply(gateway(), vec![vote("air-5", "air-2")]).await;
        assert!(matches!(result, Err(Error::DuplicateVote { .. })));

        let third = handle.apply(gateway(), vec![vote("air-5", "air-3")]).await.unwrap();
        assert_eq!(third, vec![Effect::Vote { resolved: true, votes: 3 }]);
        let candidate = storage.get_airline(&AccountId::new("air-5")).unwrap().unwrap();
        assert!(candidate.is_registered());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_vote_below_threshold_registers_directly() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);
        handle.set_authorized(owner(), gateway(), true).await.unwrap();
        seed_members(&handle, 2).await;

        let effects = handle.apply(gateway(), vec![vote("air-3", "air-1")]).await.unwrap();
        assert_eq!(effects, vec![Effect::Vote { resolved: true, votes: 1 }]);
        assert!(storage.get_ballot(&AccountId::new("air-3")).unwrap().is_none());

        let result = handle.apply(gateway(), vec![vote("air-3", "air-2")]).await;
        assert!(matches!(result, Err(Error::AlreadyRegistered(_))));

        // Unfunded voter
        let pending = Airline::new(AccountId::new("air-9"), MembershipStatus::Registered);
        handle.apply(gateway(), vec![Mutation::PutAirline(pending)]).await.unwrap();
        let result = handle.apply(gateway(), vec![vote("air-4", "air-9")]).await;
        assert!(matches!(result, Err(Error::NotFunded(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fund_accumulates_across_calls() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);
        handle.set_authorized(owner(), gateway(), true).await.unwrap();

        let id = AccountId::new("air-1");
        let airline = Airline::new(id.clone(), MembershipStatus::Registered);
        handle.apply(gateway(), vec![Mutation::PutAirline(airline)]).await.unwrap();

        let fund = |amount: i64| Mutation::Fund {
            airline: id.clone(),
            amount: Decimal::from(amount),
        };
        let first = handle.apply(gateway(), vec![fund(10)]).await.unwrap();
        let second = handle.apply(gateway(), vec![fund(15)]).await.unwrap();
        assert_eq!(
            first,
            vec![Effect::Funded { newly_funded: true, deposited: Decimal::from(10) }]
        );
        assert_eq!(
            second,
            vec![Effect::Funded { newly_funded: false, deposited: Decimal::from(25) }]
        );
        assert_eq!(storage.get_airline(&id).unwrap().unwrap().deposited, Decimal::from(25));
        assert_eq!(storage.pool().unwrap(), Decimal::from(25));

        let result = handle
            .apply(
                gateway(),
                vec![Mutation::Fund {
                    airline: AccountId::new("stranger"),
                    amount: Decimal::ONE,
                }],
            )
            .await;
        assert!(matches!(result, Err(Error::NotRegistered(_))));

        handle.shutdown().await.unwrap();
    }

    async fn start_withdrawal(handle: &StoreHandle, passenger: &AccountId) {
        handle
            .apply(
                gateway(),
                vec![
                    Mutation::Deposit(Decimal::from(5)),
                    Mutation::Credit {
                        account: passenger.clone(),
                        amount: Decimal::from(2),
                    },
                ],
            )
            .await
            .unwrap();
        let effects = handle
            .apply(
                gateway(),
                vec![Mutation::Withdraw {
                    account: passenger.clone(),
                    amount: Decimal::from(2),
                }],
            )
            .await
            .unwrap();
        assert_eq!(effects, vec![Effect::Withdrawn { amount: Decimal::from(2) }]);
    }

    #[tokio::test]
    async fn test_failed_withdrawal_restores_after_gates_close() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);
        handle.set_authorized(owner(), gateway(), true).await.unwrap();

        let passenger = AccountId::new("p1");
        start_withdrawal(&handle, &passenger).await;
        assert_eq!(storage.balance(&passenger).unwrap(), Decimal::ZERO);
        assert!(storage.get_withdrawal(&passenger).unwrap().is_some());

        // A second withdrawal waits for the first to settle
        handle
            .apply(
                gateway(),
                vec![Mutation::Credit {
                    account: passenger.clone(),
                    amount: Decimal::ONE,
                }],
            )
            .await
            .unwrap();
        let result = handle
            .apply(
                gateway(),
                vec![Mutation::Withdraw {
                    account: passenger.clone(),
                    amount: Decimal::ONE,
                }],
            )
            .await;
        assert!(matches!(result, Err(Error::InsufficientBalance(_))));

        handle.set_operational(owner(), false).await.unwrap();
        handle.set_authorized(owner(), gateway(), false).await.unwrap();

        let result = handle
            .settle_withdrawal(AccountId::new("intruder"), passenger.clone(), false)
            .await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));

        let restored = handle
            .settle_withdrawal(gateway(), passenger.clone(), false)
            .await
            .unwrap();
        assert_eq!(restored, Decimal::from(2));
        assert_eq!(storage.balance(&passenger).unwrap(), Decimal::from(3));
        assert_eq!(storage.pool().unwrap(), Decimal::from(5));
        assert!(storage.get_withdrawal(&passenger).unwrap().is_none());

        // Nothing left to settle
        let result = handle.settle_withdrawal(gateway(), passenger.clone(), false).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_completed_withdrawal_keeps_debit() {
        let (storage, _temp) = open_storage();
        let handle = spawn_store_actor(storage.clone(), owner(), 8);
        handle.set_authorized(owner(), gateway(), true).await.unwrap();

        let passenger = AccountId::new("p1");
        start_withdrawal(&handle, &passenger).await;

        // The owner may settle on the gateway's behalf
        handle
            .settle_withdrawal(owner(), passenger.clone(), true)
            .await
            .unwrap();
        assert_eq!(storage.balance(&passenger).unwrap(), Decimal::ZERO);
        assert_eq!(storage.pool().unwrap(), Decimal::from(3));
        assert!(storage.get_withdrawal(&passenger).unwrap().is_none());

        handle.shutdown().await.unwrap();
    }
}
