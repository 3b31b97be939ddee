//! Ledger store: the sole owner of persisted scheme state
//!
//! Mutations go through the single-writer actor and are gated on the
//! operational flag and the authorized-caller set. Queries read RocksDB
//! directly and never block on the writer.
//!
//! # Example
//!
//! ```no_run
//! use surety_store::{AccountId, Config, LedgerStore};
//!
//! #[tokio::main]
//! async fn main() -> surety_store::Result<()> {
//!     let config = Config {
//!         owner: AccountId::new("owner"),
//!         first_airline: Some(AccountId::new("airline-1")),
//!         ..Default::default()
//!     };
//!     let store = LedgerStore::open(config).await?;
//!
//!     // The gateway must be authorized before any of its calls succeed
//!     store
//!         .authorize_caller(&AccountId::new("owner"), AccountId::new("gateway"))
//!         .await?;
//!
//!     store.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_store_actor, StoreHandle},
    storage::{StorageStats, Write, WriteSet},
    types::{
        AccountId, Airline, Ballot, Effect, FlightKey, FlightRecord, FlightStatus,
        MembershipStatus, Mutation, PendingWithdrawal, Policy,
    },
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Ledger store interface
#[derive(Debug)]
pub struct LedgerStore {
    /// Actor handle for mutations
    handle: StoreHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Owner identity
    owner: AccountId,

    /// Configuration
    config: Config,
}

impl LedgerStore {
    /// Open the store. On first open the owner is persisted and the
    /// configured first airline is registered (unfunded).
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config)?);
        let owner = config.owner.clone();

        match storage.owner()? {
            Some(existing) if existing != owner => {
                return Err(Error::Config(format!(
                    "store at {:?} is owned by {}, not {}",
                    config.data_dir, existing, owner
                )));
            }
            Some(_) => {}
            None => {
                let mut genesis = WriteSet::new();
                genesis.push(Write::Owner(owner.clone()));
                if let Some(first) = &config.first_airline {
                    if first.is_empty() {
                        return Err(Error::Config("first_airline must not be empty".to_string()));
                    }
                    genesis.push(Write::Airline(Airline::new(
                        first.clone(),
                        MembershipStatus::Registered,
                    )));
                }
                storage.commit(&genesis)?;
                tracing::info!(
                    owner = %owner,
                    first_airline = ?config.first_airline,
                    "Initialized new store"
                );
            }
        }

        let handle = spawn_store_actor(storage.clone(), owner.clone(), config.mailbox_capacity);

        Ok(Self {
            handle,
            storage,
            owner,
            config,
        })
    }

    /// Owner identity
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    /// Identity this store publishes as its data address
    pub fn id(&self) -> &AccountId {
        &self.config.store_id
    }

    /// Minimum deposit that funds an airline
    pub fn minimum_funding(&self) -> Decimal {
        self.config.minimum_funding
    }

    // Owner-gated primitives

    /// Toggle the operational flag. Owner only; works while not operational.
    pub async fn set_operational(&self, caller: &AccountId, mode: bool) -> Result<()> {
        self.handle.set_operational(caller.clone(), mode).await
    }

    /// Add `target` to the authorized-caller set. Owner only.
    pub async fn authorize_caller(&self, caller: &AccountId, target: AccountId) -> Result<()> {
        self.handle.set_authorized(caller.clone(), target, true).await
    }

    /// Remove `target` from the authorized-caller set. Owner only.
    pub async fn deauthorize_caller(&self, caller: &AccountId, target: AccountId) -> Result<()> {
        self.handle.set_authorized(caller.clone(), target, false).await
    }

    // Mutation primitives (operational + authorized caller)

    /// Apply several mutations as one atomic transaction, returning one
    /// effect per mutation in order
    pub async fn apply(&self, caller: &AccountId, mutations: Vec<Mutation>) -> Result<Vec<Effect>> {
        self.handle.apply(caller.clone(), mutations).await
    }

    /// Finish a withdrawal started by `Mutation::Withdraw`. When the transfer
    /// did not complete the amount goes back to the balance and the pool.
    /// Allowed for the caller that started it, or the owner, regardless of
    /// the operational flag.
    pub async fn settle_withdrawal(
        &self,
        caller: &AccountId,
        account: AccountId,
        completed: bool,
    ) -> Result<Decimal> {
        self.handle
            .settle_withdrawal(caller.clone(), account, completed)
            .await
    }

    /// Insert or replace an airline record
    pub async fn set_airline(&self, caller: &AccountId, airline: Airline) -> Result<()> {
        self.apply(caller, vec![Mutation::PutAirline(airline)]).await?;
        Ok(())
    }

    /// Insert or replace a ballot
    pub async fn set_ballot(&self, caller: &AccountId, ballot: Ballot) -> Result<()> {
        self.apply(caller, vec![Mutation::PutBallot(ballot)]).await?;
        Ok(())
    }

    /// Record a new flight
    pub async fn record_flight(&self, caller: &AccountId, flight: FlightRecord) -> Result<()> {
        self.apply(caller, vec![Mutation::RecordFlight(flight)]).await?;
        Ok(())
    }

    /// Write-once flight status update
    pub async fn set_flight_status(
        &self,
        caller: &AccountId,
        key: FlightKey,
        status: FlightStatus,
    ) -> Result<()> {
        self.apply(caller, vec![Mutation::SetFlightStatus { key, status }])
            .await?;
        Ok(())
    }

    /// Create a policy and take its stake into the pool
    pub async fn create_policy(&self, caller: &AccountId, policy: Policy) -> Result<()> {
        let stake = policy.stake;
        self.apply(
            caller,
            vec![Mutation::CreatePolicy(policy), Mutation::Deposit(stake)],
        )
        .await?;
        Ok(())
    }

    /// Set the paid flag and credit the passenger in one commit
    pub async fn mark_policy_paid(
        &self,
        caller: &AccountId,
        flight: FlightKey,
        passenger: AccountId,
        credit: Decimal,
    ) -> Result<()> {
        self.apply(
            caller,
            vec![Mutation::MarkPolicyPaid {
                flight,
                passenger,
                credit,
            }],
        )
        .await?;
        Ok(())
    }

    // Queries (last committed state, no gate)

    /// Operational flag
    pub fn is_operational(&self) -> Result<bool> {
        self.storage.is_operational()
    }

    /// Whether `caller` is in the authorized-caller set
    pub fn is_authorized(&self, caller: &AccountId) -> Result<bool> {
        self.storage.is_authorized(caller)
    }

    /// Registered airline
    pub fn is_airline(&self, id: &AccountId) -> Result<bool> {
        Ok(self
            .storage
            .get_airline(id)?
            .map(|a| a.is_registered())
            .unwrap_or(false))
    }

    /// Registered and funded airline
    pub fn is_funded(&self, id: &AccountId) -> Result<bool> {
        Ok(self
            .storage
            .get_airline(id)?
            .map(|a| a.is_active())
            .unwrap_or(false))
    }

    /// Airline record
    pub fn get_airline(&self, id: &AccountId) -> Result<Option<Airline>> {
        self.storage.get_airline(id)
    }

    /// Count of Registered + Funded airlines
    pub fn registered_funded_count(&self) -> Result<usize> {
        Ok(self
            .storage
            .airlines()?
            .iter()
            .filter(|a| a.is_active())
            .count())
    }

    /// Ballot for a candidate
    pub fn get_ballot(&self, candidate: &AccountId) -> Result<Option<Ballot>> {
        self.storage.get_ballot(candidate)
    }

    /// Flight record
    pub fn get_flight(&self, key: &FlightKey) -> Result<Option<FlightRecord>> {
        self.storage.get_flight(key)
    }

    /// Flight status
    pub fn get_flight_status(&self, key: &FlightKey) -> Result<FlightStatus> {
        self.storage
            .get_flight(key)?
            .map(|f| f.status)
            .ok_or_else(|| Error::UnknownFlight(key.to_string()))
    }

    /// Policy for (flight, passenger)
    pub fn get_policy(&self, flight: &FlightKey, passenger: &AccountId) -> Result<Option<Policy>> {
        self.storage.get_policy(flight, passenger)
    }

    /// All policies on a flight
    pub fn flight_policies(&self, flight: &FlightKey) -> Result<Vec<Policy>> {
        self.storage.flight_policies(flight)
    }

    /// Withdrawable balance
    pub fn balance_of(&self, account: &AccountId) -> Result<Decimal> {
        self.storage.balance(account)
    }

    /// Withdrawal debited but not yet settled
    pub fn pending_withdrawal(&self, account: &AccountId) -> Result<Option<PendingWithdrawal>> {
        self.storage.get_withdrawal(account)
    }

    /// Value held by the store
    pub fn pool_balance(&self) -> Result<Decimal> {
        self.storage.pool()
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Shutdown the writer
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> AccountId {
        AccountId::new("owner")
    }

    fn gateway() -> AccountId {
        AccountId::new("gateway")
    }

    async fn create_test_store() -> (LedgerStore, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            owner: owner(),
            first_airline: Some(AccountId::new("air-1")),
            ..Default::default()
        };
        (LedgerStore::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_genesis_registers_first_airline_unfunded() {
        let (store, _temp) = create_test_store().await;

        assert!(store.is_operational().unwrap());
        assert!(store.is_airline(&AccountId::new("air-1")).unwrap());
        assert!(!store.is_funded(&AccountId::new("air-1")).unwrap());
        assert_eq!(store.registered_funded_count().unwrap(), 0);

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_with_other_owner_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            owner: owner(),
            ..Default::default()
        };
        let store = LedgerStore::open(config.clone()).await.unwrap();
        store.shutdown().await.unwrap();
        drop(store);
        // Let the actor release its storage handle
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let result = LedgerStore::open(Config {
            owner: AccountId::new("mallory"),
            ..config
        })
        .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_owner_only_entry_points() {
        let (store, _temp) = create_test_store().await;
        let mallory = AccountId::new("mallory");

        let result = store.set_operational(&mallory, false).await;
        assert!(matches!(result, Err(Error::OwnerOnly(_))));
        assert!(store.is_operational().unwrap());

        let result = store.authorize_caller(&mallory, mallory.clone()).await;
        assert!(matches!(result, Err(Error::OwnerOnly(_))));
        assert!(!store.is_authorized(&mallory).unwrap());

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_not_operational_blocks_mutations() {
        let (store, _temp) = create_test_store().await;
        store.authorize_caller(&owner(), gateway()).await.unwrap();
        store.set_operational(&owner(), false).await.unwrap();

        let airline = Airline::new(AccountId::new("air-2"), MembershipStatus::Registered);
        let result = store.set_airline(&gateway(), airline.clone()).await;
        assert!(matches!(result, Err(Error::NotOperational)));
        assert!(store.get_airline(&airline.id).unwrap().is_none());

        let result = store.authorize_caller(&owner(), AccountId::new("relay")).await;
        assert!(matches!(result, Err(Error::NotOperational)));

        // Reads still served
        assert!(store.is_airline(&AccountId::new("air-1")).unwrap());

        store.set_operational(&owner(), true).await.unwrap();
        store.set_airline(&gateway(), airline.clone()).await.unwrap();
        assert!(store.is_airline(&airline.id).unwrap());

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_deauthorized_caller_rejected() {
        let (store, _temp) = create_test_store().await;
        store.authorize_caller(&owner(), gateway()).await.unwrap();
        store.deauthorize_caller(&owner(), gateway()).await.unwrap();

        let ballot = Ballot::open(AccountId::new("air-5"));
        let result = store.set_ballot(&gateway(), ballot).await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_flight_status_is_write_once() {
        let (store, _temp) = create_test_store().await;
        store.authorize_caller(&owner(), gateway()).await.unwrap();

        let flight = FlightRecord::new(AccountId::new("air-1"), "ND1309", 1_700_000_000_000);
        store.record_flight(&gateway(), flight.clone()).await.unwrap();
        assert_eq!(
            store.get_flight_status(&flight.key).unwrap(),
            FlightStatus::Unknown
        );

        store
            .set_flight_status(&gateway(), flight.key, FlightStatus::OnTime)
            .await
            .unwrap();
        let result = store
            .set_flight_status(&gateway(), flight.key, FlightStatus::LateAirline)
            .await;
        assert!(matches!(result, Err(Error::AlreadyResolved(_))));
        assert_eq!(
            store.get_flight_status(&flight.key).unwrap(),
            FlightStatus::OnTime
        );

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_policy_paid_credits_once() {
        let (store, _temp) = create_test_store().await;
        store.authorize_caller(&owner(), gateway()).await.unwrap();

        let flight = FlightRecord::new(AccountId::new("air-1"), "ND1309", 1);
        let passenger = AccountId::new("p1");
        store.record_flight(&gateway(), flight.clone()).await.unwrap();
        store
            .create_policy(
                &gateway(),
                Policy::new(flight.key, passenger.clone(), Decimal::ONE),
            )
            .await
            .unwrap();
        assert_eq!(store.pool_balance().unwrap(), Decimal::ONE);

        let credit = Decimal::new(15, 1);
        store
            .mark_policy_paid(&gateway(), flight.key, passenger.clone(), credit)
            .await
            .unwrap();
        let result = store
            .mark_policy_paid(&gateway(), flight.key, passenger.clone(), credit)
            .await;
        assert!(matches!(result, Err(Error::AlreadyResolved(_))));

        assert_eq!(store.balance_of(&passenger).unwrap(), credit);
        assert!(store.get_policy(&flight.key, &passenger).unwrap().unwrap().paid);

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_count_airlines() {
        let (store, _temp) = create_test_store().await;
        store.authorize_caller(&owner(), gateway()).await.unwrap();

        let mut funded = Airline::new(AccountId::new("air-2"), MembershipStatus::Registered);
        funded.funded = true;
        store.set_airline(&gateway(), funded).await.unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_airlines, 2);
        assert_eq!(stats.active_airlines, 1);
        assert_eq!(store.registered_funded_count().unwrap(), 1);

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_identity_is_distinct_from_owner() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            owner: owner(),
            store_id: AccountId::new("surety-data"),
            ..Default::default()
        };
        let store = LedgerStore::open(config).await.unwrap();

        assert_eq!(store.id(), &AccountId::new("surety-data"));
        assert_ne!(store.id(), store.owner());

        store.shutdown().await.unwrap();
    }
}
