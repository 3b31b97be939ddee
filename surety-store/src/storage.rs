//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `airlines` - Airline records (key: account)
//! - `ballots` - Registration ballots (key: candidate)
//! - `flights` - Flight records (key: flight key)
//! - `policies` - Insurance policies (key: flight key || passenger)
//! - `balances` - Withdrawable passenger balances (key: account)
//! - `authorized` - Authorized callers (key: account)
//! - `withdrawals` - Withdrawals awaiting transfer settlement (key: account)
//! - `meta` - Scalars: operational flag, balance pool, owner

use crate::{
    error::{Error, Result},
    types::{AccountId, Airline, Ballot, FlightKey, FlightRecord, PendingWithdrawal, Policy},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Column family names
const CF_AIRLINES: &str = "airlines";
const CF_BALLOTS: &str = "ballots";
const CF_FLIGHTS: &str = "flights";
const CF_POLICIES: &str = "policies";
const CF_BALANCES: &str = "balances";
const CF_AUTHORIZED: &str = "authorized";
const CF_WITHDRAWALS: &str = "withdrawals";
const CF_META: &str = "meta";

const ALL_CFS: [&str; 8] = [
    CF_AIRLINES,
    CF_BALLOTS,
    CF_FLIGHTS,
    CF_POLICIES,
    CF_BALANCES,
    CF_AUTHORIZED,
    CF_WITHDRAWALS,
    CF_META,
];

/// Meta keys
const META_OPERATIONAL: &[u8] = b"operational";
const META_POOL: &[u8] = b"pool";
const META_OWNER: &[u8] = b"owner";

/// One staged write. A [`WriteSet`] of these commits as a single RocksDB batch.
#[derive(Debug, Clone)]
pub enum Write {
    /// Airline record
    Airline(Airline),
    /// Ballot
    Ballot(Ballot),
    /// Flight record
    Flight(FlightRecord),
    /// Policy
    Policy(Policy),
    /// Withdrawable balance (zero deletes the row)
    Balance(AccountId, Decimal),
    /// Balance pool
    Pool(Decimal),
    /// Operational flag
    Operational(bool),
    /// Authorized-caller membership
    Authorized(AccountId, bool),
    /// Owner identity
    Owner(AccountId),
    /// Withdrawal awaiting settlement
    Withdrawal(PendingWithdrawal),
    /// Settled withdrawal
    ClearWithdrawal(AccountId),
}

/// Ordered list of writes committed atomically
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    writes: Vec<Write>,
}

impl WriteSet {
    /// Empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write
    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    /// Number of staged writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Nothing staged
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            "Opened RocksDB at {:?} with {} column families",
            path,
            ALL_CFS.iter().filter(|name| db.cf_handle(name).is_some()).count()
        );

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            // Per-flight prefix scans
            CF_POLICIES => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false);
                opts.set_block_based_table_factory(&block_opts);
            }
            CF_META | CF_AUTHORIZED | CF_WITHDRAWALS => {
                opts.set_compression_type(rocksdb::DBCompressionType::None);
            }
            _ => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
        }
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn get_value<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_into<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf_handle(cf)?;
        batch.put_cf(cf, key, bincode::serialize(value)?);
        Ok(())
    }

    // Airlines

    /// Get airline by identity
    pub fn get_airline(&self, id: &AccountId) -> Result<Option<Airline>> {
        self.get_value(CF_AIRLINES, id.as_bytes())
    }

    /// All airline records
    pub fn airlines(&self) -> Result<Vec<Airline>> {
        let cf = self.cf_handle(CF_AIRLINES)?;
        let mut airlines = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            airlines.push(bincode::deserialize(&value)?);
        }
        Ok(airlines)
    }

    // Ballots

    /// Get ballot by candidate
    pub fn get_ballot(&self, candidate: &AccountId) -> Result<Option<Ballot>> {
        self.get_value(CF_BALLOTS, candidate.as_bytes())
    }

    // Flights

    /// Get flight record
    pub fn get_flight(&self, key: &FlightKey) -> Result<Option<FlightRecord>> {
        self.get_value(CF_FLIGHTS, key.as_bytes())
    }

    // Policies

    /// Get policy for (flight, passenger)
    pub fn get_policy(&self, flight: &FlightKey, passenger: &AccountId) -> Result<Option<Policy>> {
        self.get_value(CF_POLICIES, &Policy::storage_key(flight, passenger))
    }

    /// All policies on a flight (prefix scan on the flight key)
    pub fn flight_policies(&self, flight: &FlightKey) -> Result<Vec<Policy>> {
        let cf = self.cf_handle(CF_POLICIES)?;
        let prefix = flight.as_bytes();

        let mut policies = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, prefix) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            policies.push(bincode::deserialize(&value)?);
        }
        Ok(policies)
    }

    // Balances

    /// Withdrawable balance (zero when absent)
    pub fn balance(&self, account: &AccountId) -> Result<Decimal> {
        Ok(self
            .get_value(CF_BALANCES, account.as_bytes())?
            .unwrap_or(Decimal::ZERO))
    }

    /// Balance pool held by the store
    pub fn pool(&self) -> Result<Decimal> {
        Ok(self.get_value(CF_META, META_POOL)?.unwrap_or(Decimal::ZERO))
    }

    /// Withdrawal awaiting settlement for `account`
    pub fn get_withdrawal(&self, account: &AccountId) -> Result<Option<PendingWithdrawal>> {
        self.get_value(CF_WITHDRAWALS, account.as_bytes())
    }

    // Gate state

    /// Operational flag (true until first switched off)
    pub fn is_operational(&self) -> Result<bool> {
        Ok(self.get_value(CF_META, META_OPERATIONAL)?.unwrap_or(true))
    }

    /// Whether `caller` may invoke mutation primitives
    pub fn is_authorized(&self, caller: &AccountId) -> Result<bool> {
        Ok(self
            .get_value(CF_AUTHORIZED, caller.as_bytes())?
            .unwrap_or(false))
    }

    /// Persisted owner identity
    pub fn owner(&self) -> Result<Option<AccountId>> {
        self.get_value(CF_META, META_OWNER)
    }

    // Batch operations (atomic)

    /// Commit a write set as one RocksDB batch
    pub fn commit(&self, set: &WriteSet) -> Result<()> {
        let mut batch = WriteBatch::default();

        for write in &set.writes {
            match write {
                Write::Airline(airline) => {
                    self.put_into(&mut batch, CF_AIRLINES, airline.id.as_bytes(), airline)?
                }
                Write::Ballot(ballot) => {
                    self.put_into(&mut batch, CF_BALLOTS, ballot.candidate.as_bytes(), ballot)?
                }
                Write::Flight(flight) => {
                    self.put_into(&mut batch, CF_FLIGHTS, flight.key.as_bytes(), flight)?
                }
                Write::Policy(policy) => self.put_into(
                    &mut batch,
                    CF_POLICIES,
                    &Policy::storage_key(&policy.flight, &policy.passenger),
                    policy,
                )?,
                Write::Balance(account, amount) => {
                    if amount.is_zero() {
                        batch.delete_cf(self.cf_handle(CF_BALANCES)?, account.as_bytes());
                    } else {
                        self.put_into(&mut batch, CF_BALANCES, account.as_bytes(), amount)?
                    }
                }
                Write::Pool(amount) => self.put_into(&mut batch, CF_META, META_POOL, amount)?,
                Write::Operational(mode) => {
                    self.put_into(&mut batch, CF_META, META_OPERATIONAL, mode)?
                }
                Write::Authorized(account, allowed) => {
                    if *allowed {
                        self.put_into(&mut batch, CF_AUTHORIZED, account.as_bytes(), allowed)?
                    } else {
                        batch.delete_cf(self.cf_handle(CF_AUTHORIZED)?, account.as_bytes());
                    }
                }
                Write::Owner(owner) => self.put_into(&mut batch, CF_META, META_OWNER, owner)?,
                Write::Withdrawal(pending) => self.put_into(
                    &mut batch,
                    CF_WITHDRAWALS,
                    pending.account.as_bytes(),
                    pending,
                )?,
                Write::ClearWithdrawal(account) => {
                    batch.delete_cf(self.cf_handle(CF_WITHDRAWALS)?, account.as_bytes());
                }
            }
        }

        self.db.write(batch)?;

        tracing::debug!(writes = set.len(), "Write set committed");

        Ok(())
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let airlines = self.airlines()?;
        let cf_flights = self.cf_handle(CF_FLIGHTS)?;
        let cf_policies = self.cf_handle(CF_POLICIES)?;

        Ok(StorageStats {
            total_airlines: airlines.len() as u64,
            active_airlines: airlines.iter().filter(|a| a.is_active()).count() as u64,
            total_flights: self.approximate_count(cf_flights)?,
            total_policies: self.approximate_count(cf_policies)?,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Airline records (any status)
    pub total_airlines: u64,
    /// Registered and funded airlines
    pub active_airlines: u64,
    /// Flights (estimate)
    pub total_flights: u64,
    /// Policies (estimate)
    pub total_policies: u64,
}
