//! Property-based tests for escrow and registration invariants
//!
//! - Majority: a candidate resolves exactly when votes exceed half the members
//! - Payout exactness: an airline-caused delay credits exactly 1.5x stake
//! - Conservation: pool == funding + stakes - withdrawals

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use surety_gateway::{
    escrow::payout_for, voter::majority_reached, AccountId, Error, Gateway, LedgerStore,
    PayoutJournal, MAX_POLICY_STAKE, REGISTRATION_THRESHOLD,
};
use surety_store::Config;

/// Strategy for generating valid stakes in (0, 1] with up to 4 decimals
fn stake_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000i64).prop_map(|units| Decimal::new(units, 4))
}

/// Strategy for generating stakes above the cap
fn oversized_stake_strategy() -> impl Strategy<Value = Decimal> {
    (10_001i64..1_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

fn owner() -> AccountId {
    AccountId::new("owner")
}

fn airline() -> AccountId {
    AccountId::new("air-1")
}

fn relay() -> AccountId {
    AccountId::new("relay")
}

async fn gateway_with_flight(
    temp: &tempfile::TempDir,
) -> (Gateway, Arc<LedgerStore>, Arc<PayoutJournal>) {
    let config = Config {
        data_dir: temp.path().to_path_buf(),
        owner: owner(),
        first_airline: Some(airline()),
        ..Default::default()
    };
    let store = Arc::new(LedgerStore::open(config).await.unwrap());
    let journal = Arc::new(PayoutJournal::new());
    let gateway =
        Gateway::new(AccountId::new("gateway"), store.clone(), journal.clone(), 8).unwrap();
    store
        .authorize_caller(&owner(), gateway.id().clone())
        .await
        .unwrap();
    store.authorize_caller(&owner(), relay()).await.unwrap();

    gateway.fund(&airline(), Decimal::from(10)).await.unwrap();
    gateway
        .register_flight(&airline(), "ND1309", 1_700_000_000_000)
        .await
        .unwrap();
    (gateway, store, journal)
}

proptest! {
    #[test]
    fn prop_majority_is_strictly_more_than_half(members in REGISTRATION_THRESHOLD..64usize) {
        let needed = members / 2 + 1;
        prop_assert!(majority_reached(needed, members));
        prop_assert!(!majority_reached(needed - 1, members));
    }

    #[test]
    fn prop_payout_is_exact(stake in stake_strategy()) {
        let payout = payout_for(stake);
        prop_assert_eq!(payout * Decimal::TWO, stake * Decimal::from(3));
        prop_assert!(payout <= MAX_POLICY_STAKE * Decimal::new(15, 1));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Every stake is credited at exactly 1.5x and the pool balances out
    #[test]
    fn prop_airline_delay_conserves_pool(stakes in prop::collection::vec(stake_strategy(), 1..6)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempfile::tempdir().unwrap();
            let (gateway, store, journal) = gateway_with_flight(&temp).await;
            let ts = 1_700_000_000_000;

            for (n, stake) in stakes.iter().enumerate() {
                let passenger = AccountId::new(format!("p{}", n));
                gateway.buy(&passenger, &airline(), "ND1309", ts, *stake).await.unwrap();
            }
            let total: Decimal = stakes.iter().sum();
            assert_eq!(store.pool_balance().unwrap(), Decimal::from(10) + total);

            let report = gateway
                .report_flight_status(&relay(), &airline(), "ND1309", ts, 20)
                .await
                .unwrap();
            assert_eq!(report.credited.policies, stakes.len());
            assert_eq!(report.credited.amount, payout_for(total));

            let mut withdrawn = Decimal::ZERO;
            for (n, stake) in stakes.iter().enumerate() {
                let passenger = AccountId::new(format!("p{}", n));
                let paid = gateway.pay(&passenger).await.unwrap();
                assert_eq!(paid, payout_for(*stake));
                assert_eq!(journal.total_to(&passenger), paid);
                withdrawn += paid;
            }

            assert_eq!(
                store.pool_balance().unwrap(),
                Decimal::from(10) + total - withdrawn
            );
            store.shutdown().await.unwrap();
        });
    }

    /// Out-of-range stakes are rejected without touching the pool
    #[test]
    fn prop_oversized_stake_rejected(stake in oversized_stake_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempfile::tempdir().unwrap();
            let (gateway, store, _journal) = gateway_with_flight(&temp).await;

            let result = gateway
                .buy(&AccountId::new("p"), &airline(), "ND1309", 1_700_000_000_000, stake)
                .await;
            assert!(matches!(result, Err(Error::InvalidArgument(_))));
            assert_eq!(store.pool_balance().unwrap(), Decimal::from(10));
            store.shutdown().await.unwrap();
        });
    }
}
