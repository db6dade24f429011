//! Property-based tests for the wallet ledger and the paytable.
//!
//! Random operation sequences must never drive a balance negative, and the
//! balance must always equal the signed sum of the committed transactions.

use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};
use slot_core::{
    paytable::{PaytableEvaluator, WeightedPaytable},
    wallet::{
        InMemoryLedgerStore, PageRequest, TransactionFilter, TransactionRef, TransactionType,
        WalletManager,
    },
};
use std::sync::Arc;

fn tx_type_strategy() -> impl Strategy<Value = TransactionType> {
    prop_oneof![
        Just(TransactionType::Deposit),
        Just(TransactionType::Withdraw),
        Just(TransactionType::Bet),
        Just(TransactionType::Win),
        Just(TransactionType::Jackpot),
        Just(TransactionType::Refund),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<(TransactionType, i64)>> {
    prop::collection::vec((tx_type_strategy(), 1i64..=5_000), 1..=60)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_balance_reconciles_with_ledger(ops in ops_strategy()) {
        runtime().block_on(async {
            let wallet = WalletManager::new(Arc::new(InMemoryLedgerStore::new()));
            wallet
                .credit(1, 1_000, TransactionType::Deposit, TransactionRef::none())
                .await
                .unwrap();

            let mut expected = 1_000i64;
            for (tx_type, amount) in &ops {
                let reference = TransactionRef::none();
                if tx_type.direction() == slot_core::wallet::EntryDirection::Credit {
                    wallet.credit(1, *amount, *tx_type, reference).await.unwrap();
                    expected += amount;
                } else {
                    let result = wallet.debit(1, *amount, *tx_type, reference).await;
                    if *amount <= expected {
                        prop_assert!(result.is_ok());
                        expected -= amount;
                    } else {
                        prop_assert_eq!(result.unwrap_err().code(), "INSUFFICIENT_BALANCE");
                    }
                }

                let balance = wallet.get_balance(1).await.unwrap();
                prop_assert!(balance.balance >= 0);
                prop_assert_eq!(balance.balance, expected);
            }

            let page = wallet
                .get_transactions(
                    1,
                    &TransactionFilter::default(),
                    PageRequest { page: 1, page_size: 100 },
                )
                .await
                .unwrap();
            let ledger_sum: i64 = page.items.iter().map(|t| t.signed_amount()).sum();
            prop_assert_eq!(ledger_sum, expected);

            for tx in &page.items {
                prop_assert_eq!(tx.after_balance, tx.before_balance + tx.signed_amount());
                prop_assert!(tx.after_balance >= 0);
            }
            Ok(())
        })?;
    }

    #[test]
    fn test_spin_payout_is_sum_of_lines(seed in any::<u64>(), bet in 10i64..=100_000) {
        let paytable = WeightedPaytable::classic().unwrap();
        let mut rng = StdRng::seed_from_u64(seed);

        let outcome = paytable.spin(&mut rng, bet);
        prop_assert_eq!(outcome.grid.len(), 3);
        prop_assert!(outcome.grid.iter().all(|reel| reel.len() == 3));
        prop_assert_eq!(outcome.bet_amount, bet);
        prop_assert!(outcome.lines.iter().all(|l| l.payout > 0));
        prop_assert_eq!(
            outcome.win_amount,
            outcome.lines.iter().map(|l| l.payout).sum::<i64>()
        );
        prop_assert!(outcome.jackpot_win.is_none());
    }
}
