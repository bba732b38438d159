//! Transaction decomposition: splitting one logical transaction into
//! the partition-local [`ActionSpec`]s a [`PartitionRouter`] can run in
//! parallel.
//!
//! [`update_account`] is the classic four-action decomposition from
//! `examples/original_source/src/dora/tpcb/dora_tpcb_xct.cpp` (debit or
//! credit an account, touching its branch and teller aggregates and
//! appending a history row) restated against the [`AccountStorage`]
//! trait instead of a concrete storage manager, since no storage layer
//! is in scope here. A real engine implements `AccountStorage` over
//! its own table access paths.

use std::sync::Arc;

use crate::error::Result;

use super::action::ActionSpec;
use super::router::PartitionRouter;
use super::rvp::Rvp;

/// The storage operations a balance-transfer transaction needs from
/// whatever engine owns the underlying tables.
pub trait AccountStorage: Send + Sync {
    fn update_balance(&self, key: &[u8], delta: i64) -> Result<()>;
    fn insert_history(&self, branch: &[u8], teller: &[u8], account: &[u8], delta: i64) -> Result<()>;
}

/// Decompose a balance-transfer transaction into four actions —
/// `upd_branch`, `upd_teller`, `upd_account`, `ins_history` — and
/// submit them as one group. `on_terminal` runs once every action has
/// reported in, with `Ok(())` only if all four succeeded.
#[allow(clippy::too_many_arguments)]
pub fn update_account(
    router: &PartitionRouter,
    xct_id: u64,
    storage: Arc<dyn AccountStorage>,
    branch_key: Vec<u8>,
    teller_key: Vec<u8>,
    account_key: Vec<u8>,
    delta: i64,
    on_terminal: impl FnOnce(Result<()>) + Send + 'static,
) -> Result<Arc<Rvp>> {
    let branch_partition = router.decide_partition(&branch_key);
    let teller_partition = router.decide_partition(&teller_key);
    let account_partition = router.decide_partition(&account_key);
    // The history row has no key of its own; route it with the
    // account it is billed against so it lands on an already-touched
    // partition instead of spreading the transaction over a fifth one.
    let history_partition = account_partition;

    let upd_branch = {
        let storage = storage.clone();
        let key = branch_key.clone();
        ActionSpec::new(branch_partition, key.clone(), move || {
            storage.update_balance(&key, delta)
        })
    };
    let upd_teller = {
        let storage = storage.clone();
        let key = teller_key.clone();
        ActionSpec::new(teller_partition, key.clone(), move || {
            storage.update_balance(&key, delta)
        })
    };
    let upd_account = {
        let storage = storage.clone();
        let key = account_key.clone();
        ActionSpec::new(account_partition, key.clone(), move || {
            storage.update_balance(&key, delta)
        })
    };
    let ins_history = {
        let storage = storage.clone();
        let (b, t, a) = (branch_key, teller_key, account_key.clone());
        ActionSpec::new(history_partition, account_key, move || {
            storage.insert_history(&b, &t, &a, delta)
        })
    };

    router.submit(
        xct_id,
        vec![upd_branch, upd_teller, upd_account, ins_history],
        on_terminal,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use dashmap::DashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct FakeStorage {
        balances: DashMap<Vec<u8>, i64>,
        history: StdMutex<Vec<(Vec<u8>, Vec<u8>, Vec<u8>, i64)>>,
        fail_on: Option<Vec<u8>>,
    }

    impl AccountStorage for FakeStorage {
        fn update_balance(&self, key: &[u8], delta: i64) -> Result<()> {
            if self.fail_on.as_deref() == Some(key) {
                return Err(DbError::StorageManager(format!(
                    "simulated failure updating {key:?}"
                )));
            }
            *self.balances.entry(key.to_vec()).or_insert(0) += delta;
            Ok(())
        }

        fn insert_history(
            &self,
            branch: &[u8],
            teller: &[u8],
            account: &[u8],
            delta: i64,
        ) -> Result<()> {
            self.history
                .lock()
                .unwrap()
                .push((branch.to_vec(), teller.to_vec(), account.to_vec(), delta));
            Ok(())
        }
    }

    fn wait_for<F: Fn() -> bool>(f: F) {
        for _ in 0..200 {
            if f() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn successful_transfer_updates_all_three_balances_and_history() {
        let router = PartitionRouter::new(4);
        let storage = Arc::new(FakeStorage {
            balances: DashMap::new(),
            history: StdMutex::new(Vec::new()),
            fail_on: None,
        });
        let done = Arc::new(StdMutex::new(None));
        let done2 = done.clone();
        update_account(
            &router,
            1,
            storage.clone(),
            b"branch-1".to_vec(),
            b"teller-1".to_vec(),
            b"account-1".to_vec(),
            50,
            move |r| *done2.lock().unwrap() = Some(r),
        )
        .unwrap();

        wait_for(|| done.lock().unwrap().is_some());
        assert_eq!(*done.lock().unwrap(), Some(Ok(())));
        assert_eq!(*storage.balances.get(&b"branch-1".to_vec()).unwrap(), 50);
        assert_eq!(*storage.balances.get(&b"teller-1".to_vec()).unwrap(), 50);
        assert_eq!(*storage.balances.get(&b"account-1".to_vec()).unwrap(), 50);
        assert_eq!(storage.history.lock().unwrap().len(), 1);
        router.shutdown();
    }

    #[test]
    fn failure_in_one_action_surfaces_as_the_terminal_error() {
        let router = PartitionRouter::new(4);
        let storage = Arc::new(FakeStorage {
            balances: DashMap::new(),
            history: StdMutex::new(Vec::new()),
            fail_on: Some(b"account-1".to_vec()),
        });
        let done = Arc::new(StdMutex::new(None));
        let done2 = done.clone();
        update_account(
            &router,
            2,
            storage,
            b"branch-1".to_vec(),
            b"teller-1".to_vec(),
            b"account-1".to_vec(),
            10,
            move |r| *done2.lock().unwrap() = Some(r),
        )
        .unwrap();

        wait_for(|| done.lock().unwrap().is_some());
        assert!(matches!(
            done.lock().unwrap().as_ref().unwrap(),
            Err(DbError::StorageManager(_))
        ));
        router.shutdown();
    }
}
