//! Balance snapshots, from which future rights and voting power derive.
pub(crate) mod store;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;

use crate::core::entities::Account;
use crate::core::entities::SnapshotBalance;
use crate::core::store::accounts;
use crate::core::types::AccountID;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::RawBlock;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

/// Stake of a baker at a snapshot, aggregated from snapshot rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BakerSnapshot {
    pub baker_id: AccountID,
    pub own_balance: Mutez,
    pub staking_balance: Mutez,
    pub delegated_balance: Mutez,
    pub delegators_count: i32,
}

pub struct SnapshotBalanceCommit;

#[async_trait]
impl Commit for SnapshotBalanceCommit {
    fn name(&self) -> &'static str {
        "snapshot_balance"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let events = ctx.cache.block()?.events();
        if !events.is_balance_snapshot() && !events.is_activation() {
            return Ok(());
        }
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;
        let staked = accounts::get_staked(ctx.pgtx).await?;
        let rows = build_snapshot(raw.level, &staked, protocol.minimal_stake());
        let n = store::insert_many(ctx.pgtx, &rows).await?;
        tracing::debug!("snapshotted {n} balances at {}", raw.level);
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        store::delete_at(ctx.pgtx, raw.level).await?;
        Ok(())
    }
}

/// Snapshot rows of all staked accounts, ordered by account id.
///
/// Active bakers get a row with their own balance, their delegators a row
/// tagged with the baker. Accounts delegating to anything else are grouped
/// by target and only included, with their target, if the group as a whole
/// reaches `minimal_stake`.
pub fn build_snapshot(level: Level, accounts: &[Account], minimal_stake: Mutez) -> Vec<SnapshotBalance> {
    let by_id: HashMap<AccountID, &Account> = accounts.iter().map(|a| (a.id, a)).collect();
    let is_active_baker = |id: &AccountID| by_id.get(id).map_or(false, |a| a.is_active_baker());

    let mut rows: BTreeMap<AccountID, SnapshotBalance> = BTreeMap::new();
    let mut weird: BTreeMap<AccountID, Vec<&Account>> = BTreeMap::new();
    for a in accounts {
        if a.is_active_baker() {
            rows.insert(a.id, row(level, a, None));
        } else if let Some(target) = a.external_delegate() {
            if is_active_baker(&target) {
                rows.insert(a.id, row(level, a, Some(target)));
            } else {
                weird.entry(target).or_default().push(a);
            }
        }
    }

    let mut seen: HashSet<AccountID> = rows.keys().copied().collect();
    for (target_id, delegators) in weird {
        let own = by_id.get(&target_id).map_or(0, |t| t.balance);
        let total = own + delegators.iter().map(|d| d.balance).sum::<Mutez>();
        if total < minimal_stake {
            continue;
        }
        tracing::debug!("including weird delegate {target_id} with {total}");
        if let Some(target) = by_id.get(&target_id) {
            if seen.insert(target_id) {
                rows.insert(target_id, row(level, target, None));
            }
        }
        for d in delegators {
            if seen.insert(d.id) {
                rows.insert(d.id, row(level, d, Some(target_id)));
            }
        }
    }
    rows.into_values().collect()
}

fn row(level: Level, account: &Account, delegate_id: Option<AccountID>) -> SnapshotBalance {
    SnapshotBalance {
        level,
        account_id: account.id,
        delegate_id,
        balance: account.balance,
    }
}

/// Per baker totals of snapshot rows, ordered by baker id.
pub fn aggregate(rows: &[SnapshotBalance]) -> Vec<BakerSnapshot> {
    let mut bakers: BTreeMap<AccountID, BakerSnapshot> = BTreeMap::new();
    for r in rows {
        let (baker_id, own, delegated) = match r.delegate_id {
            None => (r.account_id, r.balance, 0),
            Some(d) => (d, 0, r.balance),
        };
        let entry = bakers.entry(baker_id).or_insert_with(|| BakerSnapshot {
            baker_id,
            ..Default::default()
        });
        entry.own_balance += own;
        entry.delegated_balance += delegated;
        entry.staking_balance += own + delegated;
        if r.delegate_id.is_some() {
            entry.delegators_count += 1;
        }
    }
    bakers.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn baker(id: AccountID, balance: Mutez) -> Account {
        let mut a = Account::new(id, &format!("tz1{id}"), 1);
        a.is_baker = true;
        a.delegate_id = Some(id);
        a.balance = balance;
        a
    }

    fn delegator(id: AccountID, delegate: AccountID, balance: Mutez) -> Account {
        let mut a = Account::new(id, &format!("tz1{id}"), 1);
        a.delegate_id = Some(delegate);
        a.balance = balance;
        a
    }

    fn plain(id: AccountID, balance: Mutez) -> Account {
        let mut a = Account::new(id, &format!("tz1{id}"), 1);
        a.balance = balance;
        a
    }

    #[test]
    fn bakers_and_delegators() {
        let accounts = vec![baker(1, 100), delegator(2, 1, 30), delegator(3, 1, 20)];
        let rows = build_snapshot(8, &accounts, 1000);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].delegate_id, None);
        assert_eq!(rows[1].delegate_id, Some(1));
        assert!(rows.iter().all(|r| r.level == 8));

        let bakers = aggregate(&rows);
        assert_eq!(
            bakers,
            vec![BakerSnapshot {
                baker_id: 1,
                own_balance: 100,
                staking_balance: 150,
                delegated_balance: 50,
                delegators_count: 2,
            }]
        );
    }

    #[test]
    fn weird_group_above_minimal_stake_is_included() {
        // 4 is not a baker but gathers enough stake
        let accounts = vec![plain(4, 600), delegator(5, 4, 300), delegator(6, 4, 200)];
        let rows = build_snapshot(8, &accounts, 1000);
        let ids: Vec<(AccountID, Option<AccountID>)> =
            rows.iter().map(|r| (r.account_id, r.delegate_id)).collect();
        assert_eq!(ids, vec![(4, None), (5, Some(4)), (6, Some(4))]);
        assert_eq!(aggregate(&rows)[0].staking_balance, 1100);
    }

    #[test]
    fn weird_group_below_minimal_stake_is_ignored() {
        let accounts = vec![baker(1, 5000), plain(4, 100), delegator(5, 4, 300)];
        let rows = build_snapshot(8, &accounts, 1000);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].account_id, 1);
    }

    #[test]
    fn deactivated_baker_is_treated_as_weird() {
        let mut b = baker(1, 900);
        b.deactivation_level = Some(5);
        let accounts = vec![b, delegator(2, 1, 200)];
        let rows = build_snapshot(8, &accounts, 1000);
        assert_eq!(rows.len(), 2);
        let rows = build_snapshot(8, &accounts, 2000);
        assert!(rows.is_empty());
    }

    #[test]
    fn snapshot_sums_match_staking_balances() {
        let accounts = vec![
            baker(1, 100),
            baker(2, 70),
            delegator(3, 1, 30),
            delegator(4, 2, 5),
            delegator(5, 2, 6),
        ];
        let rows = build_snapshot(8, &accounts, 0);
        for b in aggregate(&rows) {
            let sum: Mutez = rows
                .iter()
                .filter(|r| r.account_id == b.baker_id || r.delegate_id == Some(b.baker_id))
                .map(|r| r.balance)
                .sum();
            assert_eq!(sum, b.staking_balance);
        }
    }
}
