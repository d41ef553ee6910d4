//! Delegator balances backing each baker's stake in a cycle.
pub(crate) mod store;

use std::collections::HashSet;

use async_trait::async_trait;

use super::created_cycles;
use super::cycle;
use super::snapshot_balance;
use crate::core::entities::DelegatorCycle;
use crate::core::entities::SnapshotBalance;
use crate::core::protocol::Protocol;
use crate::core::types::AccountID;
use crate::core::types::CycleIndex;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

pub struct DelegatorCycleCommit;

#[async_trait]
impl Commit for DelegatorCycleCommit {
    fn name(&self) -> &'static str {
        "delegator_cycle"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, _raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;
        for index in created_cycles(&block, &protocol) {
            let c = cycle::store::get(ctx.pgtx, index)
                .await?
                .ok_or_else(|| invariant(format!("missing cycle {index}")))?;
            let snapshot = snapshot_balance::store::get_at(ctx.pgtx, c.snapshot_level).await?;
            let rows = delegator_cycles(&protocol, index, &snapshot);
            let n = store::insert_many(ctx.pgtx, &rows).await?;
            tracing::debug!("inserted {n} delegator cycles for cycle {index}");
        }
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, _raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;
        for index in created_cycles(&block, &protocol) {
            store::delete_cycle(ctx.pgtx, index).await?;
        }
        Ok(())
    }
}

/// Rows for delegators of bakers selected in `cycle`.
fn delegator_cycles(
    protocol: &Protocol,
    cycle: CycleIndex,
    snapshot: &[SnapshotBalance],
) -> Vec<DelegatorCycle> {
    let selected: HashSet<AccountID> = snapshot_balance::aggregate(snapshot)
        .iter()
        .filter(|b| cycle::is_selected(protocol, b))
        .map(|b| b.baker_id)
        .collect();
    snapshot
        .iter()
        .filter_map(|r| {
            r.delegate_id
                .filter(|d| selected.contains(d))
                .map(|baker_id| DelegatorCycle {
                    cycle,
                    delegator_id: r.account_id,
                    baker_id,
                    balance: r.balance,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(account_id: AccountID, delegate_id: Option<AccountID>, balance: i64) -> SnapshotBalance {
        SnapshotBalance {
            level: 12,
            account_id,
            delegate_id,
            balance,
        }
    }

    #[test]
    fn only_delegators_of_selected_bakers() {
        let p = Protocol::dummy();
        let snapshot = vec![
            row(1, None, 7_000_000_000),
            row(2, Some(1), 2_000_000_000),
            row(3, None, 100),
            row(4, Some(3), 200),
        ];
        let rows = delegator_cycles(&p, 5, &snapshot);
        assert_eq!(
            rows,
            vec![DelegatorCycle {
                cycle: 5,
                delegator_id: 2,
                baker_id: 1,
                balance: 2_000_000_000,
            }]
        );
    }
}
