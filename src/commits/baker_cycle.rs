//! Per baker, per cycle counters.
//!
//! Rows are created along with their cycle and then updated as rights
//! resolve. Each block contributes a set of deltas, applied in two phases:
//! first the rows of the current cycle, then the corrections addressed to
//! earlier cycles (endorsements of the previous cycle's last block,
//! accusations and revelation penalties). Reverting applies the negated
//! deltas in the same order.
mod parsing;

use std::collections::HashMap;

use async_trait::async_trait;

use super::created_cycles;
use super::cycle;
use super::delegator_cycle;
use super::snapshot_balance;
use super::snapshot_balance::BakerSnapshot;
use crate::core::entities::Account;
use crate::core::entities::Block;
use crate::core::entities::DelegatorCycle;
use crate::core::protocol::Protocol;
use crate::core::store::baker_cycles;
use crate::core::store::blocks;
use crate::core::store::rights;
use crate::core::types::CycleIndex;
use crate::core::types::Level;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;
use parsing::BakerCycleDelta;

pub struct BakerCycleCommit;

#[async_trait]
impl Commit for BakerCycleCommit {
    fn name(&self) -> &'static str {
        "baker_cycle"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;
        let events = block.events();

        let created = created_cycles(&block, &protocol);
        if !created.is_empty() {
            for index in created {
                create_cycle(ctx, &protocol, &block, index).await?;
            }
            if !events.is_activation() {
                let n = baker_cycles::delete_ineligible(ctx.pgtx, block.cycle).await?;
                tracing::debug!("deleted {n} baker cycles of ineligible bakers");
            }
            ctx.cache.invalidate_baker_cycles();
        }

        let deltas = block_deltas(ctx, &protocol, &block, raw).await?;
        let (current, corrections) = parsing::split_phases(deltas, block.cycle);
        apply_deltas(ctx, &current).await?;
        apply_deltas(ctx, &corrections).await?;
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;

        let deltas = block_deltas(ctx, &protocol, &block, raw).await?;
        let (current, corrections) = parsing::split_phases(deltas, block.cycle);
        let negate = |deltas: Vec<BakerCycleDelta>| -> Vec<BakerCycleDelta> {
            deltas.iter().map(|d| d.negated()).collect()
        };
        apply_deltas(ctx, &negate(current)).await?;
        apply_deltas(ctx, &negate(corrections)).await?;

        let created = created_cycles(&block, &protocol);
        if !created.is_empty() {
            for index in created {
                baker_cycles::delete_cycle(ctx.pgtx, index).await?;
            }
            ctx.cache.invalidate_baker_cycles();
        }
        Ok(())
    }
}

/// All deltas contributed by a block, merged per row.
async fn block_deltas(
    ctx: &mut Context<'_, '_>,
    protocol: &Protocol,
    block: &Block,
    raw: &RawBlock,
) -> Result<Vec<BakerCycleDelta>, Error> {
    let rights = ctx.cache.rights_at(ctx.pgtx, block.level).await?;
    let endorsed_priority = if rights.iter().any(|r| r.is_endorsing()) {
        blocks::get(ctx.pgtx, block.level - 1)
            .await?
            .map(|b| b.priority)
            .ok_or_else(|| invariant(format!("missing endorsed block {}", block.level - 1)))?
    } else {
        0
    };
    let mut deltas = parsing::right_deltas(protocol, block, endorsed_priority, &rights)?;

    let ops = &raw.operations;
    let addresses = ops
        .double_bakings
        .iter()
        .chain(ops.double_endorsings.iter())
        .flat_map(|a| [&a.accuser, &a.offender])
        .chain(raw.revelation_penalties.iter().map(|p| &p.baker));
    let mut ids = HashMap::new();
    for address in addresses {
        if !ids.contains_key(address) {
            let account = ctx.cache.account_by_address(ctx.pgtx, address).await?;
            ids.insert(address.clone(), account.id);
        }
    }
    deltas.extend(parsing::operation_deltas(protocol, block, raw, &ids)?);
    Ok(parsing::merge(deltas))
}

async fn apply_deltas(ctx: &mut Context<'_, '_>, deltas: &[BakerCycleDelta]) -> Result<(), Error> {
    for d in deltas {
        let found = ctx
            .cache
            .add_to_baker_cycle(ctx.pgtx, d.cycle, d.baker_id, &d.changes)
            .await?;
        if !found {
            if d.realized {
                return Err(invariant(format!(
                    "missing baker cycle {} of baker {} with realized rights",
                    d.cycle, d.baker_id
                )));
            }
            tracing::debug!("no baker cycle {} for baker {}, skipping", d.cycle, d.baker_id);
        }
    }
    Ok(())
}

/// Create the rows of a new cycle.
async fn create_cycle(
    ctx: &mut Context<'_, '_>,
    protocol: &Protocol,
    block: &Block,
    index: CycleIndex,
) -> Result<(), Error> {
    let c = cycle::store::get(ctx.pgtx, index)
        .await?
        .ok_or_else(|| invariant(format!("missing cycle {index}")))?;
    let snapshot = snapshot_balance::store::get_at(ctx.pgtx, c.snapshot_level).await?;
    let bakers = snapshot_balance::aggregate(&snapshot);
    let summaries = rights::get_summaries(ctx.pgtx, index).await?;
    let (mut rows, shifted) =
        parsing::new_baker_cycles(protocol, index, &bakers, &summaries, c.selected_stake);

    for baker_id in shifted {
        let account = ctx.cache.account(ctx.pgtx, baker_id).await?;
        tracing::warn!(
            "baker {} has rights in cycle {index} but no snapshot at {}",
            account.address,
            c.snapshot_level
        );
        let (baker, delegators) =
            fetch_shifted(ctx, &account, index, c.snapshot_level, block.level).await?;
        let summary = summaries.iter().find(|s| s.baker_id == baker_id);
        rows.push(parsing::baker_cycle(
            protocol,
            index,
            &baker,
            summary,
            c.selected_stake,
        ));
        delegator_cycle::store::insert_many(ctx.pgtx, &delegators).await?;
    }
    let n = baker_cycles::insert_many(ctx.pgtx, &rows).await?;
    tracing::debug!("inserted {n} baker cycles for cycle {index}");
    Ok(())
}

/// Rebuild the snapshot of a baker, and its delegators, from the node.
async fn fetch_shifted(
    ctx: &mut Context<'_, '_>,
    account: &Account,
    cycle: CycleIndex,
    snapshot_level: Level,
    level: Level,
) -> Result<(BakerSnapshot, Vec<DelegatorCycle>), Error> {
    let delegate = ctx.node.delegate(snapshot_level, &account.address).await?;
    let mut delegators = vec![];
    for address in delegate
        .delegated_contracts
        .iter()
        .filter(|a| **a != account.address)
    {
        let balance = ctx.node.balance(snapshot_level, address).await?;
        let delegator = ctx
            .cache
            .get_or_create_account(ctx.pgtx, address, level)
            .await?;
        delegators.push(DelegatorCycle {
            cycle,
            delegator_id: delegator.id,
            baker_id: account.id,
            balance,
        });
    }
    let baker = BakerSnapshot {
        baker_id: account.id,
        own_balance: delegate.balance,
        staking_balance: delegate.staking_balance,
        delegated_balance: delegate.delegated_balance,
        delegators_count: delegators.len() as i32,
    };
    Ok((baker, delegators))
}
