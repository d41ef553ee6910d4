//! Running totals, one row per level.
use async_trait::async_trait;

use super::cycle;
use super::delegations;
use super::delegations::DelegationChange;
use super::delegations::DelegationKind;
use crate::core::entities::Block;
use crate::core::entities::Statistics;
use crate::core::store::statistics;
use crate::core::types::BalanceUpdate;
use crate::core::types::FreezerCategory;
use crate::core::types::Mutez;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

pub struct StatisticsCommit;

#[async_trait]
impl Commit for StatisticsCommit {
    fn name(&self) -> &'static str {
        "statistics"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let events = block.events();
        let prev = ctx.cache.statistics(ctx.pgtx).await?;

        let changes = delegations::store::get_at(ctx.pgtx, block.level).await?;
        let counts = count_deltas(&changes);
        let baking_power = if events.is_cycle_begin() || events.is_activation() {
            let c = cycle::store::get(ctx.pgtx, block.cycle)
                .await?
                .ok_or_else(|| invariant(format!("missing cycle {}", block.cycle)))?;
            Some(c.selected_stake)
        } else {
            None
        };
        let row = next_statistics(prev.as_ref(), &block, raw, counts, baking_power);

        if let Some(prev) = &prev {
            if day_changed(prev, &row) {
                let date = prev.timestamp.date();
                tracing::debug!("finalizing statistics of {date}");
                statistics::set_date(ctx.pgtx, prev.level, Some(date)).await?;
            }
        }
        statistics::insert(ctx.pgtx, &row).await?;
        ctx.cache.set_statistics(Some(row));
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let row = ctx
            .cache
            .statistics(ctx.pgtx)
            .await?
            .filter(|s| s.level == raw.level)
            .ok_or_else(|| invariant(format!("no statistics at level {}", raw.level)))?;
        statistics::delete(ctx.pgtx, raw.level).await?;
        ctx.cache.set_statistics(None);

        if let Some(prev) = ctx.cache.statistics(ctx.pgtx).await? {
            if day_changed(&prev, &row) {
                statistics::set_date(ctx.pgtx, prev.level, None).await?;
                ctx.cache.set_statistics(None);
            }
        }
        Ok(())
    }
}

/// Changes in active baker and delegator counts.
fn count_deltas(changes: &[DelegationChange]) -> (i32, i32) {
    let mut bakers = 0;
    let mut delegators = 0;
    for c in changes {
        let was_active_baker = c.prev_is_baker && c.prev_deactivation_level.is_none();
        let had_delegate = c.prev_external_delegate().is_some() as i32;
        match c.kind {
            DelegationKind::Registration => {
                bakers += !was_active_baker as i32;
                delegators -= had_delegate;
            }
            DelegationKind::Delegation => delegators += 1 - had_delegate,
            DelegationKind::Withdrawal => delegators -= had_delegate,
            DelegationKind::Deactivation => bakers -= was_active_baker as i32,
        }
    }
    (bakers, delegators)
}

/// Row following `prev` for `block`.
///
/// * `counts`: changes in baker and delegator counts
/// * `baking_power`: selected stake of a starting cycle
fn next_statistics(
    prev: Option<&Statistics>,
    block: &Block,
    raw: &RawBlock,
    counts: (i32, i32),
    baking_power: Option<Mutez>,
) -> Statistics {
    let mut deposits = block.deposit;
    let mut rewards = block.reward;
    let mut fees = block.fees;
    let mut changes = 0;
    for update in &raw.balance_updates {
        changes += update.change();
        if let BalanceUpdate::Freezer {
            category, change, ..
        } = update
        {
            match category {
                FreezerCategory::Deposits => deposits += change,
                FreezerCategory::Rewards => rewards += change,
                FreezerCategory::Fees => fees += change,
            }
        }
    }

    let (total_supply, frozen_deposits, frozen_rewards, frozen_fees, prev_power, bakers, delegators) =
        match prev {
            Some(p) => (
                p.total_supply,
                p.frozen_deposits,
                p.frozen_rewards,
                p.frozen_fees,
                p.baking_power,
                p.total_bakers,
                p.total_delegators,
            ),
            None => (0, 0, 0, 0, 0, 0, 0),
        };
    let frozen_deposits = frozen_deposits + deposits;
    let frozen_rewards = frozen_rewards + rewards;
    let frozen_fees = frozen_fees + fees;
    Statistics {
        level: block.level,
        cycle: block.events().is_cycle_end().then_some(block.cycle),
        timestamp: block.timestamp,
        date: None,
        total_supply: total_supply + block.reward + block.fees + changes,
        total_frozen: frozen_deposits + frozen_rewards + frozen_fees,
        frozen_deposits,
        frozen_rewards,
        frozen_fees,
        baking_power: baking_power.unwrap_or(prev_power),
        total_bakers: bakers + counts.0,
        total_delegators: delegators + counts.1,
    }
}

/// Whether `row` is the first of a new day.
fn day_changed(prev: &Statistics, row: &Statistics) -> bool {
    prev.timestamp.date() != row.timestamp.date()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BlockEvents;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    fn change(kind: DelegationKind) -> DelegationChange {
        DelegationChange {
            level: 10,
            index: 0,
            kind,
            sender_id: 1,
            prev_delegate_id: None,
            new_delegate_id: None,
            prev_is_baker: false,
            prev_deactivation_level: None,
        }
    }

    #[test]
    fn registrations_and_deactivations() {
        let mut reactivation = change(DelegationKind::Registration);
        reactivation.prev_is_baker = true;
        reactivation.prev_deactivation_level = Some(4);
        reactivation.prev_delegate_id = Some(1);
        let mut deactivation = change(DelegationKind::Deactivation);
        deactivation.sender_id = 2;
        deactivation.prev_is_baker = true;
        let mut reregistration = change(DelegationKind::Registration);
        reregistration.sender_id = 3;
        reregistration.prev_is_baker = true;
        let mut former_delegator = change(DelegationKind::Registration);
        former_delegator.sender_id = 4;
        former_delegator.prev_delegate_id = Some(2);

        let changes = vec![reactivation, deactivation, reregistration, former_delegator];
        assert_eq!(count_deltas(&changes), (1, -1));
    }

    #[test]
    fn delegations_and_withdrawals() {
        let first = change(DelegationKind::Delegation);
        let mut switch = change(DelegationKind::Delegation);
        switch.prev_delegate_id = Some(5);
        let mut withdrawal = change(DelegationKind::Withdrawal);
        withdrawal.prev_delegate_id = Some(5);
        let idle_withdrawal = change(DelegationKind::Withdrawal);
        assert_eq!(
            count_deltas(&[first, switch, withdrawal, idle_withdrawal]),
            (0, 0)
        );
        assert_eq!(count_deltas(&[change(DelegationKind::Delegation)]), (0, 1));
    }

    #[test]
    fn running_totals() {
        let prev = Statistics {
            level: 9,
            cycle: None,
            timestamp: datetime!(2020-09-13 23:59:00 UTC),
            date: None,
            total_supply: 1_000,
            total_frozen: 60,
            frozen_deposits: 30,
            frozen_rewards: 20,
            frozen_fees: 10,
            baking_power: 700,
            total_bakers: 3,
            total_delegators: 5,
        };
        let mut block = Block::dummy();
        block.level = 10;
        block.timestamp = datetime!(2020-09-14 00:01:00 UTC);
        block.reward = 4;
        block.deposit = 8;
        block.fees = 1;
        block.events = BlockEvents::CYCLE_END;
        block.cycle = 2;
        let raw = RawBlock::dummy()
            .level(10)
            .credit("tz1a", 100)
            .freeze("tz1baker", FreezerCategory::Rewards, -20)
            .credit("tz1baker", 20);

        let row = next_statistics(Some(&prev), &block, &raw, (1, -2), None);
        assert_eq!(row.total_supply, 1_105);
        assert_eq!(row.frozen_deposits, 38);
        assert_eq!(row.frozen_rewards, 4);
        assert_eq!(row.frozen_fees, 11);
        assert_eq!(row.total_frozen, 53);
        assert_eq!(row.baking_power, 700);
        assert_eq!(row.cycle, Some(2));
        assert_eq!((row.total_bakers, row.total_delegators), (4, 3));
        assert!(day_changed(&prev, &row));

        let row = next_statistics(Some(&prev), &block, &raw, (0, 0), Some(900));
        assert_eq!(row.baking_power, 900);
    }

    #[test]
    fn first_row() {
        let block = Block::dummy();
        let raw = RawBlock::dummy().credit("tz1a", 50);
        let row = next_statistics(None, &block, &raw, (1, 0), Some(8_000));
        assert_eq!(row.total_supply, 50);
        assert_eq!(row.total_bakers, 1);
        assert_eq!(row.cycle, None);
        assert_eq!(row.date, None);
    }
}
