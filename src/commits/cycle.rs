//! Future cycles: seed, snapshot selection and stake totals.
pub mod seed;
pub(crate) mod store;

use async_trait::async_trait;

use super::created_cycles;
use super::nonces;
use super::snapshot_balance;
use super::snapshot_balance::BakerSnapshot;
use crate::constants::INITIAL_SEED;
use crate::core::entities::Cycle;
use crate::core::protocol::Protocol;
use crate::core::types::CycleIndex;
use crate::core::types::Level;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

pub struct CycleCommit;

#[async_trait]
impl Commit for CycleCommit {
    fn name(&self) -> &'static str {
        "cycle"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, _raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let events = block.events();
        if !events.is_activation() && !events.is_cycle_begin() {
            return Ok(());
        }
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;

        if events.is_activation() {
            let rows = snapshot_balance::store::get_at(ctx.pgtx, block.level).await?;
            let bakers = snapshot_balance::aggregate(&rows);
            let mut seed = INITIAL_SEED;
            for index in created_cycles(&block, &protocol) {
                seed = seed::next_seed(&seed, &[]);
                let cycle = build_cycle(&protocol, index, 0, block.level, &seed, &bakers);
                store::insert(ctx.pgtx, &cycle).await?;
            }
            return Ok(());
        }

        let index = block.cycle + protocol.preserved_cycles;
        let prev = store::get(ctx.pgtx, index - 1)
            .await?
            .ok_or_else(|| invariant(format!("missing cycle {} to seed {index}", index - 1)))?;
        let nonces = nonces::store::get_nonces(ctx.pgtx, block.cycle - 2).await?;
        let seed = seed::next_seed(&prev.seed, &nonces);

        let sampled = seed::snapshot_index(&seed, protocol.snapshots_per_cycle())?;
        let first = store::get_first(ctx.pgtx).await?;
        let (snapshot_index, snapshot_level) =
            select_snapshot(&protocol, block.cycle - 2, sampled, first.as_ref());
        tracing::debug!(
            "cycle {index} uses snapshot {snapshot_index} at level {snapshot_level}"
        );

        let rows = snapshot_balance::store::get_at(ctx.pgtx, snapshot_level).await?;
        let bakers = snapshot_balance::aggregate(&rows);
        let cycle = build_cycle(&protocol, index, snapshot_index, snapshot_level, &seed, &bakers);
        store::insert(ctx.pgtx, &cycle).await?;
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, _raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;
        for index in created_cycles(&block, &protocol) {
            store::delete(ctx.pgtx, index).await?;
        }
        Ok(())
    }
}

/// Whether a baker's stake gets it selected for rights.
pub fn is_selected(protocol: &Protocol, baker: &BakerSnapshot) -> bool {
    baker.staking_balance >= protocol.minimal_stake()
}

/// Snapshot index and level of a cycle drawn from snapshot `sampled` of
/// `cycle`.
///
/// Snapshots preceding the first indexed cycle's snapshot don't exist, the
/// first one is used instead, along with its index.
fn select_snapshot(
    protocol: &Protocol,
    cycle: CycleIndex,
    sampled: i32,
    first: Option<&Cycle>,
) -> (i32, Level) {
    let level = protocol.snapshot_level(cycle, sampled);
    match first {
        Some(f) if level < f.snapshot_level => (f.snapshot_index, f.snapshot_level),
        _ => (sampled, level),
    }
}

fn build_cycle(
    protocol: &Protocol,
    index: CycleIndex,
    snapshot_index: i32,
    snapshot_level: Level,
    seed: &[u8],
    bakers: &[BakerSnapshot],
) -> Cycle {
    let selected: Vec<&BakerSnapshot> = bakers.iter().filter(|b| is_selected(protocol, b)).collect();
    Cycle {
        index,
        first_level: protocol.first_level_of(index),
        last_level: protocol.last_level_of(index),
        snapshot_index,
        snapshot_level,
        total_staking: bakers.iter().map(|b| b.staking_balance).sum(),
        selected_stake: selected.iter().map(|b| b.staking_balance).sum(),
        total_delegated: bakers.iter().map(|b| b.delegated_balance).sum(),
        total_delegators: bakers.iter().map(|b| b.delegators_count).sum(),
        total_bakers: selected.len() as i32,
        seed: seed.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::Block;
    use crate::core::types::BlockEvents;
    use pretty_assertions::assert_eq;

    fn baker(baker_id: i32, own: i64, delegated: i64, delegators: i32) -> BakerSnapshot {
        BakerSnapshot {
            baker_id,
            own_balance: own,
            staking_balance: own + delegated,
            delegated_balance: delegated,
            delegators_count: delegators,
        }
    }

    #[test]
    fn cycle_totals() {
        let p = Protocol::dummy();
        let bakers = vec![
            baker(1, 6_000_000_000, 4_000_000_000, 2),
            baker(2, 8_000_000_000, 0, 0),
            baker(3, 1_000_000_000, 500_000_000, 1),
        ];
        let c = build_cycle(&p, 3, 2, 12, &[1u8; 32], &bakers);
        assert_eq!(c.first_level, 25);
        assert_eq!(c.last_level, 32);
        assert_eq!(c.total_bakers, 2);
        assert_eq!(c.selected_stake, 18_000_000_000);
        assert_eq!(c.total_staking, 19_500_000_000);
        assert_eq!(c.total_delegated, 4_500_000_000);
        assert_eq!(c.total_delegators, 3);
        assert_eq!(c.seed, vec![1u8; 32]);
    }

    #[test]
    fn cycle_begin_with_five_preserved_cycles_creates_one_cycle() {
        let mut p = Protocol::dummy();
        p.preserved_cycles = 5;
        let mut block = Block::dummy();
        block.cycle = 7;
        block.events = BlockEvents::CYCLE_BEGIN;
        let created: Vec<CycleIndex> = created_cycles(&block, &p).collect();
        assert_eq!(created, vec![12]);

        let bakers = vec![
            baker(1, 7_999_999_999, 0, 0),
            baker(2, 8_000_000_000, 0, 0),
            baker(3, 2_000_000_000, 7_000_000_000, 3),
        ];
        let c = build_cycle(&p, 12, 0, 40, &[0u8; 32], &bakers);
        let expected = bakers
            .iter()
            .filter(|b| b.staking_balance >= p.tokens_per_roll)
            .count();
        assert_eq!(c.total_bakers as usize, expected);
        assert_eq!(c.total_bakers, 2);
    }

    #[test]
    fn snapshot_before_first_cycle_takes_first_index() {
        let p = Protocol::dummy();
        let first = build_cycle(&p, 0, 0, 1, &[0u8; 32], &[]);
        // Cycle -1 precedes activation
        assert_eq!(select_snapshot(&p, -1, 3, Some(&first)), (0, 1));
        assert_eq!(select_snapshot(&p, 1, 3, Some(&first)), (3, 16));
        assert_eq!(select_snapshot(&p, 1, 2, None), (2, 14));
    }

    #[test]
    fn snapshot_level_is_reproducible() {
        let p = Protocol::dummy();
        let seed = seed::next_seed(&[5u8; 32], &[vec![1u8; 32]]);
        let a = p.snapshot_level(3, seed::snapshot_index(&seed, p.snapshots_per_cycle()).unwrap());
        let b = p.snapshot_level(3, seed::snapshot_index(&seed, p.snapshots_per_cycle()).unwrap());
        assert_eq!(a, b);
        assert!((p.first_level_of(3)..=p.last_level_of(3)).contains(&a));
    }
}
