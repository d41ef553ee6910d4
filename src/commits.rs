//! Block commits, listed in apply order.
pub mod baker_cycle;
pub mod baking_rights;
pub mod big_map;
pub mod block;
pub mod cycle;
pub mod delegations;
pub mod delegator_cycle;
pub mod freezer;
pub mod nonces;
pub mod snapshot_balance;
pub mod statistics;
pub mod voting;

use crate::framework::Commit;

/// All commits, in apply order. Reverts run in reverse order.
pub fn all() -> Vec<Box<dyn Commit>> {
    vec![
        Box::new(block::BlockCommit),
        Box::new(freezer::FreezerCommit),
        Box::new(delegations::DelegationsCommit),
        Box::new(nonces::NonceRevelationsCommit),
        Box::new(baking_rights::BakingRightsCommit),
        Box::new(snapshot_balance::SnapshotBalanceCommit),
        Box::new(cycle::CycleCommit),
        Box::new(delegator_cycle::DelegatorCycleCommit),
        Box::new(baker_cycle::BakerCycleCommit),
        Box::new(voting::VotingCommit),
        Box::new(big_map::BigMapCommit),
        Box::new(statistics::StatisticsCommit),
    ]
}

/// Cycles created by a block: all bootstrap cycles on activation, the newly
/// preserved cycle on cycle begin, none otherwise.
pub(crate) fn created_cycles(
    block: &crate::core::entities::Block,
    protocol: &crate::core::protocol::Protocol,
) -> std::ops::RangeInclusive<crate::core::types::CycleIndex> {
    let events = block.events();
    let last = block.cycle + protocol.preserved_cycles;
    if events.is_activation() {
        block.cycle..=last
    } else if events.is_cycle_begin() {
        last..=last
    } else {
        // Empty
        last + 1..=last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::Block;
    use crate::core::protocol::Protocol;
    use crate::core::types::BlockEvents;

    fn block(events: i32) -> Block {
        let mut b = Block::dummy();
        b.cycle = 4;
        b.events = events;
        b
    }

    #[test]
    fn activation_creates_all_preserved_cycles() {
        let p = Protocol::dummy();
        let cycles: Vec<i32> = created_cycles(&block(BlockEvents::ACTIVATION), &p).collect();
        assert_eq!(cycles, vec![4, 5, 6]);
    }

    #[test]
    fn cycle_begin_creates_one_cycle() {
        let p = Protocol::dummy();
        let cycles: Vec<i32> = created_cycles(&block(BlockEvents::CYCLE_BEGIN), &p).collect();
        assert_eq!(cycles, vec![6]);
        assert_eq!(created_cycles(&block(0), &p).count(), 0);
    }
}
