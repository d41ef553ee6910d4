use postgres_from_row::FromRow;

use super::node::models::Constants;
use super::types::CycleIndex;
use super::types::Level;
use super::types::Mutez;
use crate::constants::INITIAL_PARTICIPATION_EMA;
use crate::constants::SUPERMAJORITY;

/// Protocol parameters, as fetched from the node when a protocol is first seen.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Protocol {
    pub code: i32,
    pub hash: String,
    pub first_level: Level,
    pub first_cycle: CycleIndex,
    pub first_cycle_level: Level,
    pub preserved_cycles: i32,
    pub blocks_per_cycle: i32,
    pub blocks_per_snapshot: i32,
    pub blocks_per_voting_period: i32,
    /// Minimal stake to be selected for rights
    pub tokens_per_roll: Mutez,
    pub endorsers_per_block: i32,
    pub block_deposit: Mutez,
    pub endorsement_deposit: Mutez,
    /// Block reward per included endorsement slot, for priority 0
    pub baking_reward0: Mutez,
    /// Block reward per included endorsement slot, for priority > 0
    pub baking_reward1: Mutez,
    /// Endorsement reward per slot when the endorsed block has priority 0
    pub endorsement_reward0: Mutez,
    /// Endorsement reward per slot when the endorsed block has priority > 0
    pub endorsement_reward1: Mutez,
    pub revelation_reward: Mutez,
    pub proposal_quorum: i32,
    pub ballot_quorum_min: i32,
    pub ballot_quorum_max: i32,
    pub supermajority: i32,
    pub initial_participation_ema: i32,
}

impl Protocol {
    /// Creates a new protocol starting at `level`.
    ///
    /// * `code`: sequence number of the protocol
    /// * `cycle`, `cycle_position`: cycle info of the first block
    pub fn new(
        code: i32,
        hash: &str,
        level: Level,
        cycle: CycleIndex,
        cycle_position: i32,
        constants: &Constants,
    ) -> Self {
        Self {
            code,
            hash: hash.to_owned(),
            first_level: level,
            first_cycle: cycle,
            first_cycle_level: level - cycle_position,
            preserved_cycles: constants.preserved_cycles,
            blocks_per_cycle: constants.blocks_per_cycle,
            blocks_per_snapshot: constants.blocks_per_roll_snapshot,
            blocks_per_voting_period: constants.blocks_per_voting_period,
            tokens_per_roll: constants.tokens_per_roll,
            endorsers_per_block: constants.endorsers_per_block,
            block_deposit: constants.block_security_deposit,
            endorsement_deposit: constants.endorsement_security_deposit,
            baking_reward0: constants.baking_reward_per_endorsement[0],
            baking_reward1: constants.baking_reward_per_endorsement[1],
            endorsement_reward0: constants.endorsement_reward[0],
            endorsement_reward1: constants.endorsement_reward[1],
            revelation_reward: constants.seed_nonce_revelation_tip,
            proposal_quorum: constants.min_proposal_quorum,
            ballot_quorum_min: constants.quorum_min,
            ballot_quorum_max: constants.quorum_max,
            supermajority: SUPERMAJORITY,
            initial_participation_ema: INITIAL_PARTICIPATION_EMA,
        }
    }

    pub fn cycle_of(&self, level: Level) -> CycleIndex {
        self.first_cycle + (level - self.first_cycle_level).div_euclid(self.blocks_per_cycle)
    }

    pub fn first_level_of(&self, cycle: CycleIndex) -> Level {
        self.first_cycle_level + (cycle - self.first_cycle) * self.blocks_per_cycle
    }

    pub fn last_level_of(&self, cycle: CycleIndex) -> Level {
        self.first_level_of(cycle) + self.blocks_per_cycle - 1
    }

    pub fn snapshots_per_cycle(&self) -> i32 {
        self.blocks_per_cycle / self.blocks_per_snapshot
    }

    /// Level of snapshot `index` within `cycle`.
    pub fn snapshot_level(&self, cycle: CycleIndex, index: i32) -> Level {
        self.first_level_of(cycle) + (index + 1) * self.blocks_per_snapshot - 1
    }

    /// Position of `level` within its voting period.
    pub fn voting_period_position(&self, level: Level) -> i32 {
        (level - self.first_cycle_level).rem_euclid(self.blocks_per_voting_period)
    }

    /// Whether balances get snapshotted at given position in a cycle.
    pub fn is_snapshot_position(&self, cycle_position: i32) -> bool {
        (cycle_position + 1) % self.blocks_per_snapshot == 0
    }

    /// Number of priority 0 baking rights in a cycle.
    pub fn blocks_per_cycle(&self) -> i64 {
        self.blocks_per_cycle as i64
    }

    /// Number of endorsement slots in a cycle.
    pub fn endorsements_per_cycle(&self) -> i64 {
        self.endorsers_per_block as i64 * self.blocks_per_cycle as i64
    }

    pub fn minimal_stake(&self) -> Mutez {
        self.tokens_per_roll
    }

    /// Reward of a block baked at `priority` including `validations` endorsement slots.
    pub fn block_reward(&self, priority: i32, validations: i32) -> Mutez {
        let per_slot = match priority {
            0 => self.baking_reward0,
            _ => self.baking_reward1,
        };
        per_slot * validations as i64
    }

    /// Best possible block reward, used for projections.
    pub fn max_block_reward(&self) -> Mutez {
        self.block_reward(0, self.endorsers_per_block)
    }

    /// Reward for `slots` endorsement slots of a block baked at `endorsed_priority`.
    pub fn endorsement_reward(&self, slots: i32, endorsed_priority: i32) -> Mutez {
        let per_slot = match endorsed_priority {
            0 => self.endorsement_reward0,
            _ => self.endorsement_reward1,
        };
        per_slot * slots as i64
    }

    /// Best possible endorsement reward, used for projections.
    pub fn max_endorsement_reward(&self, slots: i32) -> Mutez {
        self.endorsement_reward(slots, 0)
    }

    pub fn endorsement_deposit(&self, slots: i32) -> Mutez {
        self.endorsement_deposit * slots as i64
    }
}

#[cfg(feature = "test-utilities")]
impl Protocol {
    /// A small protocol for tests: 8 blocks per cycle, 2 per snapshot.
    pub fn dummy() -> Self {
        Self {
            code: 1,
            hash: String::from("PtDummy"),
            first_level: 1,
            first_cycle: 0,
            first_cycle_level: 1,
            preserved_cycles: 2,
            blocks_per_cycle: 8,
            blocks_per_snapshot: 2,
            blocks_per_voting_period: 16,
            tokens_per_roll: 8_000_000_000,
            endorsers_per_block: 4,
            block_deposit: 512_000_000,
            endorsement_deposit: 64_000_000,
            baking_reward0: 1_250_000,
            baking_reward1: 187_500,
            endorsement_reward0: 1_250_000,
            endorsement_reward1: 833_333,
            revelation_reward: 125_000,
            proposal_quorum: 500,
            ballot_quorum_min: 2000,
            ballot_quorum_max: 7000,
            supermajority: SUPERMAJORITY,
            initial_participation_ema: INITIAL_PARTICIPATION_EMA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Protocol;
    use pretty_assertions::assert_eq;

    #[test]
    fn cycle_arithmetic() {
        let p = Protocol::dummy();
        assert_eq!(p.cycle_of(1), 0);
        assert_eq!(p.cycle_of(8), 0);
        assert_eq!(p.cycle_of(9), 1);
        assert_eq!(p.first_level_of(2), 17);
        assert_eq!(p.last_level_of(2), 24);
        assert_eq!(p.snapshots_per_cycle(), 4);
        assert_eq!(p.snapshot_level(1, 0), 10);
        assert_eq!(p.snapshot_level(1, 3), 16);
        assert!(p.is_snapshot_position(1));
        assert!(!p.is_snapshot_position(2));
        assert_eq!(p.voting_period_position(16), 15);
        assert_eq!(p.voting_period_position(17), 0);
    }

    #[test]
    fn cycle_arithmetic_for_late_protocol() {
        let mut p = Protocol::dummy();
        // Protocol activated mid cycle 10
        p.first_level = 85;
        p.first_cycle = 10;
        p.first_cycle_level = 81;
        assert_eq!(p.cycle_of(85), 10);
        assert_eq!(p.cycle_of(89), 11);
        assert_eq!(p.first_level_of(11), 89);
    }

    #[test]
    fn block_rewards_depend_on_priority() {
        let p = Protocol::dummy();
        assert_eq!(p.block_reward(0, 4), 5_000_000);
        assert_eq!(p.block_reward(1, 4), 750_000);
        assert_eq!(p.block_reward(3, 2), 375_000);
        assert_eq!(p.max_block_reward(), 5_000_000);
    }

    #[test]
    fn endorsement_rewards_depend_on_endorsed_priority() {
        let p = Protocol::dummy();
        assert_eq!(p.endorsement_reward(2, 0), 2_500_000);
        assert_eq!(p.endorsement_reward(2, 1), 1_666_666);
        assert_eq!(p.max_endorsement_reward(3), 3_750_000);
        assert_eq!(p.endorsement_deposit(3), 192_000_000);
    }
}
