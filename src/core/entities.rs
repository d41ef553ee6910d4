//! Rows of the core tables, shared by the cache and the commits.
use postgres_from_row::FromRow;
use postgres_types::FromSql;
use postgres_types::ToSql;
use time::Date;
use time::OffsetDateTime;

use super::types::AccountID;
use super::types::Address;
use super::types::BlockEvents;
use super::types::BlockHash;
use super::types::CycleIndex;
use super::types::Level;
use super::types::Mutez;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Account {
    pub id: AccountID,
    pub address: Address,
    pub first_level: Level,
    /// Total balance, frozen amounts included
    pub balance: Mutez,
    pub frozen_deposits: Mutez,
    pub frozen_rewards: Mutez,
    pub frozen_fees: Mutez,
    pub delegate_id: Option<AccountID>,
    pub is_baker: bool,
    pub deactivation_level: Option<Level>,
    /// Own balance plus delegated balance
    pub staking_balance: Mutez,
    pub delegated_balance: Mutez,
    pub delegators_count: i32,
    pub blocks_count: i32,
}

impl Account {
    pub fn new(id: AccountID, address: &str, first_level: Level) -> Self {
        Self {
            id,
            address: address.to_owned(),
            first_level,
            balance: 0,
            frozen_deposits: 0,
            frozen_rewards: 0,
            frozen_fees: 0,
            delegate_id: None,
            is_baker: false,
            deactivation_level: None,
            staking_balance: 0,
            delegated_balance: 0,
            delegators_count: 0,
            blocks_count: 0,
        }
    }

    pub fn frozen(&self) -> Mutez {
        self.frozen_deposits + self.frozen_rewards + self.frozen_fees
    }

    /// Spendable balance, i.e. balance available to cover deposits.
    pub fn available(&self) -> Mutez {
        self.balance - self.frozen()
    }

    pub fn is_active_baker(&self) -> bool {
        self.is_baker && self.deactivation_level.is_none()
    }

    /// Delegate other than self, if any.
    pub fn external_delegate(&self) -> Option<AccountID> {
        self.delegate_id.filter(|d| *d != self.id)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Block {
    pub level: Level,
    pub hash: BlockHash,
    pub cycle: CycleIndex,
    pub cycle_position: i32,
    pub timestamp: OffsetDateTime,
    pub protocol_code: i32,
    pub priority: i32,
    pub baker_id: AccountID,
    /// Endorsement slots included in the block
    pub validations: i32,
    pub reward: Mutez,
    pub deposit: Mutez,
    pub fees: Mutez,
    pub events: i32,
    pub operations: i32,
}

impl Block {
    pub fn events(&self) -> BlockEvents {
        BlockEvents(self.events)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSql, FromSql)]
#[postgres(name = "right_kind")]
pub enum RightKind {
    #[postgres(name = "baking")]
    Baking,
    #[postgres(name = "endorsing")]
    Endorsing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSql, FromSql)]
#[postgres(name = "right_status")]
pub enum RightStatus {
    #[postgres(name = "future")]
    Future,
    #[postgres(name = "realized")]
    Realized,
    #[postgres(name = "missed")]
    Missed,
    #[postgres(name = "uncovered")]
    Uncovered,
}

/// Baking or endorsing right.
///
/// Endorsing rights are stored at the level of the block including the
/// endorsements, i.e. one level after the endorsed block, but keep the cycle of
/// the endorsed block.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BakingRight {
    pub cycle: CycleIndex,
    pub level: Level,
    pub baker_id: AccountID,
    pub kind: RightKind,
    pub status: RightStatus,
    /// Baking rights only
    pub priority: Option<i32>,
    /// Endorsing rights only
    pub slots: Option<i32>,
}

impl BakingRight {
    pub fn baking(cycle: CycleIndex, level: Level, baker_id: AccountID, priority: i32) -> Self {
        Self {
            cycle,
            level,
            baker_id,
            kind: RightKind::Baking,
            status: RightStatus::Future,
            priority: Some(priority),
            slots: None,
        }
    }

    pub fn endorsing(cycle: CycleIndex, level: Level, baker_id: AccountID, slots: i32) -> Self {
        Self {
            cycle,
            level,
            baker_id,
            kind: RightKind::Endorsing,
            status: RightStatus::Future,
            priority: None,
            slots: Some(slots),
        }
    }

    pub fn is_baking(&self) -> bool {
        self.kind == RightKind::Baking
    }

    pub fn is_endorsing(&self) -> bool {
        self.kind == RightKind::Endorsing
    }

    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or_default()
    }

    pub fn slots(&self) -> i32 {
        self.slots.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Cycle {
    pub index: CycleIndex,
    pub first_level: Level,
    pub last_level: Level,
    pub snapshot_index: i32,
    pub snapshot_level: Level,
    pub total_staking: Mutez,
    pub selected_stake: Mutez,
    pub total_delegated: Mutez,
    pub total_delegators: i32,
    /// Number of bakers with enough stake to get rights
    pub total_bakers: i32,
    pub seed: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DelegatorCycle {
    pub cycle: CycleIndex,
    pub delegator_id: AccountID,
    pub baker_id: AccountID,
    pub balance: Mutez,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SnapshotBalance {
    pub level: Level,
    pub account_id: AccountID,
    pub delegate_id: Option<AccountID>,
    pub balance: Mutez,
}

/// Running totals, one row per level.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Statistics {
    pub level: Level,
    /// Set on the last level of a cycle
    pub cycle: Option<CycleIndex>,
    pub timestamp: OffsetDateTime,
    /// Set on the last row of a day, once the next day has started
    pub date: Option<Date>,
    pub total_supply: Mutez,
    pub total_frozen: Mutez,
    pub frozen_deposits: Mutez,
    pub frozen_rewards: Mutez,
    pub frozen_fees: Mutez,
    /// Selected stake of the current cycle
    pub baking_power: Mutez,
    pub total_bakers: i32,
    pub total_delegators: i32,
}

/// Per baker, per cycle statistics.
#[derive(Debug, Clone, PartialEq, Default, FromRow)]
pub struct BakerCycle {
    pub cycle: CycleIndex,
    pub baker_id: AccountID,
    pub staking_balance: Mutez,
    pub delegated_balance: Mutez,
    pub delegators_count: i32,
    pub expected_blocks: f64,
    pub expected_endorsements: f64,

    pub future_blocks: i64,
    pub own_blocks: i64,
    pub extra_blocks: i64,
    pub missed_own_blocks: i64,
    pub missed_extra_blocks: i64,
    pub uncovered_own_blocks: i64,
    pub uncovered_extra_blocks: i64,

    pub future_endorsements: i64,
    pub endorsements: i64,
    pub missed_endorsements: i64,
    pub uncovered_endorsements: i64,

    pub future_block_rewards: i64,
    pub own_block_rewards: i64,
    pub extra_block_rewards: i64,
    pub missed_own_block_rewards: i64,
    pub missed_extra_block_rewards: i64,
    pub uncovered_own_block_rewards: i64,
    pub uncovered_extra_block_rewards: i64,

    pub future_endorsement_rewards: i64,
    pub endorsement_rewards: i64,
    pub missed_endorsement_rewards: i64,
    pub uncovered_endorsement_rewards: i64,

    pub own_block_fees: i64,
    pub extra_block_fees: i64,
    pub missed_own_block_fees: i64,
    pub missed_extra_block_fees: i64,
    pub uncovered_own_block_fees: i64,
    pub uncovered_extra_block_fees: i64,

    pub double_baking_rewards: i64,
    pub double_baking_lost_deposits: i64,
    pub double_baking_lost_rewards: i64,
    pub double_baking_lost_fees: i64,
    pub double_endorsing_rewards: i64,
    pub double_endorsing_lost_deposits: i64,
    pub double_endorsing_lost_rewards: i64,
    pub double_endorsing_lost_fees: i64,

    pub revelation_rewards: i64,
    pub revelation_lost_rewards: i64,
    pub revelation_lost_fees: i64,

    pub block_deposits: i64,
    pub endorsement_deposits: i64,
    pub future_block_deposits: i64,
    pub future_endorsement_deposits: i64,
}

/// Incrementally maintained columns of a [`BakerCycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    FutureBlocks,
    OwnBlocks,
    ExtraBlocks,
    MissedOwnBlocks,
    MissedExtraBlocks,
    UncoveredOwnBlocks,
    UncoveredExtraBlocks,
    FutureEndorsements,
    Endorsements,
    MissedEndorsements,
    UncoveredEndorsements,
    FutureBlockRewards,
    OwnBlockRewards,
    ExtraBlockRewards,
    MissedOwnBlockRewards,
    MissedExtraBlockRewards,
    UncoveredOwnBlockRewards,
    UncoveredExtraBlockRewards,
    FutureEndorsementRewards,
    EndorsementRewards,
    MissedEndorsementRewards,
    UncoveredEndorsementRewards,
    OwnBlockFees,
    ExtraBlockFees,
    MissedOwnBlockFees,
    MissedExtraBlockFees,
    UncoveredOwnBlockFees,
    UncoveredExtraBlockFees,
    DoubleBakingRewards,
    DoubleBakingLostDeposits,
    DoubleBakingLostRewards,
    DoubleBakingLostFees,
    DoubleEndorsingRewards,
    DoubleEndorsingLostDeposits,
    DoubleEndorsingLostRewards,
    DoubleEndorsingLostFees,
    RevelationRewards,
    RevelationLostRewards,
    RevelationLostFees,
    BlockDeposits,
    EndorsementDeposits,
    FutureBlockDeposits,
    FutureEndorsementDeposits,
}

impl Counter {
    pub fn column(&self) -> &'static str {
        match self {
            Self::FutureBlocks => "future_blocks",
            Self::OwnBlocks => "own_blocks",
            Self::ExtraBlocks => "extra_blocks",
            Self::MissedOwnBlocks => "missed_own_blocks",
            Self::MissedExtraBlocks => "missed_extra_blocks",
            Self::UncoveredOwnBlocks => "uncovered_own_blocks",
            Self::UncoveredExtraBlocks => "uncovered_extra_blocks",
            Self::FutureEndorsements => "future_endorsements",
            Self::Endorsements => "endorsements",
            Self::MissedEndorsements => "missed_endorsements",
            Self::UncoveredEndorsements => "uncovered_endorsements",
            Self::FutureBlockRewards => "future_block_rewards",
            Self::OwnBlockRewards => "own_block_rewards",
            Self::ExtraBlockRewards => "extra_block_rewards",
            Self::MissedOwnBlockRewards => "missed_own_block_rewards",
            Self::MissedExtraBlockRewards => "missed_extra_block_rewards",
            Self::UncoveredOwnBlockRewards => "uncovered_own_block_rewards",
            Self::UncoveredExtraBlockRewards => "uncovered_extra_block_rewards",
            Self::FutureEndorsementRewards => "future_endorsement_rewards",
            Self::EndorsementRewards => "endorsement_rewards",
            Self::MissedEndorsementRewards => "missed_endorsement_rewards",
            Self::UncoveredEndorsementRewards => "uncovered_endorsement_rewards",
            Self::OwnBlockFees => "own_block_fees",
            Self::ExtraBlockFees => "extra_block_fees",
            Self::MissedOwnBlockFees => "missed_own_block_fees",
            Self::MissedExtraBlockFees => "missed_extra_block_fees",
            Self::UncoveredOwnBlockFees => "uncovered_own_block_fees",
            Self::UncoveredExtraBlockFees => "uncovered_extra_block_fees",
            Self::DoubleBakingRewards => "double_baking_rewards",
            Self::DoubleBakingLostDeposits => "double_baking_lost_deposits",
            Self::DoubleBakingLostRewards => "double_baking_lost_rewards",
            Self::DoubleBakingLostFees => "double_baking_lost_fees",
            Self::DoubleEndorsingRewards => "double_endorsing_rewards",
            Self::DoubleEndorsingLostDeposits => "double_endorsing_lost_deposits",
            Self::DoubleEndorsingLostRewards => "double_endorsing_lost_rewards",
            Self::DoubleEndorsingLostFees => "double_endorsing_lost_fees",
            Self::RevelationRewards => "revelation_rewards",
            Self::RevelationLostRewards => "revelation_lost_rewards",
            Self::RevelationLostFees => "revelation_lost_fees",
            Self::BlockDeposits => "block_deposits",
            Self::EndorsementDeposits => "endorsement_deposits",
            Self::FutureBlockDeposits => "future_block_deposits",
            Self::FutureEndorsementDeposits => "future_endorsement_deposits",
        }
    }
}

impl BakerCycle {
    pub fn new(cycle: CycleIndex, baker_id: AccountID) -> Self {
        Self {
            cycle,
            baker_id,
            ..Default::default()
        }
    }

    pub fn get(&self, counter: Counter) -> i64 {
        *self.field(counter)
    }

    pub fn add(&mut self, counter: Counter, amount: i64) {
        *self.field_mut(counter) += amount;
    }

    fn field(&self, counter: Counter) -> &i64 {
        match counter {
            Counter::FutureBlocks => &self.future_blocks,
            Counter::OwnBlocks => &self.own_blocks,
            Counter::ExtraBlocks => &self.extra_blocks,
            Counter::MissedOwnBlocks => &self.missed_own_blocks,
            Counter::MissedExtraBlocks => &self.missed_extra_blocks,
            Counter::UncoveredOwnBlocks => &self.uncovered_own_blocks,
            Counter::UncoveredExtraBlocks => &self.uncovered_extra_blocks,
            Counter::FutureEndorsements => &self.future_endorsements,
            Counter::Endorsements => &self.endorsements,
            Counter::MissedEndorsements => &self.missed_endorsements,
            Counter::UncoveredEndorsements => &self.uncovered_endorsements,
            Counter::FutureBlockRewards => &self.future_block_rewards,
            Counter::OwnBlockRewards => &self.own_block_rewards,
            Counter::ExtraBlockRewards => &self.extra_block_rewards,
            Counter::MissedOwnBlockRewards => &self.missed_own_block_rewards,
            Counter::MissedExtraBlockRewards => &self.missed_extra_block_rewards,
            Counter::UncoveredOwnBlockRewards => &self.uncovered_own_block_rewards,
            Counter::UncoveredExtraBlockRewards => &self.uncovered_extra_block_rewards,
            Counter::FutureEndorsementRewards => &self.future_endorsement_rewards,
            Counter::EndorsementRewards => &self.endorsement_rewards,
            Counter::MissedEndorsementRewards => &self.missed_endorsement_rewards,
            Counter::UncoveredEndorsementRewards => &self.uncovered_endorsement_rewards,
            Counter::OwnBlockFees => &self.own_block_fees,
            Counter::ExtraBlockFees => &self.extra_block_fees,
            Counter::MissedOwnBlockFees => &self.missed_own_block_fees,
            Counter::MissedExtraBlockFees => &self.missed_extra_block_fees,
            Counter::UncoveredOwnBlockFees => &self.uncovered_own_block_fees,
            Counter::UncoveredExtraBlockFees => &self.uncovered_extra_block_fees,
            Counter::DoubleBakingRewards => &self.double_baking_rewards,
            Counter::DoubleBakingLostDeposits => &self.double_baking_lost_deposits,
            Counter::DoubleBakingLostRewards => &self.double_baking_lost_rewards,
            Counter::DoubleBakingLostFees => &self.double_baking_lost_fees,
            Counter::DoubleEndorsingRewards => &self.double_endorsing_rewards,
            Counter::DoubleEndorsingLostDeposits => &self.double_endorsing_lost_deposits,
            Counter::DoubleEndorsingLostRewards => &self.double_endorsing_lost_rewards,
            Counter::DoubleEndorsingLostFees => &self.double_endorsing_lost_fees,
            Counter::RevelationRewards => &self.revelation_rewards,
            Counter::RevelationLostRewards => &self.revelation_lost_rewards,
            Counter::RevelationLostFees => &self.revelation_lost_fees,
            Counter::BlockDeposits => &self.block_deposits,
            Counter::EndorsementDeposits => &self.endorsement_deposits,
            Counter::FutureBlockDeposits => &self.future_block_deposits,
            Counter::FutureEndorsementDeposits => &self.future_endorsement_deposits,
        }
    }

    fn field_mut(&mut self, counter: Counter) -> &mut i64 {
        match counter {
            Counter::FutureBlocks => &mut self.future_blocks,
            Counter::OwnBlocks => &mut self.own_blocks,
            Counter::ExtraBlocks => &mut self.extra_blocks,
            Counter::MissedOwnBlocks => &mut self.missed_own_blocks,
            Counter::MissedExtraBlocks => &mut self.missed_extra_blocks,
            Counter::UncoveredOwnBlocks => &mut self.uncovered_own_blocks,
            Counter::UncoveredExtraBlocks => &mut self.uncovered_extra_blocks,
            Counter::FutureEndorsements => &mut self.future_endorsements,
            Counter::Endorsements => &mut self.endorsements,
            Counter::MissedEndorsements => &mut self.missed_endorsements,
            Counter::UncoveredEndorsements => &mut self.uncovered_endorsements,
            Counter::FutureBlockRewards => &mut self.future_block_rewards,
            Counter::OwnBlockRewards => &mut self.own_block_rewards,
            Counter::ExtraBlockRewards => &mut self.extra_block_rewards,
            Counter::MissedOwnBlockRewards => &mut self.missed_own_block_rewards,
            Counter::MissedExtraBlockRewards => &mut self.missed_extra_block_rewards,
            Counter::UncoveredOwnBlockRewards => &mut self.uncovered_own_block_rewards,
            Counter::UncoveredExtraBlockRewards => &mut self.uncovered_extra_block_rewards,
            Counter::FutureEndorsementRewards => &mut self.future_endorsement_rewards,
            Counter::EndorsementRewards => &mut self.endorsement_rewards,
            Counter::MissedEndorsementRewards => &mut self.missed_endorsement_rewards,
            Counter::UncoveredEndorsementRewards => &mut self.uncovered_endorsement_rewards,
            Counter::OwnBlockFees => &mut self.own_block_fees,
            Counter::ExtraBlockFees => &mut self.extra_block_fees,
            Counter::MissedOwnBlockFees => &mut self.missed_own_block_fees,
            Counter::MissedExtraBlockFees => &mut self.missed_extra_block_fees,
            Counter::UncoveredOwnBlockFees => &mut self.uncovered_own_block_fees,
            Counter::UncoveredExtraBlockFees => &mut self.uncovered_extra_block_fees,
            Counter::DoubleBakingRewards => &mut self.double_baking_rewards,
            Counter::DoubleBakingLostDeposits => &mut self.double_baking_lost_deposits,
            Counter::DoubleBakingLostRewards => &mut self.double_baking_lost_rewards,
            Counter::DoubleBakingLostFees => &mut self.double_baking_lost_fees,
            Counter::DoubleEndorsingRewards => &mut self.double_endorsing_rewards,
            Counter::DoubleEndorsingLostDeposits => &mut self.double_endorsing_lost_deposits,
            Counter::DoubleEndorsingLostRewards => &mut self.double_endorsing_lost_rewards,
            Counter::DoubleEndorsingLostFees => &mut self.double_endorsing_lost_fees,
            Counter::RevelationRewards => &mut self.revelation_rewards,
            Counter::RevelationLostRewards => &mut self.revelation_lost_rewards,
            Counter::RevelationLostFees => &mut self.revelation_lost_fees,
            Counter::BlockDeposits => &mut self.block_deposits,
            Counter::EndorsementDeposits => &mut self.endorsement_deposits,
            Counter::FutureBlockDeposits => &mut self.future_block_deposits,
            Counter::FutureEndorsementDeposits => &mut self.future_endorsement_deposits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn available_balance_excludes_frozen_amounts() {
        let mut a = Account::new(1, "tz1a", 1);
        a.balance = 1000;
        a.frozen_deposits = 300;
        a.frozen_rewards = 20;
        a.frozen_fees = 5;
        assert_eq!(a.available(), 675);
    }

    #[test]
    fn external_delegate_ignores_self_delegation() {
        let mut a = Account::new(4, "tz1a", 1);
        a.delegate_id = Some(4);
        assert_eq!(a.external_delegate(), None);
        a.delegate_id = Some(2);
        assert_eq!(a.external_delegate(), Some(2));
    }

    #[test]
    fn baker_cycle_counters() {
        let mut bc = BakerCycle::new(3, 7);
        bc.add(Counter::FutureBlocks, 4);
        bc.add(Counter::FutureBlocks, -1);
        bc.add(Counter::MissedOwnBlockFees, 250);
        assert_eq!(bc.get(Counter::FutureBlocks), 3);
        assert_eq!(bc.missed_own_block_fees, 250);
        assert_eq!(Counter::MissedOwnBlockFees.column(), "missed_own_block_fees");
    }
}
