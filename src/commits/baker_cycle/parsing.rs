use std::collections::HashMap;

use crate::commits::cycle::is_selected;
use crate::commits::snapshot_balance::BakerSnapshot;
use crate::core::entities::BakerCycle;
use crate::core::entities::BakingRight;
use crate::core::entities::Block;
use crate::core::entities::Counter;
use crate::core::entities::RightStatus;
use crate::core::protocol::Protocol;
use crate::core::store::rights::RightsSummary;
use crate::core::types::AccountID;
use crate::core::types::Address;
use crate::core::types::CycleIndex;
use crate::core::types::Mutez;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;

/// Counter changes of a single baker cycle row.
#[derive(Debug, Clone, PartialEq)]
pub struct BakerCycleDelta {
    pub cycle: CycleIndex,
    pub baker_id: AccountID,
    pub changes: Vec<(Counter, i64)>,
    /// Whether the delta stems from a realized right, in which case the row
    /// must exist.
    pub realized: bool,
}

impl BakerCycleDelta {
    pub fn new(cycle: CycleIndex, baker_id: AccountID) -> Self {
        Self {
            cycle,
            baker_id,
            changes: vec![],
            realized: false,
        }
    }

    /// Add `amount` to `counter`, merging with any earlier change of it.
    pub fn add(&mut self, counter: Counter, amount: i64) {
        if amount == 0 {
            return;
        }
        match self.changes.iter_mut().find(|(c, _)| *c == counter) {
            Some((_, total)) => *total += amount,
            None => self.changes.push((counter, amount)),
        }
    }

    pub fn get(&self, counter: Counter) -> i64 {
        self.changes
            .iter()
            .filter(|(c, _)| *c == counter)
            .map(|(_, a)| a)
            .sum()
    }

    pub fn negated(&self) -> Self {
        Self {
            changes: self.changes.iter().map(|(c, a)| (*c, -a)).collect(),
            ..self.clone()
        }
    }
}

/// Deltas of the rights resolved at the block's level.
///
/// * `endorsed_priority`: priority of the endorsed block, i.e. the previous one
pub fn right_deltas(
    protocol: &Protocol,
    block: &Block,
    endorsed_priority: i32,
    rights: &[BakingRight],
) -> Result<Vec<BakerCycleDelta>, Error> {
    let mut deltas = vec![];
    for right in rights {
        let mut d = BakerCycleDelta::new(right.cycle, right.baker_id);
        if right.is_baking() {
            let p = right.priority();
            let own = p == 0;
            let pick = |own_counter: Counter, extra_counter: Counter| {
                if own {
                    own_counter
                } else {
                    extra_counter
                }
            };
            match right.status {
                RightStatus::Realized => {
                    d.realized = true;
                    d.add(pick(Counter::OwnBlocks, Counter::ExtraBlocks), 1);
                    d.add(
                        pick(Counter::OwnBlockRewards, Counter::ExtraBlockRewards),
                        block.reward,
                    );
                    d.add(pick(Counter::OwnBlockFees, Counter::ExtraBlockFees), block.fees);
                    d.add(Counter::BlockDeposits, block.deposit);
                }
                RightStatus::Missed => {
                    d.add(pick(Counter::MissedOwnBlocks, Counter::MissedExtraBlocks), 1);
                    d.add(
                        pick(Counter::MissedOwnBlockRewards, Counter::MissedExtraBlockRewards),
                        protocol.block_reward(p, block.validations),
                    );
                    d.add(
                        pick(Counter::MissedOwnBlockFees, Counter::MissedExtraBlockFees),
                        block.fees,
                    );
                }
                RightStatus::Uncovered => {
                    d.add(
                        pick(Counter::UncoveredOwnBlocks, Counter::UncoveredExtraBlocks),
                        1,
                    );
                    d.add(
                        pick(
                            Counter::UncoveredOwnBlockRewards,
                            Counter::UncoveredExtraBlockRewards,
                        ),
                        protocol.block_reward(p, block.validations),
                    );
                    d.add(
                        pick(Counter::UncoveredOwnBlockFees, Counter::UncoveredExtraBlockFees),
                        block.fees,
                    );
                }
                RightStatus::Future => return Err(unresolved(right)),
            }
            if own {
                d.add(Counter::FutureBlocks, -1);
                d.add(Counter::FutureBlockRewards, -protocol.max_block_reward());
                d.add(Counter::FutureBlockDeposits, -protocol.block_deposit);
            }
        } else {
            let slots = right.slots();
            let reward = protocol.endorsement_reward(slots, endorsed_priority);
            match right.status {
                RightStatus::Realized => {
                    d.realized = true;
                    d.add(Counter::Endorsements, slots as i64);
                    d.add(Counter::EndorsementRewards, reward);
                    d.add(Counter::EndorsementDeposits, protocol.endorsement_deposit(slots));
                }
                RightStatus::Missed => {
                    d.add(Counter::MissedEndorsements, slots as i64);
                    d.add(Counter::MissedEndorsementRewards, reward);
                }
                RightStatus::Uncovered => {
                    d.add(Counter::UncoveredEndorsements, slots as i64);
                    d.add(Counter::UncoveredEndorsementRewards, reward);
                }
                RightStatus::Future => return Err(unresolved(right)),
            }
            d.add(Counter::FutureEndorsements, -(slots as i64));
            d.add(
                Counter::FutureEndorsementRewards,
                -protocol.max_endorsement_reward(slots),
            );
            d.add(
                Counter::FutureEndorsementDeposits,
                -protocol.endorsement_deposit(slots),
            );
        }
        deltas.push(d);
    }
    Ok(deltas)
}

fn unresolved(right: &BakingRight) -> Error {
    invariant(format!(
        "right of baker {} at {} is still future",
        right.baker_id, right.level
    ))
}

/// Deltas of accusations, nonce revelations and revelation penalties.
pub fn operation_deltas(
    protocol: &Protocol,
    block: &Block,
    raw: &RawBlock,
    ids: &HashMap<Address, AccountID>,
) -> Result<Vec<BakerCycleDelta>, Error> {
    let id = |address: &Address| {
        ids.get(address)
            .copied()
            .ok_or_else(|| invariant(format!("unknown baker {address}")))
    };
    let mut deltas = vec![];
    let accusations = [
        (
            &raw.operations.double_bakings,
            [
                Counter::DoubleBakingRewards,
                Counter::DoubleBakingLostDeposits,
                Counter::DoubleBakingLostRewards,
                Counter::DoubleBakingLostFees,
            ],
        ),
        (
            &raw.operations.double_endorsings,
            [
                Counter::DoubleEndorsingRewards,
                Counter::DoubleEndorsingLostDeposits,
                Counter::DoubleEndorsingLostRewards,
                Counter::DoubleEndorsingLostFees,
            ],
        ),
    ];
    for (ops, [reward, lost_deposits, lost_rewards, lost_fees]) in accusations {
        for op in ops {
            let mut accuser = BakerCycleDelta::new(block.cycle, id(&op.accuser)?);
            accuser.add(reward, op.reward);
            deltas.push(accuser);

            let mut offender =
                BakerCycleDelta::new(protocol.cycle_of(op.accused_level), id(&op.offender)?);
            offender.add(lost_deposits, op.lost_deposits);
            offender.add(lost_rewards, op.lost_rewards);
            offender.add(lost_fees, op.lost_fees);
            deltas.push(offender);
        }
    }
    if !raw.operations.nonce_revelations.is_empty() {
        let mut d = BakerCycleDelta::new(block.cycle, block.baker_id);
        let n = raw.operations.nonce_revelations.len() as i64;
        d.add(Counter::RevelationRewards, n * protocol.revelation_reward);
        deltas.push(d);
    }
    for penalty in &raw.revelation_penalties {
        let mut d = BakerCycleDelta::new(protocol.cycle_of(penalty.missed_level), id(&penalty.baker)?);
        d.add(Counter::RevelationLostRewards, penalty.lost_reward);
        d.add(Counter::RevelationLostFees, penalty.lost_fees);
        deltas.push(d);
    }
    Ok(deltas)
}

/// Merge deltas of the same row, keeping first seen order.
pub fn merge(deltas: Vec<BakerCycleDelta>) -> Vec<BakerCycleDelta> {
    let mut merged: Vec<BakerCycleDelta> = vec![];
    for d in deltas {
        match merged
            .iter_mut()
            .find(|m| m.cycle == d.cycle && m.baker_id == d.baker_id)
        {
            Some(m) => {
                m.realized |= d.realized;
                for (counter, amount) in d.changes {
                    m.add(counter, amount);
                }
            }
            None => merged.push(d),
        }
    }
    merged
}

/// Split deltas into those of the current cycle and the cross-cycle
/// corrections addressed to earlier cycles.
pub fn split_phases(
    deltas: Vec<BakerCycleDelta>,
    cycle: CycleIndex,
) -> (Vec<BakerCycleDelta>, Vec<BakerCycleDelta>) {
    deltas.into_iter().partition(|d| d.cycle >= cycle)
}

/// A new row, with expectations and projections of future rights.
pub fn baker_cycle(
    protocol: &Protocol,
    cycle: CycleIndex,
    baker: &BakerSnapshot,
    rights: Option<&RightsSummary>,
    selected_stake: Mutez,
) -> BakerCycle {
    let share = match selected_stake {
        0 => 0.0,
        _ => baker.staking_balance as f64 / selected_stake as f64,
    };
    let blocks = rights.map_or(0, |r| r.blocks);
    let slots = rights.map_or(0, |r| r.slots);
    let mut bc = BakerCycle::new(cycle, baker.baker_id);
    bc.staking_balance = baker.staking_balance;
    bc.delegated_balance = baker.delegated_balance;
    bc.delegators_count = baker.delegators_count;
    bc.expected_blocks = protocol.blocks_per_cycle() as f64 * share;
    bc.expected_endorsements = protocol.endorsements_per_cycle() as f64 * share;
    bc.future_blocks = blocks;
    bc.future_block_rewards = blocks * protocol.max_block_reward();
    bc.future_block_deposits = blocks * protocol.block_deposit;
    bc.future_endorsements = slots;
    bc.future_endorsement_rewards = slots * protocol.endorsement_reward0;
    bc.future_endorsement_deposits = slots * protocol.endorsement_deposit;
    bc
}

/// Rows of a new cycle for all selected bakers, and the bakers holding rights
/// without being part of the snapshot.
pub fn new_baker_cycles(
    protocol: &Protocol,
    cycle: CycleIndex,
    bakers: &[BakerSnapshot],
    rights: &[RightsSummary],
    selected_stake: Mutez,
) -> (Vec<BakerCycle>, Vec<AccountID>) {
    let by_baker: HashMap<AccountID, &RightsSummary> =
        rights.iter().map(|r| (r.baker_id, r)).collect();
    let rows: Vec<BakerCycle> = bakers
        .iter()
        .filter(|b| is_selected(protocol, b))
        .map(|b| {
            baker_cycle(
                protocol,
                cycle,
                b,
                by_baker.get(&b.baker_id).copied(),
                selected_stake,
            )
        })
        .collect();
    let shifted = rights
        .iter()
        .map(|r| r.baker_id)
        .filter(|id| !rows.iter().any(|bc| bc.baker_id == *id))
        .collect();
    (rows, shifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::RightKind;
    use crate::core::types::Accusation;
    use crate::core::types::NonceRevelation;
    use crate::core::types::RevelationPenalty;
    use pretty_assertions::assert_eq;

    fn block(level: i32, priority: i32, baker_id: AccountID) -> Block {
        let mut b = Block::dummy();
        b.level = level;
        b.cycle = 1;
        b.priority = priority;
        b.baker_id = baker_id;
        b.validations = 4;
        b.reward = 5_000_000;
        b.deposit = 512_000_000;
        b.fees = 3_000;
        b
    }

    fn with_status(mut right: BakingRight, status: RightStatus) -> BakingRight {
        right.status = status;
        right
    }

    #[test]
    fn realized_own_block() {
        let p = Protocol::dummy();
        let rights = vec![with_status(BakingRight::baking(1, 10, 7, 0), RightStatus::Realized)];
        let deltas = right_deltas(&p, &block(10, 0, 7), 0, &rights).unwrap();
        assert_eq!(deltas.len(), 1);
        let d = &deltas[0];
        assert!(d.realized);
        assert_eq!(d.get(Counter::OwnBlocks), 1);
        assert_eq!(d.get(Counter::OwnBlockRewards), 5_000_000);
        assert_eq!(d.get(Counter::OwnBlockFees), 3_000);
        assert_eq!(d.get(Counter::BlockDeposits), 512_000_000);
        assert_eq!(d.get(Counter::FutureBlocks), -1);
        assert_eq!(d.get(Counter::FutureBlockRewards), -5_000_000);
        assert_eq!(d.get(Counter::FutureBlockDeposits), -512_000_000);
    }

    #[test]
    fn missed_and_uncovered_blocks() {
        let p = Protocol::dummy();
        let rights = vec![
            with_status(BakingRight::baking(1, 10, 1, 0), RightStatus::Uncovered),
            with_status(BakingRight::baking(1, 10, 2, 1), RightStatus::Missed),
            with_status(BakingRight::baking(1, 10, 3, 2), RightStatus::Realized),
        ];
        let deltas = right_deltas(&p, &block(10, 2, 3), 0, &rights).unwrap();
        assert_eq!(deltas[0].get(Counter::UncoveredOwnBlocks), 1);
        assert_eq!(deltas[0].get(Counter::UncoveredOwnBlockRewards), 5_000_000);
        assert_eq!(deltas[0].get(Counter::FutureBlocks), -1);
        assert!(!deltas[0].realized);
        assert_eq!(deltas[1].get(Counter::MissedExtraBlocks), 1);
        assert_eq!(deltas[1].get(Counter::MissedExtraBlockRewards), 750_000);
        assert_eq!(deltas[1].get(Counter::MissedExtraBlockFees), 3_000);
        assert_eq!(deltas[1].get(Counter::FutureBlocks), 0);
        assert_eq!(deltas[2].get(Counter::ExtraBlocks), 1);
        assert_eq!(deltas[2].get(Counter::ExtraBlockRewards), 5_000_000);
    }

    #[test]
    fn endorsement_rewards_use_endorsed_priority() {
        let p = Protocol::dummy();
        let rights = vec![
            with_status(BakingRight::endorsing(1, 10, 4, 2), RightStatus::Realized),
            with_status(BakingRight::endorsing(1, 10, 5, 1), RightStatus::Missed),
        ];
        let deltas = right_deltas(&p, &block(10, 0, 4), 1, &rights).unwrap();
        assert_eq!(deltas[0].get(Counter::Endorsements), 2);
        assert_eq!(deltas[0].get(Counter::EndorsementRewards), 1_666_666);
        assert_eq!(deltas[0].get(Counter::EndorsementDeposits), 128_000_000);
        assert_eq!(deltas[0].get(Counter::FutureEndorsements), -2);
        assert_eq!(deltas[0].get(Counter::FutureEndorsementRewards), -2_500_000);
        assert_eq!(deltas[1].get(Counter::MissedEndorsements), 1);
        assert_eq!(deltas[1].get(Counter::MissedEndorsementRewards), 833_333);
        assert_eq!(deltas[1].get(Counter::FutureEndorsementDeposits), -64_000_000);
    }

    #[test]
    fn future_right_is_fatal() {
        let p = Protocol::dummy();
        let rights = vec![BakingRight::baking(1, 10, 7, 0)];
        assert!(right_deltas(&p, &block(10, 0, 7), 0, &rights).is_err());
    }

    #[test]
    fn future_decrements_match_resolved_rights() {
        let p = Protocol::dummy();
        let statuses = [RightStatus::Realized, RightStatus::Missed, RightStatus::Uncovered];
        let mut rights = vec![];
        for (i, status) in statuses.iter().enumerate() {
            let baker = i as i32 + 1;
            rights.push(with_status(BakingRight::baking(1, 10, baker, i as i32), *status));
            rights.push(with_status(BakingRight::endorsing(1, 10, baker, baker), *status));
        }
        let deltas = right_deltas(&p, &block(10, 0, 1), 0, &rights).unwrap();

        let decremented_blocks: i64 = deltas.iter().map(|d| -d.get(Counter::FutureBlocks)).sum();
        let resolved_own = rights
            .iter()
            .filter(|r| r.kind == RightKind::Baking && r.priority() == 0)
            .count() as i64;
        assert_eq!(decremented_blocks, resolved_own);

        let decremented_slots: i64 = deltas
            .iter()
            .map(|d| -d.get(Counter::FutureEndorsements))
            .sum();
        let resolved_slots: i64 = rights
            .iter()
            .filter(|r| r.is_endorsing())
            .map(|r| r.slots() as i64)
            .sum();
        assert_eq!(decremented_slots, resolved_slots);
    }

    #[test]
    fn accusations_target_accused_cycle() {
        let p = Protocol::dummy();
        let mut raw = RawBlock::dummy().level(18).cycle(2, 1);
        raw.operations.double_bakings.push(Accusation {
            accuser: String::from("tz1accuser"),
            offender: String::from("tz1offender"),
            accused_level: 15,
            reward: 100,
            lost_deposits: 1000,
            lost_rewards: 200,
            lost_fees: 10,
        });
        raw.operations.nonce_revelations.push(NonceRevelation {
            revealed_level: 3,
            nonce: String::from("00"),
        });
        raw.revelation_penalties.push(RevelationPenalty {
            baker: String::from("tz1offender"),
            missed_level: 2,
            lost_reward: 30,
            lost_fees: 4,
        });
        let ids = HashMap::from([
            (String::from("tz1accuser"), 1),
            (String::from("tz1offender"), 2),
        ]);
        let mut b = block(18, 0, 3);
        b.cycle = 2;
        let deltas = operation_deltas(&p, &b, &raw, &ids).unwrap();
        assert_eq!(deltas.len(), 4);
        assert_eq!((deltas[0].cycle, deltas[0].baker_id), (2, 1));
        assert_eq!(deltas[0].get(Counter::DoubleBakingRewards), 100);
        assert_eq!((deltas[1].cycle, deltas[1].baker_id), (1, 2));
        assert_eq!(deltas[1].get(Counter::DoubleBakingLostDeposits), 1000);
        assert_eq!((deltas[2].cycle, deltas[2].baker_id), (2, 3));
        assert_eq!(deltas[2].get(Counter::RevelationRewards), 125_000);
        assert_eq!((deltas[3].cycle, deltas[3].baker_id), (0, 2));
        assert_eq!(deltas[3].get(Counter::RevelationLostFees), 4);

        let (current, previous) = split_phases(deltas, 2);
        assert_eq!(current.len(), 2);
        assert_eq!(previous.len(), 2);
    }

    #[test]
    fn merge_sums_same_row() {
        let mut a = BakerCycleDelta::new(1, 1);
        a.add(Counter::FutureBlocks, -1);
        let mut b = BakerCycleDelta::new(1, 2);
        b.add(Counter::Endorsements, 2);
        let mut c = BakerCycleDelta::new(1, 1);
        c.add(Counter::FutureBlocks, -1);
        c.add(Counter::OwnBlocks, 1);
        c.realized = true;
        let merged = merge(vec![a, b, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].baker_id, 1);
        assert_eq!(
            merged[0].changes,
            vec![(Counter::FutureBlocks, -2), (Counter::OwnBlocks, 1)]
        );
        assert!(merged[0].realized);
    }

    #[test]
    fn negated_delta_cancels_out() {
        let mut d = BakerCycleDelta::new(1, 1);
        d.add(Counter::OwnBlocks, 1);
        d.add(Counter::FutureBlockRewards, -5);
        let mut bc = BakerCycle::new(1, 1);
        for (c, a) in d.changes.iter().chain(d.negated().changes.iter()) {
            bc.add(*c, *a);
        }
        assert_eq!(bc, BakerCycle::new(1, 1));
    }

    #[test]
    fn new_rows_with_projections() {
        let p = Protocol::dummy();
        let bakers = vec![
            BakerSnapshot {
                baker_id: 1,
                own_balance: 8_000_000_000,
                staking_balance: 12_000_000_000,
                delegated_balance: 4_000_000_000,
                delegators_count: 1,
            },
            BakerSnapshot {
                baker_id: 2,
                own_balance: 100,
                staking_balance: 100,
                delegated_balance: 0,
                delegators_count: 0,
            },
        ];
        let rights = vec![
            RightsSummary {
                baker_id: 1,
                blocks: 6,
                slots: 20,
            },
            RightsSummary {
                baker_id: 9,
                blocks: 2,
                slots: 12,
            },
        ];
        let (rows, shifted) = new_baker_cycles(&p, 4, &bakers, &rights, 16_000_000_000);
        assert_eq!(rows.len(), 1);
        assert_eq!(shifted, vec![9]);
        let bc = &rows[0];
        assert_eq!(bc.expected_blocks, 6.0);
        assert_eq!(bc.expected_endorsements, 24.0);
        assert_eq!(bc.future_blocks, 6);
        assert_eq!(bc.future_block_rewards, 30_000_000);
        assert_eq!(bc.future_block_deposits, 3_072_000_000);
        assert_eq!(bc.future_endorsements, 20);
        assert_eq!(bc.future_endorsement_rewards, 25_000_000);
        assert_eq!(bc.future_endorsement_deposits, 1_280_000_000);
    }
}
