use std::collections::HashMap;

use crate::core::entities::BakingRight;
use crate::core::entities::Block;
use crate::core::entities::RightStatus;
use crate::core::node::models::RawBakingRight;
use crate::core::node::models::RawEndorsingRight;
use crate::core::protocol::Protocol;
use crate::core::types::AccountID;
use crate::core::types::Address;
use crate::core::types::CycleIndex;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::error::invariant;
use crate::error::Error;

/// Check the node reported complete rights for a cycle.
pub fn validate(
    protocol: &Protocol,
    cycle: CycleIndex,
    baking: &[RawBakingRight],
    endorsing: &[RawEndorsingRight],
) -> Result<(), Error> {
    let blocks = baking.iter().filter(|r| r.priority == 0).count() as i64;
    if blocks != protocol.blocks_per_cycle() {
        return Err(invariant(format!(
            "cycle {cycle} has {blocks} priority 0 baking rights, expected {}",
            protocol.blocks_per_cycle()
        )));
    }
    let slots: i64 = endorsing.iter().map(|r| r.slot_count() as i64).sum();
    if slots != protocol.endorsements_per_cycle() {
        return Err(invariant(format!(
            "cycle {cycle} has {slots} endorsement slots, expected {}",
            protocol.endorsements_per_cycle()
        )));
    }
    Ok(())
}

/// Future rights of a cycle, ready for insertion.
///
/// Endorsing rights are moved to the level including the endorsements.
/// Rights for levels below `min_level` are dropped.
pub fn future_rights(
    protocol: &Protocol,
    baking: &[RawBakingRight],
    endorsing: &[RawEndorsingRight],
    ids: &HashMap<Address, AccountID>,
    min_level: Level,
) -> Result<Vec<BakingRight>, Error> {
    let id = |address: &Address| {
        ids.get(address)
            .copied()
            .ok_or_else(|| invariant(format!("no account for baker {address}")))
    };
    let mut rights = Vec::with_capacity(baking.len() + endorsing.len());
    for r in baking.iter().filter(|r| r.level >= min_level) {
        rights.push(BakingRight::baking(
            protocol.cycle_of(r.level),
            r.level,
            id(&r.delegate)?,
            r.priority,
        ));
    }
    for r in endorsing.iter().filter(|r| r.level >= min_level) {
        rights.push(BakingRight::endorsing(
            protocol.cycle_of(r.level),
            r.level + 1,
            id(&r.delegate)?,
            r.slot_count(),
        ));
    }
    Ok(rights)
}

/// Rights resolved at a level.
#[derive(Debug, PartialEq)]
pub struct Resolution {
    /// Rights with a new terminal status
    pub updated: Vec<BakingRight>,
    /// Whether some baking rights above the block priority have to be deleted
    pub has_unused: bool,
}

/// Decide the terminal status of all rights at the block's level.
///
/// * `endorsements`: slots included in the block, by endorser
/// * `available`: spendable balance of bakers with rights at this level
/// * `check_endorsers`: whether every endorser must hold a right
pub fn resolve(
    protocol: &Protocol,
    block: &Block,
    rights: &[BakingRight],
    endorsements: &HashMap<AccountID, i32>,
    available: &HashMap<AccountID, Mutez>,
    check_endorsers: bool,
) -> Result<Resolution, Error> {
    let balance = |id: AccountID| available.get(&id).copied().unwrap_or_default();
    let mut updated = vec![];
    let mut has_unused = false;
    let mut realized = false;
    for right in rights {
        if right.status != RightStatus::Future {
            return Err(invariant(format!(
                "right {right:?} at {} already resolved",
                block.level
            )));
        }
        let status = if right.is_baking() {
            let p = right.priority();
            if p > block.priority {
                has_unused = true;
                continue;
            }
            if p == block.priority {
                if right.baker_id != block.baker_id {
                    return Err(invariant(format!(
                        "block {} baked by {} at priority {p}, right belongs to {}",
                        block.level, block.baker_id, right.baker_id
                    )));
                }
                realized = true;
                RightStatus::Realized
            } else if balance(right.baker_id) < protocol.block_deposit {
                RightStatus::Uncovered
            } else {
                RightStatus::Missed
            }
        } else {
            match endorsements.get(&right.baker_id) {
                Some(slots) if *slots == right.slots() => RightStatus::Realized,
                Some(slots) => {
                    return Err(invariant(format!(
                        "baker {} endorsed {slots} slots at {}, right has {}",
                        right.baker_id,
                        block.level,
                        right.slots()
                    )))
                }
                None if balance(right.baker_id) < protocol.endorsement_deposit(right.slots()) => {
                    RightStatus::Uncovered
                }
                None => RightStatus::Missed,
            }
        };
        let mut right = right.clone();
        right.status = status;
        updated.push(right);
    }
    if !realized {
        return Err(invariant(format!(
            "no baking right at {} for priority {}",
            block.level, block.priority
        )));
    }
    if check_endorsers {
        for baker_id in endorsements.keys() {
            if !rights
                .iter()
                .any(|r| r.is_endorsing() && r.baker_id == *baker_id)
            {
                return Err(invariant(format!(
                    "baker {baker_id} endorsed at {} without a right",
                    block.level
                )));
            }
        }
    }
    Ok(Resolution {
        updated,
        has_unused,
    })
}

/// Highest priority among baking rights, if any.
pub fn max_priority(rights: &[BakingRight]) -> Option<i32> {
    rights
        .iter()
        .filter(|r| r.is_baking())
        .map(|r| r.priority())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw_baking(level: Level, delegate: &str, priority: i32) -> RawBakingRight {
        RawBakingRight {
            level,
            delegate: delegate.to_owned(),
            priority,
        }
    }

    fn raw_endorsing(level: Level, delegate: &str, slots: Vec<i32>) -> RawEndorsingRight {
        RawEndorsingRight {
            level,
            delegate: delegate.to_owned(),
            slots,
        }
    }

    /// Complete rights of cycle 1 in the dummy protocol: a bakes, b endorses.
    fn cycle_1() -> (Vec<RawBakingRight>, Vec<RawEndorsingRight>) {
        let baking = (9..=16)
            .flat_map(|l| vec![raw_baking(l, "a", 0), raw_baking(l, "b", 1)])
            .collect();
        let endorsing = (9..=16)
            .flat_map(|l| vec![raw_endorsing(l, "a", vec![0]), raw_endorsing(l, "b", vec![1, 2, 3])])
            .collect();
        (baking, endorsing)
    }

    fn ids() -> HashMap<Address, AccountID> {
        HashMap::from([(String::from("a"), 1), (String::from("b"), 2)])
    }

    fn block(level: Level, priority: i32, baker_id: AccountID) -> Block {
        let mut b = Block::dummy();
        b.level = level;
        b.cycle = 1;
        b.priority = priority;
        b.baker_id = baker_id;
        b
    }

    #[test]
    fn validate_complete_cycle() {
        let p = Protocol::dummy();
        let (baking, endorsing) = cycle_1();
        assert!(validate(&p, 1, &baking, &endorsing).is_ok());
    }

    #[test]
    fn validate_detects_missing_rights() {
        let p = Protocol::dummy();
        let (mut baking, mut endorsing) = cycle_1();
        baking.remove(0);
        assert!(validate(&p, 1, &baking, &endorsing).is_err());
        let (baking, _) = cycle_1();
        endorsing.pop();
        assert!(validate(&p, 1, &baking, &endorsing).is_err());
    }

    #[test]
    fn endorsing_rights_move_to_next_level() {
        let p = Protocol::dummy();
        let (baking, endorsing) = cycle_1();
        let rights = future_rights(&p, &baking, &endorsing, &ids(), 0).unwrap();
        assert_eq!(rights.len(), 32);
        let last = rights
            .iter()
            .filter(|r| r.is_endorsing())
            .max_by_key(|r| r.level)
            .unwrap();
        assert_eq!(last.level, 17);
        assert_eq!(last.cycle, 1);
        assert!(rights.iter().all(|r| r.status == RightStatus::Future));
    }

    #[test]
    fn rights_below_min_level_are_dropped() {
        let p = Protocol::dummy();
        let (baking, endorsing) = cycle_1();
        let rights = future_rights(&p, &baking, &endorsing, &ids(), 12).unwrap();
        assert_eq!(rights.iter().filter(|r| r.is_baking()).count(), 10);
        assert!(rights.iter().all(|r| r.level >= 12));
    }

    #[test]
    fn unknown_baker_is_fatal() {
        let p = Protocol::dummy();
        let baking = vec![raw_baking(9, "c", 0)];
        assert!(future_rights(&p, &baking, &[], &ids(), 0).is_err());
    }

    #[test]
    fn resolve_realized_missed_and_uncovered() {
        let p = Protocol::dummy();
        let rights = vec![
            BakingRight::baking(1, 10, 1, 0),
            BakingRight::baking(1, 10, 2, 1),
            BakingRight::baking(1, 10, 3, 2),
            BakingRight::baking(1, 10, 1, 3),
            BakingRight::endorsing(1, 10, 1, 1),
            BakingRight::endorsing(1, 10, 2, 3),
        ];
        let endorsements = HashMap::from([(2, 3)]);
        // Baker 1 can't cover a block deposit
        let available = HashMap::from([(1, 100_000_000), (2, 10_000_000_000), (3, 10_000_000_000)]);
        let res = resolve(&p, &block(10, 2, 3), &rights, &endorsements, &available, true).unwrap();
        let statuses: Vec<RightStatus> = res.updated.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                RightStatus::Uncovered,
                RightStatus::Missed,
                RightStatus::Realized,
                RightStatus::Missed,
                RightStatus::Realized,
            ]
        );
        assert!(res.has_unused);
    }

    #[test]
    fn resolve_requires_block_baker_right() {
        let p = Protocol::dummy();
        let rights = vec![BakingRight::baking(1, 10, 1, 0)];
        let available = HashMap::new();
        let endorsements = HashMap::new();
        assert!(resolve(&p, &block(10, 0, 2), &rights, &endorsements, &available, true).is_err());
        assert!(resolve(&p, &block(10, 1, 1), &rights, &endorsements, &available, true).is_err());
    }

    #[test]
    fn resolve_rejects_unexpected_endorsers() {
        let p = Protocol::dummy();
        let rights = vec![BakingRight::baking(1, 10, 1, 0)];
        let endorsements = HashMap::from([(5, 1)]);
        let available = HashMap::new();
        assert!(resolve(&p, &block(10, 0, 1), &rights, &endorsements, &available, true).is_err());
        assert!(resolve(&p, &block(10, 0, 1), &rights, &endorsements, &available, false).is_ok());
    }

    #[test]
    fn resolve_rejects_slot_mismatch() {
        let p = Protocol::dummy();
        let rights = vec![
            BakingRight::baking(1, 10, 1, 0),
            BakingRight::endorsing(1, 10, 2, 3),
        ];
        let endorsements = HashMap::from([(2, 2)]);
        let available = HashMap::new();
        assert!(resolve(&p, &block(10, 0, 1), &rights, &endorsements, &available, true).is_err());
    }

    #[test]
    fn max_priority_ignores_endorsing_rights() {
        let rights = vec![
            BakingRight::baking(1, 10, 1, 0),
            BakingRight::baking(1, 10, 2, 2),
            BakingRight::endorsing(1, 10, 2, 30),
        ];
        assert_eq!(max_priority(&rights), Some(2));
        assert_eq!(max_priority(&[]), None);
    }
}
