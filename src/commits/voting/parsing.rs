use super::types::PeriodKind;
use super::types::PeriodStatus;
use super::types::Proposal;
use super::types::ProposalStatus;
use super::types::VotingPeriod;
use crate::constants::EMA_CARRY_WEIGHT;
use crate::constants::EMA_PARTICIPATION_WEIGHT;
use crate::constants::RATE_BASE;
use crate::core::entities::Account;
use crate::core::protocol::Protocol;
use crate::core::types::AccountID;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::PeriodIndex;

/// Final status of a period, given the proposals of its epoch.
pub fn evaluate(period: &VotingPeriod, proposals: &[Proposal]) -> PeriodStatus {
    match period.kind {
        PeriodKind::Proposal => {
            let top = match proposals.iter().map(|p| p.voting_power).max() {
                Some(top) => top,
                None => return PeriodStatus::NoProposals,
            };
            if top * RATE_BASE < period.total_voting_power * period.upvotes_quorum as i64 {
                PeriodStatus::NoQuorum
            } else if proposals.iter().filter(|p| p.voting_power == top).count() > 1 {
                PeriodStatus::NoSingleWinner
            } else {
                PeriodStatus::Success
            }
        }
        PeriodKind::Exploration | PeriodKind::Promotion => {
            let quorum = period.ballots_quorum.unwrap_or_default() as i64;
            let supermajority = period.supermajority.unwrap_or_default() as i64;
            let yay = period.yay_voting_power;
            let nay = period.nay_voting_power;
            if period.ballots_voting_power() * RATE_BASE < period.total_voting_power * quorum {
                PeriodStatus::NoQuorum
            } else if yay * RATE_BASE < (yay + nay) * supermajority {
                PeriodStatus::NoSupermajority
            } else {
                PeriodStatus::Success
            }
        }
        PeriodKind::Testing => PeriodStatus::Success,
    }
}

/// Status of the epoch's active proposal once a period of `kind` ends with
/// `status`, `None` if it stays active.
pub fn proposal_outcome(kind: PeriodKind, status: PeriodStatus) -> Option<ProposalStatus> {
    match (kind, status) {
        (PeriodKind::Proposal | PeriodKind::Exploration, PeriodStatus::Success) => None,
        (PeriodKind::Testing, _) => None,
        (PeriodKind::Promotion, PeriodStatus::Success) => Some(ProposalStatus::Accepted),
        (PeriodKind::Exploration | PeriodKind::Promotion, PeriodStatus::NoSupermajority) => {
            Some(ProposalStatus::Rejected)
        }
        _ => Some(ProposalStatus::Skipped),
    }
}

/// Kind of the period following one of `kind` ending with `status`.
pub fn next_kind(kind: PeriodKind, status: PeriodStatus) -> PeriodKind {
    match (kind, status) {
        (PeriodKind::Proposal, PeriodStatus::Success) => PeriodKind::Exploration,
        (PeriodKind::Exploration, PeriodStatus::Success) => PeriodKind::Testing,
        (PeriodKind::Testing, _) => PeriodKind::Promotion,
        _ => PeriodKind::Proposal,
    }
}

/// Participation rate of a ballot period.
pub fn participation(period: &VotingPeriod) -> i32 {
    match period.total_voting_power {
        0 => 0,
        total => (period.ballots_voting_power() * RATE_BASE / total) as i32,
    }
}

/// Participation EMA carried over from the previous ballot period.
pub fn next_ema(prev: &VotingPeriod, protocol: &Protocol) -> i32 {
    let ema = prev
        .participation_ema
        .unwrap_or(protocol.initial_participation_ema) as i64;
    ((ema * EMA_CARRY_WEIGHT + participation(prev) as i64 * EMA_PARTICIPATION_WEIGHT) / RATE_BASE)
        as i32
}

pub fn ballots_quorum(protocol: &Protocol, ema: i32) -> i32 {
    let min = protocol.ballot_quorum_min as i64;
    let max = protocol.ballot_quorum_max as i64;
    (min + ema as i64 * (max - min) / RATE_BASE) as i32
}

/// Proposal with most voting power, with its upvotes.
pub fn top(proposals: &[Proposal]) -> (i32, Mutez) {
    proposals
        .iter()
        .max_by_key(|p| p.voting_power)
        .map_or((0, 0), |p| (p.upvotes, p.voting_power))
}

/// Bakers listed for voting, with their voting power.
pub fn listings(protocol: &Protocol, bakers: &[Account]) -> Vec<(AccountID, Mutez)> {
    let minimal_stake = protocol.minimal_stake();
    bakers
        .iter()
        .filter(|b| b.is_active_baker() && b.staking_balance >= minimal_stake)
        .map(|b| (b.id, b.staking_balance))
        .collect()
}

/// A new active period.
///
/// * `ema`: participation EMA for ballot periods
pub fn new_period(
    protocol: &Protocol,
    index: PeriodIndex,
    epoch: i32,
    kind: PeriodKind,
    first_level: Level,
    snapshot: &[(AccountID, Mutez)],
    ema: Option<i32>,
) -> VotingPeriod {
    let ballots = kind.has_ballots();
    VotingPeriod {
        index,
        epoch,
        kind,
        status: PeriodStatus::Active,
        first_level,
        last_level: first_level + protocol.blocks_per_voting_period - 1,
        total_bakers: snapshot.len() as i32,
        total_voting_power: snapshot.iter().map(|(_, vp)| vp).sum(),
        upvotes_quorum: protocol.proposal_quorum,
        proposals_count: 0,
        top_upvotes: 0,
        top_voting_power: 0,
        participation_ema: ema.filter(|_| ballots),
        ballots_quorum: ema.filter(|_| ballots).map(|e| ballots_quorum(protocol, e)),
        supermajority: Some(protocol.supermajority).filter(|_| ballots),
        yay_ballots: 0,
        yay_voting_power: 0,
        nay_ballots: 0,
        nay_voting_power: 0,
        pass_ballots: 0,
        pass_voting_power: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vote;
    use pretty_assertions::assert_eq;

    fn period(kind: PeriodKind) -> VotingPeriod {
        let p = Protocol::dummy();
        let snapshot = vec![(1, 6_000), (2, 3_000), (3, 1_000)];
        new_period(&p, 4, 1, kind, 65, &snapshot, Some(8000))
    }

    fn proposal(id: i32, voting_power: Mutez) -> Proposal {
        Proposal {
            id,
            hash: format!("P{id}"),
            epoch: 1,
            first_level: 66,
            first_period: 4,
            last_period: 4,
            initiator_id: 1,
            upvotes: 1,
            voting_power,
            status: ProposalStatus::Active,
            status_level: None,
        }
    }

    #[test]
    fn new_ballot_period() {
        let vp = period(PeriodKind::Exploration);
        assert_eq!(vp.total_bakers, 3);
        assert_eq!(vp.total_voting_power, 10_000);
        assert_eq!(vp.last_level, 80);
        // 2000 + 8000 * 5000 / 10000
        assert_eq!(vp.ballots_quorum, Some(6000));
        assert_eq!(vp.supermajority, Some(8000));

        let vp = period(PeriodKind::Testing);
        assert_eq!(vp.ballots_quorum, None);
        assert_eq!(vp.participation_ema, None);
    }

    #[test]
    fn proposal_period_outcomes() {
        let vp = period(PeriodKind::Proposal);
        assert_eq!(evaluate(&vp, &[]), PeriodStatus::NoProposals);
        // Quorum is 5% of 10_000
        assert_eq!(evaluate(&vp, &[proposal(1, 400)]), PeriodStatus::NoQuorum);
        assert_eq!(
            evaluate(&vp, &[proposal(1, 3_000), proposal(2, 3_000)]),
            PeriodStatus::NoSingleWinner
        );
        assert_eq!(
            evaluate(&vp, &[proposal(1, 3_000), proposal(2, 1_000)]),
            PeriodStatus::Success
        );
    }

    #[test]
    fn exploration_below_quorum() {
        let mut vp = period(PeriodKind::Exploration);
        vp.count_ballot(Vote::Yay, 3_000, 1);
        vp.count_ballot(Vote::Pass, 1_000, 1);
        // 4000 < 10000 * 6000 / 10000
        let status = evaluate(&vp, &[]);
        assert_eq!(status, PeriodStatus::NoQuorum);
        assert_eq!(
            proposal_outcome(PeriodKind::Exploration, status),
            Some(ProposalStatus::Skipped)
        );
        assert_eq!(next_kind(PeriodKind::Exploration, status), PeriodKind::Proposal);
    }

    #[test]
    fn exploration_without_supermajority() {
        let mut vp = period(PeriodKind::Exploration);
        vp.count_ballot(Vote::Yay, 6_000, 1);
        vp.count_ballot(Vote::Nay, 3_000, 1);
        let status = evaluate(&vp, &[]);
        assert_eq!(status, PeriodStatus::NoSupermajority);
        assert_eq!(
            proposal_outcome(PeriodKind::Exploration, status),
            Some(ProposalStatus::Rejected)
        );
    }

    #[test]
    fn successful_exploration_and_promotion() {
        let mut vp = period(PeriodKind::Exploration);
        vp.count_ballot(Vote::Yay, 9_000, 1);
        vp.count_ballot(Vote::Nay, 1_000, 1);
        let status = evaluate(&vp, &[]);
        assert_eq!(status, PeriodStatus::Success);
        assert_eq!(proposal_outcome(PeriodKind::Exploration, status), None);
        assert_eq!(next_kind(PeriodKind::Exploration, status), PeriodKind::Testing);
        assert_eq!(
            next_kind(PeriodKind::Testing, PeriodStatus::Success),
            PeriodKind::Promotion
        );
        assert_eq!(
            proposal_outcome(PeriodKind::Promotion, PeriodStatus::Success),
            Some(ProposalStatus::Accepted)
        );
        assert_eq!(
            next_kind(PeriodKind::Promotion, PeriodStatus::Success),
            PeriodKind::Proposal
        );
    }

    #[test]
    fn ballots_can_be_uncounted() {
        let mut vp = period(PeriodKind::Promotion);
        let blank = vp.clone();
        vp.count_ballot(Vote::Nay, 1_234, 1);
        vp.count_ballot(Vote::Nay, 1_234, -1);
        assert_eq!(vp, blank);
    }

    #[test]
    fn participation_ema() {
        let p = Protocol::dummy();
        let mut vp = period(PeriodKind::Exploration);
        vp.count_ballot(Vote::Yay, 5_000, 1);
        assert_eq!(participation(&vp), 5_000);
        // (8000 * 8000 + 5000 * 2000) / 10000
        assert_eq!(next_ema(&vp, &p), 7_400);
    }

    #[test]
    fn only_active_bakers_with_minimal_stake_are_listed() {
        let p = Protocol::dummy();
        let baker = |id: AccountID, staking: Mutez| {
            let mut a = Account::new(id, &format!("tz1{id}"), 1);
            a.is_baker = true;
            a.delegate_id = Some(id);
            a.staking_balance = staking;
            a
        };
        let mut inactive = baker(3, 9_000_000_000);
        inactive.deactivation_level = Some(10);
        let bakers = vec![
            baker(1, 8_000_000_000),
            baker(2, 7_999_999_999),
            inactive,
        ];
        assert_eq!(listings(&p, &bakers), vec![(1, 8_000_000_000)]);
    }

    #[test]
    fn top_proposal() {
        let mut a = proposal(1, 100);
        a.upvotes = 3;
        let b = proposal(2, 200);
        assert_eq!(top(&[a, b]), (1, 200));
        assert_eq!(top(&[]), (0, 0));
    }
}
