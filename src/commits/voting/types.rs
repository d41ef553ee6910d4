use postgres_from_row::FromRow;
use postgres_types::FromSql;
use postgres_types::ToSql;

use crate::core::types::AccountID;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::PeriodIndex;
use crate::core::types::Vote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "period_kind")]
pub enum PeriodKind {
    #[postgres(name = "proposal")]
    Proposal,
    #[postgres(name = "exploration")]
    Exploration,
    /// Waiting period, no votes
    #[postgres(name = "testing")]
    Testing,
    #[postgres(name = "promotion")]
    Promotion,
}

impl PeriodKind {
    pub fn has_ballots(&self) -> bool {
        matches!(self, Self::Exploration | Self::Promotion)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "period_status")]
pub enum PeriodStatus {
    #[postgres(name = "active")]
    Active,
    #[postgres(name = "no_proposals")]
    NoProposals,
    #[postgres(name = "no_quorum")]
    NoQuorum,
    #[postgres(name = "no_single_winner")]
    NoSingleWinner,
    #[postgres(name = "no_supermajority")]
    NoSupermajority,
    #[postgres(name = "success")]
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "proposal_status")]
pub enum ProposalStatus {
    #[postgres(name = "active")]
    Active,
    #[postgres(name = "accepted")]
    Accepted,
    #[postgres(name = "rejected")]
    Rejected,
    #[postgres(name = "skipped")]
    Skipped,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct VotingPeriod {
    pub index: PeriodIndex,
    /// Proposal period and the ballot periods following it
    pub epoch: i32,
    pub kind: PeriodKind,
    pub status: PeriodStatus,
    pub first_level: Level,
    pub last_level: Level,
    pub total_bakers: i32,
    pub total_voting_power: Mutez,
    pub upvotes_quorum: i32,
    pub proposals_count: i32,
    pub top_upvotes: i32,
    pub top_voting_power: Mutez,
    /// Ballot periods only
    pub participation_ema: Option<i32>,
    pub ballots_quorum: Option<i32>,
    pub supermajority: Option<i32>,
    pub yay_ballots: i32,
    pub yay_voting_power: Mutez,
    pub nay_ballots: i32,
    pub nay_voting_power: Mutez,
    pub pass_ballots: i32,
    pub pass_voting_power: Mutez,
}

impl VotingPeriod {
    /// Voting power of all ballots cast.
    pub fn ballots_voting_power(&self) -> Mutez {
        self.yay_voting_power + self.nay_voting_power + self.pass_voting_power
    }

    /// Add (or remove, with `sign` -1) a ballot to the period's counters.
    pub fn count_ballot(&mut self, vote: Vote, voting_power: Mutez, sign: i32) {
        let (ballots, power) = match vote {
            Vote::Yay => (&mut self.yay_ballots, &mut self.yay_voting_power),
            Vote::Nay => (&mut self.nay_ballots, &mut self.nay_voting_power),
            Vote::Pass => (&mut self.pass_ballots, &mut self.pass_voting_power),
        };
        *ballots += sign;
        *power += sign as i64 * voting_power;
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct VotingSnapshot {
    pub period: PeriodIndex,
    pub level: Level,
    pub baker_id: AccountID,
    pub voting_power: Mutez,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Proposal {
    pub id: i32,
    pub hash: String,
    pub epoch: i32,
    pub first_level: Level,
    pub first_period: PeriodIndex,
    /// Last period the proposal was voted in
    pub last_period: PeriodIndex,
    pub initiator_id: AccountID,
    pub upvotes: i32,
    pub voting_power: Mutez,
    pub status: ProposalStatus,
    /// Level at which the status was last changed
    pub status_level: Option<Level>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Upvote {
    pub level: Level,
    pub period: PeriodIndex,
    pub proposal_id: i32,
    pub baker_id: AccountID,
    pub voting_power: Mutez,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Ballot {
    pub level: Level,
    pub period: PeriodIndex,
    pub proposal_id: i32,
    pub baker_id: AccountID,
    pub vote: Vote,
    pub voting_power: Mutez,
}
