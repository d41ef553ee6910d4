//! Governance periods, proposals and ballots.
//!
//! A period opens with a snapshot of the voting power of listed bakers and
//! collects upvotes (proposal periods) or ballots (exploration and promotion
//! periods). Its last block settles it and opens the next one.
mod parsing;
pub(crate) mod store;
pub mod types;

use async_trait::async_trait;

use crate::core::entities::Block;
use crate::core::protocol::Protocol;
use crate::core::store::accounts;
use crate::core::types::AccountID;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::PeriodIndex;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;
use types::Ballot;
use types::PeriodKind;
use types::PeriodStatus;
use types::Proposal;
use types::ProposalStatus;
use types::Upvote;
use types::VotingPeriod;
use types::VotingSnapshot;

pub struct VotingCommit;

#[async_trait]
impl Commit for VotingCommit {
    fn name(&self) -> &'static str {
        "voting"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;

        let mut period = if block.events().is_activation() {
            let first_level = block.level - protocol.voting_period_position(block.level);
            open_period(ctx, &protocol, 0, 0, PeriodKind::Proposal, first_level, block.level)
                .await?
        } else {
            store::get_last_period(ctx.pgtx)
                .await?
                .ok_or_else(|| invariant("no voting period"))?
        };

        if !raw.operations.proposals.is_empty() {
            upvote(ctx, &block, &mut period, raw).await?;
        }
        for op in &raw.operations.ballots {
            if op.period != period.index {
                return Err(invariant(format!(
                    "ballot for period {} during period {}",
                    op.period, period.index
                )));
            }
            let baker = ctx.cache.account_by_address(ctx.pgtx, &op.sender).await?;
            let voting_power = voting_power(ctx, period.index, baker.id).await?;
            let proposal = store::find_proposal(ctx.pgtx, period.epoch, &op.proposal)
                .await?
                .ok_or_else(|| invariant(format!("ballot for unknown proposal {}", op.proposal)))?;
            store::insert_ballot(
                ctx.pgtx,
                &Ballot {
                    level: block.level,
                    period: period.index,
                    proposal_id: proposal.id,
                    baker_id: baker.id,
                    vote: op.vote,
                    voting_power,
                },
            )
            .await?;
            period.count_ballot(op.vote, voting_power, 1);
        }

        if block.level == period.last_level {
            settle_period(ctx, &protocol, &block, &mut period).await?;
        } else {
            store::update_period(ctx.pgtx, &period).await?;
        }
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, _raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        let mut period = store::get_last_period(ctx.pgtx)
            .await?
            .ok_or_else(|| invariant("no voting period"))?;

        if period.first_level == block.level + 1 {
            period = reopen_period(ctx, &block, &period).await?;
        }

        for b in store::get_ballots_at(ctx.pgtx, block.level).await? {
            period.count_ballot(b.vote, b.voting_power, -1);
        }
        store::delete_ballots_at(ctx.pgtx, block.level).await?;

        let upvotes = store::get_upvotes_at(ctx.pgtx, block.level).await?;
        if !upvotes.is_empty() {
            for u in upvotes.iter().rev() {
                let mut proposal = get_proposal(ctx, u.proposal_id).await?;
                proposal.upvotes -= 1;
                proposal.voting_power -= u.voting_power;
                if proposal.upvotes == 0 && proposal.first_level == block.level {
                    store::delete_proposal(ctx.pgtx, proposal.id).await?;
                    period.proposals_count -= 1;
                } else {
                    store::update_proposal(ctx.pgtx, &proposal).await?;
                }
            }
            store::delete_upvotes_at(ctx.pgtx, block.level).await?;
            let proposals = store::get_epoch_proposals(ctx.pgtx, period.epoch).await?;
            (period.top_upvotes, period.top_voting_power) = parsing::top(&proposals);
        }

        if block.events().is_activation() {
            tracing::debug!("deleting voting period {}", period.index);
            store::delete_snapshots(ctx.pgtx, period.index).await?;
            store::delete_period(ctx.pgtx, period.index).await?;
        } else {
            store::update_period(ctx.pgtx, &period).await?;
        }
        Ok(())
    }
}

/// Record all upvotes of a block.
async fn upvote(
    ctx: &mut Context<'_, '_>,
    block: &Block,
    period: &mut VotingPeriod,
    raw: &RawBlock,
) -> Result<(), Error> {
    for op in &raw.operations.proposals {
        if op.period != period.index || period.kind != PeriodKind::Proposal {
            return Err(invariant(format!(
                "proposals for period {} during period {}",
                op.period, period.index
            )));
        }
        let baker = ctx.cache.account_by_address(ctx.pgtx, &op.sender).await?;
        let voting_power = voting_power(ctx, period.index, baker.id).await?;
        for hash in &op.proposals {
            let mut proposal = match store::find_proposal(ctx.pgtx, period.epoch, hash).await? {
                Some(p) => p,
                None => {
                    let mut p = Proposal {
                        id: 0,
                        hash: hash.clone(),
                        epoch: period.epoch,
                        first_level: block.level,
                        first_period: period.index,
                        last_period: period.index,
                        initiator_id: baker.id,
                        upvotes: 0,
                        voting_power: 0,
                        status: ProposalStatus::Active,
                        status_level: None,
                    };
                    p.id = store::insert_proposal(ctx.pgtx, &p).await?;
                    period.proposals_count += 1;
                    tracing::info!("new proposal {hash}");
                    p
                }
            };
            proposal.upvotes += 1;
            proposal.voting_power += voting_power;
            store::update_proposal(ctx.pgtx, &proposal).await?;
            store::insert_upvote(
                ctx.pgtx,
                &Upvote {
                    level: block.level,
                    period: period.index,
                    proposal_id: proposal.id,
                    baker_id: baker.id,
                    voting_power,
                },
            )
            .await?;
        }
    }
    let proposals = store::get_epoch_proposals(ctx.pgtx, period.epoch).await?;
    (period.top_upvotes, period.top_voting_power) = parsing::top(&proposals);
    Ok(())
}

/// Decide the outcome of a period on its last block and open the next one.
async fn settle_period(
    ctx: &mut Context<'_, '_>,
    protocol: &Protocol,
    block: &Block,
    period: &mut VotingPeriod,
) -> Result<(), Error> {
    let proposals = store::get_epoch_proposals(ctx.pgtx, period.epoch).await?;
    let status = parsing::evaluate(period, &proposals);
    period.status = status;
    store::update_period(ctx.pgtx, period).await?;
    tracing::info!("voting period {} ended with {status:?}", period.index);

    let next_kind = parsing::next_kind(period.kind, status);
    let next_epoch = if next_kind == PeriodKind::Proposal {
        period.epoch + 1
    } else {
        period.epoch
    };
    let next_index = period.index + 1;

    let winner = if period.kind == PeriodKind::Proposal && status == PeriodStatus::Success {
        proposals.iter().max_by_key(|p| p.voting_power).map(|p| p.id)
    } else {
        None
    };
    for mut proposal in proposals
        .into_iter()
        .filter(|p| p.status == ProposalStatus::Active)
    {
        let outcome = match period.kind {
            PeriodKind::Proposal if Some(proposal.id) == winner => None,
            PeriodKind::Proposal => Some(ProposalStatus::Skipped),
            kind => parsing::proposal_outcome(kind, status),
        };
        match outcome {
            Some(s) => {
                proposal.status = s;
                proposal.status_level = Some(block.level);
            }
            None if next_epoch == period.epoch => proposal.last_period = next_index,
            None => continue,
        }
        store::update_proposal(ctx.pgtx, &proposal).await?;
    }

    open_period(
        ctx,
        protocol,
        next_index,
        next_epoch,
        next_kind,
        block.level + 1,
        block.level,
    )
    .await?;
    Ok(())
}

/// Undo the settlement of the period preceding `opened`, returning it.
async fn reopen_period(
    ctx: &mut Context<'_, '_>,
    block: &Block,
    opened: &VotingPeriod,
) -> Result<VotingPeriod, Error> {
    tracing::debug!("deleting voting period {}", opened.index);
    store::delete_snapshots(ctx.pgtx, opened.index).await?;
    store::delete_period(ctx.pgtx, opened.index).await?;

    let mut period = store::get_period(ctx.pgtx, opened.index - 1)
        .await?
        .ok_or_else(|| invariant(format!("missing voting period {}", opened.index - 1)))?;
    period.status = PeriodStatus::Active;

    for mut proposal in store::get_proposals_settled_at(ctx.pgtx, block.level).await? {
        proposal.status = ProposalStatus::Active;
        proposal.status_level = None;
        store::update_proposal(ctx.pgtx, &proposal).await?;
    }
    if opened.epoch == period.epoch {
        for mut proposal in store::get_epoch_proposals(ctx.pgtx, period.epoch).await? {
            if proposal.last_period == opened.index {
                proposal.last_period = period.index;
                store::update_proposal(ctx.pgtx, &proposal).await?;
            }
        }
    }
    Ok(period)
}

/// Create a period and the voting power snapshot of currently listed bakers.
///
/// * `level`: level of the block taking the snapshot
async fn open_period(
    ctx: &mut Context<'_, '_>,
    protocol: &Protocol,
    index: PeriodIndex,
    epoch: i32,
    kind: PeriodKind,
    first_level: Level,
    level: Level,
) -> Result<VotingPeriod, Error> {
    let bakers = accounts::get_active_bakers(ctx.pgtx).await?;
    let listings = parsing::listings(protocol, &bakers);
    let ema = if kind.has_ballots() {
        let ema = match store::get_last_ballot_period(ctx.pgtx, index).await? {
            Some(prev) => parsing::next_ema(&prev, protocol),
            None => protocol.initial_participation_ema,
        };
        Some(ema)
    } else {
        None
    };
    let period = parsing::new_period(protocol, index, epoch, kind, first_level, &listings, ema);
    store::insert_period(ctx.pgtx, &period).await?;

    let snapshots: Vec<VotingSnapshot> = listings
        .into_iter()
        .map(|(baker_id, voting_power)| VotingSnapshot {
            period: index,
            level,
            baker_id,
            voting_power,
        })
        .collect();
    store::insert_snapshots(ctx.pgtx, &snapshots).await?;
    tracing::info!(
        "opened {kind:?} period {index} with {} bakers",
        period.total_bakers
    );
    Ok(period)
}

async fn voting_power(
    ctx: &mut Context<'_, '_>,
    period: PeriodIndex,
    baker_id: AccountID,
) -> Result<Mutez, Error> {
    store::get_voting_power(ctx.pgtx, period, baker_id)
        .await?
        .ok_or_else(|| invariant(format!("baker {baker_id} not listed in period {period}")))
}

async fn get_proposal(ctx: &mut Context<'_, '_>, id: i32) -> Result<Proposal, Error> {
    store::get_proposal(ctx.pgtx, id)
        .await?
        .ok_or_else(|| invariant(format!("unknown proposal {id}")))
}
