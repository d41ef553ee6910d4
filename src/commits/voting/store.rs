use postgres_from_row::FromRow;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use super::types::Ballot;
use super::types::Proposal;
use super::types::Upvote;
use super::types::VotingPeriod;
use super::types::VotingSnapshot;
use crate::core::types::AccountID;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::PeriodIndex;

const PERIOD_COLUMNS: &str = "
    index
    , epoch
    , kind
    , status
    , first_level
    , last_level
    , total_bakers
    , total_voting_power
    , upvotes_quorum
    , proposals_count
    , top_upvotes
    , top_voting_power
    , participation_ema
    , ballots_quorum
    , supermajority
    , yay_ballots
    , yay_voting_power
    , nay_ballots
    , nay_voting_power
    , pass_ballots
    , pass_voting_power";

const PROPOSAL_COLUMNS: &str = "
    id
    , hash
    , epoch
    , first_level
    , first_period
    , last_period
    , initiator_id
    , upvotes
    , voting_power
    , status
    , status_level";

// Periods

/// Period with the highest index, if any.
pub async fn get_last_period(
    client: &impl GenericClient,
) -> Result<Option<VotingPeriod>, tokio_postgres::Error> {
    tracing::trace!("get_last_period");
    let sql = format!("select {PERIOD_COLUMNS} from tw.voting_periods order by index desc limit 1;");
    client
        .query_opt(&sql, &[])
        .await?
        .map(|row| VotingPeriod::try_from_row(&row))
        .transpose()
}

pub async fn get_period(
    client: &impl GenericClient,
    index: PeriodIndex,
) -> Result<Option<VotingPeriod>, tokio_postgres::Error> {
    tracing::trace!("get_period {index}");
    let sql = format!("select {PERIOD_COLUMNS} from tw.voting_periods where index = $1;");
    client
        .query_opt(&sql, &[&index])
        .await?
        .map(|row| VotingPeriod::try_from_row(&row))
        .transpose()
}

/// Last ballot period before period `index`, if any.
pub async fn get_last_ballot_period(
    client: &impl GenericClient,
    index: PeriodIndex,
) -> Result<Option<VotingPeriod>, tokio_postgres::Error> {
    tracing::trace!("get_last_ballot_period {index}");
    let sql = format!(
        "
        select {PERIOD_COLUMNS}
        from tw.voting_periods
        where index < $1
            and kind in ('exploration', 'promotion')
        order by index desc
        limit 1;"
    );
    client
        .query_opt(&sql, &[&index])
        .await?
        .map(|row| VotingPeriod::try_from_row(&row))
        .transpose()
}

pub async fn insert_period(
    pgtx: &Transaction<'_>,
    p: &VotingPeriod,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert_period {}", p.index);
    let sql = format!(
        "
        insert into tw.voting_periods ({PERIOD_COLUMNS})
        values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
            $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21
        );"
    );
    pgtx.execute(
        &sql,
        &[
            &p.index,
            &p.epoch,
            &p.kind,
            &p.status,
            &p.first_level,
            &p.last_level,
            &p.total_bakers,
            &p.total_voting_power,
            &p.upvotes_quorum,
            &p.proposals_count,
            &p.top_upvotes,
            &p.top_voting_power,
            &p.participation_ema,
            &p.ballots_quorum,
            &p.supermajority,
            &p.yay_ballots,
            &p.yay_voting_power,
            &p.nay_ballots,
            &p.nay_voting_power,
            &p.pass_ballots,
            &p.pass_voting_power,
        ],
    )
    .await?;
    Ok(())
}

/// Persist the mutable fields of a period.
pub async fn update_period(
    pgtx: &Transaction<'_>,
    p: &VotingPeriod,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("update_period {}", p.index);
    let sql = "
        update tw.voting_periods
        set status = $2
            , proposals_count = $3
            , top_upvotes = $4
            , top_voting_power = $5
            , yay_ballots = $6
            , yay_voting_power = $7
            , nay_ballots = $8
            , nay_voting_power = $9
            , pass_ballots = $10
            , pass_voting_power = $11
        where index = $1;";
    pgtx.execute(
        sql,
        &[
            &p.index,
            &p.status,
            &p.proposals_count,
            &p.top_upvotes,
            &p.top_voting_power,
            &p.yay_ballots,
            &p.yay_voting_power,
            &p.nay_ballots,
            &p.nay_voting_power,
            &p.pass_ballots,
            &p.pass_voting_power,
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete_period(
    pgtx: &Transaction<'_>,
    index: PeriodIndex,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete_period {index}");
    pgtx.execute("delete from tw.voting_periods where index = $1;", &[&index])
        .await?;
    Ok(())
}

// Snapshots

pub async fn insert_snapshots(
    pgtx: &Transaction<'_>,
    rows: &[VotingSnapshot],
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("insert_snapshots ({} rows)", rows.len());
    let sql = "
        insert into tw.voting_snapshots (period, level, baker_id, voting_power)
        select * from unnest($1::integer[], $2::integer[], $3::integer[], $4::bigint[]);";
    let periods: Vec<i32> = rows.iter().map(|r| r.period).collect();
    let levels: Vec<i32> = rows.iter().map(|r| r.level).collect();
    let bakers: Vec<i32> = rows.iter().map(|r| r.baker_id).collect();
    let powers: Vec<i64> = rows.iter().map(|r| r.voting_power).collect();
    pgtx.execute(sql, &[&periods, &levels, &bakers, &powers])
        .await
}

/// Voting power of a baker in given period, if listed.
pub async fn get_voting_power(
    client: &impl GenericClient,
    period: PeriodIndex,
    baker_id: AccountID,
) -> Result<Option<Mutez>, tokio_postgres::Error> {
    tracing::trace!("get_voting_power {period} {baker_id}");
    let sql = "
        select voting_power
        from tw.voting_snapshots
        where period = $1 and baker_id = $2;";
    Ok(client
        .query_opt(sql, &[&period, &baker_id])
        .await?
        .map(|row| row.get(0)))
}

pub async fn delete_snapshots(
    pgtx: &Transaction<'_>,
    period: PeriodIndex,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_snapshots {period}");
    pgtx.execute(
        "delete from tw.voting_snapshots where period = $1;",
        &[&period],
    )
    .await
}

// Proposals

pub async fn find_proposal(
    client: &impl GenericClient,
    epoch: i32,
    hash: &str,
) -> Result<Option<Proposal>, tokio_postgres::Error> {
    tracing::trace!("find_proposal {epoch} {hash}");
    let sql = format!("select {PROPOSAL_COLUMNS} from tw.proposals where epoch = $1 and hash = $2;");
    client
        .query_opt(&sql, &[&epoch, &hash])
        .await?
        .map(|row| Proposal::try_from_row(&row))
        .transpose()
}

pub async fn get_proposal(
    client: &impl GenericClient,
    id: i32,
) -> Result<Option<Proposal>, tokio_postgres::Error> {
    tracing::trace!("get_proposal {id}");
    let sql = format!("select {PROPOSAL_COLUMNS} from tw.proposals where id = $1;");
    client
        .query_opt(&sql, &[&id])
        .await?
        .map(|row| Proposal::try_from_row(&row))
        .transpose()
}

/// All proposals of an epoch, ordered by id.
pub async fn get_epoch_proposals(
    client: &impl GenericClient,
    epoch: i32,
) -> Result<Vec<Proposal>, tokio_postgres::Error> {
    tracing::trace!("get_epoch_proposals {epoch}");
    let sql = format!("select {PROPOSAL_COLUMNS} from tw.proposals where epoch = $1 order by id;");
    client
        .query(&sql, &[&epoch])
        .await?
        .iter()
        .map(Proposal::try_from_row)
        .collect()
}

/// Proposals whose status got changed at given `level`.
pub async fn get_proposals_settled_at(
    client: &impl GenericClient,
    level: Level,
) -> Result<Vec<Proposal>, tokio_postgres::Error> {
    tracing::trace!("get_proposals_settled_at {level}");
    let sql = format!("select {PROPOSAL_COLUMNS} from tw.proposals where status_level = $1 order by id;");
    client
        .query(&sql, &[&level])
        .await?
        .iter()
        .map(Proposal::try_from_row)
        .collect()
}

/// Insert a new proposal and return its id.
pub async fn insert_proposal(
    pgtx: &Transaction<'_>,
    p: &Proposal,
) -> Result<i32, tokio_postgres::Error> {
    tracing::trace!("insert_proposal {}", p.hash);
    let sql = "
        insert into tw.proposals (
            hash
            , epoch
            , first_level
            , first_period
            , last_period
            , initiator_id
            , upvotes
            , voting_power
            , status
            , status_level
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        returning id;";
    let row = pgtx
        .query_one(
            sql,
            &[
                &p.hash,
                &p.epoch,
                &p.first_level,
                &p.first_period,
                &p.last_period,
                &p.initiator_id,
                &p.upvotes,
                &p.voting_power,
                &p.status,
                &p.status_level,
            ],
        )
        .await?;
    Ok(row.get(0))
}

pub async fn update_proposal(
    pgtx: &Transaction<'_>,
    p: &Proposal,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("update_proposal {}", p.id);
    let sql = "
        update tw.proposals
        set last_period = $2
            , upvotes = $3
            , voting_power = $4
            , status = $5
            , status_level = $6
        where id = $1;";
    pgtx.execute(
        sql,
        &[
            &p.id,
            &p.last_period,
            &p.upvotes,
            &p.voting_power,
            &p.status,
            &p.status_level,
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete_proposal(pgtx: &Transaction<'_>, id: i32) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete_proposal {id}");
    pgtx.execute("delete from tw.proposals where id = $1;", &[&id])
        .await?;
    Ok(())
}

// Upvotes and ballots

pub async fn insert_upvote(pgtx: &Transaction<'_>, u: &Upvote) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert_upvote {} {}", u.proposal_id, u.baker_id);
    let sql = "
        insert into tw.proposal_upvotes (level, period, proposal_id, baker_id, voting_power)
        values ($1, $2, $3, $4, $5);";
    pgtx.execute(
        sql,
        &[&u.level, &u.period, &u.proposal_id, &u.baker_id, &u.voting_power],
    )
    .await?;
    Ok(())
}

pub async fn get_upvotes_at(
    client: &impl GenericClient,
    level: Level,
) -> Result<Vec<Upvote>, tokio_postgres::Error> {
    tracing::trace!("get_upvotes_at {level}");
    let sql = "
        select level
            , period
            , proposal_id
            , baker_id
            , voting_power
        from tw.proposal_upvotes
        where level = $1;";
    client
        .query(sql, &[&level])
        .await?
        .iter()
        .map(Upvote::try_from_row)
        .collect()
}

pub async fn delete_upvotes_at(
    pgtx: &Transaction<'_>,
    level: Level,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_upvotes_at {level}");
    pgtx.execute(
        "delete from tw.proposal_upvotes where level = $1;",
        &[&level],
    )
    .await
}

pub async fn insert_ballot(pgtx: &Transaction<'_>, b: &Ballot) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert_ballot {} {}", b.period, b.baker_id);
    let sql = "
        insert into tw.ballots (level, period, proposal_id, baker_id, vote, voting_power)
        values ($1, $2, $3, $4, $5, $6);";
    pgtx.execute(
        sql,
        &[
            &b.level,
            &b.period,
            &b.proposal_id,
            &b.baker_id,
            &b.vote,
            &b.voting_power,
        ],
    )
    .await?;
    Ok(())
}

pub async fn get_ballots_at(
    client: &impl GenericClient,
    level: Level,
) -> Result<Vec<Ballot>, tokio_postgres::Error> {
    tracing::trace!("get_ballots_at {level}");
    let sql = "
        select level
            , period
            , proposal_id
            , baker_id
            , vote
            , voting_power
        from tw.ballots
        where level = $1;";
    client
        .query(sql, &[&level])
        .await?
        .iter()
        .map(Ballot::try_from_row)
        .collect()
}

pub async fn delete_ballots_at(
    pgtx: &Transaction<'_>,
    level: Level,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_ballots_at {level}");
    pgtx.execute("delete from tw.ballots where level = $1;", &[&level])
        .await
}
