use postgres_from_row::FromRow;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use crate::core::protocol::Protocol;

const COLUMNS: &str = "
    code
    , hash
    , first_level
    , first_cycle
    , first_cycle_level
    , preserved_cycles
    , blocks_per_cycle
    , blocks_per_snapshot
    , blocks_per_voting_period
    , tokens_per_roll
    , endorsers_per_block
    , block_deposit
    , endorsement_deposit
    , baking_reward0
    , baking_reward1
    , endorsement_reward0
    , endorsement_reward1
    , revelation_reward
    , proposal_quorum
    , ballot_quorum_min
    , ballot_quorum_max
    , supermajority
    , initial_participation_ema";

/// Latest protocol, if any.
pub async fn get_last(
    client: &impl GenericClient,
) -> Result<Option<Protocol>, tokio_postgres::Error> {
    tracing::trace!("get_last");
    let sql = format!("select {COLUMNS} from tw.protocols order by code desc limit 1;");
    client
        .query_opt(&sql, &[])
        .await?
        .map(|row| Protocol::try_from_row(&row))
        .transpose()
}

pub async fn insert(pgtx: &Transaction<'_>, p: &Protocol) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert {} {}", p.code, p.hash);
    let sql = format!(
        "
        insert into tw.protocols ({COLUMNS})
        values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
            $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
        );"
    );
    pgtx.execute(
        &sql,
        &[
            &p.code,
            &p.hash,
            &p.first_level,
            &p.first_cycle,
            &p.first_cycle_level,
            &p.preserved_cycles,
            &p.blocks_per_cycle,
            &p.blocks_per_snapshot,
            &p.blocks_per_voting_period,
            &p.tokens_per_roll,
            &p.endorsers_per_block,
            &p.block_deposit,
            &p.endorsement_deposit,
            &p.baking_reward0,
            &p.baking_reward1,
            &p.endorsement_reward0,
            &p.endorsement_reward1,
            &p.revelation_reward,
            &p.proposal_quorum,
            &p.ballot_quorum_min,
            &p.ballot_quorum_max,
            &p.supermajority,
            &p.initial_participation_ema,
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete(pgtx: &Transaction<'_>, code: i32) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete {code}");
    pgtx.execute("delete from tw.protocols where code = $1;", &[&code])
        .await?;
    Ok(())
}
