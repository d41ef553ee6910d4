use itertools::Itertools;
use postgres_from_row::FromRow;
use tokio_postgres::types::ToSql;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use crate::core::entities::BakerCycle;
use crate::core::entities::Counter;
use crate::core::types::AccountID;
use crate::core::types::CycleIndex;

pub async fn get_cycle(
    client: &impl GenericClient,
    cycle: CycleIndex,
) -> Result<Vec<BakerCycle>, tokio_postgres::Error> {
    tracing::trace!("get_cycle {cycle}");
    let sql = "select * from tw.baker_cycles where cycle = $1 order by baker_id;";
    client
        .query(sql, &[&cycle])
        .await?
        .iter()
        .map(BakerCycle::try_from_row)
        .collect()
}

/// Bulk insert new rows. Only balances, expectations and projections are
/// persisted, realized counters start at zero.
pub async fn insert_many(
    pgtx: &Transaction<'_>,
    rows: &[BakerCycle],
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("insert_many ({} rows)", rows.len());
    let sql = "
        insert into tw.baker_cycles (
            cycle
            , baker_id
            , staking_balance
            , delegated_balance
            , delegators_count
            , expected_blocks
            , expected_endorsements
            , future_blocks
            , future_endorsements
            , future_block_rewards
            , future_endorsement_rewards
            , future_block_deposits
            , future_endorsement_deposits
        )
        select * from unnest(
            $1::integer[], $2::integer[], $3::bigint[], $4::bigint[], $5::integer[],
            $6::double precision[], $7::double precision[],
            $8::bigint[], $9::bigint[], $10::bigint[], $11::bigint[], $12::bigint[], $13::bigint[]
        );";
    let cycles: Vec<i32> = rows.iter().map(|r| r.cycle).collect();
    let bakers: Vec<i32> = rows.iter().map(|r| r.baker_id).collect();
    let staking: Vec<i64> = rows.iter().map(|r| r.staking_balance).collect();
    let delegated: Vec<i64> = rows.iter().map(|r| r.delegated_balance).collect();
    let delegators: Vec<i32> = rows.iter().map(|r| r.delegators_count).collect();
    let expected_blocks: Vec<f64> = rows.iter().map(|r| r.expected_blocks).collect();
    let expected_endorsements: Vec<f64> = rows.iter().map(|r| r.expected_endorsements).collect();
    let future_blocks: Vec<i64> = rows.iter().map(|r| r.future_blocks).collect();
    let future_endorsements: Vec<i64> = rows.iter().map(|r| r.future_endorsements).collect();
    let future_block_rewards: Vec<i64> = rows.iter().map(|r| r.future_block_rewards).collect();
    let future_endorsement_rewards: Vec<i64> =
        rows.iter().map(|r| r.future_endorsement_rewards).collect();
    let future_block_deposits: Vec<i64> = rows.iter().map(|r| r.future_block_deposits).collect();
    let future_endorsement_deposits: Vec<i64> =
        rows.iter().map(|r| r.future_endorsement_deposits).collect();
    pgtx.execute(
        sql,
        &[
            &cycles,
            &bakers,
            &staking,
            &delegated,
            &delegators,
            &expected_blocks,
            &expected_endorsements,
            &future_blocks,
            &future_endorsements,
            &future_block_rewards,
            &future_endorsement_rewards,
            &future_block_deposits,
            &future_endorsement_deposits,
        ],
    )
    .await
}

/// Add `changes` to the counters of a row.
///
/// Returns the number of modified rows, 0 if the row doesn't exist.
pub async fn add(
    pgtx: &Transaction<'_>,
    cycle: CycleIndex,
    baker_id: AccountID,
    changes: &[(Counter, i64)],
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("add {cycle} {baker_id} {changes:?}");
    if changes.is_empty() {
        return Ok(1);
    }
    let assignments = changes
        .iter()
        .enumerate()
        .map(|(i, (counter, _))| {
            let col = counter.column();
            format!("{col} = {col} + ${}", i + 3)
        })
        .join(", ");
    let sql = format!(
        "update tw.baker_cycles set {assignments} where cycle = $1 and baker_id = $2;"
    );
    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&cycle, &baker_id];
    for (_, amount) in changes {
        params.push(amount);
    }
    pgtx.execute(&sql, &params).await
}

/// Delete rows of accounts that are not active bakers.
pub async fn delete_ineligible(
    pgtx: &Transaction<'_>,
    cycle: CycleIndex,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_ineligible {cycle}");
    let sql = "
        delete from tw.baker_cycles bc
        using tw.accounts a
        where bc.baker_id = a.id
            and bc.cycle = $1
            and not (a.is_baker and a.deactivation_level is null);";
    pgtx.execute(sql, &[&cycle]).await
}

pub async fn delete_cycle(
    pgtx: &Transaction<'_>,
    cycle: CycleIndex,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_cycle {cycle}");
    pgtx.execute("delete from tw.baker_cycles where cycle = $1;", &[&cycle])
        .await
}
