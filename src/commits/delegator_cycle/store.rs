use tokio_postgres::Transaction;

use crate::core::entities::DelegatorCycle;
use crate::core::types::CycleIndex;

/// Bulk insert rows, ignoring delegators already present in their cycle.
pub async fn insert_many(
    pgtx: &Transaction<'_>,
    rows: &[DelegatorCycle],
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("insert_many ({} rows)", rows.len());
    let sql = "
        insert into tw.delegator_cycles (cycle, delegator_id, baker_id, balance)
        select * from unnest($1::integer[], $2::integer[], $3::integer[], $4::bigint[])
        on conflict do nothing;";
    let cycles: Vec<i32> = rows.iter().map(|r| r.cycle).collect();
    let delegators: Vec<i32> = rows.iter().map(|r| r.delegator_id).collect();
    let bakers: Vec<i32> = rows.iter().map(|r| r.baker_id).collect();
    let balances: Vec<i64> = rows.iter().map(|r| r.balance).collect();
    pgtx.execute(sql, &[&cycles, &delegators, &bakers, &balances])
        .await
}

pub async fn delete_cycle(
    pgtx: &Transaction<'_>,
    cycle: CycleIndex,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_cycle {cycle}");
    pgtx.execute(
        "delete from tw.delegator_cycles where cycle = $1;",
        &[&cycle],
    )
    .await
}
