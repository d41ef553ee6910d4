use postgres_from_row::FromRow;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use crate::core::entities::SnapshotBalance;
use crate::core::types::Level;

pub async fn insert_many(
    pgtx: &Transaction<'_>,
    rows: &[SnapshotBalance],
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("insert_many ({} rows)", rows.len());
    let sql = "
        insert into tw.snapshot_balances (level, account_id, delegate_id, balance)
        select * from unnest($1::integer[], $2::integer[], $3::integer[], $4::bigint[]);";
    let levels: Vec<i32> = rows.iter().map(|r| r.level).collect();
    let accounts: Vec<i32> = rows.iter().map(|r| r.account_id).collect();
    let delegates: Vec<Option<i32>> = rows.iter().map(|r| r.delegate_id).collect();
    let balances: Vec<i64> = rows.iter().map(|r| r.balance).collect();
    pgtx.execute(sql, &[&levels, &accounts, &delegates, &balances])
        .await
}

pub async fn get_at(
    client: &impl GenericClient,
    level: Level,
) -> Result<Vec<SnapshotBalance>, tokio_postgres::Error> {
    tracing::trace!("get_at {level}");
    let sql = "
        select level
            , account_id
            , delegate_id
            , balance
        from tw.snapshot_balances
        where level = $1
        order by account_id;";
    client
        .query(sql, &[&level])
        .await?
        .iter()
        .map(SnapshotBalance::try_from_row)
        .collect()
}

pub async fn delete_at(pgtx: &Transaction<'_>, level: Level) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_at {level}");
    pgtx.execute(
        "delete from tw.snapshot_balances where level = $1;",
        &[&level],
    )
    .await
}
