use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use super::Revelation;
use crate::core::types::CycleIndex;
use crate::core::types::Level;

pub async fn insert(pgtx: &Transaction<'_>, r: &Revelation) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert {} {}", r.level, r.revealed_level);
    let sql = "
        insert into tw.nonce_revelations (
            level
            , baker_id
            , revealed_level
            , revealed_cycle
            , nonce
        )
        values ($1, $2, $3, $4, $5);";
    pgtx.execute(
        sql,
        &[
            &r.level,
            &r.baker_id,
            &r.revealed_level,
            &r.revealed_cycle,
            &r.nonce,
        ],
    )
    .await?;
    Ok(())
}

/// Nonces revealed for blocks of given `cycle`, ordered by revealed level.
pub async fn get_nonces(
    client: &impl GenericClient,
    cycle: CycleIndex,
) -> Result<Vec<Vec<u8>>, tokio_postgres::Error> {
    tracing::trace!("get_nonces {cycle}");
    let sql = "
        select nonce
        from tw.nonce_revelations
        where revealed_cycle = $1
        order by revealed_level;";
    Ok(client
        .query(sql, &[&cycle])
        .await?
        .iter()
        .map(|r| r.get(0))
        .collect())
}

pub async fn delete_at(pgtx: &Transaction<'_>, level: Level) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_at {level}");
    pgtx.execute(
        "delete from tw.nonce_revelations where level = $1;",
        &[&level],
    )
    .await
}
