use postgres_from_row::FromRow;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use super::DelegationChange;
use crate::core::types::Level;

pub async fn insert(
    pgtx: &Transaction<'_>,
    change: &DelegationChange,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert {} {}", change.level, change.index);
    let sql = "
        insert into tw.delegations (
            level
            , index
            , kind
            , sender_id
            , prev_delegate_id
            , new_delegate_id
            , prev_is_baker
            , prev_deactivation_level
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8);";
    pgtx.execute(
        sql,
        &[
            &change.level,
            &change.index,
            &change.kind,
            &change.sender_id,
            &change.prev_delegate_id,
            &change.new_delegate_id,
            &change.prev_is_baker,
            &change.prev_deactivation_level,
        ],
    )
    .await?;
    Ok(())
}

/// Changes recorded at `level`, in application order.
pub async fn get_at(
    client: &impl GenericClient,
    level: Level,
) -> Result<Vec<DelegationChange>, tokio_postgres::Error> {
    tracing::trace!("get_at {level}");
    let sql = "
        select level
            , index
            , kind
            , sender_id
            , prev_delegate_id
            , new_delegate_id
            , prev_is_baker
            , prev_deactivation_level
        from tw.delegations
        where level = $1
        order by index;";
    client
        .query(sql, &[&level])
        .await?
        .iter()
        .map(DelegationChange::try_from_row)
        .collect()
}

pub async fn delete_at(pgtx: &Transaction<'_>, level: Level) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete_at {level}");
    pgtx.execute("delete from tw.delegations where level = $1;", &[&level])
        .await?;
    Ok(())
}
