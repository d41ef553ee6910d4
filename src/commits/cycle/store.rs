use postgres_from_row::FromRow;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use crate::core::entities::Cycle;
use crate::core::types::CycleIndex;

const COLUMNS: &str = "
    index
    , first_level
    , last_level
    , snapshot_index
    , snapshot_level
    , total_staking
    , selected_stake
    , total_delegated
    , total_delegators
    , total_bakers
    , seed";

pub async fn get(
    client: &impl GenericClient,
    index: CycleIndex,
) -> Result<Option<Cycle>, tokio_postgres::Error> {
    tracing::trace!("get {index}");
    let sql = format!("select {COLUMNS} from tw.cycles where index = $1;");
    client
        .query_opt(&sql, &[&index])
        .await?
        .map(|row| Cycle::try_from_row(&row))
        .transpose()
}

/// Earliest cycle, created on activation.
pub async fn get_first(client: &impl GenericClient) -> Result<Option<Cycle>, tokio_postgres::Error> {
    tracing::trace!("get_first");
    let sql = format!("select {COLUMNS} from tw.cycles order by index limit 1;");
    client
        .query_opt(&sql, &[])
        .await?
        .map(|row| Cycle::try_from_row(&row))
        .transpose()
}

pub async fn insert(pgtx: &Transaction<'_>, c: &Cycle) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert {}", c.index);
    let sql = format!(
        "
        insert into tw.cycles ({COLUMNS})
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11);"
    );
    pgtx.execute(
        &sql,
        &[
            &c.index,
            &c.first_level,
            &c.last_level,
            &c.snapshot_index,
            &c.snapshot_level,
            &c.total_staking,
            &c.selected_stake,
            &c.total_delegated,
            &c.total_delegators,
            &c.total_bakers,
            &c.seed,
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete(pgtx: &Transaction<'_>, index: CycleIndex) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete {index}");
    pgtx.execute("delete from tw.cycles where index = $1;", &[&index])
        .await?;
    Ok(())
}
