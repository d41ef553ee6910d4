use postgres_from_row::FromRow;
use time::Date;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use crate::core::entities::Statistics;
use crate::core::types::Level;

const COLUMNS: &str = "
    level
    , cycle
    , timestamp
    , date
    , total_supply
    , total_frozen
    , frozen_deposits
    , frozen_rewards
    , frozen_fees
    , baking_power
    , total_bakers
    , total_delegators";

/// Row of the highest level, if any.
pub async fn get_last(
    client: &impl GenericClient,
) -> Result<Option<Statistics>, tokio_postgres::Error> {
    tracing::trace!("get_last");
    let sql = format!("select {COLUMNS} from tw.statistics order by level desc limit 1;");
    client
        .query_opt(&sql, &[])
        .await?
        .map(|row| Statistics::try_from_row(&row))
        .transpose()
}

pub async fn insert(pgtx: &Transaction<'_>, s: &Statistics) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert {}", s.level);
    let sql = format!(
        "
        insert into tw.statistics ({COLUMNS})
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12);"
    );
    pgtx.execute(
        &sql,
        &[
            &s.level,
            &s.cycle,
            &s.timestamp,
            &s.date,
            &s.total_supply,
            &s.total_frozen,
            &s.frozen_deposits,
            &s.frozen_rewards,
            &s.frozen_fees,
            &s.baking_power,
            &s.total_bakers,
            &s.total_delegators,
        ],
    )
    .await?;
    Ok(())
}

pub async fn set_date(
    pgtx: &Transaction<'_>,
    level: Level,
    date: Option<Date>,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("set_date {level} {date:?}");
    pgtx.execute(
        "update tw.statistics set date = $2 where level = $1;",
        &[&level, &date],
    )
    .await?;
    Ok(())
}

pub async fn delete(pgtx: &Transaction<'_>, level: Level) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete {level}");
    pgtx.execute("delete from tw.statistics where level = $1;", &[&level])
        .await?;
    Ok(())
}
