use postgres_from_row::FromRow;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use crate::core::entities::Block;
use crate::core::types::Level;

pub async fn get(
    client: &impl GenericClient,
    level: Level,
) -> Result<Option<Block>, tokio_postgres::Error> {
    tracing::trace!("get {level}");
    let sql = "
        select level
            , hash
            , cycle
            , cycle_position
            , timestamp
            , protocol_code
            , priority
            , baker_id
            , validations
            , reward
            , deposit
            , fees
            , events
            , operations
        from tw.blocks
        where level = $1;";
    client
        .query_opt(sql, &[&level])
        .await?
        .map(|row| Block::try_from_row(&row))
        .transpose()
}

pub async fn insert(pgtx: &Transaction<'_>, block: &Block) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert {}", block.level);
    let sql = "
        insert into tw.blocks (
            level
            , hash
            , cycle
            , cycle_position
            , timestamp
            , protocol_code
            , priority
            , baker_id
            , validations
            , reward
            , deposit
            , fees
            , events
            , operations
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14);";
    pgtx.execute(
        sql,
        &[
            &block.level,
            &block.hash,
            &block.cycle,
            &block.cycle_position,
            &block.timestamp,
            &block.protocol_code,
            &block.priority,
            &block.baker_id,
            &block.validations,
            &block.reward,
            &block.deposit,
            &block.fees,
            &block.events,
            &block.operations,
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete(pgtx: &Transaction<'_>, level: Level) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete {level}");
    pgtx.execute("delete from tw.blocks where level = $1;", &[&level])
        .await?;
    Ok(())
}
