use postgres_from_row::FromRow;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use crate::core::entities::BakingRight;
use crate::core::entities::RightKind;
use crate::core::entities::RightStatus;
use crate::core::types::AccountID;
use crate::core::types::CycleIndex;
use crate::core::types::Level;

/// Future rights of a baker within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RightsSummary {
    pub baker_id: AccountID,
    /// Number of priority 0 baking rights
    pub blocks: i64,
    /// Total endorsement slots
    pub slots: i64,
}

pub async fn get_at(
    client: &impl GenericClient,
    level: Level,
) -> Result<Vec<BakingRight>, tokio_postgres::Error> {
    tracing::trace!("get_at {level}");
    let sql = "
        select cycle
            , level
            , baker_id
            , kind
            , status
            , priority
            , slots
        from tw.baking_rights
        where level = $1
        order by kind, priority, baker_id;";
    client
        .query(sql, &[&level])
        .await?
        .iter()
        .map(BakingRight::try_from_row)
        .collect()
}

/// Bulk load rights through a binary COPY.
pub async fn insert_many(
    pgtx: &Transaction<'_>,
    rights: &[BakingRight],
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("insert_many ({} rights)", rights.len());
    // Enum types are only known at runtime
    let stmt = pgtx
        .prepare("select null::tw.right_kind, null::tw.right_status;")
        .await?;
    let kind_type = stmt.columns()[0].type_().clone();
    let status_type = stmt.columns()[1].type_().clone();

    let sink = pgtx
        .copy_in(
            "copy tw.baking_rights (cycle, level, baker_id, kind, status, priority, slots)
            from stdin binary;",
        )
        .await?;
    let writer = BinaryCopyInWriter::new(
        sink,
        &[
            Type::INT4,
            Type::INT4,
            Type::INT4,
            kind_type,
            status_type,
            Type::INT4,
            Type::INT4,
        ],
    );
    tokio::pin!(writer);
    for r in rights {
        writer
            .as_mut()
            .write(&[
                &r.cycle,
                &r.level,
                &r.baker_id,
                &r.kind,
                &r.status,
                &r.priority,
                &r.slots,
            ])
            .await?;
    }
    writer.finish().await
}

pub async fn update_status(
    pgtx: &Transaction<'_>,
    right: &BakingRight,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!(
        "update_status {} {} {:?} {:?}",
        right.level,
        right.baker_id,
        right.kind,
        right.status
    );
    let sql = "
        update tw.baking_rights
        set status = $5
        where level = $1
            and baker_id = $2
            and kind = $3
            and priority is not distinct from $4;";
    pgtx.execute(
        sql,
        &[
            &right.level,
            &right.baker_id,
            &right.kind,
            &right.priority,
            &right.status,
        ],
    )
    .await?;
    Ok(())
}

/// Set all rights at given `level` back to future.
pub async fn reset_at(pgtx: &Transaction<'_>, level: Level) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("reset_at {level}");
    pgtx.execute(
        "update tw.baking_rights set status = $2 where level = $1;",
        &[&level, &RightStatus::Future],
    )
    .await?;
    Ok(())
}

/// Delete baking rights at `level` with a priority above `priority`.
pub async fn delete_above_priority(
    pgtx: &Transaction<'_>,
    level: Level,
    priority: i32,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_above_priority {level} {priority}");
    let sql = "
        delete from tw.baking_rights
        where level = $1
            and kind = $2
            and priority > $3;";
    pgtx.execute(sql, &[&level, &RightKind::Baking, &priority])
        .await
}

/// Delete rights of accounts that are not active bakers.
pub async fn delete_ineligible(
    pgtx: &Transaction<'_>,
    cycle: CycleIndex,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_ineligible {cycle}");
    let sql = "
        delete from tw.baking_rights r
        using tw.accounts a
        where r.baker_id = a.id
            and r.cycle = $1
            and not (a.is_baker and a.deactivation_level is null);";
    pgtx.execute(sql, &[&cycle]).await
}

pub async fn delete_cycle(
    pgtx: &Transaction<'_>,
    cycle: CycleIndex,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_cycle {cycle}");
    pgtx.execute("delete from tw.baking_rights where cycle = $1;", &[&cycle])
        .await
}

/// Per baker totals of future rights in a cycle.
pub async fn get_summaries(
    client: &impl GenericClient,
    cycle: CycleIndex,
) -> Result<Vec<RightsSummary>, tokio_postgres::Error> {
    tracing::trace!("get_summaries {cycle}");
    let sql = "
        select baker_id
            , count(*) filter (where kind = 'baking' and priority = 0)
            , coalesce(sum(slots) filter (where kind = 'endorsing'), 0)::bigint
        from tw.baking_rights
        where cycle = $1
        group by baker_id
        order by baker_id;";
    Ok(client
        .query(sql, &[&cycle])
        .await?
        .iter()
        .map(|r| RightsSummary {
            baker_id: r.get(0),
            blocks: r.get(1),
            slots: r.get(2),
        })
        .collect())
}
