use postgres_from_row::FromRow;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use super::types::BigMap;
use super::types::BigMapKey;
use super::types::BigMapUpdate;
use crate::core::types::Level;
use crate::core::types::Ptr;

const MAP_COLUMNS: &str = "
    ptr
    , contract_id
    , storage_path
    , key_type
    , value_type
    , active
    , first_level
    , last_level
    , total_keys
    , active_keys
    , updates";

const KEY_COLUMNS: &str = "
    k.id
    , k.ptr
    , k.key_hash
    , k.key
    , k.value
    , k.active
    , k.first_level
    , k.last_level
    , k.updates";

// Prefetch

pub async fn get_maps(
    client: &impl GenericClient,
    ptrs: &[Ptr],
) -> Result<Vec<BigMap>, tokio_postgres::Error> {
    tracing::trace!("get_maps ({} ptrs)", ptrs.len());
    let sql = format!("select {MAP_COLUMNS} from tw.big_maps where ptr = any($1);");
    client
        .query(&sql, &[&ptrs])
        .await?
        .iter()
        .map(BigMap::try_from_row)
        .collect()
}

/// Keys matching given (ptr, key hash) pairs.
pub async fn get_keys(
    client: &impl GenericClient,
    ptrs: &[Ptr],
    key_hashes: &[String],
) -> Result<Vec<BigMapKey>, tokio_postgres::Error> {
    tracing::trace!("get_keys ({} keys)", ptrs.len());
    let sql = format!(
        "
        select {KEY_COLUMNS}
        from tw.big_map_keys k
        join unnest($1::bigint[], $2::text[]) as u(ptr, key_hash)
            on u.ptr = k.ptr and u.key_hash = k.key_hash;"
    );
    client
        .query(&sql, &[&ptrs, &key_hashes])
        .await?
        .iter()
        .map(BigMapKey::try_from_row)
        .collect()
}

/// Active keys of given maps.
pub async fn get_active_keys(
    client: &impl GenericClient,
    ptrs: &[Ptr],
) -> Result<Vec<BigMapKey>, tokio_postgres::Error> {
    tracing::trace!("get_active_keys ({} ptrs)", ptrs.len());
    let sql = format!(
        "
        select {KEY_COLUMNS}
        from tw.big_map_keys k
        where k.ptr = any($1) and k.active;"
    );
    client
        .query(&sql, &[&ptrs])
        .await?
        .iter()
        .map(BigMapKey::try_from_row)
        .collect()
}

// Maps

pub async fn get_map(
    client: &impl GenericClient,
    ptr: Ptr,
) -> Result<Option<BigMap>, tokio_postgres::Error> {
    tracing::trace!("get_map {ptr}");
    let sql = format!("select {MAP_COLUMNS} from tw.big_maps where ptr = $1;");
    client
        .query_opt(&sql, &[&ptr])
        .await?
        .map(|row| BigMap::try_from_row(&row))
        .transpose()
}

pub async fn insert_map(pgtx: &Transaction<'_>, m: &BigMap) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert_map {}", m.ptr);
    let sql = format!(
        "
        insert into tw.big_maps ({MAP_COLUMNS})
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11);"
    );
    pgtx.execute(
        &sql,
        &[
            &m.ptr,
            &m.contract_id,
            &m.storage_path,
            &m.key_type,
            &m.value_type,
            &m.active,
            &m.first_level,
            &m.last_level,
            &m.total_keys,
            &m.active_keys,
            &m.updates,
        ],
    )
    .await?;
    Ok(())
}

pub async fn update_map(pgtx: &Transaction<'_>, m: &BigMap) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("update_map {}", m.ptr);
    let sql = "
        update tw.big_maps
        set active = $2
            , last_level = $3
            , total_keys = $4
            , active_keys = $5
            , updates = $6
        where ptr = $1;";
    pgtx.execute(
        sql,
        &[
            &m.ptr,
            &m.active,
            &m.last_level,
            &m.total_keys,
            &m.active_keys,
            &m.updates,
        ],
    )
    .await?;
    Ok(())
}

/// Rebuild the state of a map as it was before `level`, from its keys and
/// earlier audit rows.
pub async fn restore_map(
    pgtx: &Transaction<'_>,
    ptr: Ptr,
    level: Level,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("restore_map {ptr} {level}");
    let sql = "
        update tw.big_maps m
        set active = not exists (
                select 1 from tw.big_map_updates u
                where u.ptr = m.ptr and u.level < $2 and u.action = 'remove'
            )
            , last_level = (
                select max(u.level) from tw.big_map_updates u
                where u.ptr = m.ptr and u.level < $2
            )
            , total_keys = (
                select count(*) from tw.big_map_keys k where k.ptr = m.ptr
            )
            , active_keys = (
                select count(*) from tw.big_map_keys k where k.ptr = m.ptr and k.active
            )
            , updates = (
                select count(*) from tw.big_map_updates u
                where u.ptr = m.ptr and u.level < $2
            )
        where m.ptr = $1;";
    pgtx.execute(sql, &[&ptr, &level]).await?;
    Ok(())
}

pub async fn delete_map(pgtx: &Transaction<'_>, ptr: Ptr) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete_map {ptr}");
    pgtx.execute("delete from tw.big_maps where ptr = $1;", &[&ptr])
        .await?;
    Ok(())
}

// Keys

pub async fn get_key(
    client: &impl GenericClient,
    ptr: Ptr,
    key_hash: &str,
) -> Result<Option<BigMapKey>, tokio_postgres::Error> {
    tracing::trace!("get_key {ptr} {key_hash}");
    let sql = format!(
        "
        select {KEY_COLUMNS}
        from tw.big_map_keys k
        where k.ptr = $1 and k.key_hash = $2;"
    );
    client
        .query_opt(&sql, &[&ptr, &key_hash])
        .await?
        .map(|row| BigMapKey::try_from_row(&row))
        .transpose()
}

pub async fn insert_key(pgtx: &Transaction<'_>, k: &BigMapKey) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert_key {} {}", k.ptr, k.key_hash);
    let sql = "
        insert into tw.big_map_keys (
            ptr
            , key_hash
            , key
            , value
            , active
            , first_level
            , last_level
            , updates
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8);";
    pgtx.execute(
        sql,
        &[
            &k.ptr,
            &k.key_hash,
            &k.key,
            &k.value,
            &k.active,
            &k.first_level,
            &k.last_level,
            &k.updates,
        ],
    )
    .await?;
    Ok(())
}

pub async fn update_key(pgtx: &Transaction<'_>, k: &BigMapKey) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("update_key {} {}", k.ptr, k.key_hash);
    let sql = "
        update tw.big_map_keys
        set value = $3
            , active = $4
            , last_level = $5
            , updates = $6
        where ptr = $1 and key_hash = $2;";
    pgtx.execute(
        sql,
        &[
            &k.ptr,
            &k.key_hash,
            &k.value,
            &k.active,
            &k.last_level,
            &k.updates,
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete_key(pgtx: &Transaction<'_>, id: i32) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("delete_key {id}");
    pgtx.execute("delete from tw.big_map_keys where id = $1;", &[&id])
        .await?;
    Ok(())
}

// Audit log

pub async fn insert_update(
    pgtx: &Transaction<'_>,
    u: &BigMapUpdate,
) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("insert_update {} {:?}", u.ptr, u.action);
    let sql = "
        insert into tw.big_map_updates (level, ptr, action, key_hash, value)
        values ($1, $2, $3, $4, $5);";
    pgtx.execute(sql, &[&u.level, &u.ptr, &u.action, &u.key_hash, &u.value])
        .await?;
    Ok(())
}

/// Audit rows of given `level`, in insertion order.
pub async fn get_updates_at(
    client: &impl GenericClient,
    level: Level,
) -> Result<Vec<BigMapUpdate>, tokio_postgres::Error> {
    tracing::trace!("get_updates_at {level}");
    let sql = "
        select level
            , ptr
            , action
            , key_hash
            , value
        from tw.big_map_updates
        where level = $1
        order by id;";
    client
        .query(sql, &[&level])
        .await?
        .iter()
        .map(BigMapUpdate::try_from_row)
        .collect()
}

/// Last audit row of a key before `level`.
pub async fn get_last_key_update(
    client: &impl GenericClient,
    ptr: Ptr,
    key_hash: &str,
    level: Level,
) -> Result<Option<BigMapUpdate>, tokio_postgres::Error> {
    tracing::trace!("get_last_key_update {ptr} {key_hash} {level}");
    let sql = "
        select level
            , ptr
            , action
            , key_hash
            , value
        from tw.big_map_updates
        where ptr = $1 and key_hash = $2 and level < $3
        order by id desc
        limit 1;";
    client
        .query_opt(sql, &[&ptr, &key_hash, &level])
        .await?
        .map(|row| BigMapUpdate::try_from_row(&row))
        .transpose()
}

pub async fn delete_updates_at(
    pgtx: &Transaction<'_>,
    level: Level,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_updates_at {level}");
    pgtx.execute(
        "delete from tw.big_map_updates where level = $1;",
        &[&level],
    )
    .await
}
