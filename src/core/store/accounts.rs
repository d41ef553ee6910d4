use postgres_from_row::FromRow;
use tokio_postgres::GenericClient;
use tokio_postgres::Transaction;

use crate::core::entities::Account;
use crate::core::types::AccountID;
use crate::core::types::Level;

const COLUMNS: &str = "
    id
    , address
    , first_level
    , balance
    , frozen_deposits
    , frozen_rewards
    , frozen_fees
    , delegate_id
    , is_baker
    , deactivation_level
    , staking_balance
    , delegated_balance
    , delegators_count
    , blocks_count";

pub async fn get(
    client: &impl GenericClient,
    id: AccountID,
) -> Result<Option<Account>, tokio_postgres::Error> {
    tracing::trace!("get {id}");
    let sql = format!("select {COLUMNS} from tw.accounts where id = $1;");
    client
        .query_opt(&sql, &[&id])
        .await?
        .map(|row| Account::try_from_row(&row))
        .transpose()
}

pub async fn get_by_address(
    client: &impl GenericClient,
    address: &str,
) -> Result<Option<Account>, tokio_postgres::Error> {
    tracing::trace!("get_by_address {address}");
    let sql = format!("select {COLUMNS} from tw.accounts where address = $1;");
    client
        .query_opt(&sql, &[&address])
        .await?
        .map(|row| Account::try_from_row(&row))
        .transpose()
}

/// Accounts holding or receiving stake: active bakers, delegators and delegation targets.
pub async fn get_staked(client: &impl GenericClient) -> Result<Vec<Account>, tokio_postgres::Error> {
    tracing::trace!("get_staked");
    let sql = format!(
        "
        select {COLUMNS}
        from tw.accounts
        where (is_baker and deactivation_level is null)
            or delegate_id is not null
            or delegators_count > 0
        order by id;"
    );
    client
        .query(&sql, &[])
        .await?
        .iter()
        .map(Account::try_from_row)
        .collect()
}

pub async fn get_active_bakers(
    client: &impl GenericClient,
) -> Result<Vec<Account>, tokio_postgres::Error> {
    tracing::trace!("get_active_bakers");
    let sql = format!(
        "
        select {COLUMNS}
        from tw.accounts
        where is_baker and deactivation_level is null
        order by id;"
    );
    client
        .query(&sql, &[])
        .await?
        .iter()
        .map(Account::try_from_row)
        .collect()
}

/// Insert a blank account and return it.
pub async fn insert(
    pgtx: &Transaction<'_>,
    address: &str,
    level: Level,
) -> Result<Account, tokio_postgres::Error> {
    tracing::trace!("insert {address} at {level}");
    let sql = "
        insert into tw.accounts (
            address
            , first_level
            , balance
            , frozen_deposits
            , frozen_rewards
            , frozen_fees
            , is_baker
            , staking_balance
            , delegated_balance
            , delegators_count
            , blocks_count
        )
        values ($1, $2, 0, 0, 0, 0, false, 0, 0, 0, 0)
        returning id;";
    let row = pgtx.query_one(sql, &[&address, &level]).await?;
    Ok(Account::new(row.get(0), address, level))
}

pub async fn update(pgtx: &Transaction<'_>, account: &Account) -> Result<(), tokio_postgres::Error> {
    tracing::trace!("update {}", account.id);
    let sql = "
        update tw.accounts
        set balance = $2
            , frozen_deposits = $3
            , frozen_rewards = $4
            , frozen_fees = $5
            , delegate_id = $6
            , is_baker = $7
            , deactivation_level = $8
            , staking_balance = $9
            , delegated_balance = $10
            , delegators_count = $11
            , blocks_count = $12
        where id = $1;";
    pgtx.execute(
        sql,
        &[
            &account.id,
            &account.balance,
            &account.frozen_deposits,
            &account.frozen_rewards,
            &account.frozen_fees,
            &account.delegate_id,
            &account.is_baker,
            &account.deactivation_level,
            &account.staking_balance,
            &account.delegated_balance,
            &account.delegators_count,
            &account.blocks_count,
        ],
    )
    .await?;
    Ok(())
}

/// Delete accounts first seen at given `level`.
pub async fn delete_created_at(
    pgtx: &Transaction<'_>,
    level: Level,
) -> Result<u64, tokio_postgres::Error> {
    tracing::trace!("delete_created_at {level}");
    pgtx.execute("delete from tw.accounts where first_level = $1;", &[&level])
        .await
}
