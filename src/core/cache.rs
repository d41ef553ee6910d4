//! In-memory copies of hot rows.
//!
//! Reads go through the cache, writes go through the cache to the open
//! transaction, so both stay in lockstep. The cache must be reset whenever a
//! transaction is abandoned.
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use tokio_postgres::Transaction;

use super::entities::Account;
use super::entities::BakerCycle;
use super::entities::BakingRight;
use super::entities::Block;
use super::entities::Counter;
use super::entities::Statistics;
use super::protocol::Protocol;
use super::store::accounts;
use super::store::baker_cycles;
use super::store::blocks;
use super::store::protocols;
use super::store::rights;
use super::store::statistics;
use super::types::AccountID;
use super::types::CycleIndex;
use super::types::Level;
use super::types::Mutez;
use crate::constants::settings::ACCOUNTS_CACHE_SIZE;
use crate::error::invariant;
use crate::error::Error;

#[derive(Debug)]
pub struct Cache {
    accounts: LruCache<AccountID, Account>,
    /// Maps addresses to account id's
    addresses: LruCache<String, AccountID>,
    /// Block being processed
    block: Option<Block>,
    protocol: Option<Protocol>,
    /// Rights at a single level
    rights: Option<(Level, Vec<BakingRight>)>,
    /// Baker cycles of loaded cycles, by baker
    baker_cycles: HashMap<CycleIndex, HashMap<AccountID, BakerCycle>>,
    /// Last statistics row
    statistics: Option<Statistics>,
}

impl Cache {
    pub fn new() -> Self {
        let size = NonZeroUsize::new(ACCOUNTS_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            accounts: LruCache::new(size),
            addresses: LruCache::new(size),
            block: None,
            protocol: None,
            rights: None,
            baker_cycles: HashMap::new(),
            statistics: None,
        }
    }

    /// Drop all cached rows.
    pub fn reset(&mut self) {
        tracing::debug!("resetting cache");
        self.accounts.clear();
        self.addresses.clear();
        self.block = None;
        self.protocol = None;
        self.rights = None;
        self.baker_cycles.clear();
        self.statistics = None;
    }
}

/// Accounts
impl Cache {
    /// Get account with given `id`, which must exist.
    pub async fn account(&mut self, pgtx: &Transaction<'_>, id: AccountID) -> Result<Account, Error> {
        if let Some(a) = self.accounts.get(&id) {
            return Ok(a.clone());
        }
        match accounts::get(pgtx, id).await? {
            Some(a) => {
                self.put_account(a.clone());
                Ok(a)
            }
            None => Err(invariant(format!("unknown account id {id}"))),
        }
    }

    pub async fn find_account(
        &mut self,
        pgtx: &Transaction<'_>,
        address: &str,
    ) -> Result<Option<Account>, Error> {
        if let Some(id) = self.addresses.get(address).copied() {
            return self.account(pgtx, id).await.map(Some);
        }
        let account = accounts::get_by_address(pgtx, address).await?;
        if let Some(a) = &account {
            self.put_account(a.clone());
        }
        Ok(account)
    }

    /// Get account with given `address`, which must exist.
    pub async fn account_by_address(
        &mut self,
        pgtx: &Transaction<'_>,
        address: &str,
    ) -> Result<Account, Error> {
        self.find_account(pgtx, address)
            .await?
            .ok_or_else(|| invariant(format!("unknown account {address}")))
    }

    /// Get account with given `address`, creating it at `level` if new.
    pub async fn get_or_create_account(
        &mut self,
        pgtx: &Transaction<'_>,
        address: &str,
        level: Level,
    ) -> Result<Account, Error> {
        if let Some(a) = self.find_account(pgtx, address).await? {
            return Ok(a);
        }
        let account = accounts::insert(pgtx, address, level).await?;
        self.put_account(account.clone());
        Ok(account)
    }

    pub async fn update_account(
        &mut self,
        pgtx: &Transaction<'_>,
        account: Account,
    ) -> Result<(), Error> {
        accounts::update(pgtx, &account).await?;
        self.put_account(account);
        Ok(())
    }

    /// Add `amount` to the balance of an account and to the staking balance
    /// of its delegate.
    pub async fn credit(
        &mut self,
        pgtx: &Transaction<'_>,
        id: AccountID,
        amount: Mutez,
    ) -> Result<(), Error> {
        if amount == 0 {
            return Ok(());
        }
        let mut account = self.account(pgtx, id).await?;
        account.balance += amount;
        account.staking_balance += amount;
        let delegate_id = account.external_delegate();
        self.update_account(pgtx, account).await?;
        if let Some(delegate_id) = delegate_id {
            let mut delegate = self.account(pgtx, delegate_id).await?;
            delegate.delegated_balance += amount;
            delegate.staking_balance += amount;
            self.update_account(pgtx, delegate).await?;
        }
        Ok(())
    }

    fn put_account(&mut self, account: Account) {
        self.addresses.put(account.address.clone(), account.id);
        self.accounts.put(account.id, account);
    }
}

/// Blocks and protocols
impl Cache {
    /// Block being processed.
    pub fn block(&self) -> Result<&Block, Error> {
        self.block
            .as_ref()
            .ok_or_else(|| invariant("no current block"))
    }

    pub fn set_block(&mut self, block: Option<Block>) {
        self.block = block;
    }

    /// Load block at `level` as current block.
    pub async fn load_block(&mut self, pgtx: &Transaction<'_>, level: Level) -> Result<(), Error> {
        match blocks::get(pgtx, level).await? {
            Some(b) => {
                self.block = Some(b);
                Ok(())
            }
            None => Err(invariant(format!("no block at level {level}"))),
        }
    }

    /// Current protocol, if any.
    pub async fn find_protocol(&mut self, pgtx: &Transaction<'_>) -> Result<Option<Protocol>, Error> {
        if self.protocol.is_none() {
            self.protocol = protocols::get_last(pgtx).await?;
        }
        Ok(self.protocol.clone())
    }

    /// Current protocol, which must exist.
    pub async fn protocol(&mut self, pgtx: &Transaction<'_>) -> Result<Protocol, Error> {
        self.find_protocol(pgtx)
            .await?
            .ok_or_else(|| invariant("no protocol"))
    }

    pub fn set_protocol(&mut self, protocol: Option<Protocol>) {
        self.protocol = protocol;
    }
}

/// Rights
impl Cache {
    /// Rights at given `level`.
    pub async fn rights_at(
        &mut self,
        pgtx: &Transaction<'_>,
        level: Level,
    ) -> Result<Vec<BakingRight>, Error> {
        match &self.rights {
            Some((l, rights)) if *l == level => Ok(rights.clone()),
            _ => {
                let rights = rights::get_at(pgtx, level).await?;
                self.rights = Some((level, rights.clone()));
                Ok(rights)
            }
        }
    }

    /// Persist status of a right at the cached level.
    pub async fn update_right(
        &mut self,
        pgtx: &Transaction<'_>,
        right: &BakingRight,
    ) -> Result<(), Error> {
        rights::update_status(pgtx, right).await?;
        if let Some((level, cached)) = &mut self.rights {
            if *level == right.level {
                for r in cached.iter_mut() {
                    if r.baker_id == right.baker_id
                        && r.kind == right.kind
                        && r.priority == right.priority
                    {
                        r.status = right.status;
                    }
                }
            }
        }
        Ok(())
    }

    /// Forget cached rights, after rights got inserted or deleted.
    pub fn invalidate_rights(&mut self) {
        self.rights = None;
    }
}

/// Baker cycles
impl Cache {
    /// Rows of `cycle`, loading the whole cycle on first access.
    async fn cycle_bakers(
        &mut self,
        pgtx: &Transaction<'_>,
        cycle: CycleIndex,
    ) -> Result<&mut HashMap<AccountID, BakerCycle>, Error> {
        if !self.baker_cycles.contains_key(&cycle) {
            let rows = baker_cycles::get_cycle(pgtx, cycle).await?;
            tracing::debug!("loaded {} baker cycles of cycle {cycle}", rows.len());
            let rows = rows.into_iter().map(|bc| (bc.baker_id, bc)).collect();
            self.baker_cycles.insert(cycle, rows);
        }
        self.baker_cycles
            .get_mut(&cycle)
            .ok_or_else(|| invariant(format!("baker cycles of {cycle} not loaded")))
    }

    /// Add `changes` to a baker cycle. Returns false if the row doesn't exist.
    pub async fn add_to_baker_cycle(
        &mut self,
        pgtx: &Transaction<'_>,
        cycle: CycleIndex,
        baker_id: AccountID,
        changes: &[(Counter, i64)],
    ) -> Result<bool, Error> {
        let rows = self.cycle_bakers(pgtx, cycle).await?;
        let Some(bc) = rows.get_mut(&baker_id) else {
            return Ok(false);
        };
        baker_cycles::add(pgtx, cycle, baker_id, changes).await?;
        for (counter, amount) in changes {
            bc.add(*counter, *amount);
        }
        Ok(true)
    }

    /// Forget cached baker cycles, after rows got inserted or deleted in bulk.
    pub fn invalidate_baker_cycles(&mut self) {
        self.baker_cycles.clear();
    }
}

/// Statistics
impl Cache {
    pub async fn statistics(&mut self, pgtx: &Transaction<'_>) -> Result<Option<Statistics>, Error> {
        if self.statistics.is_none() {
            self.statistics = statistics::get_last(pgtx).await?;
        }
        Ok(self.statistics.clone())
    }

    pub fn set_statistics(&mut self, statistics: Option<Statistics>) {
        self.statistics = statistics;
    }
}
