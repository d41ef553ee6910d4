//! Future rights of upcoming cycles and their resolution, level by level.
mod parsing;

use std::collections::HashMap;

use async_trait::async_trait;

use super::created_cycles;
use crate::constants::settings::MAX_PRIORITY_FETCHED;
use crate::core::entities::BakingRight;
use crate::core::entities::Block;
use crate::core::node::models::RawBakingRight;
use crate::core::node::models::RawEndorsingRight;
use crate::core::protocol::Protocol;
use crate::core::store::rights;
use crate::core::types::AccountID;
use crate::core::types::Address;
use crate::core::types::CycleIndex;
use crate::core::types::Level;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

pub struct BakingRightsCommit;

#[async_trait]
impl Commit for BakingRightsCommit {
    fn name(&self) -> &'static str {
        "baking_rights"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;
        let block = ctx.cache.block()?.clone();
        let events = block.events();

        let cycles = created_cycles(&block, &protocol);
        if !cycles.is_empty() {
            // Keep rights from the current level on when activating mid cycle
            let min_level = if events.is_activation() {
                block.level
            } else {
                Level::MIN
            };
            for cycle in cycles {
                load_cycle(ctx, &protocol, cycle, raw.level, min_level).await?;
            }
            if !events.is_activation() {
                let n = rights::delete_ineligible(ctx.pgtx, block.cycle).await?;
                tracing::debug!("deleted {n} rights of ineligible bakers in cycle {}", block.cycle);
            }
            ctx.cache.invalidate_rights();
        }

        let mut current = ctx.cache.rights_at(ctx.pgtx, block.level).await?;
        if parsing::max_priority(&current).map_or(true, |p| p < block.priority) {
            load_missing(ctx, &protocol, &block, &current).await?;
            ctx.cache.invalidate_rights();
            current = ctx.cache.rights_at(ctx.pgtx, block.level).await?;
        }

        let mut endorsements: HashMap<AccountID, i32> = HashMap::new();
        if !events.is_activation() {
            for e in &raw.operations.endorsements {
                let endorser = ctx
                    .cache
                    .find_account(ctx.pgtx, &e.delegate)
                    .await?
                    .ok_or_else(|| invariant(format!("unknown endorser {}", e.delegate)))?;
                *endorsements.entry(endorser.id).or_default() += e.slots;
            }
        }
        let mut available = HashMap::new();
        for r in &current {
            if !available.contains_key(&r.baker_id) {
                let baker = ctx.cache.account(ctx.pgtx, r.baker_id).await?;
                available.insert(r.baker_id, baker.available());
            }
        }

        let resolution = parsing::resolve(
            &protocol,
            &block,
            &current,
            &endorsements,
            &available,
            !events.is_activation(),
        )?;
        for right in &resolution.updated {
            ctx.cache.update_right(ctx.pgtx, right).await?;
        }
        if resolution.has_unused {
            rights::delete_above_priority(ctx.pgtx, block.level, block.priority).await?;
            ctx.cache.invalidate_rights();
        }
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, _raw: &RawBlock) -> Result<(), Error> {
        let protocol = ctx.cache.protocol(ctx.pgtx).await?;
        let block = ctx.cache.block()?.clone();
        rights::reset_at(ctx.pgtx, block.level).await?;
        for cycle in created_cycles(&block, &protocol) {
            let n = rights::delete_cycle(ctx.pgtx, cycle).await?;
            tracing::debug!("deleted {n} rights of cycle {cycle}");
        }
        ctx.cache.invalidate_rights();
        Ok(())
    }
}

/// Fetch, validate and store all rights of a future `cycle`.
async fn load_cycle(
    ctx: &mut Context<'_, '_>,
    protocol: &Protocol,
    cycle: CycleIndex,
    level: Level,
    min_level: Level,
) -> Result<(), Error> {
    tracing::debug!("fetching rights of cycle {cycle}");
    let (baking, endorsing) = tokio::try_join!(
        ctx.node.baking_rights(cycle, MAX_PRIORITY_FETCHED),
        ctx.node.endorsing_rights(cycle),
    )?;
    parsing::validate(protocol, cycle, &baking, &endorsing)?;
    let ids = map_bakers(ctx, &baking, &endorsing, level).await?;
    let rights = parsing::future_rights(protocol, &baking, &endorsing, &ids, min_level)?;
    let n = rights::insert_many(ctx.pgtx, &rights).await?;
    tracing::debug!("inserted {n} rights for cycle {cycle}");
    Ok(())
}

/// Fetch baking rights at the block's level up to its priority and store
/// those not known yet.
async fn load_missing(
    ctx: &mut Context<'_, '_>,
    protocol: &Protocol,
    block: &Block,
    current: &[BakingRight],
) -> Result<(), Error> {
    let known = parsing::max_priority(current).unwrap_or(-1);
    tracing::debug!(
        "fetching rights at {} for priorities {} to {}",
        block.level,
        known + 1,
        block.priority
    );
    let fetched: Vec<RawBakingRight> = ctx
        .node
        .baking_rights_at(block.level, block.priority)
        .await?
        .into_iter()
        .filter(|r| r.level == block.level && r.priority > known)
        .collect();
    let ids = map_bakers(ctx, &fetched, &[], block.level).await?;
    let rights = parsing::future_rights(protocol, &fetched, &[], &ids, block.level)?;
    rights::insert_many(ctx.pgtx, &rights).await?;
    Ok(())
}

/// Account ids of all bakers with rights, creating accounts as needed.
async fn map_bakers(
    ctx: &mut Context<'_, '_>,
    baking: &[RawBakingRight],
    endorsing: &[RawEndorsingRight],
    level: Level,
) -> Result<HashMap<Address, AccountID>, Error> {
    let mut ids = HashMap::new();
    let addresses = baking
        .iter()
        .map(|r| &r.delegate)
        .chain(endorsing.iter().map(|r| &r.delegate));
    for address in addresses {
        if !ids.contains_key(address) {
            let account = ctx
                .cache
                .get_or_create_account(ctx.pgtx, address, level)
                .await?;
            ids.insert(address.clone(), account.id);
        }
    }
    Ok(ids)
}
