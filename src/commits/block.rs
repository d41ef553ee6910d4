//! Block rows, protocol upgrades and the frozen balance effects of baking.
use async_trait::async_trait;

use crate::core::entities::Block;
use crate::core::protocol::Protocol;
use crate::core::store::accounts;
use crate::core::store::blocks;
use crate::core::store::protocols;
use crate::core::types::BlockEvents;
use crate::core::types::RawBlock;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

pub struct BlockCommit;

#[async_trait]
impl Commit for BlockCommit {
    fn name(&self) -> &'static str {
        "block"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let mut events = BlockEvents::default();
        let protocol = match ctx.cache.find_protocol(ctx.pgtx).await? {
            None => {
                events.set(BlockEvents::ACTIVATION);
                create_protocol(ctx, raw, 1).await?
            }
            Some(p) if p.hash != raw.protocol => {
                events.set(BlockEvents::PROTOCOL_BEGIN);
                create_protocol(ctx, raw, p.code + 1).await?
            }
            Some(p) => p,
        };
        events.set(position_events(raw, &protocol).0);

        let mut baker = ctx
            .cache
            .get_or_create_account(ctx.pgtx, &raw.baker, raw.level)
            .await?;
        let block = Block {
            level: raw.level,
            hash: raw.hash.clone(),
            cycle: raw.cycle,
            cycle_position: raw.cycle_position,
            timestamp: raw.timestamp,
            protocol_code: protocol.code,
            priority: raw.priority,
            baker_id: baker.id,
            validations: raw.validations(),
            reward: raw.reward,
            deposit: raw.deposit,
            fees: raw.fees,
            events: events.0,
            operations: raw.operations_mask(),
        };
        blocks::insert(ctx.pgtx, &block).await?;
        ctx.cache.set_block(Some(block));

        baker.frozen_deposits += raw.deposit;
        baker.frozen_rewards += raw.reward;
        baker.frozen_fees += raw.fees;
        baker.blocks_count += 1;
        let baker_id = baker.id;
        ctx.cache.update_account(ctx.pgtx, baker).await?;
        ctx.cache
            .credit(ctx.pgtx, baker_id, raw.reward + raw.fees)
            .await?;
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, _raw: &RawBlock) -> Result<(), Error> {
        let block = ctx.cache.block()?.clone();
        ctx.cache
            .credit(ctx.pgtx, block.baker_id, -(block.reward + block.fees))
            .await?;
        let mut baker = ctx.cache.account(ctx.pgtx, block.baker_id).await?;
        baker.frozen_deposits -= block.deposit;
        baker.frozen_rewards -= block.reward;
        baker.frozen_fees -= block.fees;
        baker.blocks_count -= 1;
        ctx.cache.update_account(ctx.pgtx, baker).await?;

        blocks::delete(ctx.pgtx, block.level).await?;
        let n = accounts::delete_created_at(ctx.pgtx, block.level).await?;
        tracing::debug!("deleted {n} accounts created at {}", block.level);

        let events = block.events();
        if events.is_activation() || events.is_protocol_begin() {
            protocols::delete(ctx.pgtx, block.protocol_code).await?;
            ctx.cache.set_protocol(None);
        }
        ctx.cache.set_block(None);
        Ok(())
    }
}

async fn create_protocol(
    ctx: &mut Context<'_, '_>,
    raw: &RawBlock,
    code: i32,
) -> Result<Protocol, Error> {
    tracing::info!("new protocol {code} {} at {}", raw.protocol, raw.level);
    let constants = ctx.node.constants(raw.level).await?;
    let protocol = Protocol::new(
        code,
        &raw.protocol,
        raw.level,
        raw.cycle,
        raw.cycle_position,
        &constants,
    );
    protocols::insert(ctx.pgtx, &protocol).await?;
    ctx.cache.set_protocol(Some(protocol.clone()));
    Ok(protocol)
}

/// Events implied by the block's position within cycles and voting periods.
fn position_events(raw: &RawBlock, protocol: &Protocol) -> BlockEvents {
    let mut events = BlockEvents::default();
    if raw.cycle_position == 0 {
        events.set(BlockEvents::CYCLE_BEGIN);
    }
    if raw.cycle_position == protocol.blocks_per_cycle - 1 {
        events.set(BlockEvents::CYCLE_END);
    }
    if protocol.is_snapshot_position(raw.cycle_position) {
        events.set(BlockEvents::BALANCE_SNAPSHOT);
    }
    let voting_position = protocol.voting_period_position(raw.level);
    if voting_position == 0 {
        events.set(BlockEvents::VOTING_PERIOD_BEGIN);
    }
    if voting_position == protocol.blocks_per_voting_period - 1 {
        events.set(BlockEvents::VOTING_PERIOD_END);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_block_of_cycle_and_period() {
        let p = Protocol::dummy();
        let raw = RawBlock::dummy().level(17).cycle(2, 0);
        let events = position_events(&raw, &p);
        assert!(events.is_cycle_begin());
        assert!(!events.is_cycle_end());
        assert!(!events.is_balance_snapshot());
        assert!(events.has(BlockEvents::VOTING_PERIOD_BEGIN));
        assert!(!events.is_voting_period_end());
    }

    #[test]
    fn last_block_of_cycle_is_a_snapshot() {
        let p = Protocol::dummy();
        let raw = RawBlock::dummy().level(16).cycle(1, 7);
        let events = position_events(&raw, &p);
        assert!(events.is_cycle_end());
        assert!(events.is_balance_snapshot());
        assert!(events.is_voting_period_end());
        assert!(!events.is_cycle_begin());
    }

    #[test]
    fn mid_cycle_block() {
        let p = Protocol::dummy();
        let raw = RawBlock::dummy().level(11).cycle(1, 2);
        assert_eq!(position_events(&raw, &p), BlockEvents::default());
    }
}
