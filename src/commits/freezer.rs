//! Balance updates reported by the node.
use async_trait::async_trait;

use crate::core::entities::Account;
use crate::core::types::BalanceUpdate;
use crate::core::types::FreezerCategory;
use crate::core::types::Mutez;
use crate::core::types::RawBlock;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

pub struct FreezerCommit;

#[async_trait]
impl Commit for FreezerCommit {
    fn name(&self) -> &'static str {
        "freezer"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        for update in &raw.balance_updates {
            apply_update(ctx, raw, update, 1).await?;
        }
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        for update in raw.balance_updates.iter().rev() {
            apply_update(ctx, raw, update, -1).await?;
        }
        Ok(())
    }
}

/// Apply a balance update, negated when `sign` is -1.
async fn apply_update(
    ctx: &mut Context<'_, '_>,
    raw: &RawBlock,
    update: &BalanceUpdate,
    sign: i64,
) -> Result<(), Error> {
    let change = sign * update.change();
    let account = ctx
        .cache
        .get_or_create_account(ctx.pgtx, update.address(), raw.level)
        .await?;
    let id = account.id;
    if let BalanceUpdate::Freezer { category, .. } = update {
        let mut account = account;
        freeze(&mut account, *category, change);
        ctx.cache.update_account(ctx.pgtx, account).await?;
    }
    ctx.cache.credit(ctx.pgtx, id, change).await
}

fn freeze(account: &mut Account, category: FreezerCategory, change: Mutez) {
    match category {
        FreezerCategory::Deposits => account.frozen_deposits += change,
        FreezerCategory::Rewards => account.frozen_rewards += change,
        FreezerCategory::Fees => account.frozen_fees += change,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn freeze_moves_matching_category_only() {
        let mut a = Account::new(1, "tz1a", 1);
        freeze(&mut a, FreezerCategory::Rewards, 500);
        freeze(&mut a, FreezerCategory::Rewards, -200);
        freeze(&mut a, FreezerCategory::Fees, 7);
        assert_eq!(a.frozen_rewards, 300);
        assert_eq!(a.frozen_fees, 7);
        assert_eq!(a.frozen_deposits, 0);
    }
}
