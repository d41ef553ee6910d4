//! Baker registrations, delegation changes and deactivations.
//!
//! Every change is recorded in `tw.delegations` with the state it replaced,
//! which is all a revert needs.
pub(crate) mod store;

use async_trait::async_trait;
use postgres_from_row::FromRow;
use postgres_types::FromSql;
use postgres_types::ToSql;

use crate::core::entities::Account;
use crate::core::types::AccountID;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "delegation_kind")]
pub enum DelegationKind {
    /// Self delegation, (re)activating a baker
    #[postgres(name = "registration")]
    Registration,
    #[postgres(name = "delegation")]
    Delegation,
    #[postgres(name = "withdrawal")]
    Withdrawal,
    #[postgres(name = "deactivation")]
    Deactivation,
}

/// A delegation state change and the state it replaced.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DelegationChange {
    pub level: Level,
    /// Position within the block. Deactivations come after operations.
    pub index: i32,
    pub kind: DelegationKind,
    pub sender_id: AccountID,
    pub prev_delegate_id: Option<AccountID>,
    pub new_delegate_id: Option<AccountID>,
    pub prev_is_baker: bool,
    pub prev_deactivation_level: Option<Level>,
}

impl DelegationChange {
    fn new(level: Level, index: i32, kind: DelegationKind, sender: &Account) -> Self {
        Self {
            level,
            index,
            kind,
            sender_id: sender.id,
            prev_delegate_id: sender.delegate_id,
            new_delegate_id: sender.delegate_id,
            prev_is_baker: sender.is_baker,
            prev_deactivation_level: sender.deactivation_level,
        }
    }

    /// Previous delegate, other than the sender itself.
    pub fn prev_external_delegate(&self) -> Option<AccountID> {
        self.prev_delegate_id.filter(|d| *d != self.sender_id)
    }
}

pub struct DelegationsCommit;

#[async_trait]
impl Commit for DelegationsCommit {
    fn name(&self) -> &'static str {
        "delegations"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let ops = &raw.operations.delegations;
        for (i, op) in ops.iter().enumerate() {
            let sender = ctx
                .cache
                .get_or_create_account(ctx.pgtx, &op.sender, raw.level)
                .await?;
            let target = match &op.delegate {
                Some(address) => Some(
                    ctx.cache
                        .get_or_create_account(ctx.pgtx, address, raw.level)
                        .await?,
                ),
                None => None,
            };
            let kind = classify(&sender, target.as_ref())?;
            let mut change = DelegationChange::new(raw.level, i as i32, kind, &sender);
            change.new_delegate_id = target.as_ref().map(|t| t.id);

            if let Some(prev) = change.prev_external_delegate() {
                move_stake(ctx, prev, -sender.balance, -1).await?;
            }
            if let (DelegationKind::Delegation, Some(target)) = (kind, &target) {
                move_stake(ctx, target.id, sender.balance, 1).await?;
            }
            let mut sender = ctx.cache.account(ctx.pgtx, sender.id).await?;
            sender.delegate_id = change.new_delegate_id;
            if kind == DelegationKind::Registration {
                sender.is_baker = true;
                sender.deactivation_level = None;
            }
            ctx.cache.update_account(ctx.pgtx, sender).await?;
            store::insert(ctx.pgtx, &change).await?;
        }

        for (j, address) in raw.deactivated.iter().enumerate() {
            let mut baker = ctx.cache.account_by_address(ctx.pgtx, address).await?;
            let index = (ops.len() + j) as i32;
            let change =
                DelegationChange::new(raw.level, index, DelegationKind::Deactivation, &baker);
            baker.deactivation_level = Some(raw.level);
            ctx.cache.update_account(ctx.pgtx, baker).await?;
            store::insert(ctx.pgtx, &change).await?;
        }
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let changes = store::get_at(ctx.pgtx, raw.level).await?;
        for change in changes.iter().rev() {
            let sender = ctx.cache.account(ctx.pgtx, change.sender_id).await?;
            if change.kind == DelegationKind::Delegation {
                if let Some(target) = change.new_delegate_id {
                    move_stake(ctx, target, -sender.balance, -1).await?;
                }
            }
            if change.kind != DelegationKind::Deactivation {
                if let Some(prev) = change.prev_external_delegate() {
                    move_stake(ctx, prev, sender.balance, 1).await?;
                }
            }
            let mut sender = ctx.cache.account(ctx.pgtx, change.sender_id).await?;
            sender.delegate_id = change.prev_delegate_id;
            sender.is_baker = change.prev_is_baker;
            sender.deactivation_level = change.prev_deactivation_level;
            ctx.cache.update_account(ctx.pgtx, sender).await?;
        }
        store::delete_at(ctx.pgtx, raw.level).await?;
        Ok(())
    }
}

/// Kind of a delegation operation from `sender` to `target`.
fn classify(sender: &Account, target: Option<&Account>) -> Result<DelegationKind, Error> {
    match target {
        Some(t) if t.id == sender.id => Ok(DelegationKind::Registration),
        _ if sender.is_baker => Err(invariant(format!(
            "baker {} cannot delegate away",
            sender.address
        ))),
        Some(_) => Ok(DelegationKind::Delegation),
        None => Ok(DelegationKind::Withdrawal),
    }
}

/// Add `amount` to the delegated and staking balances of a delegate.
async fn move_stake(
    ctx: &mut Context<'_, '_>,
    delegate_id: AccountID,
    amount: Mutez,
    delegators: i32,
) -> Result<(), Error> {
    let mut delegate = ctx.cache.account(ctx.pgtx, delegate_id).await?;
    delegate.delegated_balance += amount;
    delegate.staking_balance += amount;
    delegate.delegators_count += delegators;
    ctx.cache.update_account(ctx.pgtx, delegate).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn account(id: AccountID, is_baker: bool) -> Account {
        let mut a = Account::new(id, &format!("tz1{id}"), 1);
        a.is_baker = is_baker;
        a
    }

    #[test]
    fn self_delegation_registers() {
        let a = account(1, false);
        assert_eq!(classify(&a, Some(&a)).unwrap(), DelegationKind::Registration);
        let b = account(2, true);
        assert_eq!(classify(&b, Some(&b)).unwrap(), DelegationKind::Registration);
    }

    #[test]
    fn delegation_and_withdrawal() {
        let a = account(1, false);
        let b = account(2, true);
        assert_eq!(classify(&a, Some(&b)).unwrap(), DelegationKind::Delegation);
        assert_eq!(classify(&a, None).unwrap(), DelegationKind::Withdrawal);
    }

    #[test]
    fn bakers_cannot_delegate_away() {
        let a = account(1, true);
        let b = account(2, true);
        assert!(classify(&a, Some(&b)).unwrap_err().is_fatal());
        assert!(classify(&a, None).is_err());
    }

    #[test]
    fn previous_self_delegation_is_not_external() {
        let mut a = account(3, true);
        a.delegate_id = Some(3);
        let change = DelegationChange::new(10, 0, DelegationKind::Registration, &a);
        assert_eq!(change.prev_external_delegate(), None);
        a.delegate_id = Some(5);
        let change = DelegationChange::new(10, 0, DelegationKind::Delegation, &a);
        assert_eq!(change.prev_external_delegate(), Some(5));
    }
}
