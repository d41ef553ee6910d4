use async_trait::async_trait;
use tokio_postgres::Transaction;

use crate::core::cache::Cache;
use crate::core::types::RawBlock;
use crate::core::NodeRpc;
use crate::error::Error;

/// Everything a commit can touch while processing a block.
pub struct Context<'a, 'tx> {
    /// Transaction spanning all commits of the block
    pub pgtx: &'a Transaction<'tx>,
    pub cache: &'a mut Cache,
    pub node: &'a dyn NodeRpc,
}

/// An invertible unit of derived state changes.
///
/// `revert` must undo exactly what `apply` did for the same block. It is only
/// ever called on the last applied block, after all later commits have been
/// reverted.
#[async_trait]
pub trait Commit: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, ctx: &mut Context<'_, '_>, block: &RawBlock) -> Result<(), Error>;

    async fn revert(&self, ctx: &mut Context<'_, '_>, block: &RawBlock) -> Result<(), Error>;
}
