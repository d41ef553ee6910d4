use tokio_postgres::Client;

use super::commit::Commit;
use super::commit::Context;
use super::store;
use super::store::app_state;
use crate::commits;
use crate::config::PostgresConfig;
use crate::core::cache::Cache;
use crate::core::types::Head;
use crate::core::types::RawBlock;
use crate::core::NodeRpc;
use crate::error::invariant;
use crate::error::Error;

enum Direction {
    Apply,
    Revert,
}

/// Runs all commits, in order, for each block.
pub struct Pipeline<N: NodeRpc> {
    client: Client,
    node: N,
    cache: Cache,
    head: Head,
    commits: Vec<Box<dyn Commit>>,
}

impl<N: NodeRpc> Pipeline<N> {
    pub async fn new(pgconf: &PostgresConfig, node: N) -> Result<Self, Error> {
        let mut client = store::connect(pgconf).await?;
        store::init(&mut client).await?;
        let head = app_state::get_head(&client).await?;
        tracing::debug!("pipeline is at {head:?}");
        Ok(Self {
            client,
            node,
            cache: Cache::new(),
            head,
            commits: commits::all(),
        })
    }

    /// Last applied block
    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    /// Apply a child of the current head.
    pub async fn apply(&mut self, block: &RawBlock) -> Result<(), Error> {
        tracing::info!("applying block {} {}", block.level, block.hash);
        if !self.head.is_initial()
            && (block.level != self.head.level + 1 || block.predecessor != self.head.hash)
        {
            return Err(invariant(format!(
                "block {} {} is not a child of head {:?}",
                block.level, block.hash, self.head
            )));
        }
        let head = Head::new(block.level, block.hash.clone());
        self.run(block, &head, Direction::Apply).await?;
        self.head = head;
        Ok(())
    }

    /// Revert the current head.
    pub async fn revert(&mut self, block: &RawBlock) -> Result<(), Error> {
        tracing::info!("reverting block {} {}", block.level, block.hash);
        if block.level != self.head.level || block.hash != self.head.hash {
            return Err(invariant(format!(
                "block {} {} is not the head {:?}",
                block.level, block.hash, self.head
            )));
        }
        let head = Head::new(block.level - 1, block.predecessor.clone());
        self.run(block, &head, Direction::Revert).await?;
        self.head = head;
        // Reverted rows may linger in cache
        self.cache.reset();
        Ok(())
    }

    /// Run all commits in a single transaction, resetting the cache on failure.
    async fn run(&mut self, block: &RawBlock, head: &Head, direction: Direction) -> Result<(), Error> {
        let Self {
            client,
            node,
            cache,
            commits,
            ..
        } = self;
        let result = run_commits(client, &*node, cache, &commits[..], block, head, direction).await;
        if let Err(e) = &result {
            tracing::warn!("block {} failed: {e}", block.level);
            cache.reset();
        }
        result
    }
}

async fn run_commits(
    client: &mut Client,
    node: &dyn NodeRpc,
    cache: &mut Cache,
    commits: &[Box<dyn Commit>],
    block: &RawBlock,
    head: &Head,
    direction: Direction,
) -> Result<(), Error> {
    let pgtx = client.transaction().await?;
    let mut ctx = Context {
        pgtx: &pgtx,
        cache,
        node,
    };
    match direction {
        Direction::Apply => {
            for commit in commits {
                tracing::debug!("applying {} for {}", commit.name(), block.level);
                commit.apply(&mut ctx, block).await?;
            }
        }
        Direction::Revert => {
            ctx.cache.load_block(&pgtx, block.level).await?;
            for commit in commits.iter().rev() {
                tracing::debug!("reverting {} for {}", commit.name(), block.level);
                commit.revert(&mut ctx, block).await?;
            }
        }
    }
    app_state::update_head(&pgtx, head).await?;
    pgtx.commit().await?;
    Ok(())
}
