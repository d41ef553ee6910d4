mod api;
pub mod models;

use api::NodeAPI;
use async_trait::async_trait;
use thiserror::Error;

use self::models::Constants;
use self::models::RawBakingRight;
use self::models::RawDelegate;
use self::models::RawEndorsingRight;
use super::types::Address;
use super::types::BlockHash;
use super::types::CycleIndex;
use super::types::Level;
use super::types::Mutez;
use super::types::RawBlock;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Node is unreachable. Could be a tempory outage but make sure your config is set correctly and the node is running.")]
    NodeUnreachable,
    #[error("Bad node API request: {0}")]
    API400BadRequest(String),
    #[error("Node API request not found: {0}")]
    API404Notfound(String),
    #[error("Error while requesting ({0})")]
    APIError(String),
    #[error("Failed parsing response from {0}")]
    DeserializationError(String),
}

/// Node queries needed to index blocks.
///
/// Everything past `block_at` and `block` is only needed on demand, when
/// locally stored data is insufficient.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Level of the node's current head
    async fn head_level(&self) -> Result<Level, NodeError>;

    /// Main chain block at given `level`
    async fn block_at(&self, level: Level) -> Result<RawBlock, NodeError>;

    /// Block with given `hash`, whether on the main chain or not
    async fn block(&self, hash: &BlockHash) -> Result<RawBlock, NodeError>;

    /// All baking rights of a cycle, up to `max_priority`
    async fn baking_rights(
        &self,
        cycle: CycleIndex,
        max_priority: i32,
    ) -> Result<Vec<RawBakingRight>, NodeError>;

    /// Baking rights at a single level, up to `max_priority`
    async fn baking_rights_at(
        &self,
        level: Level,
        max_priority: i32,
    ) -> Result<Vec<RawBakingRight>, NodeError>;

    /// All endorsing rights of a cycle
    async fn endorsing_rights(&self, cycle: CycleIndex)
        -> Result<Vec<RawEndorsingRight>, NodeError>;

    /// Protocol constants in effect at `level`
    async fn constants(&self, level: Level) -> Result<Constants, NodeError>;

    /// Delegate state of `address` at `level`
    async fn delegate(&self, level: Level, address: &Address) -> Result<RawDelegate, NodeError>;

    /// Balance of `address` at `level`
    async fn balance(&self, level: Level, address: &Address) -> Result<Mutez, NodeError>;
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub api: NodeAPI,
}

impl Node {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: String::from(id),
            api: NodeAPI::new(url),
        }
    }
}

#[async_trait]
impl NodeRpc for Node {
    async fn head_level(&self) -> Result<Level, NodeError> {
        Ok(self.api.head_header().await?.level)
    }

    async fn block_at(&self, level: Level) -> Result<RawBlock, NodeError> {
        self.api.block(&level.to_string()).await
    }

    async fn block(&self, hash: &BlockHash) -> Result<RawBlock, NodeError> {
        self.api.block(hash).await
    }

    async fn baking_rights(
        &self,
        cycle: CycleIndex,
        max_priority: i32,
    ) -> Result<Vec<RawBakingRight>, NodeError> {
        self.api
            .baking_rights(&format!("cycle={cycle}&max_priority={max_priority}&all=true"))
            .await
    }

    async fn baking_rights_at(
        &self,
        level: Level,
        max_priority: i32,
    ) -> Result<Vec<RawBakingRight>, NodeError> {
        self.api
            .baking_rights(&format!("level={level}&max_priority={max_priority}&all=true"))
            .await
    }

    async fn endorsing_rights(
        &self,
        cycle: CycleIndex,
    ) -> Result<Vec<RawEndorsingRight>, NodeError> {
        self.api.endorsing_rights(cycle).await
    }

    async fn constants(&self, level: Level) -> Result<Constants, NodeError> {
        self.api.constants(level).await
    }

    async fn delegate(&self, level: Level, address: &Address) -> Result<RawDelegate, NodeError> {
        self.api.delegate(level, address).await
    }

    async fn balance(&self, level: Level, address: &Address) -> Result<Mutez, NodeError> {
        self.api.balance(level, address).await
    }
}
