use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tw::core::node::models::Constants;
use tw::core::node::models::RawBakingRight;
use tw::core::node::models::RawDelegate;
use tw::core::node::models::RawEndorsingRight;
use tw::core::node::NodeError;
use tw::core::protocol::Protocol;
use tw::core::types::Address;
use tw::core::types::BlockHash;
use tw::core::types::CycleIndex;
use tw::core::types::Level;
use tw::core::types::Mutez;
use tw::core::types::RawBlock;
use tw::core::NodeRpc;

/// In-memory node where a single baker holds every right.
pub struct MockNode {
    pub protocol: Protocol,
    pub baker: Address,
    /// Blocks by hash
    blocks: Mutex<HashMap<BlockHash, RawBlock>>,
    /// Main chain hashes by level
    main_chain: Mutex<HashMap<Level, BlockHash>>,
}

impl MockNode {
    pub fn new(baker: &str) -> Self {
        Self {
            protocol: Protocol::dummy(),
            baker: baker.to_owned(),
            blocks: Mutex::new(HashMap::new()),
            main_chain: Mutex::new(HashMap::new()),
        }
    }

    /// Make `block` the main chain block at its level.
    pub fn push(&self, block: &RawBlock) {
        self.blocks
            .lock()
            .unwrap()
            .insert(block.hash.clone(), block.clone());
        self.main_chain
            .lock()
            .unwrap()
            .insert(block.level, block.hash.clone());
    }

    fn levels(&self, cycle: CycleIndex) -> std::ops::RangeInclusive<Level> {
        self.protocol.first_level_of(cycle)..=self.protocol.last_level_of(cycle)
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn head_level(&self) -> Result<Level, NodeError> {
        Ok(self
            .main_chain
            .lock()
            .unwrap()
            .keys()
            .max()
            .copied()
            .unwrap_or(0))
    }

    async fn block_at(&self, level: Level) -> Result<RawBlock, NodeError> {
        let hash = self
            .main_chain
            .lock()
            .unwrap()
            .get(&level)
            .cloned()
            .ok_or_else(|| NodeError::API404Notfound(level.to_string()))?;
        self.block(&hash).await
    }

    async fn block(&self, hash: &BlockHash) -> Result<RawBlock, NodeError> {
        self.blocks
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| NodeError::API404Notfound(hash.clone()))
    }

    async fn baking_rights(
        &self,
        cycle: CycleIndex,
        _max_priority: i32,
    ) -> Result<Vec<RawBakingRight>, NodeError> {
        Ok(self
            .levels(cycle)
            .map(|level| RawBakingRight {
                level,
                delegate: self.baker.clone(),
                priority: 0,
            })
            .collect())
    }

    async fn baking_rights_at(
        &self,
        level: Level,
        _max_priority: i32,
    ) -> Result<Vec<RawBakingRight>, NodeError> {
        Ok(vec![RawBakingRight {
            level,
            delegate: self.baker.clone(),
            priority: 0,
        }])
    }

    async fn endorsing_rights(
        &self,
        cycle: CycleIndex,
    ) -> Result<Vec<RawEndorsingRight>, NodeError> {
        let slots: Vec<i32> = (0..self.protocol.endorsers_per_block).collect();
        Ok(self
            .levels(cycle)
            .map(|level| RawEndorsingRight {
                level,
                delegate: self.baker.clone(),
                slots: slots.clone(),
            })
            .collect())
    }

    async fn constants(&self, _level: Level) -> Result<Constants, NodeError> {
        let p = &self.protocol;
        Ok(Constants {
            preserved_cycles: p.preserved_cycles,
            blocks_per_cycle: p.blocks_per_cycle,
            blocks_per_roll_snapshot: p.blocks_per_snapshot,
            blocks_per_voting_period: p.blocks_per_voting_period,
            tokens_per_roll: p.tokens_per_roll,
            endorsers_per_block: p.endorsers_per_block,
            block_security_deposit: p.block_deposit,
            endorsement_security_deposit: p.endorsement_deposit,
            baking_reward_per_endorsement: [p.baking_reward0, p.baking_reward1],
            endorsement_reward: [p.endorsement_reward0, p.endorsement_reward1],
            seed_nonce_revelation_tip: p.revelation_reward,
            min_proposal_quorum: p.proposal_quorum,
            quorum_min: p.ballot_quorum_min,
            quorum_max: p.ballot_quorum_max,
        })
    }

    async fn delegate(&self, _level: Level, address: &Address) -> Result<RawDelegate, NodeError> {
        Err(NodeError::API404Notfound(address.clone()))
    }

    async fn balance(&self, _level: Level, address: &Address) -> Result<Mutez, NodeError> {
        Err(NodeError::API404Notfound(address.clone()))
    }
}
