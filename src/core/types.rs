use serde::Deserialize;
use time::OffsetDateTime;

#[cfg(feature = "test-utilities")]
pub mod testutils;

pub type AccountID = i32;
pub type Address = String;
pub type BlockHash = String;
pub type CycleIndex = i32;
pub type Level = i32;
pub type Mutez = i64;
pub type PeriodIndex = i32;
/// Big map pointer. Negative values are temporary and scoped to one operation group.
pub type Ptr = i64;

/// Last applied block, as tracked in `tw.app_state`.
#[derive(Debug, Clone, PartialEq)]
pub struct Head {
    pub level: Level,
    pub hash: BlockHash,
}

impl Head {
    pub fn new(level: Level, hash: BlockHash) -> Self {
        Self { level, hash }
    }

    /// A head representing blank state, before inclusion of any block.
    pub fn initial() -> Self {
        Self {
            level: -1,
            hash: String::from(""),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.level == -1 && self.hash.is_empty()
    }
}

/// Block data as decoded from the node.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    pub level: Level,
    pub hash: BlockHash,
    pub predecessor: BlockHash,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub protocol: String,
    pub cycle: CycleIndex,
    pub cycle_position: i32,
    pub priority: i32,
    pub baker: Address,
    /// Frozen reward earned by the baker
    pub reward: Mutez,
    /// Security deposit frozen for the baker
    pub deposit: Mutez,
    /// Fees collected from included operations
    pub fees: Mutez,
    /// Balance updates, except those of block production (see reward, deposit and fees).
    #[serde(default)]
    pub balance_updates: Vec<BalanceUpdate>,
    /// Bakers deactivated at the end of this block's cycle.
    #[serde(default)]
    pub deactivated: Vec<Address>,
    #[serde(default)]
    pub revelation_penalties: Vec<RevelationPenalty>,
    #[serde(default)]
    pub operations: Operations,
}

impl RawBlock {
    /// Number of endorsement slots included in the block.
    pub fn validations(&self) -> i32 {
        self.operations.endorsements.iter().map(|e| e.slots).sum()
    }

    /// Bitmask of operation kinds contained in the block.
    pub fn operations_mask(&self) -> i32 {
        let ops = &self.operations;
        let mut mask = 0;
        if !ops.endorsements.is_empty() {
            mask |= OperationKinds::ENDORSEMENTS;
        }
        if !ops.ballots.is_empty() {
            mask |= OperationKinds::BALLOTS;
        }
        if !ops.proposals.is_empty() {
            mask |= OperationKinds::PROPOSALS;
        }
        if !ops.double_bakings.is_empty() {
            mask |= OperationKinds::DOUBLE_BAKINGS;
        }
        if !ops.double_endorsings.is_empty() {
            mask |= OperationKinds::DOUBLE_ENDORSINGS;
        }
        if !ops.nonce_revelations.is_empty() {
            mask |= OperationKinds::NONCE_REVELATIONS;
        }
        if !ops.delegations.is_empty() {
            mask |= OperationKinds::DELEGATIONS;
        }
        if !ops.contract_calls.is_empty() {
            mask |= OperationKinds::CONTRACT_CALLS;
        }
        if !self.revelation_penalties.is_empty() {
            mask |= OperationKinds::REVELATION_PENALTIES;
        }
        mask
    }
}

pub struct OperationKinds;

impl OperationKinds {
    pub const ENDORSEMENTS: i32 = 1;
    pub const BALLOTS: i32 = 2;
    pub const PROPOSALS: i32 = 4;
    pub const DOUBLE_BAKINGS: i32 = 8;
    pub const DOUBLE_ENDORSINGS: i32 = 16;
    pub const NONCE_REVELATIONS: i32 = 32;
    pub const DELEGATIONS: i32 = 64;
    pub const CONTRACT_CALLS: i32 = 128;
    pub const REVELATION_PENALTIES: i32 = 256;
}

/// Block events, stored as a bitmask on the block row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockEvents(pub i32);

impl BlockEvents {
    pub const CYCLE_BEGIN: i32 = 1;
    pub const CYCLE_END: i32 = 2;
    pub const BALANCE_SNAPSHOT: i32 = 4;
    /// First block indexed under the first known protocol.
    pub const ACTIVATION: i32 = 8;
    /// First block of a new protocol.
    pub const PROTOCOL_BEGIN: i32 = 16;
    pub const VOTING_PERIOD_BEGIN: i32 = 32;
    pub const VOTING_PERIOD_END: i32 = 64;

    pub fn has(&self, flag: i32) -> bool {
        self.0 & flag == flag
    }

    pub fn set(&mut self, flag: i32) {
        self.0 |= flag;
    }

    pub fn is_cycle_begin(&self) -> bool {
        self.has(Self::CYCLE_BEGIN)
    }

    pub fn is_cycle_end(&self) -> bool {
        self.has(Self::CYCLE_END)
    }

    pub fn is_balance_snapshot(&self) -> bool {
        self.has(Self::BALANCE_SNAPSHOT)
    }

    pub fn is_activation(&self) -> bool {
        self.has(Self::ACTIVATION)
    }

    pub fn is_protocol_begin(&self) -> bool {
        self.has(Self::PROTOCOL_BEGIN)
    }

    pub fn is_voting_period_end(&self) -> bool {
        self.has(Self::VOTING_PERIOD_END)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceUpdate {
    Contract {
        address: Address,
        change: Mutez,
    },
    Freezer {
        baker: Address,
        category: FreezerCategory,
        cycle: CycleIndex,
        change: Mutez,
    },
}

impl BalanceUpdate {
    pub fn address(&self) -> &Address {
        match self {
            Self::Contract { address, .. } => address,
            Self::Freezer { baker, .. } => baker,
        }
    }

    pub fn change(&self) -> Mutez {
        match self {
            Self::Contract { change, .. } => *change,
            Self::Freezer { change, .. } => *change,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FreezerCategory {
    Deposits,
    Rewards,
    Fees,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevelationPenalty {
    pub baker: Address,
    pub missed_level: Level,
    pub lost_reward: Mutez,
    pub lost_fees: Mutez,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Operations {
    pub endorsements: Vec<Endorsement>,
    pub ballots: Vec<BallotOperation>,
    pub proposals: Vec<ProposalsOperation>,
    pub double_bakings: Vec<Accusation>,
    pub double_endorsings: Vec<Accusation>,
    pub nonce_revelations: Vec<NonceRevelation>,
    pub delegations: Vec<Delegation>,
    pub contract_calls: Vec<ContractCall>,
}

/// Endorsement of the previous block, included in this one.
#[derive(Debug, Clone, Deserialize)]
pub struct Endorsement {
    pub delegate: Address,
    pub slots: i32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, postgres_types::ToSql, postgres_types::FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "vote")]
pub enum Vote {
    #[postgres(name = "yay")]
    Yay,
    #[postgres(name = "nay")]
    Nay,
    #[postgres(name = "pass")]
    Pass,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BallotOperation {
    pub sender: Address,
    pub period: PeriodIndex,
    pub proposal: String,
    pub vote: Vote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalsOperation {
    pub sender: Address,
    pub period: PeriodIndex,
    pub proposals: Vec<String>,
}

/// Double baking or double endorsing evidence.
#[derive(Debug, Clone, Deserialize)]
pub struct Accusation {
    pub accuser: Address,
    pub offender: Address,
    pub accused_level: Level,
    pub reward: Mutez,
    pub lost_deposits: Mutez,
    pub lost_rewards: Mutez,
    pub lost_fees: Mutez,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NonceRevelation {
    pub revealed_level: Level,
    /// Base16 encoded nonce
    pub nonce: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delegation {
    pub sender: Address,
    /// New delegate, `None` when withdrawing. Self-delegation registers a baker.
    pub delegate: Option<Address>,
}

/// Contract call or origination with its resulting storage and big map diffs.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractCall {
    /// Index of the operation group within the block. Internal calls share
    /// the group of the operation emitting them.
    pub group: i32,
    pub contract: Address,
    /// Storage after the operation was applied.
    pub storage: serde_json::Value,
    #[serde(default)]
    pub big_map_diffs: Vec<BigMapDiff>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BigMapDiff {
    Alloc {
        ptr: Ptr,
        key_type: serde_json::Value,
        value_type: serde_json::Value,
    },
    Copy {
        source: Ptr,
        destination: Ptr,
    },
    Update {
        ptr: Ptr,
        key_hash: String,
        key: serde_json::Value,
        /// `None` removes the key.
        value: Option<serde_json::Value>,
    },
    Remove {
        ptr: Ptr,
    },
}
