/// Schema holding all derived tables
pub const SCHEMA_NAME: &str = "tw";

/// Fixed-point base of quorums, supermajority and participation rates
pub const RATE_BASE: i64 = 10_000;

/// Ballot supermajority, not part of the node constants
pub const SUPERMAJORITY: i32 = 8000;

/// Participation EMA assumed before the first ballot period
pub const INITIAL_PARTICIPATION_EMA: i32 = 8000;

/// Weight of the previous EMA when carrying participation to the next ballot period
pub const EMA_CARRY_WEIGHT: i64 = 8000;

/// Weight of the last participation when carrying it to the next ballot period
pub const EMA_PARTICIPATION_WEIGHT: i64 = 2000;

/// Seed of the cycles created on activation
pub const INITIAL_SEED: [u8; 32] = [0u8; 32];

/// Suffix hashed with a cycle seed to draw its snapshot index
pub const SNAPSHOT_SEED_SUFFIX: &[u8] = b"roll_snapshot";

pub mod settings {
    /// Capacity of the accounts cache
    pub const ACCOUNTS_CACHE_SIZE: usize = 100_000;

    /// Highest priority of baking rights fetched ahead of time
    pub const MAX_PRIORITY_FETCHED: i32 = 3;
}
