use postgres_from_row::FromRow;
use postgres_types::FromSql;
use postgres_types::ToSql;
use serde_json::Value;

use crate::core::types::AccountID;
use crate::core::types::Level;
use crate::core::types::Ptr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "big_map_action")]
pub enum BigMapAction {
    #[postgres(name = "allocate")]
    Allocate,
    #[postgres(name = "add_key")]
    AddKey,
    #[postgres(name = "update_key")]
    UpdateKey,
    #[postgres(name = "remove_key")]
    RemoveKey,
    #[postgres(name = "remove")]
    Remove,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BigMap {
    pub ptr: Ptr,
    pub contract_id: AccountID,
    /// Dotted path of the pointer within the contract storage
    pub storage_path: String,
    pub key_type: Value,
    pub value_type: Value,
    pub active: bool,
    pub first_level: Level,
    pub last_level: Level,
    /// Key rows, active or not
    pub total_keys: i32,
    pub active_keys: i32,
    /// Number of audit rows of the map and its keys
    pub updates: i32,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BigMapKey {
    /// Serial id, 0 until inserted
    pub id: i32,
    pub ptr: Ptr,
    pub key_hash: String,
    pub key: Value,
    /// `None` once removed
    pub value: Option<Value>,
    pub active: bool,
    pub first_level: Level,
    pub last_level: Level,
    /// Number of audit rows of the key
    pub updates: i32,
}

/// Audit row, one per persisted mutation.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BigMapUpdate {
    pub level: Level,
    pub ptr: Ptr,
    pub action: BigMapAction,
    pub key_hash: Option<String>,
    pub value: Option<Value>,
}
