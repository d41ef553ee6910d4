//! Applies big map diffs to prefetched rows, without touching the store.
//!
//! Negative pointers denote temporary maps. Their images live in an arena
//! that only lasts for the calls of a single operation group and never make
//! it to the plan.
use std::collections::BTreeMap;
use std::collections::HashMap;

use serde_json::Value;

use super::types::BigMap;
use super::types::BigMapAction;
use super::types::BigMapKey;
use super::types::BigMapUpdate;
use crate::core::types::AccountID;
use crate::core::types::BigMapDiff;
use crate::core::types::Level;
use crate::core::types::Ptr;
use crate::error::invariant;
use crate::error::Error;

/// Rows to persist for a block.
#[derive(Debug, Default)]
pub struct Plan {
    pub new_maps: Vec<BigMap>,
    pub updated_maps: Vec<BigMap>,
    pub new_keys: Vec<BigMapKey>,
    pub updated_keys: Vec<BigMapKey>,
    pub updates: Vec<BigMapUpdate>,
}

#[derive(Debug)]
struct Tracked<T> {
    row: T,
    is_new: bool,
    dirty: bool,
}

impl<T> Tracked<T> {
    fn existing(row: T) -> Self {
        Self {
            row,
            is_new: false,
            dirty: false,
        }
    }

    fn created(row: T) -> Self {
        Self {
            row,
            is_new: true,
            dirty: true,
        }
    }
}

/// In-memory image of a map: types and active keys by hash.
#[derive(Debug, Clone)]
struct Image {
    key_type: Value,
    value_type: Value,
    keys: BTreeMap<String, (Value, Value)>,
}

/// Temporary maps of the current operation group.
///
/// Pointers are remapped to slots the first time they are allocated or
/// copied into.
#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Option<Image>>,
    index: HashMap<Ptr, usize>,
}

impl Arena {
    fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    fn alloc(&mut self, ptr: Ptr, image: Image) {
        self.slots.push(Some(image));
        self.index.insert(ptr, self.slots.len() - 1);
    }

    fn get(&self, ptr: Ptr) -> Option<&Image> {
        self.index
            .get(&ptr)
            .and_then(|i| self.slots.get(*i))
            .and_then(|s| s.as_ref())
    }

    fn get_mut(&mut self, ptr: Ptr) -> Option<&mut Image> {
        self.index
            .get(&ptr)
            .and_then(|i| self.slots.get_mut(*i))
            .and_then(|s| s.as_mut())
    }

    fn remove(&mut self, ptr: Ptr) {
        if let Some(i) = self.index.remove(&ptr) {
            self.slots[i] = None;
        }
    }
}

pub struct Planner {
    level: Level,
    maps: HashMap<Ptr, Tracked<BigMap>>,
    keys: HashMap<(Ptr, String), Tracked<BigMapKey>>,
    arena: Arena,
    /// Operation group the arena belongs to
    group: Option<i32>,
    updates: Vec<BigMapUpdate>,
}

impl Planner {
    /// New planner for block at `level`, given all rows its diffs refer to.
    pub fn new(level: Level, maps: Vec<BigMap>, keys: Vec<BigMapKey>) -> Self {
        Self {
            level,
            maps: maps
                .into_iter()
                .map(|m| (m.ptr, Tracked::existing(m)))
                .collect(),
            keys: keys
                .into_iter()
                .map(|k| ((k.ptr, k.key_hash.clone()), Tracked::existing(k)))
                .collect(),
            arena: Arena::default(),
            group: None,
            updates: vec![],
        }
    }

    /// Process the diffs of a contract call, in order.
    ///
    /// Calls must come in block order. Temporary maps are dropped when the
    /// operation group changes.
    ///
    /// * `group`: operation group of the call
    /// * `storage`: contract storage after the call
    pub fn apply_call(
        &mut self,
        group: i32,
        contract_id: AccountID,
        storage: &Value,
        diffs: &[BigMapDiff],
    ) -> Result<(), Error> {
        if self.group != Some(group) {
            self.arena.clear();
            self.group = Some(group);
        }
        for diff in diffs {
            match diff {
                BigMapDiff::Alloc {
                    ptr,
                    key_type,
                    value_type,
                } => {
                    let image = Image {
                        key_type: key_type.clone(),
                        value_type: value_type.clone(),
                        keys: BTreeMap::new(),
                    };
                    self.allocate(*ptr, contract_id, storage, image)?;
                }
                BigMapDiff::Copy {
                    source,
                    destination,
                } => {
                    let image = self.image(*source)?;
                    self.allocate(*destination, contract_id, storage, image)?;
                }
                BigMapDiff::Update {
                    ptr,
                    key_hash,
                    key,
                    value,
                } if *ptr < 0 => {
                    let image = self
                        .arena
                        .get_mut(*ptr)
                        .ok_or_else(|| invariant(format!("update of unknown temporary big map {ptr}")))?;
                    match value {
                        Some(v) => image.keys.insert(key_hash.clone(), (key.clone(), v.clone())),
                        None => image.keys.remove(key_hash),
                    };
                }
                BigMapDiff::Update {
                    ptr,
                    key_hash,
                    key,
                    value,
                } => self.set_key(*ptr, key_hash, key, value.as_ref())?,
                BigMapDiff::Remove { ptr } if *ptr < 0 => self.arena.remove(*ptr),
                BigMapDiff::Remove { ptr } => {
                    let map = self.map_mut(*ptr)?;
                    map.active = false;
                    self.audit(*ptr, BigMapAction::Remove, None, None);
                }
            }
        }
        Ok(())
    }

    /// Rows to persist, ordered by pointer and key hash.
    pub fn finish(self) -> Plan {
        let mut plan = Plan {
            updates: self.updates,
            ..Default::default()
        };
        let mut maps: Vec<Tracked<BigMap>> = self.maps.into_values().filter(|m| m.dirty).collect();
        maps.sort_by_key(|m| m.row.ptr);
        for m in maps {
            if m.is_new {
                plan.new_maps.push(m.row);
            } else {
                plan.updated_maps.push(m.row);
            }
        }
        let mut keys: Vec<Tracked<BigMapKey>> = self.keys.into_values().filter(|k| k.dirty).collect();
        keys.sort_by(|a, b| (a.row.ptr, &a.row.key_hash).cmp(&(b.row.ptr, &b.row.key_hash)));
        for k in keys {
            if k.is_new {
                plan.new_keys.push(k.row);
            } else {
                plan.updated_keys.push(k.row);
            }
        }
        plan
    }

    /// Current image of a map, temporary or not.
    fn image(&self, ptr: Ptr) -> Result<Image, Error> {
        if ptr < 0 {
            return self
                .arena
                .get(ptr)
                .cloned()
                .ok_or_else(|| invariant(format!("copy of unknown temporary big map {ptr}")));
        }
        let map = self
            .maps
            .get(&ptr)
            .ok_or_else(|| invariant(format!("copy of unknown big map {ptr}")))?;
        let keys = self
            .keys
            .values()
            .filter(|k| k.row.ptr == ptr && k.row.active)
            .filter_map(|k| {
                k.row
                    .value
                    .as_ref()
                    .map(|v| (k.row.key_hash.clone(), (k.row.key.clone(), v.clone())))
            })
            .collect();
        Ok(Image {
            key_type: map.row.key_type.clone(),
            value_type: map.row.value_type.clone(),
            keys,
        })
    }

    /// Create a map from an image, in the arena for temporary pointers.
    fn allocate(
        &mut self,
        ptr: Ptr,
        contract_id: AccountID,
        storage: &Value,
        image: Image,
    ) -> Result<(), Error> {
        if ptr < 0 {
            self.arena.alloc(ptr, image);
            return Ok(());
        }
        if self.maps.contains_key(&ptr) {
            return Err(invariant(format!("big map {ptr} already exists")));
        }
        let storage_path = storage_path(storage, ptr).unwrap_or_else(|| {
            tracing::warn!("big map {ptr} not found in storage of contract {contract_id}");
            String::new()
        });
        let map = BigMap {
            ptr,
            contract_id,
            storage_path,
            key_type: image.key_type,
            value_type: image.value_type,
            active: true,
            first_level: self.level,
            last_level: self.level,
            total_keys: 0,
            active_keys: 0,
            updates: 0,
        };
        self.maps.insert(ptr, Tracked::created(map));
        self.audit(ptr, BigMapAction::Allocate, None, None);
        for (key_hash, (key, value)) in image.keys {
            self.set_key(ptr, &key_hash, &key, Some(&value))?;
        }
        Ok(())
    }

    /// Add, update or remove (`value` is `None`) a key of a persisted map.
    fn set_key(
        &mut self,
        ptr: Ptr,
        key_hash: &str,
        key: &Value,
        value: Option<&Value>,
    ) -> Result<(), Error> {
        let level = self.level;
        let id = (ptr, key_hash.to_owned());
        let state = self.keys.get(&id).map(|k| k.row.active);
        let map = self.map_mut(ptr)?;
        let action = match (state, value) {
            (None | Some(false), None) => {
                tracing::debug!("ignoring removal of absent key {key_hash} of big map {ptr}");
                return Ok(());
            }
            (None, Some(_)) => {
                map.total_keys += 1;
                map.active_keys += 1;
                BigMapAction::AddKey
            }
            (Some(false), Some(_)) => {
                map.active_keys += 1;
                BigMapAction::AddKey
            }
            (Some(true), Some(_)) => BigMapAction::UpdateKey,
            (Some(true), None) => {
                map.active_keys -= 1;
                BigMapAction::RemoveKey
            }
        };
        let entry = self.keys.entry(id).or_insert_with(|| {
            Tracked::created(BigMapKey {
                id: 0,
                ptr,
                key_hash: key_hash.to_owned(),
                key: key.clone(),
                value: None,
                active: false,
                first_level: level,
                last_level: level,
                updates: 0,
            })
        });
        entry.dirty = true;
        entry.row.active = value.is_some();
        entry.row.value = value.cloned();
        entry.row.last_level = level;
        entry.row.updates += 1;
        self.audit(ptr, action, Some(key_hash.to_owned()), value.cloned());
        Ok(())
    }

    fn map_mut(&mut self, ptr: Ptr) -> Result<&mut BigMap, Error> {
        let map = self
            .maps
            .get_mut(&ptr)
            .ok_or_else(|| invariant(format!("unknown big map {ptr}")))?;
        map.dirty = true;
        Ok(&mut map.row)
    }

    /// Record a mutation of map `ptr` in the audit log.
    fn audit(
        &mut self,
        ptr: Ptr,
        action: BigMapAction,
        key_hash: Option<String>,
        value: Option<Value>,
    ) {
        if let Some(map) = self.maps.get_mut(&ptr) {
            map.dirty = true;
            map.row.updates += 1;
            map.row.last_level = self.level;
        }
        self.updates.push(BigMapUpdate {
            level: self.level,
            ptr,
            action,
            key_hash,
            value,
        });
    }
}

/// Dotted path to the node of `storage` holding pointer `ptr`.
///
/// Pointers appear either as plain numbers or as `{"int": "<ptr>"}` nodes.
pub fn storage_path(storage: &Value, ptr: Ptr) -> Option<String> {
    let mut path = vec![];
    find(storage, ptr, &mut path).then(|| path.join("."))
}

fn find(node: &Value, ptr: Ptr, path: &mut Vec<String>) -> bool {
    match node {
        Value::Number(n) => n.as_i64() == Some(ptr),
        Value::Object(fields) => {
            if let (1, Some(Value::String(s))) = (fields.len(), fields.get("int")) {
                return s.parse::<Ptr>() == Ok(ptr);
            }
            for (name, child) in fields {
                path.push(name.clone());
                if find(child, ptr, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(i.to_string());
                if find(child, ptr, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn alloc(ptr: Ptr) -> BigMapDiff {
        BigMapDiff::Alloc {
            ptr,
            key_type: json!({"prim": "address"}),
            value_type: json!({"prim": "nat"}),
        }
    }

    fn update(ptr: Ptr, key_hash: &str, value: Option<i64>) -> BigMapDiff {
        BigMapDiff::Update {
            ptr,
            key_hash: key_hash.to_owned(),
            key: json!({"string": key_hash}),
            value: value.map(|v| json!({"int": v.to_string()})),
        }
    }

    fn existing_map(ptr: Ptr) -> BigMap {
        BigMap {
            ptr,
            contract_id: 7,
            storage_path: String::from("ledger"),
            key_type: json!({"prim": "address"}),
            value_type: json!({"prim": "nat"}),
            active: true,
            first_level: 10,
            last_level: 12,
            total_keys: 2,
            active_keys: 1,
            updates: 5,
        }
    }

    fn existing_key(ptr: Ptr, key_hash: &str, value: Option<i64>) -> BigMapKey {
        BigMapKey {
            id: 3,
            ptr,
            key_hash: key_hash.to_owned(),
            key: json!({"string": key_hash}),
            value: value.map(|v| json!({"int": v.to_string()})),
            active: value.is_some(),
            first_level: 10,
            last_level: 12,
            updates: 2,
        }
    }

    #[test]
    fn temporary_map_copied_into_persisted_map() {
        let storage = json!({"ledger": {"int": "100"}, "owner": {"string": "tz1a"}});
        let mut planner = Planner::new(20, vec![], vec![]);
        planner
            .apply_call(
                0,
                7,
                &storage,
                &[
                    alloc(-1),
                    update(-1, "k", Some(42)),
                    BigMapDiff::Copy {
                        source: -1,
                        destination: 100,
                    },
                ],
            )
            .unwrap();
        let plan = planner.finish();

        assert_eq!(plan.new_maps.len(), 1);
        let map = &plan.new_maps[0];
        assert_eq!(map.ptr, 100);
        assert_eq!(map.storage_path, "ledger");
        assert_eq!(map.total_keys, 1);
        assert_eq!(map.active_keys, 1);
        assert_eq!(map.updates, 2);

        assert_eq!(plan.new_keys.len(), 1);
        assert_eq!(plan.new_keys[0].ptr, 100);
        assert_eq!(plan.new_keys[0].key_hash, "k");
        assert_eq!(plan.new_keys[0].value, Some(json!({"int": "42"})));

        assert!(plan.updates.iter().all(|u| u.ptr == 100));
        let actions: Vec<BigMapAction> = plan.updates.iter().map(|u| u.action).collect();
        assert_eq!(actions, vec![BigMapAction::Allocate, BigMapAction::AddKey]);
    }

    #[test]
    fn temporary_maps_are_shared_within_an_operation_group() {
        let mut planner = Planner::new(20, vec![], vec![]);
        planner
            .apply_call(3, 7, &json!({}), &[alloc(-1), update(-1, "k", Some(1))])
            .unwrap();
        // Internal call of the same group picks up the temporary map
        planner
            .apply_call(
                3,
                8,
                &json!({"m": {"int": "100"}}),
                &[BigMapDiff::Copy {
                    source: -1,
                    destination: 100,
                }],
            )
            .unwrap();
        let plan = planner.finish();
        assert_eq!(plan.new_maps.len(), 1);
        assert_eq!(plan.new_maps[0].contract_id, 8);
        assert_eq!(plan.new_maps[0].storage_path, "m");
        assert_eq!(plan.new_keys.len(), 1);
        assert_eq!(plan.new_keys[0].ptr, 100);
    }

    #[test]
    fn temporary_pointers_do_not_outlive_their_group() {
        let storage = json!({});
        let mut planner = Planner::new(20, vec![], vec![]);
        planner.apply_call(3, 7, &storage, &[alloc(-1)]).unwrap();
        let err = planner
            .apply_call(4, 7, &storage, &[update(-1, "k", Some(1))])
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn key_lifecycle_counters() {
        let mut planner = Planner::new(
            20,
            vec![existing_map(5)],
            vec![existing_key(5, "a", Some(1)), existing_key(5, "b", None)],
        );
        planner
            .apply_call(
                0,
                7,
                &json!(5),
                &[
                    update(5, "a", Some(2)),
                    update(5, "a", None),
                    update(5, "b", Some(3)),
                    update(5, "c", Some(4)),
                    update(5, "d", None),
                ],
            )
            .unwrap();
        let plan = planner.finish();

        let map = &plan.updated_maps[0];
        assert_eq!(map.total_keys, 3);
        assert_eq!(map.active_keys, 2);
        assert_eq!(map.updates, 9);
        assert_eq!(map.last_level, 20);

        let actions: Vec<BigMapAction> = plan.updates.iter().map(|u| u.action).collect();
        assert_eq!(
            actions,
            vec![
                BigMapAction::UpdateKey,
                BigMapAction::RemoveKey,
                BigMapAction::AddKey,
                BigMapAction::AddKey,
            ]
        );
        let a = &plan.updated_keys[0];
        assert_eq!((a.key_hash.as_str(), a.active, a.updates), ("a", false, 4));
        assert_eq!(a.value, None);
        let b = &plan.updated_keys[1];
        assert_eq!((b.key_hash.as_str(), b.active, b.updates), ("b", true, 3));
        assert_eq!(plan.new_keys[0].key_hash, "c");
        assert_eq!(plan.new_keys[0].first_level, 20);
    }

    #[test]
    fn copy_of_persisted_map_takes_active_keys() {
        let mut planner = Planner::new(
            20,
            vec![existing_map(5)],
            vec![existing_key(5, "a", Some(1)), existing_key(5, "b", None)],
        );
        planner
            .apply_call(
                0,
                7,
                &json!([{"int": "6"}]),
                &[BigMapDiff::Copy {
                    source: 5,
                    destination: 6,
                }],
            )
            .unwrap();
        let plan = planner.finish();
        assert_eq!(plan.new_maps[0].storage_path, "0");
        assert!(plan.updated_maps.is_empty());
        let keys: Vec<(Ptr, &str)> = plan
            .new_keys
            .iter()
            .map(|k| (k.ptr, k.key_hash.as_str()))
            .collect();
        assert_eq!(keys, vec![(6, "a")]);
    }

    #[test]
    fn remove_deactivates_map() {
        let mut planner = Planner::new(20, vec![existing_map(5)], vec![]);
        planner
            .apply_call(0, 7, &json!({}), &[BigMapDiff::Remove { ptr: 5 }])
            .unwrap();
        let plan = planner.finish();
        assert!(!plan.updated_maps[0].active);
        assert_eq!(plan.updates[0].action, BigMapAction::Remove);
        assert_eq!(plan.updates[0].key_hash, None);
    }

    #[test]
    fn unknown_or_duplicate_maps_are_invariant_violations() {
        let mut planner = Planner::new(20, vec![existing_map(5)], vec![]);
        assert!(planner
            .apply_call(0, 7, &json!({}), &[update(9, "k", Some(1))])
            .is_err());
        assert!(planner.apply_call(0, 7, &json!({}), &[alloc(5)]).is_err());
    }

    #[test]
    fn storage_paths() {
        let storage = json!({
            "prim": "Pair",
            "args": [{"int": "12"}, {"prim": "Pair", "args": [{"string": "x"}, {"int": "13"}]}]
        });
        assert_eq!(storage_path(&storage, 12).as_deref(), Some("args.0"));
        assert_eq!(storage_path(&storage, 13).as_deref(), Some("args.1.args.1"));
        assert_eq!(storage_path(&storage, 14), None);
        assert_eq!(storage_path(&json!({"tokens": 3}), 3).as_deref(), Some("tokens"));
    }
}
