//! Contract big maps, kept in sync with the big map diffs of contract calls.
//!
//! All maps and keys referred to by a block are fetched up front, the diffs
//! are planned in memory and the resulting rows written back. Every
//! persisted mutation gets an audit row in `tw.big_map_updates`, from which
//! reverts rebuild the previous state.
mod planner;
pub(crate) mod store;
pub mod types;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::core::types::BigMapDiff;
use crate::core::types::Ptr;
use crate::core::types::RawBlock;
use crate::error::invariant;
use crate::error::Error;
use crate::framework::Commit;
use crate::framework::Context;
use planner::Planner;
use types::BigMapAction;

pub struct BigMapCommit;

#[async_trait]
impl Commit for BigMapCommit {
    fn name(&self) -> &'static str {
        "big_map"
    }

    async fn apply(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let calls = &raw.operations.contract_calls;
        if calls.iter().all(|c| c.big_map_diffs.is_empty()) {
            return Ok(());
        }
        let prefetch = Prefetch::new(calls.iter().flat_map(|c| c.big_map_diffs.iter()));
        let (maps, mut keys, copied) = tokio::try_join!(
            store::get_maps(ctx.pgtx, &prefetch.ptrs),
            store::get_keys(ctx.pgtx, &prefetch.key_ptrs, &prefetch.key_hashes),
            store::get_active_keys(ctx.pgtx, &prefetch.copied),
        )?;
        keys.extend(copied);

        let mut planner = Planner::new(raw.level, maps, keys);
        for call in calls.iter().filter(|c| !c.big_map_diffs.is_empty()) {
            let contract = ctx
                .cache
                .get_or_create_account(ctx.pgtx, &call.contract, raw.level)
                .await?;
            planner.apply_call(call.group, contract.id, &call.storage, &call.big_map_diffs)?;
        }
        let plan = planner.finish();

        for m in &plan.new_maps {
            store::insert_map(ctx.pgtx, m).await?;
        }
        for m in &plan.updated_maps {
            store::update_map(ctx.pgtx, m).await?;
        }
        for k in &plan.new_keys {
            store::insert_key(ctx.pgtx, k).await?;
        }
        for k in &plan.updated_keys {
            store::update_key(ctx.pgtx, k).await?;
        }
        for u in &plan.updates {
            store::insert_update(ctx.pgtx, u).await?;
        }
        tracing::debug!(
            "big maps: {} new, {} new keys, {} updates",
            plan.new_maps.len(),
            plan.new_keys.len(),
            plan.updates.len()
        );
        Ok(())
    }

    async fn revert(&self, ctx: &mut Context<'_, '_>, raw: &RawBlock) -> Result<(), Error> {
        let level = raw.level;
        let updates = store::get_updates_at(ctx.pgtx, level).await?;
        if updates.is_empty() {
            return Ok(());
        }
        let ptrs: BTreeSet<Ptr> = updates.iter().map(|u| u.ptr).collect();
        let mut touched: BTreeMap<(Ptr, &str), i32> = BTreeMap::new();
        for u in &updates {
            if let Some(key_hash) = &u.key_hash {
                *touched.entry((u.ptr, key_hash.as_str())).or_default() += 1;
            }
        }

        for ((ptr, key_hash), n) in touched {
            let mut key = store::get_key(ctx.pgtx, ptr, key_hash)
                .await?
                .ok_or_else(|| invariant(format!("missing key {key_hash} of big map {ptr}")))?;
            if key.first_level == level {
                store::delete_key(ctx.pgtx, key.id).await?;
                continue;
            }
            let prev = store::get_last_key_update(ctx.pgtx, ptr, key_hash, level)
                .await?
                .ok_or_else(|| invariant(format!("no history for key {key_hash} of big map {ptr}")))?;
            key.active = prev.action != BigMapAction::RemoveKey;
            key.value = prev.value;
            key.last_level = prev.level;
            key.updates -= n;
            store::update_key(ctx.pgtx, &key).await?;
        }

        for ptr in ptrs {
            let map = store::get_map(ctx.pgtx, ptr)
                .await?
                .ok_or_else(|| invariant(format!("missing big map {ptr}")))?;
            if map.first_level == level {
                store::delete_map(ctx.pgtx, ptr).await?;
            } else {
                store::restore_map(ctx.pgtx, ptr, level).await?;
            }
        }
        store::delete_updates_at(ctx.pgtx, level).await?;
        Ok(())
    }
}

/// Persisted rows referred to by a set of diffs.
#[derive(Debug, Default, PartialEq)]
struct Prefetch {
    /// Maps being updated, removed or copied
    ptrs: Vec<Ptr>,
    /// Updated keys, as parallel arrays
    key_ptrs: Vec<Ptr>,
    key_hashes: Vec<String>,
    /// Maps whose keys get copied
    copied: Vec<Ptr>,
}

impl Prefetch {
    fn new<'a>(diffs: impl Iterator<Item = &'a BigMapDiff>) -> Self {
        let mut ptrs = BTreeSet::new();
        let mut keys = BTreeSet::new();
        let mut copied = BTreeSet::new();
        for diff in diffs {
            match diff {
                BigMapDiff::Alloc { .. } => (),
                BigMapDiff::Copy { source, .. } if *source >= 0 => {
                    ptrs.insert(*source);
                    copied.insert(*source);
                }
                BigMapDiff::Update { ptr, key_hash, .. } if *ptr >= 0 => {
                    ptrs.insert(*ptr);
                    keys.insert((*ptr, key_hash.clone()));
                }
                BigMapDiff::Remove { ptr } if *ptr >= 0 => {
                    ptrs.insert(*ptr);
                }
                _ => (),
            }
        }
        let (key_ptrs, key_hashes) = keys.into_iter().unzip();
        Self {
            ptrs: ptrs.into_iter().collect(),
            key_ptrs,
            key_hashes,
            copied: copied.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn prefetch_skips_temporary_pointers() {
        let diffs = vec![
            BigMapDiff::Alloc {
                ptr: -1,
                key_type: json!({}),
                value_type: json!({}),
            },
            BigMapDiff::Copy {
                source: 4,
                destination: -1,
            },
            BigMapDiff::Update {
                ptr: -1,
                key_hash: String::from("a"),
                key: json!({}),
                value: None,
            },
            BigMapDiff::Update {
                ptr: 9,
                key_hash: String::from("b"),
                key: json!({}),
                value: None,
            },
            BigMapDiff::Update {
                ptr: 9,
                key_hash: String::from("b"),
                key: json!({}),
                value: Some(json!({})),
            },
            BigMapDiff::Remove { ptr: 2 },
        ];
        assert_eq!(
            Prefetch::new(diffs.iter()),
            Prefetch {
                ptrs: vec![2, 4, 9],
                key_ptrs: vec![9],
                key_hashes: vec![String::from("b")],
                copied: vec![4],
            }
        );
    }
}
