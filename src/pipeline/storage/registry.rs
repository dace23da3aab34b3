use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::domain::{Build, CanonicalMarker};
use crate::error::{ReconcileError, Result};
use crate::pipeline::processing::normalize::NameNormalizer;

/// Lookup keys a record contributes to the registry indexes
#[derive(Debug, Default, PartialEq, Eq)]
struct IndexKeys {
    aliases: BTreeSet<String>,
    variants: BTreeSet<String>,
    reference_id: Option<String>,
    direct_positions: BTreeSet<(Build, u64)>,
}

/// In-memory store of canonical records, keyed by `canonical_id`.
///
/// The registry has a single writer: records are created and mutated only through
/// [`Registry::insert`] and [`Registry::update`], which keep the lookup indexes in step
/// with the records. Everything else gets shared references.
#[derive(Debug, Default)]
pub struct Registry {
    records: BTreeMap<String, CanonicalMarker>,
    alias_index: HashMap<String, BTreeSet<String>>,
    variant_index: HashMap<String, BTreeSet<String>>,
    reference_index: HashMap<String, BTreeSet<String>>,
    position_index: HashMap<(Build, u64), BTreeSet<String>>,
    normalizer: NameNormalizer,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, canonical_id: &str) -> bool {
        self.records.contains_key(canonical_id)
    }

    pub fn get(&self, canonical_id: &str) -> Option<&CanonicalMarker> {
        self.records.get(canonical_id)
    }

    /// Records in `canonical_id` order
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalMarker> {
        self.records.values()
    }

    /// Ids of records listing `name` as an alias
    pub fn ids_with_alias(&self, name: &str) -> BTreeSet<String> {
        self.alias_index.get(name).cloned().unwrap_or_default()
    }

    /// Ids of records whose canonical id or aliases normalize to `variant`
    pub fn ids_with_variant(&self, variant: &str) -> BTreeSet<String> {
        self.variant_index.get(variant).cloned().unwrap_or_default()
    }

    pub fn ids_with_reference(&self, reference_id: &str) -> BTreeSet<String> {
        self.reference_index.get(reference_id).cloned().unwrap_or_default()
    }

    /// Ids of records holding `position` as a direct observation on `build`
    pub fn ids_with_direct_position(&self, build: Build, position: u64) -> BTreeSet<String> {
        self.position_index
            .get(&(build, position))
            .cloned()
            .unwrap_or_default()
    }

    /// Register a new record. Canonical ids are never reused.
    pub(crate) fn insert(&mut self, record: CanonicalMarker) -> Result<()> {
        if self.records.contains_key(&record.canonical_id) {
            return Err(ReconcileError::DuplicateCanonicalId(record.canonical_id));
        }
        let keys = self.index_keys(&record);
        let id = record.canonical_id.clone();
        self.add_keys(&id, &keys);
        self.records.insert(id.clone(), record);
        debug!("Registered canonical record {}", id);
        Ok(())
    }

    /// Mutate an existing record and refresh its index entries. Returns `None` if the id
    /// is unknown.
    pub(crate) fn update<R>(
        &mut self,
        canonical_id: &str,
        mutate: impl FnOnce(&mut CanonicalMarker) -> R,
    ) -> Option<R> {
        let before = self.index_keys(self.records.get(canonical_id)?);
        let record = self.records.get_mut(canonical_id)?;
        let result = mutate(record);
        let after = Self::keys_for(&self.normalizer, record);

        if before != after {
            let id = canonical_id.to_string();
            self.remove_keys(&id, &before);
            self.add_keys(&id, &after);
        }
        Some(result)
    }

    fn index_keys(&self, record: &CanonicalMarker) -> IndexKeys {
        Self::keys_for(&self.normalizer, record)
    }

    fn keys_for(normalizer: &NameNormalizer, record: &CanonicalMarker) -> IndexKeys {
        let mut variants = normalizer.variants(&record.canonical_id);
        for alias in &record.aliases {
            variants.extend(normalizer.variants(alias));
        }
        IndexKeys {
            aliases: record.aliases.clone(),
            variants,
            reference_id: record.reference_id.clone(),
            direct_positions: record
                .positions
                .iter()
                .filter(|(_, p)| p.is_direct())
                .map(|(b, p)| (*b, p.value))
                .collect(),
        }
    }

    fn add_keys(&mut self, id: &str, keys: &IndexKeys) {
        for alias in &keys.aliases {
            self.alias_index.entry(alias.clone()).or_default().insert(id.to_string());
        }
        for variant in &keys.variants {
            self.variant_index.entry(variant.clone()).or_default().insert(id.to_string());
        }
        if let Some(reference_id) = &keys.reference_id {
            self.reference_index
                .entry(reference_id.clone())
                .or_default()
                .insert(id.to_string());
        }
        for key in &keys.direct_positions {
            self.position_index.entry(*key).or_default().insert(id.to_string());
        }
    }

    fn remove_keys(&mut self, id: &str, keys: &IndexKeys) {
        fn remove<K: std::hash::Hash + Eq>(index: &mut HashMap<K, BTreeSet<String>>, key: &K, id: &str) {
            if let Some(ids) = index.get_mut(key) {
                ids.remove(id);
                if ids.is_empty() {
                    index.remove(key);
                }
            }
        }

        for alias in &keys.aliases {
            remove(&mut self.alias_index, alias, id);
        }
        for variant in &keys.variants {
            remove(&mut self.variant_index, variant, id);
        }
        if let Some(reference_id) = &keys.reference_id {
            remove(&mut self.reference_index, reference_id, id);
        }
        for key in &keys.direct_positions {
            remove(&mut self.position_index, key, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str) -> CanonicalMarker {
        CanonicalMarker::new(id, true)
    }

    #[test]
    fn test_insert_rejects_duplicate_ids() {
        let mut registry = Registry::new();
        registry.insert(marker("M269")).unwrap();
        let err = registry.insert(marker("M269")).unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateCanonicalId(id) if id == "M269"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_indexes_follow_updates() {
        let mut registry = Registry::new();
        registry.insert(marker("M269")).unwrap();

        registry.update("M269", |m| {
            m.aliases.insert("S3".to_string());
            m.reference_id = Some("rs9786153".to_string());
            m.record_direct(Build::B37, 22_739_367);
        });

        assert!(registry.ids_with_alias("S3").contains("M269"));
        assert!(registry.ids_with_reference("rs9786153").contains("M269"));
        assert!(registry
            .ids_with_direct_position(Build::B37, 22_739_367)
            .contains("M269"));

        registry.update("M269", |m| {
            m.record_direct(Build::B37, 22_739_368);
        });
        assert!(registry.ids_with_direct_position(Build::B37, 22_739_367).is_empty());
        assert!(registry
            .ids_with_direct_position(Build::B37, 22_739_368)
            .contains("M269"));
    }

    #[test]
    fn test_derived_positions_are_not_indexed() {
        let mut registry = Registry::new();
        registry.insert(marker("L21")).unwrap();
        registry.update("L21", |m| m.record_derived(Build::B36, 100));
        assert!(registry.ids_with_direct_position(Build::B36, 100).is_empty());
    }

    #[test]
    fn test_variant_index_covers_ids_and_aliases() {
        let mut registry = Registry::new();
        let mut record = marker("21355");
        record.aliases.insert("P312.1".to_string());
        registry.insert(record).unwrap();

        assert!(registry.ids_with_variant("IMS-JST21355").contains("21355"));
        assert!(registry.ids_with_variant("P312").contains("21355"));
        assert!(registry.update("missing", |_| ()).is_none());
    }
}
