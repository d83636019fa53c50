use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// One registered code: the id is its compact on-disk reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntry<K = String> {
    pub id: u32,
    pub code: K,
    #[serde(default)]
    pub name: Option<String>,
}

/// Append-only, deduplicating registry assigning sequential ids to
/// first-seen keys.
///
/// Ids start at 0, increase by one per new key and are never reused.
/// Adding a key a second time returns the existing entry untouched,
/// including its name.
#[derive(Debug, Clone)]
pub struct CodeTable<K = String> {
    entries: Vec<CodeEntry<K>>,
    index: HashMap<K, u32>,
}

impl<K> Default for CodeTable<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> CodeTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table by adding `pairs` in iteration order.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<String>)>,
    {
        let mut table = Self::new();
        table.extend(pairs);
        table
    }

    /// Register `code`, returning its entry.
    pub fn add(&mut self, code: K, name: Option<String>) -> &CodeEntry<K> {
        let ix = match self.index.get(&code) {
            Some(&id) => id as usize,
            None => {
                let id = self.entries.len() as u32;
                self.index.insert(code.clone(), id);
                self.entries.push(CodeEntry { id, code, name });
                id as usize
            }
        };
        &self.entries[ix]
    }

    /// Add every pair in order; already-known codes are skipped.
    pub fn extend<I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, Option<String>)>,
    {
        for (code, name) in pairs {
            self.add(code, name);
        }
    }

    pub fn get<Q>(&self, code: &Q) -> Option<&CodeEntry<K>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(code).map(|&id| &self.entries[id as usize])
    }

    pub fn get_id<Q>(&self, code: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(code).copied()
    }

    pub fn entry(&self, id: u32) -> Option<&CodeEntry<K>> {
        self.entries.get(id as usize)
    }

    pub fn get_code(&self, id: u32) -> Option<&K> {
        self.entry(id).map(|e| &e.code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, CodeEntry<K>> {
        self.entries.iter()
    }
}

impl<'a, K> IntoIterator for &'a CodeTable<K> {
    type Item = &'a CodeEntry<K>;
    type IntoIter = std::slice::Iter<'a, CodeEntry<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_and_stable() {
        let mut table = CodeTable::new();
        assert_eq!(table.add("E92000001".to_string(), Some("England".into())).id, 0);
        assert_eq!(table.add("W92000004".to_string(), Some("Wales".into())).id, 1);

        let again = table.add("E92000001".to_string(), Some("Renamed".into()));
        assert_eq!(again.id, 0);
        assert_eq!(again.name.as_deref(), Some("England"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_lookups_return_none_when_missing() {
        let table = CodeTable::from_pairs([("S92000003".to_string(), None)]);
        assert_eq!(table.get_id("S92000003"), Some(0));
        assert_eq!(table.get_id("N92000002"), None);
        assert_eq!(table.get_code(0).map(String::as_str), Some("S92000003"));
        assert_eq!(table.get_code(7), None);
    }

    #[test]
    fn test_iteration_follows_id_order() {
        let table = CodeTable::from_pairs(["0AB", "0AA", "0AB", "2CD"].map(|c| (c.to_string(), None)));
        let codes: Vec<_> = table.iter().map(|e| (e.id, e.code.as_str())).collect();
        assert_eq!(codes, vec![(0, "0AB"), (1, "0AA"), (2, "2CD")]);
    }
}
