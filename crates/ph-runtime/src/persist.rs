//! The external persistence contract
//!
//! Rule storage lives outside the page: the extension shell owns the actual
//! key-value store and its quota. The engine only speaks [`RuleStore`].
//! Persistence and application are deliberately decoupled - a failed save
//! never rolls back an in-page effect, it surfaces as a status message.
//!
//! [`MemoryStore`] is the reference implementation backing tests and the
//! CLI; the wasm bridge provides one that forwards to the shell.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use ph_core::path::path_matches;
use ph_core::types::{Rule, RuleSet};

/// Version stamp written into export bundles.
pub const EXPORT_VERSION: u32 = 1;

// =============================================================================
// Errors
// =============================================================================

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("operation is handled outside the page runtime")]
    Unsupported,
}

// =============================================================================
// Bundle types
// =============================================================================

/// One persisted rule with its scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StoredRule {
    pub host: String,
    pub path_pattern: String,
    pub rule: Rule,
}

/// Aggregate numbers reported with exports and maintenance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StoreStats {
    pub hosts: usize,
    pub rules: usize,
}

/// A full export of the store. Imports merge, they never replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ExportBundle {
    pub version: u32,
    pub stats: StoreStats,
    pub data: Vec<StoredRule>,
}

/// Outcome of a maintenance pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MaintenanceReport {
    /// Entries removed (duplicates, unparseable selectors).
    pub cleaned: usize,
    /// Serialized size of the store after cleaning, in bytes.
    pub size: usize,
}

// =============================================================================
// The store contract
// =============================================================================

/// Per-host rule storage, as the engine sees it.
pub trait RuleStore {
    fn save_rule(
        &mut self,
        host: &str,
        path_pattern: &str,
        rule: &Rule,
    ) -> Result<(), PersistenceError>;

    /// Remove every stored rule for the host that targets the selector.
    fn remove_rule(&mut self, host: &str, selector: &str) -> Result<(), PersistenceError>;

    /// All rules whose pattern covers the concrete path, in insertion order.
    fn load_rules(&self, host: &str, path: &str) -> Result<RuleSet, PersistenceError>;

    /// Drop duplicates and unusable entries; report what remains.
    fn maintenance(&mut self) -> Result<MaintenanceReport, PersistenceError>;

    fn export_all(&self) -> Result<ExportBundle, PersistenceError>;

    /// Merge a bundle into the store. Returns the number of new entries.
    fn import_all(&mut self, bundle: &ExportBundle) -> Result<usize, PersistenceError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Insertion-ordered in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Vec<StoredRule>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StoredRule] {
        &self.entries
    }

    fn stats(&self) -> StoreStats {
        let mut hosts: Vec<&str> = self.entries.iter().map(|e| e.host.as_str()).collect();
        hosts.sort_unstable();
        hosts.dedup();
        StoreStats {
            hosts: hosts.len(),
            rules: self.entries.len(),
        }
    }

    fn contains(&self, host: &str, path_pattern: &str, rule: &Rule) -> bool {
        let fp = rule.fingerprint();
        self.entries.iter().any(|e| {
            e.host == host && e.path_pattern == path_pattern && e.rule.fingerprint() == fp
        })
    }
}

impl RuleStore for MemoryStore {
    fn save_rule(
        &mut self,
        host: &str,
        path_pattern: &str,
        rule: &Rule,
    ) -> Result<(), PersistenceError> {
        if !self.contains(host, path_pattern, rule) {
            self.entries.push(StoredRule {
                host: host.to_string(),
                path_pattern: path_pattern.to_string(),
                rule: rule.clone(),
            });
        }
        Ok(())
    }

    fn remove_rule(&mut self, host: &str, selector: &str) -> Result<(), PersistenceError> {
        self.entries
            .retain(|e| !(e.host == host && e.rule.selector == selector));
        Ok(())
    }

    fn load_rules(&self, host: &str, path: &str) -> Result<RuleSet, PersistenceError> {
        let mut set = RuleSet::new(host, &ph_core::path::generalize_path(path));
        for entry in &self.entries {
            if entry.host == host && path_matches(&entry.path_pattern, path) {
                set.push(entry.rule.clone());
            }
        }
        Ok(set)
    }

    fn maintenance(&mut self) -> Result<MaintenanceReport, PersistenceError> {
        let before = self.entries.len();
        let mut seen: Vec<(String, String, u64)> = Vec::new();
        self.entries.retain(|e| {
            if ph_core::selector::SelectorList::parse(&e.rule.selector).is_err() {
                return false;
            }
            let key = (e.host.clone(), e.path_pattern.clone(), e.rule.fingerprint());
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        let cleaned = before - self.entries.len();
        let size = serde_json::to_vec(&self.export_all()?)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?
            .len();
        Ok(MaintenanceReport { cleaned, size })
    }

    fn export_all(&self) -> Result<ExportBundle, PersistenceError> {
        Ok(ExportBundle {
            version: EXPORT_VERSION,
            stats: self.stats(),
            data: self.entries.clone(),
        })
    }

    fn import_all(&mut self, bundle: &ExportBundle) -> Result<usize, PersistenceError> {
        let mut merged = 0usize;
        for entry in &bundle.data {
            if !self.contains(&entry.host, &entry.path_pattern, &entry.rule) {
                self.entries.push(entry.clone());
                merged += 1;
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_by_path() {
        let mut store = MemoryStore::new();
        store
            .save_rule("example.com", "/user/*", &Rule::hide(".promo", "promos"))
            .unwrap();
        store
            .save_rule("example.com", "/", &Rule::hide(".ad", "ads"))
            .unwrap();
        store
            .save_rule("other.com", "/user/*", &Rule::hide(".junk", "junk"))
            .unwrap();

        let set = store.load_rules("example.com", "/user/42").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.rules[0].selector, ".promo");
        assert_eq!(set.host, "example.com");

        let root = store.load_rules("example.com", "/").unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root.rules[0].selector, ".ad");
    }

    #[test]
    fn test_load_preserves_insertion_order() {
        let mut store = MemoryStore::new();
        for selector in [".one", ".two", ".three"] {
            store
                .save_rule("example.com", "/news", &Rule::hide(selector, selector))
                .unwrap();
        }
        let set = store.load_rules("example.com", "/news").unwrap();
        let selectors: Vec<&str> = set.iter().map(|r| r.selector.as_str()).collect();
        assert_eq!(selectors, vec![".one", ".two", ".three"]);
    }

    #[test]
    fn test_save_is_idempotent() {
        let mut store = MemoryStore::new();
        let rule = Rule::hide(".ad", "ads");
        store.save_rule("example.com", "/", &rule).unwrap();
        store.save_rule("example.com", "/", &rule).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_rule_by_selector() {
        let mut store = MemoryStore::new();
        store
            .save_rule("example.com", "/", &Rule::hide(".ad", "ads"))
            .unwrap();
        store
            .save_rule("example.com", "/news", &Rule::hide(".ad", "ads elsewhere"))
            .unwrap();
        store.remove_rule("example.com", ".ad").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_maintenance_cleans_broken_and_duplicate_entries() {
        let mut store = MemoryStore::new();
        store
            .save_rule("example.com", "/", &Rule::hide(".ad", "ads"))
            .unwrap();
        // A broken selector that slipped in through an old import.
        store.entries.push(StoredRule {
            host: "example.com".to_string(),
            path_pattern: "/".to_string(),
            rule: Rule::hide("div {", "broken"),
        });
        store.entries.push(StoredRule {
            host: "example.com".to_string(),
            path_pattern: "/".to_string(),
            rule: Rule::hide(".ad", "duplicate"),
        });

        let report = store.maintenance().unwrap();
        assert_eq!(report.cleaned, 2);
        assert_eq!(store.len(), 1);
        assert!(report.size > 0);
    }

    #[test]
    fn test_export_import_merges() {
        let mut a = MemoryStore::new();
        a.save_rule("example.com", "/", &Rule::hide(".ad", "ads"))
            .unwrap();
        let bundle = a.export_all().unwrap();
        assert_eq!(bundle.version, EXPORT_VERSION);
        assert_eq!(bundle.stats.hosts, 1);

        let mut b = MemoryStore::new();
        b.save_rule("example.com", "/", &Rule::hide(".ad", "ads"))
            .unwrap();
        b.save_rule("other.com", "/", &Rule::hide(".junk", "junk"))
            .unwrap();

        // Merge, never replace: the duplicate is skipped, existing survive.
        let merged = b.import_all(&bundle).unwrap();
        assert_eq!(merged, 0);
        assert_eq!(b.len(), 2);
    }
}
