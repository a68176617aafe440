//! JSON-file rule store
//!
//! A write-through [`RuleStore`] over an export bundle on disk, so the CLI
//! can run the same store operations the extension shell runs against its
//! key-value backend.

use std::fs;
use std::path::{Path, PathBuf};

use ph_core::types::{Rule, RuleSet};
use ph_runtime::persist::{
    ExportBundle, MaintenanceReport, MemoryStore, PersistenceError, RuleStore,
};

pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Open a store file; a missing file starts empty.
    pub fn open(path: &Path) -> Result<Self, String> {
        let mut inner = MemoryStore::new();
        if path.exists() {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            let bundle: ExportBundle = serde_json::from_str(&text)
                .map_err(|e| format!("'{}' is not a rule bundle: {}", path.display(), e))?;
            inner
                .import_all(&bundle)
                .map_err(|e| format!("Failed to load '{}': {}", path.display(), e))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.inner.len()
    }

    fn persist(&self) -> Result<(), PersistenceError> {
        let bundle = self.inner.export_all()?;
        let json = serde_json::to_string_pretty(&bundle)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        fs::write(&self.path, json)
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))
    }
}

impl RuleStore for FileStore {
    fn save_rule(
        &mut self,
        host: &str,
        path_pattern: &str,
        rule: &Rule,
    ) -> Result<(), PersistenceError> {
        self.inner.save_rule(host, path_pattern, rule)?;
        self.persist()
    }

    fn remove_rule(&mut self, host: &str, selector: &str) -> Result<(), PersistenceError> {
        self.inner.remove_rule(host, selector)?;
        self.persist()
    }

    fn load_rules(&self, host: &str, path: &str) -> Result<RuleSet, PersistenceError> {
        self.inner.load_rules(host, path)
    }

    fn maintenance(&mut self) -> Result<MaintenanceReport, PersistenceError> {
        let report = self.inner.maintenance()?;
        self.persist()?;
        Ok(report)
    }

    fn export_all(&self) -> Result<ExportBundle, PersistenceError> {
        self.inner.export_all()
    }

    fn import_all(&mut self, bundle: &ExportBundle) -> Result<usize, PersistenceError> {
        let merged = self.inner.import_all(bundle)?;
        self.persist()?;
        Ok(merged)
    }
}
