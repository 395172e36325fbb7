//! Last result of every scheduled run, persisted as JSON

use super::outcome::RunReport;
use crate::config::expand_tilde;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct LastResultStore {
    path: PathBuf,
}

impl LastResultStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: expand_tilde(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored results; a missing or unreadable file counts as empty
    pub fn load(&self) -> BTreeMap<String, RunReport> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return BTreeMap::new(),
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("Ignoring corrupt result file {:?}: {}", self.path, e);
            BTreeMap::new()
        })
    }

    pub fn get(&self, record: &str) -> Option<RunReport> {
        self.load().remove(record)
    }

    /// Replace the last result of `record`
    pub fn record(&self, record: &str, report: &RunReport) -> Result<()> {
        let mut results = self.load();
        results.insert(record.to_string(), report.clone());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&results)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!("Stored last result of '{}'", record);
        Ok(())
    }
}
