//! Producer double for orchestration tests
//! Available for use in external test crates

#![allow(dead_code)]

use super::{Artifact, ArtifactProducer, DumpFormat};
use crate::config::BackupScope;
use anyhow::Result;
use std::sync::{Arc, Mutex};

/// Recorded produce request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProduceCall {
    pub source: String,
    pub scope: BackupScope,
    pub format: DumpFormat,
}

/// Mock producer returning fixed bytes or a configured failure
#[derive(Clone)]
pub struct MockProducer {
    pub calls: Arc<Mutex<Vec<ProduceCall>>>,
    content: Vec<u8>,
    failure: Option<String>,
    databases: Vec<String>,
}

impl Default for MockProducer {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
            content: b"PK mock archive".to_vec(),
            failure: None,
            databases: Vec::new(),
        }
    }
}

impl MockProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn with_databases(mut self, databases: &[&str]) -> Self {
        self.databases = databases.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn get_calls(&self) -> Vec<ProduceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ArtifactProducer for MockProducer {
    fn produce(&self, source: &str, scope: BackupScope, format: DumpFormat) -> Result<Artifact> {
        self.calls.lock().unwrap().push(ProduceCall {
            source: source.to_string(),
            scope,
            format,
        });
        if let Some(message) = &self.failure {
            anyhow::bail!("{}", message);
        }
        Ok(Artifact::from_bytes(self.content.clone()))
    }

    fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.databases.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
