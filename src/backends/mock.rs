//! In-memory backend that records calls and returns configured failures
//! Available for use in external test crates

#![allow(dead_code)]

use super::{
    ArtifactId, BackendError, BackendFactory, ListedArtifact, Result, StorageBackend,
    TransferOptions,
};
use crate::config::{Destination, DestinationKind};
use crate::utils::naming::ArtifactName;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

/// Recorded backend invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    Connect,
    Upload(String),
    List,
    Delete(String),
    Disconnect,
    Probe,
}

#[derive(Default)]
struct MockState {
    kind: Option<DestinationKind>,
    calls: Vec<BackendCall>,
    stored: Vec<ListedArtifact>,
    contents: HashMap<String, Vec<u8>>,
    connected: bool,
    hide_uploads: bool,
    connect_error: Option<BackendError>,
    upload_error: Option<BackendError>,
    list_error: Option<BackendError>,
    delete_error: Option<BackendError>,
    chunk_size: Option<usize>,
}

/// Mock backend for testing
///
/// Clones share state, so a test can keep one handle while the engine owns another.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Pre-populate the destination
    pub fn with_existing(self, entries: Vec<ListedArtifact>) -> Self {
        self.state().stored.extend(entries);
        self
    }

    pub fn fail_connect(self, error: BackendError) -> Self {
        self.state().connect_error = Some(error);
        self
    }

    pub fn fail_upload(self, error: BackendError) -> Self {
        self.state().upload_error = Some(error);
        self
    }

    pub fn fail_list(self, error: BackendError) -> Self {
        self.state().list_error = Some(error);
        self
    }

    pub fn fail_delete(self, error: BackendError) -> Self {
        self.state().delete_error = Some(error);
        self
    }

    /// Leave new uploads out of listings, like an eventually consistent store
    pub fn hide_uploads_from_listing(self) -> Self {
        self.state().hide_uploads = true;
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    pub fn was_called(&self, call: &BackendCall) -> bool {
        self.state().calls.contains(call)
    }

    pub fn upload_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Upload(_)))
            .count()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::Delete(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names currently stored, in insertion order
    pub fn stored_names(&self) -> Vec<String> {
        self.state().stored.iter().map(|e| e.name.clone()).collect()
    }

    pub fn content_of(&self, name: &str) -> Option<Vec<u8>> {
        self.state().contents.get(name).cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Chunk size the factory was asked to use
    pub fn chunk_size(&self) -> Option<usize> {
        self.state().chunk_size
    }
}

impl StorageBackend for MockBackend {
    fn kind(&self) -> DestinationKind {
        self.state().kind.unwrap_or(DestinationKind::Local)
    }

    fn connect(&mut self) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BackendCall::Connect);
        if let Some(err) = state.connect_error.clone() {
            return Err(err);
        }
        state.connected = true;
        Ok(())
    }

    fn upload(&mut self, content: &mut dyn Read, name: &ArtifactName) -> Result<ArtifactId> {
        let file_name = name.file_name();
        self.state().calls.push(BackendCall::Upload(file_name.clone()));

        let mut buffer = Vec::new();
        content.read_to_end(&mut buffer)?;

        let mut state = self.state();
        if let Some(err) = state.upload_error.clone() {
            return Err(err);
        }

        let id = ArtifactId::new(format!("mock://{}", file_name));
        state.contents.insert(file_name.clone(), buffer);
        if !state.hide_uploads {
            state.stored.push(ListedArtifact {
                id: id.clone(),
                location: file_name.clone(),
                name: file_name,
                timestamp: name.captured_at(),
            });
        }
        Ok(id)
    }

    fn list(&mut self) -> Result<Vec<ListedArtifact>> {
        let mut state = self.state();
        state.calls.push(BackendCall::List);
        if let Some(err) = state.list_error.clone() {
            return Err(err);
        }
        Ok(state.stored.clone())
    }

    fn delete(&mut self, entry: &ListedArtifact) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BackendCall::Delete(entry.name.clone()));
        if let Some(err) = state.delete_error.clone() {
            return Err(err);
        }
        state.stored.retain(|e| e.id != entry.id);
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state();
        state.calls.push(BackendCall::Disconnect);
        state.connected = false;
    }

    fn probe(&mut self) -> Result<String> {
        self.state().calls.push(BackendCall::Probe);
        Ok("mock destination".to_string())
    }
}

impl BackendFactory for MockBackend {
    fn create(
        &self,
        destination: &Destination,
        options: TransferOptions,
    ) -> Result<Box<dyn StorageBackend>> {
        {
            let mut state = self.state();
            state.kind = Some(destination.kind());
            state.chunk_size = Some(options.chunk_size);
        }
        Ok(Box::new(self.clone()))
    }
}
