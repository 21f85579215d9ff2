//! The slice of the store that survives a restart: notes and map layer
//! preferences. The viewport and the catalog are deliberately left out.

use super::models::{AnnotationTable, BaseLayer, Overlay};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Mutex};
use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    pub property_notes: AnnotationTable,
    pub selected_base_layer: BaseLayer,
    pub enabled_overlays: Vec<Overlay>,
}

/// What actually lands on disk; the version lets us migrate the state
/// shape later without guessing.
#[derive(Serialize, Deserialize)]
struct Envelope {
    state: PersistedState,
    version: u32,
}

const STATE_VERSION: u32 = 0;

#[async_trait]
pub trait StateStorage: Send + Sync {
    /// `Ok(None)` means nothing has been saved yet.
    async fn load(&self) -> Result<Option<PersistedState>>;
    async fn save(&self, state: &PersistedState) -> Result<()>;
}

/// One JSON file, rewritten on every save.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StateStorage for JsonFileStorage {
    async fn load(&self) -> Result<Option<PersistedState>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved state yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("reading {}", self.path.display())
                })
            }
        };
        let envelope: Envelope = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;

        Ok(Some(envelope.state))
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        let json = serde_json::to_vec_pretty(&Envelope {
            state: state.clone(),
            version: STATE_VERSION,
        })?;
        // Write-then-rename so a crash mid-save leaves the old file intact.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;

        Ok(())
    }
}

/// Keeps the state in memory. Used in tests, and for running the dashboard
/// without touching the disk.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<Option<PersistedState>>,
    saves: Mutex<usize>,
}

impl MemoryStorage {
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }
    pub fn saved(&self) -> Option<PersistedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StateStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<PersistedState>> {
        Ok(self.saved())
    }
    async fn save(&self, state: &PersistedState) -> Result<()> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
