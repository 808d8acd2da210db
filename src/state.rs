// src/state.rs

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::{RegistryValueSnapshot, StartMode};

pub const STATE_FORMAT_VERSION: u32 = 1;

/// Original start mode of a service, captured the first time the tool
/// actually changed it. The token is kept as a string so that a file written
/// by a different tool version fails per-item at restore time instead of
/// poisoning the whole load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedServiceEntry {
    pub label: String,
    pub original_start_type: String,
}

/// Original data of a registry value, captured before the first change.
/// `original: None` records that the value did not exist, which makes restore
/// delete it rather than invent a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRegistryEntry {
    pub label: String,
    pub path: String,
    pub name: String,
    pub original: Option<RegistryValueSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub version: u32,
    pub created: String,
    pub services: IndexMap<String, PersistedServiceEntry>,
    pub registry: IndexMap<String, PersistedRegistryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_apply: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restore: Option<String>,
}

impl RunState {
    fn new() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            created: Utc::now().to_rfc3339(),
            services: IndexMap::new(),
            registry: IndexMap::new(),
            last_apply: None,
            last_restore: None,
        }
    }
}

/// Owns the persisted record of originals. Everything restore does is driven
/// by what was captured here, never by guessing a Windows default.
pub struct StateStore {
    path: PathBuf,
    pub state: RunState,
}

impl StateStore {
    /// Loads the state file, falling back to a fresh empty state when the
    /// file is missing, unreadable or corrupt. Load never fails the run.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RunState>(&contents) {
                Ok(state) => state,
                Err(e) => {
                    debug!("State file {:?} is corrupt ({}); starting fresh.", path, e);
                    RunState::new()
                }
            },
            Err(e) => {
                debug!("State file {:?} not readable ({}); starting fresh.", path, e);
                RunState::new()
            }
        };
        Self { path, state }
    }

    /// Writes the state file via a temp file and rename so a crash mid-write
    /// leaves either the old file or the new one, never a torn half.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory {:?}", dir))?;
        }
        let json = serde_json::to_string_pretty(&self.state)
            .context("Failed to serialize state to JSON")?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state file {:?}", self.path))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Captures a service's original start mode, first-write-wins. Returns
    /// `true` when a new record was inserted; a second capture attempt for
    /// the same id is a no-op and returns `false`.
    pub fn record_service_original(&mut self, id: &str, label: &str, mode: StartMode) -> bool {
        if self.state.services.contains_key(id) {
            return false;
        }
        self.state.services.insert(
            id.to_string(),
            PersistedServiceEntry {
                label: label.to_string(),
                original_start_type: mode.to_string(),
            },
        );
        true
    }

    /// Captures a registry value's original data (or its absence),
    /// first-write-wins, keyed by `path\name`.
    pub fn record_registry_original(
        &mut self,
        path: &str,
        name: &str,
        label: &str,
        original: Option<RegistryValueSnapshot>,
    ) -> bool {
        let key = format!("{}\\{}", path, name);
        if self.state.registry.contains_key(&key) {
            return false;
        }
        self.state.registry.insert(
            key,
            PersistedRegistryEntry {
                label: label.to_string(),
                path: path.to_string(),
                name: name.to_string(),
                original,
            },
        );
        true
    }

    pub fn service_original(&self, id: &str) -> Option<&PersistedServiceEntry> {
        self.state.services.get(id)
    }

    pub fn registry_original(&self, key: &str) -> Option<&PersistedRegistryEntry> {
        self.state.registry.get(key)
    }

    pub fn stamp_apply(&mut self) {
        self.state.last_apply = Some(Utc::now().to_rfc3339());
    }

    pub fn stamp_restore(&mut self) {
        self.state.last_restore = Some(Utc::now().to_rfc3339());
    }
}
