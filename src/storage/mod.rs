//! Persistence layer.
//!
//! Saves and loads the bulletin checkpoint to/from a JSON file. One process
//! owns the file at a time; every save overwrites it whole.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{CbatError, VersionedState};

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "saved.json";

/// Checkpoint persistence used by the pipeline.
pub trait StateStore: Send + Sync {
    /// Load the checkpoint; absent means the default empty state.
    fn load(&self) -> Result<VersionedState, CbatError>;

    fn save(&self, state: &VersionedState) -> Result<(), CbatError>;
}

/// Save the checkpoint to a JSON file.
pub fn save_state(state: &VersionedState, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(Path::new(DEFAULT_STATE_FILE));
    let json = serde_json::to_string_pretty(state).context("Failed to serialise state")?;

    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write state to {}", path.display()))?;

    debug!(
        path = %path.display(),
        version = %state.version,
        bonds = state.known_bonds.len(),
        "State saved"
    );
    Ok(())
}

/// Load the checkpoint from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&Path>) -> Result<Option<VersionedState>> {
    let path = path.unwrap_or(Path::new(DEFAULT_STATE_FILE));

    if !path.exists() {
        info!(path = %path.display(), "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state from {}", path.display()))?;

    let state: VersionedState = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse state from {}", path.display()))?;

    info!(
        path = %path.display(),
        version = %state.version,
        bonds = state.known_bonds.len(),
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(Path::new(DEFAULT_STATE_FILE));
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete state file {}", path.display()))?;
    }
    Ok(())
}

/// [`StateStore`] backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<VersionedState, CbatError> {
        load_state(Some(self.path.as_path()))
            .map(Option::unwrap_or_default)
            .map_err(|e| CbatError::StateLoad(format!("{e:#}")))
    }

    fn save(&self, state: &VersionedState) -> Result<(), CbatError> {
        save_state(state, Some(self.path.as_path())).map_err(|e| CbatError::StateSave(format!("{e:#}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
