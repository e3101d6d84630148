//! Durable, run-keyed persistence of the ecosystem state.
//!
//! The state is written after every successful step so that a rerun with the same inputs
//! can skip what is already on chain.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use fs2::FileExt;
use serde::Deserialize;

use crate::{EcosystemState, ProvisionError, Result, RunKey};

/// Persists [`EcosystemState`] to `<dir>/ecosystem-<run id>.json`.
///
/// The store holds an exclusive lock on `<dir>/ecosystem-<run id>.lock` for its whole
/// lifetime: two runs with the same key cannot interleave their submissions. The run key is
/// written next to the state and checked on load.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    run_key: RunKey,
    _lock: File,
}

/// On-disk layout of a persisted state.
#[derive(Debug, Deserialize)]
struct PersistedState {
    run_key: RunKey,
    state: EcosystemState,
}

impl StateStore {
    /// Open (and lock) the store for a run.
    pub fn open(dir: &Path, run_key: &RunKey) -> Result<Self> {
        Self::open_inner(dir, run_key).map_err(ProvisionError::Store)
    }

    fn open_inner(dir: &Path, run_key: &RunKey) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;

        let id = run_key.id();
        let lock_path = dir.join(format!("ecosystem-{id}.lock"));
        let lock = File::create(&lock_path)
            .with_context(|| format!("Failed to create lock file {}", lock_path.display()))?;
        lock.try_lock_exclusive().with_context(|| {
            format!(
                "Another provisioning run holds {}, refusing to run concurrently",
                lock_path.display()
            )
        })?;

        let path = dir.join(format!("ecosystem-{id}.json"));
        tracing::debug!(path = %path.display(), "State store opened");

        Ok(Self {
            path,
            run_key: run_key.clone(),
            _lock: lock,
        })
    }

    /// The run this store belongs to.
    pub fn run_key(&self) -> &RunKey {
        &self.run_key
    }

    /// Path of the persisted state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, if a previous run left one.
    pub fn load(&self) -> Result<Option<EcosystemState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state from {}", self.path.display()))
            .map_err(ProvisionError::Store)?;
        let persisted: PersistedState = serde_json::from_str(&content)
            .context("Failed to parse persisted state JSON")
            .map_err(ProvisionError::Store)?;

        if persisted.run_key != self.run_key {
            return Err(ProvisionError::Store(anyhow::anyhow!(
                "{} was written by run {} ({} on chain {}), not by run {}",
                self.path.display(),
                persisted.run_key.id(),
                persisted.run_key.environment,
                persisted.run_key.chain_id,
                self.run_key.id()
            )));
        }

        tracing::info!(path = %self.path.display(), "Persisted state loaded");
        Ok(Some(persisted.state))
    }

    /// Atomically replace the persisted state.
    pub fn save(&self, state: &EcosystemState) -> Result<()> {
        self.save_inner(state).map_err(ProvisionError::Store)
    }

    fn save_inner(&self, state: &EcosystemState) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "run_key": &self.run_key,
            "state": state,
        }))
        .context("Failed to serialize state")?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write state to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to move state into {}", self.path.display()))?;

        tracing::trace!(path = %self.path.display(), "State saved");
        Ok(())
    }

    /// Remove the persisted state so the next run starts from scratch.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))
                .map_err(ProvisionError::Store)?;
        }
        Ok(())
    }
}
