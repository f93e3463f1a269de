//! Best-model snapshots: save, restore and history.
//!
//! A snapshot holds the epoch, optimiser state, score, decision threshold and
//! the state of every model role present in the [`ModelBundle`] at save time.
//! Restore only touches roles present both in the bundle and the snapshot.

use crate::error::{PipelineError, Result};
use crate::training::device::{Device, DeviceProbe};
use chrono::{DateTime, Utc};
use crossing_core::DevicePreference;
use crossing_core::persistence::{read_json, write_atomic, write_json_atomic};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Opaque serialized state of a model or optimiser.
pub type StateDict = serde_json::Value;

/// Anything whose state can be captured and restored.
pub trait Stateful {
    fn state_dict(&self) -> StateDict;

    fn load_state_dict(&mut self, state: StateDict, device: Device) -> Result<()>;
}

/// Sub-model slots that are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Encoder,
    Decoder,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Encoder, Role::Decoder];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Encoder => write!(f, "encoder"),
            Role::Decoder => write!(f, "decoder"),
        }
    }
}

/// The live models of a training run plus their decision threshold.
pub struct ModelBundle {
    encoder: Option<Box<dyn Stateful>>,
    decoder: Option<Box<dyn Stateful>>,
    pub best_thr: f64,
}

impl ModelBundle {
    pub fn new(best_thr: f64) -> Self {
        Self {
            encoder: None,
            decoder: None,
            best_thr,
        }
    }

    pub fn with_encoder(mut self, model: Box<dyn Stateful>) -> Self {
        self.encoder = Some(model);
        self
    }

    pub fn with_decoder(mut self, model: Box<dyn Stateful>) -> Self {
        self.decoder = Some(model);
        self
    }

    pub fn model(&self, role: Role) -> Option<&dyn Stateful> {
        match role {
            Role::Encoder => self.encoder.as_deref(),
            Role::Decoder => self.decoder.as_deref(),
        }
    }

    pub fn model_mut(&mut self, role: Role) -> Option<&mut (dyn Stateful + 'static)> {
        match role {
            Role::Encoder => self.encoder.as_deref_mut(),
            Role::Decoder => self.decoder.as_deref_mut(),
        }
    }

    /// Roles that hold a model.
    pub fn roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| self.model(*r).is_some())
            .collect()
    }
}

/// On-disk snapshot. Role states are present only for roles the bundle held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub epoch: usize,
    pub optimizer_state: StateDict,
    pub score: f64,
    pub best_thr: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_state: Option<StateDict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder_state: Option<StateDict>,
}

impl Snapshot {
    pub fn capture(
        epoch: usize,
        score: f64,
        bundle: &ModelBundle,
        optimizer: &dyn Stateful,
    ) -> Self {
        Self {
            epoch,
            optimizer_state: optimizer.state_dict(),
            score,
            best_thr: bundle.best_thr,
            encoder_state: bundle.model(Role::Encoder).map(|m| m.state_dict()),
            decoder_state: bundle.model(Role::Decoder).map(|m| m.state_dict()),
        }
    }

    pub fn state(&self, role: Role) -> Option<&StateDict> {
        match role {
            Role::Encoder => self.encoder_state.as_ref(),
            Role::Decoder => self.decoder_state.as_ref(),
        }
    }

    fn take_state(&mut self, role: Role) -> Option<StateDict> {
        match role {
            Role::Encoder => self.encoder_state.take(),
            Role::Decoder => self.decoder_state.take(),
        }
    }

    pub fn roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| self.state(*r).is_some())
            .collect()
    }
}

/// One saved snapshot in the history manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: String,
    pub epoch: usize,
    pub score: f64,
    pub roles: Vec<Role>,
    pub path: PathBuf,
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// What a restore did.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub epoch: usize,
    pub score: f64,
    pub best_thr: f64,
    pub device: Device,
    pub restored: Vec<Role>,
    /// Requested by the bundle but absent from the snapshot.
    pub skipped: Vec<Role>,
}

/// A snapshot file plus its history manifest.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    max_history: usize,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_history: 50,
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `best.json` -> `best.history.json`.
    pub fn history_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string());
        self.path.with_file_name(format!("{stem}.history.json"))
    }

    /// Atomically replace the snapshot and append a history record.
    ///
    /// Only the snapshot write can fail the save. History bookkeeping is
    /// best-effort: an unreadable manifest is replaced by a fresh one and a
    /// failed manifest write is logged.
    pub fn save(&self, snapshot: &Snapshot) -> Result<CheckpointRecord> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &bytes).map_err(|e| PipelineError::CheckpointSave {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let record = CheckpointRecord {
            id: uuid::Uuid::new_v4().to_string(),
            epoch: snapshot.epoch,
            score: snapshot.score,
            roles: snapshot.roles(),
            path: self.path.clone(),
            hash: format!("{:x}", Sha256::digest(&bytes)),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };

        let history_path = self.history_path();
        let mut history = self.history().unwrap_or_else(|e| {
            tracing::warn!(
                path = %history_path.display(),
                error = %e,
                "Unreadable checkpoint history, starting a new one"
            );
            Vec::new()
        });
        history.push(record.clone());
        if history.len() > self.max_history {
            let excess = history.len() - self.max_history;
            history.drain(..excess);
        }
        if let Err(e) = write_json_atomic(&history_path, &history) {
            tracing::warn!(
                path = %history_path.display(),
                error = %e,
                "Failed to write checkpoint history"
            );
        }

        tracing::debug!(
            path = %self.path.display(),
            epoch = record.epoch,
            hash = %record.hash,
            "Saved checkpoint"
        );
        Ok(record)
    }

    /// Read the snapshot. Missing or malformed files are `CheckpointLoad` errors.
    pub fn load(&self) -> Result<Snapshot> {
        match read_json::<Snapshot>(&self.path) {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => Err(PipelineError::checkpoint_load(&self.path, "file not found")),
            Err(e) => Err(PipelineError::checkpoint_load(&self.path, e.to_string())),
        }
    }

    /// Saved records, oldest first. Empty when nothing was saved yet.
    pub fn history(&self) -> Result<Vec<CheckpointRecord>> {
        read_json(&self.history_path())
            .map(Option::unwrap_or_default)
            .map_err(|e| PipelineError::checkpoint_load(self.history_path(), e.to_string()))
    }

    /// Load the snapshot into `bundle`.
    ///
    /// Each role held by the bundle is restored if the snapshot has it and
    /// left untouched otherwise. The decision threshold is always restored.
    pub fn restore(
        &self,
        bundle: &mut ModelBundle,
        preference: DevicePreference,
        probe: &dyn DeviceProbe,
    ) -> Result<RestoreReport> {
        let mut snapshot = self.load()?;
        let device = Device::resolve(preference, probe);

        let mut restored = Vec::new();
        let mut skipped = Vec::new();
        for role in bundle.roles() {
            let Some(state) = snapshot.take_state(role) else {
                tracing::warn!(%role, path = %self.path.display(), "Role missing from checkpoint");
                skipped.push(role);
                continue;
            };
            if let Some(model) = bundle.model_mut(role) {
                model.load_state_dict(state, device).map_err(|e| {
                    PipelineError::checkpoint_load(&self.path, format!("{role}: {e}"))
                })?;
                restored.push(role);
            }
        }
        bundle.best_thr = snapshot.best_thr;

        tracing::info!(
            path = %self.path.display(),
            epoch = snapshot.epoch,
            %device,
            restored = ?restored,
            "Restored checkpoint"
        );
        Ok(RestoreReport {
            epoch: snapshot.epoch,
            score: snapshot.score,
            best_thr: snapshot.best_thr,
            device,
            restored,
            skipped,
        })
    }
}
