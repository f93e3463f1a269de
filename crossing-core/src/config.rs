//! Configuration system for crossing.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/crossing/config.toml` and/or `.crossing/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::DatasetKind;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossingConfig {
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Datasets to multiplex, in source order.
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub early_stopping: EarlyStoppingConfig,
}

/// How batches are assembled and interleaved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Samples per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Sequences are padded to this many frames.
    #[serde(default = "default_padded_length")]
    pub padded_length: usize,
    /// Probability of horizontally flipping a whole sequence.
    #[serde(default)]
    pub hflip_p: f64,
    /// Per-dataset weights. May omit the last entry, which then takes the remainder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    /// Upper bound on batches per epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batches: Option<usize>,
    /// Shuffle sample order within each dataset.
    #[serde(default = "default_true")]
    pub shuffle: bool,
    /// Drop the trailing partial batch of each dataset.
    #[serde(default)]
    pub drop_last: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            padded_length: default_padded_length(),
            hflip_p: 0.0,
            weights: None,
            max_batches: None,
            shuffle: true,
            drop_last: false,
            seed: default_seed(),
        }
    }
}

fn default_batch_size() -> usize {
    8
}

fn default_padded_length() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

/// One annotated dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub kind: DatasetKind,
    /// JSON file holding the sequence annotations.
    pub annotations: PathBuf,
    /// Root directory of the extracted frames.
    pub image_root: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Where restored model state is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use an accelerator when one is visible, otherwise the CPU.
    #[default]
    Auto,
    Cpu,
    Accelerator,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevicePreference::Auto => write!(f, "auto"),
            DevicePreference::Cpu => write!(f, "cpu"),
            DevicePreference::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Early-stopping and checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    /// Epochs without improvement before stopping.
    #[serde(default = "default_patience")]
    pub patience: usize,
    /// Minimum gain over the best score that counts as an improvement.
    #[serde(default)]
    pub delta: f64,
    /// Seeds the best score with `-min_loss` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_loss: Option<f64>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    #[serde(default)]
    pub device: DevicePreference,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: default_patience(),
            delta: 0.0,
            min_loss: None,
            verbose: false,
            checkpoint_path: default_checkpoint_path(),
            device: DevicePreference::Auto,
        }
    }
}

fn default_patience() -> usize {
    7
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(".crossing/checkpoints/best.json")
}

impl CrossingConfig {
    /// Datasets that take part in sampling.
    pub fn enabled_datasets(&self) -> impl Iterator<Item = &DatasetConfig> {
        self.datasets.iter().filter(|d| d.enabled)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler.batch_size == 0 {
            return Err(ConfigError::invalid("sampler.batch_size must be at least 1"));
        }
        if self.sampler.padded_length == 0 {
            return Err(ConfigError::invalid(
                "sampler.padded_length must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.sampler.hflip_p) {
            return Err(ConfigError::invalid(format!(
                "sampler.hflip_p must be within [0, 1], got {}",
                self.sampler.hflip_p
            )));
        }
        if self.early_stopping.patience == 0 {
            return Err(ConfigError::invalid(
                "early_stopping.patience must be at least 1",
            ));
        }
        if !self.early_stopping.delta.is_finite() {
            return Err(ConfigError::invalid("early_stopping.delta must be finite"));
        }
        Ok(())
    }

    /// Make relative dataset and checkpoint paths relative to `workspace`.
    pub fn resolve_paths(&mut self, workspace: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = workspace.join(&*p);
            }
        };
        for dataset in &mut self.datasets {
            anchor(&mut dataset.annotations);
            anchor(&mut dataset.image_root);
        }
        anchor(&mut self.early_stopping.checkpoint_path);
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "crossing", "crossing")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".crossing").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `CROSSING_`)
/// 3. Workspace-local config (`.crossing/config.toml`)
/// 4. User config (`~/.config/crossing/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&CrossingConfig>,
) -> Result<CrossingConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(CrossingConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        tracing::debug!(path = %user_config.display(), "Merging user config");
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            tracing::debug!(path = %ws_config.display(), "Merging workspace config");
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // CROSSING_SAMPLER__BATCH_SIZE, CROSSING_EARLY_STOPPING__PATIENCE, etc.
    figment = figment.merge(Env::prefixed("CROSSING_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load, validate and anchor the configuration of `workspace`.
///
/// Relative dataset and checkpoint paths are resolved against `workspace`.
pub fn load_workspace_config(workspace: &Path) -> crate::error::Result<CrossingConfig> {
    let mut config = load_config(Some(workspace), None).map_err(ConfigError::from)?;
    config.validate()?;
    config.resolve_paths(workspace);
    Ok(config)
}

/// Check whether any crossing configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
