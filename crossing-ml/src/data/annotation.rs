//! Pedestrian sequence annotations as stored in the per-dataset JSON files.

use crate::data::tte::TimeToEvent;
use crate::error::{PipelineError, Result};
use crossing_core::DatasetKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `[x1, y1, x2, y2]` in pixels.
pub type BBox = [f64; 4];

/// Per-frame behaviour flags (look, nod, hand gesture, reaction). `-1` means unannotated.
pub type Behavior = [i8; 4];

/// Scene attributes of a track. `-1` means unannotated.
pub type Attributes = [f32; 6];

pub const NO_BEHAVIOR: Behavior = [-1; 4];
pub const NO_ATTRIBUTES: Attributes = [-1.0; 6];

/// One pedestrian track over consecutive frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceAnnotation {
    pub id: String,
    pub source: DatasetKind,
    pub video_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_number: Option<String>,
    pub frames: Vec<u32>,
    /// One box per frame.
    pub bbox: Vec<BBox>,
    /// Per-frame action labels; may be empty.
    #[serde(default)]
    pub action: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Vec<Behavior>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    /// Crossing-transition label.
    #[serde(default, rename = "trans_label", skip_serializing_if = "Option::is_none")]
    pub label: Option<f32>,
    #[serde(default, rename = "TTE", alias = "tte")]
    pub tte: TimeToEvent,
}

impl SequenceAnnotation {
    pub fn seq_len(&self) -> usize {
        self.frames.len()
    }

    /// Check per-frame fields line up with `frames`.
    pub fn validate(&self) -> Result<()> {
        let n = self.frames.len();
        if n == 0 {
            return Err(PipelineError::dataset(format!("sample {}: no frames", self.id)));
        }
        if self.bbox.len() != n {
            return Err(PipelineError::dataset(format!(
                "sample {}: {} boxes for {n} frames",
                self.id,
                self.bbox.len()
            )));
        }
        if !self.action.is_empty() && self.action.len() != n {
            return Err(PipelineError::dataset(format!(
                "sample {}: {} action labels for {n} frames",
                self.id,
                self.action.len()
            )));
        }
        if let Some(behavior) = &self.behavior {
            if behavior.len() != n {
                return Err(PipelineError::dataset(format!(
                    "sample {}: {} behavior rows for {n} frames",
                    self.id,
                    behavior.len()
                )));
            }
        }
        if self.source.uses_set_number() && self.set_number.is_none() {
            return Err(PipelineError::dataset(format!(
                "sample {}: {} samples need a set_number",
                self.id, self.source
            )));
        }
        Ok(())
    }

    /// Image file of every frame under `image_root`.
    pub fn frame_paths(&self, image_root: &Path) -> Result<Vec<PathBuf>> {
        self.frames
            .iter()
            .map(|&frame| {
                self.source
                    .frame_path(
                        image_root,
                        &self.video_number,
                        self.set_number.as_deref(),
                        frame,
                    )
                    .ok_or_else(|| {
                        PipelineError::dataset(format!(
                            "sample {}: cannot resolve frame {frame}",
                            self.id
                        ))
                    })
            })
            .collect()
    }
}

/// A pedestrian in a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnnotation {
    pub id: String,
    pub source: DatasetKind,
    pub video_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_number: Option<String>,
    pub frame: u32,
    pub bbox: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Behavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    #[serde(default, rename = "trans_label", skip_serializing_if = "Option::is_none")]
    pub label: Option<f32>,
    #[serde(default, rename = "TTE", alias = "tte")]
    pub tte: TimeToEvent,
}

impl FrameAnnotation {
    /// Image file of the frame under `image_root`.
    pub fn frame_path(&self, image_root: &Path) -> Result<PathBuf> {
        self.source
            .frame_path(
                image_root,
                &self.video_number,
                self.set_number.as_deref(),
                self.frame,
            )
            .ok_or_else(|| {
                PipelineError::dataset(format!(
                    "sample {}: {} samples need a set_number",
                    self.id, self.source
                ))
            })
    }
}

/// Read a JSON array of sequence annotations.
pub fn load_annotations(path: &Path) -> Result<Vec<SequenceAnnotation>> {
    load_records(path)
}

/// Read a JSON array of single-frame annotations.
pub fn load_frame_annotations(path: &Path) -> Result<Vec<FrameAnnotation>> {
    load_records(path)
}

fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let bytes = std::fs::read(path).map_err(|e| {
        PipelineError::dataset(format!("cannot read annotations {}: {e}", path.display()))
    })?;
    let samples: Vec<T> = serde_json::from_slice(&bytes)?;
    tracing::debug!(path = %path.display(), samples = samples.len(), "Loaded annotations");
    Ok(samples)
}
