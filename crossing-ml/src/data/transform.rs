//! Sample marshalling: horizontal flip and padding to a fixed sequence length.

use crate::data::annotation::{
    Attributes, BBox, Behavior, FrameAnnotation, NO_ATTRIBUTES, NO_BEHAVIOR, SequenceAnnotation,
};
use crate::data::tte::TimeToEvent;
use crate::error::{PipelineError, Result};
use crossing_core::DatasetKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Box used for padded steps.
pub const PAD_BBOX: BBox = [0.0; 4];
/// Action label used for padded steps.
pub const PAD_ACTION: i32 = -1;

/// Mirror a box around the vertical centre line of a `width`-pixel frame.
pub fn flip_bbox(bbox: &BBox, width: f64) -> BBox {
    [width - bbox[2], bbox[1], width - bbox[0], bbox[3]]
}

/// A sequence sample padded to a fixed length, ready for collation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddedSequence {
    pub id: String,
    pub source: DatasetKind,
    /// Real frames only; never padded.
    pub frame_paths: Vec<PathBuf>,
    pub bbox: Vec<BBox>,
    /// Number of real steps; the rest is padding.
    pub seq_length: usize,
    pub action: Vec<i32>,
    pub behavior: Vec<Behavior>,
    pub attributes: Attributes,
    pub label: Option<f32>,
    pub tte: TimeToEvent,
    pub tte_tag: f32,
    pub flipped: bool,
}

/// Pad `sample` to `padded_length` steps, mirroring boxes when `flip_width` is set.
pub fn pad_sequence(
    sample: &SequenceAnnotation,
    frame_paths: Vec<PathBuf>,
    padded_length: usize,
    flip_width: Option<f64>,
) -> Result<PaddedSequence> {
    let n = sample.seq_len();
    if n > padded_length {
        return Err(PipelineError::dataset(format!(
            "sample {}: {n} frames exceed padded length {padded_length}",
            sample.id
        )));
    }

    let mut bbox: Vec<BBox> = match flip_width {
        Some(width) => sample.bbox.iter().map(|b| flip_bbox(b, width)).collect(),
        None => sample.bbox.clone(),
    };
    bbox.resize(padded_length, PAD_BBOX);

    let mut action = if sample.action.is_empty() {
        vec![PAD_ACTION; n]
    } else {
        sample.action.clone()
    };
    action.resize(padded_length, PAD_ACTION);

    let mut behavior = sample
        .behavior
        .clone()
        .unwrap_or_else(|| vec![NO_BEHAVIOR; n]);
    behavior.resize(padded_length, NO_BEHAVIOR);

    let tte = sample.tte.rounded();
    Ok(PaddedSequence {
        id: sample.id.clone(),
        source: sample.source,
        frame_paths,
        bbox,
        seq_length: n,
        action,
        behavior,
        attributes: sample.attributes.unwrap_or(NO_ATTRIBUTES),
        label: sample.label,
        tte,
        tte_tag: tte.tag(),
        flipped: flip_width.is_some(),
    })
}

/// A single-frame sample with defaults filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub id: String,
    pub source: DatasetKind,
    pub image_path: PathBuf,
    pub bbox: BBox,
    pub behavior: Behavior,
    pub attributes: Attributes,
    pub label: Option<f32>,
    pub tte: TimeToEvent,
    pub flipped: bool,
}

/// Resolve the image of `sample` and fill absent annotations, mirroring the
/// box when `flip_width` is set.
pub fn marshal_frame(
    sample: &FrameAnnotation,
    image_root: &Path,
    flip_width: Option<f64>,
) -> Result<FrameSample> {
    let image_path = sample.frame_path(image_root)?;
    let bbox = match flip_width {
        Some(width) => flip_bbox(&sample.bbox, width),
        None => sample.bbox,
    };
    Ok(FrameSample {
        id: sample.id.clone(),
        source: sample.source,
        image_path,
        bbox,
        behavior: sample.behavior.unwrap_or(NO_BEHAVIOR),
        attributes: sample.attributes.unwrap_or(NO_ATTRIBUTES),
        label: sample.label,
        tte: sample.tte.rounded(),
        flipped: flip_width.is_some(),
    })
}
