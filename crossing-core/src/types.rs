//! Dataset vocabulary shared across crates.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The video-clip datasets crossing knows how to read.
///
/// Each kind lays out its extracted frames differently on disk, see
/// [`DatasetKind::frame_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DatasetKind {
    #[serde(alias = "jaad")]
    Jaad,
    #[serde(alias = "pie")]
    Pie,
    #[serde(alias = "titan")]
    Titan,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [DatasetKind::Jaad, DatasetKind::Pie, DatasetKind::Titan];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Jaad => "JAAD",
            DatasetKind::Pie => "PIE",
            DatasetKind::Titan => "TITAN",
        }
    }

    /// Width in pixels of the extracted frames, used to mirror boxes.
    pub fn frame_width(&self) -> f64 {
        match self {
            DatasetKind::Jaad | DatasetKind::Pie => 1920.0,
            DatasetKind::Titan => 2704.0,
        }
    }

    /// Whether frames of this dataset are grouped by a set number above the video.
    pub fn uses_set_number(&self) -> bool {
        matches!(self, DatasetKind::Pie)
    }

    /// Resolve the image file for one frame.
    ///
    /// Returns `None` for PIE when no set number is given.
    pub fn frame_path(
        &self,
        root: &Path,
        video: &str,
        set: Option<&str>,
        frame: u32,
    ) -> Option<PathBuf> {
        match self {
            DatasetKind::Jaad => Some(root.join(video).join(format!("{frame:05}.png"))),
            DatasetKind::Pie => {
                set.map(|set| root.join(set).join(video).join(format!("{frame:05}.png")))
            }
            DatasetKind::Titan => Some(
                root.join(video)
                    .join("images")
                    .join(format!("{frame:06}.png")),
            ),
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JAAD" => Ok(DatasetKind::Jaad),
            "PIE" => Ok(DatasetKind::Pie),
            "TITAN" => Ok(DatasetKind::Titan),
            other => Err(format!("unknown dataset kind: {other}")),
        }
    }
}
