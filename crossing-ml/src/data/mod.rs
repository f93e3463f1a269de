//! Data pipeline — annotations, padding, per-dataset loaders and weighted multiplexing.

pub mod annotation;
pub mod loader;
pub mod multiplexer;
pub mod source;
pub mod transform;
pub mod tte;

pub use annotation::{
    BBox, FrameAnnotation, SequenceAnnotation, load_annotations, load_frame_annotations,
};
pub use loader::{LoaderOptions, SequenceBatch, SequenceLoader};
pub use multiplexer::{MultiplexIter, Tagged, WeightedMultiplexer, select_source};
pub use source::{BatchSource, VecSource};
pub use transform::{FrameSample, PaddedSequence, flip_bbox, marshal_frame, pad_sequence};
pub use tte::TimeToEvent;
