//! Training support — early stopping, best-model checkpoints, device placement.

pub mod checkpoint;
pub mod device;
pub mod early_stopping;

pub use checkpoint::{
    CheckpointRecord, CheckpointStore, ModelBundle, RestoreReport, Role, Snapshot, StateDict,
    Stateful,
};
pub use device::{Device, DeviceProbe, StaticProbe, SystemProbe};
pub use early_stopping::{EarlyStopping, MonitorState};
