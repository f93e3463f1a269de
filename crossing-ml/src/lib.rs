//! # crossing-ml — multi-dataset sampling and early stopping
//!
//! Builds per-dataset batch loaders for pedestrian crossing-intent clips
//! (JAAD, PIE, TITAN), interleaves them with a weighted round-robin
//! multiplexer, and tracks validation scores with an early-stopping monitor
//! that snapshots the best model.

pub mod data;
pub mod error;
pub mod training;

pub use data::{
    BatchSource, SequenceBatch, SequenceLoader, Tagged, TimeToEvent, VecSource,
    WeightedMultiplexer,
};
pub use error::{PipelineError, Result};
pub use training::{CheckpointStore, EarlyStopping, ModelBundle, MonitorState, Role, Stateful};

use crossing_core::{CrossingConfig, CrossingError};

/// Build one loader per enabled dataset, in configuration order.
pub fn build_loaders(config: &CrossingConfig) -> Result<Vec<SequenceLoader>> {
    config.validate().map_err(CrossingError::from)?;
    let loaders = config
        .enabled_datasets()
        .map(|dataset| SequenceLoader::from_config(dataset, &config.sampler))
        .collect::<Result<Vec<_>>>()?;
    if loaders.is_empty() {
        return Err(PipelineError::invalid_configuration(
            "no enabled datasets configured",
        ));
    }
    Ok(loaders)
}

/// Multiplex `loaders` with the weights and cap from `config`.
pub fn multiplex<'a>(
    loaders: &'a [SequenceLoader],
    config: &CrossingConfig,
) -> Result<WeightedMultiplexer<'a, SequenceBatch>> {
    let sources: Vec<&dyn BatchSource<Batch = SequenceBatch>> = loaders
        .iter()
        .map(|l| l as &dyn BatchSource<Batch = SequenceBatch>)
        .collect();
    WeightedMultiplexer::new(
        sources,
        config.sampler.weights.clone(),
        config.sampler.max_batches,
    )
}
