//! Per-dataset batch loader.
//!
//! A [`SequenceLoader`] owns the annotations of one dataset and hands out
//! batches of padded sequences. It implements [`BatchSource`] so several
//! loaders can be fed to the weighted multiplexer.

use crate::data::annotation::{SequenceAnnotation, load_annotations};
use crate::data::source::BatchSource;
use crate::data::transform::{PaddedSequence, pad_sequence};
use crate::error::{PipelineError, Result};
use crossing_core::{DatasetConfig, DatasetKind, SamplerConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

/// A batch of samples from one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceBatch {
    pub source: DatasetKind,
    pub samples: Vec<PaddedSequence>,
}

impl SequenceBatch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Loader options, usually taken from [`SamplerConfig`].
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub padded_length: usize,
    pub hflip_p: f64,
    pub shuffle: bool,
    pub drop_last: bool,
    pub seed: u64,
}

impl From<&SamplerConfig> for LoaderOptions {
    fn from(cfg: &SamplerConfig) -> Self {
        Self {
            batch_size: cfg.batch_size,
            padded_length: cfg.padded_length,
            hflip_p: cfg.hflip_p,
            shuffle: cfg.shuffle,
            drop_last: cfg.drop_last,
            seed: cfg.seed,
        }
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::from(&SamplerConfig::default())
    }
}

/// Batches of one dataset, reshuffled per epoch.
pub struct SequenceLoader {
    kind: DatasetKind,
    samples: Vec<SequenceAnnotation>,
    frame_paths: Vec<Vec<PathBuf>>,
    frame_width: f64,
    options: LoaderOptions,
    epoch: u64,
}

impl SequenceLoader {
    /// Validate every sample up front so iteration cannot fail.
    pub fn new(
        kind: DatasetKind,
        image_root: PathBuf,
        samples: Vec<SequenceAnnotation>,
        options: LoaderOptions,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(PipelineError::invalid_configuration(
                "batch_size must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&options.hflip_p) {
            return Err(PipelineError::invalid_configuration(format!(
                "hflip_p must be within [0, 1], got {}",
                options.hflip_p
            )));
        }
        let mut frame_paths = Vec::with_capacity(samples.len());
        for sample in &samples {
            sample.validate()?;
            if sample.source != kind {
                return Err(PipelineError::dataset(format!(
                    "sample {} is from {}, loader expects {kind}",
                    sample.id, sample.source
                )));
            }
            if sample.seq_len() > options.padded_length {
                return Err(PipelineError::dataset(format!(
                    "sample {}: {} frames exceed padded length {}",
                    sample.id,
                    sample.seq_len(),
                    options.padded_length
                )));
            }
            frame_paths.push(sample.frame_paths(&image_root)?);
        }
        tracing::info!(
            dataset = %kind,
            samples = samples.len(),
            batch_size = options.batch_size,
            "Created sequence loader"
        );
        Ok(Self {
            kind,
            samples,
            frame_paths,
            frame_width: kind.frame_width(),
            options,
            epoch: 0,
        })
    }

    /// Build from a configured dataset, reading its annotation file.
    pub fn from_config(dataset: &DatasetConfig, sampler: &SamplerConfig) -> Result<Self> {
        let samples = load_annotations(&dataset.annotations)?;
        Self::new(
            dataset.kind,
            dataset.image_root.clone(),
            samples,
            LoaderOptions::from(sampler),
        )
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Select the shuffle/flip stream for `epoch`.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    fn epoch_seed(&self) -> u64 {
        self.options
            .seed
            .wrapping_add(self.epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

impl BatchSource for SequenceLoader {
    type Batch = SequenceBatch;

    fn len(&self) -> usize {
        let n = self.samples.len();
        let bs = self.options.batch_size;
        if self.options.drop_last {
            n / bs
        } else {
            n.div_ceil(bs)
        }
    }

    fn iter_batches(&self) -> Box<dyn Iterator<Item = SequenceBatch> + '_> {
        let mut rng = StdRng::seed_from_u64(self.epoch_seed());
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        if self.options.shuffle {
            order.shuffle(&mut rng);
        }
        let n_batches = self.len();
        Box::new(LoaderIter {
            loader: self,
            order,
            rng,
            batch: 0,
            n_batches,
        })
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}

struct LoaderIter<'a> {
    loader: &'a SequenceLoader,
    order: Vec<usize>,
    rng: StdRng,
    batch: usize,
    n_batches: usize,
}

impl LoaderIter<'_> {
    fn marshal(&mut self, index: usize) -> Option<PaddedSequence> {
        let loader = self.loader;
        let flip = loader.options.hflip_p > 0.0 && self.rng.gen_bool(loader.options.hflip_p);
        let sample = &loader.samples[index];
        match pad_sequence(
            sample,
            loader.frame_paths[index].clone(),
            loader.options.padded_length,
            flip.then_some(loader.frame_width),
        ) {
            Ok(padded) => Some(padded),
            Err(e) => {
                // Lengths were checked in `SequenceLoader::new`.
                tracing::error!(sample = %sample.id, error = %e, "Skipping sample");
                None
            }
        }
    }
}

impl Iterator for LoaderIter<'_> {
    type Item = SequenceBatch;

    fn next(&mut self) -> Option<SequenceBatch> {
        if self.batch >= self.n_batches {
            return None;
        }
        let bs = self.loader.options.batch_size;
        let start = self.batch * bs;
        let end = (start + bs).min(self.order.len());
        self.batch += 1;

        let indices: Vec<usize> = self.order[start..end].to_vec();
        let samples = indices
            .into_iter()
            .filter_map(|i| self.marshal(i))
            .collect();
        Some(SequenceBatch {
            source: self.loader.kind,
            samples,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.n_batches - self.batch;
        (left, Some(left))
    }
}
