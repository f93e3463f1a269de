//! Batch source abstraction consumed by the multiplexer.

/// A finite, single-pass provider of training batches with a known count.
///
/// Implementations must not report more batches than `iter_batches` can
/// deliver during one epoch; the multiplexer ends the epoch as soon as a
/// source runs dry.
pub trait BatchSource {
    type Batch;

    /// Number of batches one call to `iter_batches` yields.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a fresh pass over the batches.
    fn iter_batches(&self) -> Box<dyn Iterator<Item = Self::Batch> + '_>;

    /// Human-readable label for logs.
    fn name(&self) -> &str {
        "source"
    }
}

/// Pre-assembled batches held in memory.
#[derive(Debug, Clone)]
pub struct VecSource<B> {
    name: String,
    batches: Vec<B>,
}

impl<B> VecSource<B> {
    pub fn new(name: impl Into<String>, batches: Vec<B>) -> Self {
        Self {
            name: name.into(),
            batches,
        }
    }

    pub fn batches(&self) -> &[B] {
        &self.batches
    }
}

impl<B: Clone> BatchSource for VecSource<B> {
    type Batch = B;

    fn len(&self) -> usize {
        self.batches.len()
    }

    fn iter_batches(&self) -> Box<dyn Iterator<Item = B> + '_> {
        Box::new(self.batches.iter().cloned())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
