//! Weighted round-robin multiplexing of several batch sources.
//!
//! The multiplexer interleaves batches from independent datasets so that
//! each dataset contributes roughly its weight's share of an epoch. At every
//! step it pulls from the source that is furthest behind its share, i.e. the
//! one minimising `loaded[i] / weight[i]`, with the lowest index winning ties.
//!
//! An epoch ends either after `n_batches` yields or as soon as the selected
//! source has nothing left, whichever comes first. The bound is checked
//! before each pull, so `n_batches == 0` gives an empty epoch and no source
//! is touched. A loop that checks the bound only after each yield would
//! still emit one batch in that case; here [`WeightedMultiplexer::len`] is
//! always an upper bound on the yields. The selected source index
//! travels with every batch (see [`Tagged`]) so downstream consumers never
//! need shared state to find out where a batch came from.

use crate::data::source::BatchSource;
use crate::error::{PipelineError, Result};
use std::iter::FusedIterator;

/// A batch together with the index of the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<B> {
    pub source_index: usize,
    pub batch: B,
}

impl<B> Tagged<B> {
    pub fn into_inner(self) -> B {
        self.batch
    }
}

/// Merges several [`BatchSource`]s into one weighted, deterministic stream.
///
/// Sources are borrowed; the harness that built them keeps ownership and may
/// reuse them across epochs. Each call to [`iter`](Self::iter) starts a new
/// epoch with fresh per-source iterators.
pub struct WeightedMultiplexer<'a, B> {
    sources: Vec<&'a dyn BatchSource<Batch = B>>,
    weights: Vec<f64>,
    n_batches: usize,
}

impl<'a, B> WeightedMultiplexer<'a, B> {
    /// Build a multiplexer.
    ///
    /// `weights` may be omitted (uniform), given for every source, or given
    /// for all but the last source, which then receives `1 - sum(weights)`.
    /// The resulting weights must all be positive and are normalised to sum
    /// to one. The epoch length is `floor(min_i(len_i / weight_i))`, capped
    /// by `max_batches` when given.
    pub fn new(
        sources: Vec<&'a dyn BatchSource<Batch = B>>,
        weights: Option<Vec<f64>>,
        max_batches: Option<usize>,
    ) -> Result<Self> {
        let weights = resolve_weights(sources.len(), weights)?;

        let budget = sources
            .iter()
            .zip(&weights)
            .map(|(source, w)| source.len() as f64 / w)
            .fold(f64::INFINITY, f64::min)
            .floor() as usize;
        let n_batches = match max_batches {
            Some(cap) => budget.min(cap),
            None => budget,
        };

        for source in sources.iter().filter(|s| s.is_empty()) {
            tracing::warn!(source = source.name(), "Batch source is empty, epoch will be empty");
        }
        tracing::info!(
            weights = ?weights,
            sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            n_batches,
            "dataset weights"
        );

        Ok(Self {
            sources,
            weights,
            n_batches,
        })
    }

    /// Batches per epoch. An upper bound: an exhausted source ends the epoch early.
    pub fn len(&self) -> usize {
        self.n_batches
    }

    pub fn is_empty(&self) -> bool {
        self.n_batches == 0
    }

    /// Normalised weights, one per source.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source_name(&self, index: usize) -> Option<&str> {
        self.sources.get(index).map(|s| s.name())
    }

    /// Start one epoch.
    pub fn iter(&self) -> MultiplexIter<'_, B> {
        MultiplexIter {
            iters: self.sources.iter().map(|s| s.iter_batches()).collect(),
            weights: &self.weights,
            n_loaded: vec![0; self.sources.len()],
            yielded: 0,
            n_batches: self.n_batches,
            last_source: None,
            done: false,
        }
    }
}

impl<'m, 'a, B> IntoIterator for &'m WeightedMultiplexer<'a, B> {
    type Item = Tagged<B>;
    type IntoIter = MultiplexIter<'m, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One epoch of a [`WeightedMultiplexer`].
pub struct MultiplexIter<'m, B> {
    iters: Vec<Box<dyn Iterator<Item = B> + 'm>>,
    weights: &'m [f64],
    n_loaded: Vec<usize>,
    yielded: usize,
    n_batches: usize,
    last_source: Option<usize>,
    done: bool,
}

impl<B> MultiplexIter<'_, B> {
    /// Index of the source that produced the most recent batch.
    pub fn last_source(&self) -> Option<usize> {
        self.last_source
    }

    /// Batches taken from each source so far this epoch.
    pub fn loaded(&self) -> &[usize] {
        &self.n_loaded
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }
}

impl<B> Iterator for MultiplexIter<'_, B> {
    type Item = Tagged<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.yielded >= self.n_batches {
            self.done = true;
            return None;
        }

        let index = select_source(&self.n_loaded, self.weights);
        let Some(batch) = self.iters[index].next() else {
            tracing::debug!(
                source = index,
                yielded = self.yielded,
                n_batches = self.n_batches,
                "Batch source exhausted, ending epoch"
            );
            self.done = true;
            return None;
        };

        self.n_loaded[index] += 1;
        self.yielded += 1;
        self.last_source = Some(index);
        Some(Tagged {
            source_index: index,
            batch,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.n_batches - self.yielded))
        }
    }
}

impl<B> FusedIterator for MultiplexIter<'_, B> {}

/// Pick the source furthest behind its share: `argmin_i(loaded[i] / weights[i])`.
///
/// Ties go to the lowest index.
pub fn select_source(loaded: &[usize], weights: &[f64]) -> usize {
    let mut best = 0;
    let mut best_ratio = f64::INFINITY;
    for (i, (&n, &w)) in loaded.iter().zip(weights).enumerate() {
        let ratio = n as f64 / w;
        if ratio < best_ratio {
            best = i;
            best_ratio = ratio;
        }
    }
    best
}

/// Expand, validate and normalise per-source weights.
pub fn resolve_weights(n_sources: usize, weights: Option<Vec<f64>>) -> Result<Vec<f64>> {
    if n_sources == 0 {
        return Err(PipelineError::invalid_configuration(
            "at least one batch source is required",
        ));
    }

    let mut weights = match weights {
        None => vec![1.0 / n_sources as f64; n_sources],
        Some(mut w) if w.len() + 1 == n_sources => {
            let rest = 1.0 - w.iter().sum::<f64>();
            w.push(rest);
            w
        }
        Some(w) if w.len() == n_sources => w,
        Some(w) => {
            return Err(PipelineError::invalid_configuration(format!(
                "invalid dataset weights: {w:?} for {n_sources} sources"
            )));
        }
    };

    if let Some(bad) = weights.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
        return Err(PipelineError::invalid_configuration(format!(
            "dataset weights must be positive, got {bad} in {weights:?}"
        )));
    }

    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::VecSource;
    use pretty_assertions::assert_eq;

    fn numbered(name: &str, n: usize) -> VecSource<(String, usize)> {
        VecSource::new(name, (0..n).map(|i| (name.to_string(), i)).collect())
    }

    fn order<B>(mux: &WeightedMultiplexer<'_, B>) -> Vec<usize> {
        mux.iter().map(|t| t.source_index).collect()
    }

    /// Claims `claimed` batches but only ever yields `actual`.
    struct ShortSource {
        claimed: usize,
        actual: usize,
    }

    impl BatchSource for ShortSource {
        type Batch = usize;

        fn len(&self) -> usize {
            self.claimed
        }

        fn iter_batches(&self) -> Box<dyn Iterator<Item = usize> + '_> {
            Box::new(0..self.actual)
        }
    }

    #[test]
    fn test_uniform_weights_by_default() {
        let a = numbered("a", 4);
        let b = numbered("b", 4);
        let c = numbered("c", 4);
        let mux = WeightedMultiplexer::new(vec![&a, &b, &c], None, None).unwrap();
        for w in mux.weights() {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(mux.len(), 12);
    }

    #[test]
    fn test_two_equal_sources_alternate() {
        let a = numbered("a", 10);
        let b = numbered("b", 10);
        let mux = WeightedMultiplexer::new(vec![&a, &b], Some(vec![0.5, 0.5]), None).unwrap();
        assert_eq!(mux.len(), 20);

        let mut it = mux.iter();
        let first = it.next().unwrap();
        assert_eq!(first.source_index, 0);
        assert_eq!(it.last_source(), Some(0));

        let rest: Vec<usize> = it.map(|t| t.source_index).collect();
        let expected: Vec<usize> = (1..20).map(|i| i % 2).collect();
        assert_eq!(rest, expected);
    }

    #[test]
    fn test_batches_keep_per_source_order() {
        let a = numbered("a", 3);
        let b = numbered("b", 3);
        let mux = WeightedMultiplexer::new(vec![&a, &b], None, None).unwrap();
        let from_a: Vec<usize> = mux
            .iter()
            .filter(|t| t.source_index == 0)
            .map(|t| t.batch.1)
            .collect();
        assert_eq!(from_a, vec![0, 1, 2]);
    }

    #[test]
    fn test_small_heavy_mix() {
        let small = numbered("small", 4);
        let large = numbered("large", 20);
        let mux =
            WeightedMultiplexer::new(vec![&small, &large], Some(vec![0.2, 0.8]), None).unwrap();
        assert_eq!(mux.len(), 20);

        let mut it = mux.iter();
        let picked: Vec<usize> = it.by_ref().map(|t| t.source_index).collect();
        assert_eq!(picked.len(), 20);
        assert_eq!(it.loaded(), &[4, 16]);
        assert_eq!(&picked[..5], &[0, 1, 1, 1, 1]);
        assert_eq!(picked, [0, 1, 1, 1, 1].repeat(4));
    }

    #[test]
    fn test_remainder_weight_appended() {
        let a = numbered("a", 2);
        let b = numbered("b", 3);
        let mux = WeightedMultiplexer::new(vec![&a, &b], Some(vec![0.3]), None).unwrap();
        assert!((mux.weights()[1] - 0.7).abs() < 1e-12);
        assert_eq!(mux.len(), 4);
        assert_eq!(order(&mux), vec![0, 1, 1, 1]);
    }

    #[test]
    fn test_weights_are_normalised() {
        let a = numbered("a", 5);
        let b = numbered("b", 5);
        let mux = WeightedMultiplexer::new(vec![&a, &b], Some(vec![2.0, 6.0]), None).unwrap();
        assert!((mux.weights()[0] - 0.25).abs() < 1e-12);
        assert!((mux.weights()[1] - 0.75).abs() < 1e-12);
        let sum: f64 = mux.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_weight_count() {
        let a = numbered("a", 5);
        let b = numbered("b", 5);
        let c = numbered("c", 5);
        let err =
            WeightedMultiplexer::new(vec![&a, &b, &c], Some(vec![0.5]), None).err().unwrap();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));

        let err = WeightedMultiplexer::new(vec![&a], Some(vec![0.2, 0.3, 0.5]), None)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_non_positive_weights_rejected() {
        let a = numbered("a", 5);
        let b = numbered("b", 5);
        assert!(WeightedMultiplexer::new(vec![&a, &b], Some(vec![0.0, 1.0]), None).is_err());
        assert!(WeightedMultiplexer::new(vec![&a, &b], Some(vec![-0.5, 1.0]), None).is_err());
        assert!(WeightedMultiplexer::new(vec![&a, &b], Some(vec![f64::NAN, 1.0]), None).is_err());
        // The appended remainder would be zero.
        assert!(WeightedMultiplexer::new(vec![&a, &b], Some(vec![1.0]), None).is_err());
    }

    #[test]
    fn test_no_sources_rejected() {
        let err = WeightedMultiplexer::<u8>::new(Vec::new(), None, None).err().unwrap();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_cap_limits_epoch() {
        let a = numbered("a", 10);
        let b = numbered("b", 10);
        let mux = WeightedMultiplexer::new(vec![&a, &b], None, Some(5)).unwrap();
        assert_eq!(mux.len(), 5);
        assert_eq!(order(&mux), vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_zero_cap_yields_nothing() {
        let a = numbered("a", 10);
        let mux = WeightedMultiplexer::new(vec![&a], None, Some(0)).unwrap();
        assert!(mux.is_empty());
        let mut it = mux.iter();
        assert!(it.next().is_none());
        assert_eq!(it.loaded(), &[0]);
        assert_eq!(it.last_source(), None);
    }

    #[test]
    fn test_short_source_ends_epoch_at_first_miss() {
        let liar = ShortSource {
            claimed: 10,
            actual: 2,
        };
        let honest = VecSource::new("honest", (0..10).collect::<Vec<usize>>());
        let mux = WeightedMultiplexer::new(vec![&liar, &honest], None, None).unwrap();
        assert_eq!(mux.len(), 20);

        let mut it = mux.iter();
        let picked: Vec<usize> = it.by_ref().map(|t| t.source_index).collect();
        // Fifth step selects source 0 again, which has nothing left.
        assert_eq!(picked, vec![0, 1, 0, 1]);
        assert_eq!(it.loaded(), &[2, 2]);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        assert_eq!(select_source(&[0, 0, 0], &[0.2, 0.3, 0.5]), 0);
        assert_eq!(select_source(&[1, 1, 0], &[0.5, 0.5, 0.0001]), 2);
        assert_eq!(select_source(&[2, 1], &[0.5, 0.25]), 0);
    }

    #[test]
    fn test_iteration_is_deterministic() {
        let a = numbered("a", 7);
        let b = numbered("b", 13);
        let c = numbered("c", 5);
        let mux =
            WeightedMultiplexer::new(vec![&a, &b, &c], Some(vec![0.3, 0.5]), None).unwrap();
        let first: Vec<_> = mux.iter().collect();
        let second: Vec<_> = mux.iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_size_hint_counts_down() {
        let a = numbered("a", 2);
        let b = numbered("b", 2);
        let mux = WeightedMultiplexer::new(vec![&a, &b], None, None).unwrap();
        let mut it = mux.iter();
        assert_eq!(it.size_hint(), (0, Some(4)));
        it.next();
        assert_eq!(it.size_hint(), (0, Some(3)));
        assert_eq!(it.by_ref().count(), 3);
        assert_eq!(it.size_hint(), (0, Some(0)));
    }

    #[test]
    fn test_for_loop_over_reference() {
        let a = numbered("a", 3);
        let mux = WeightedMultiplexer::new(vec![&a], None, None).unwrap();
        let mut n = 0;
        for tagged in &mux {
            assert_eq!(tagged.source_index, 0);
            n += 1;
        }
        assert_eq!(n, 3);
        assert_eq!(mux.source_name(0), Some("a"));
    }
}
