//! Early stopping on a validation score (higher is better).

use crate::error::Result;
use crate::training::checkpoint::{CheckpointStore, ModelBundle, Snapshot, Stateful};
use crossing_core::EarlyStoppingConfig;

/// Where the monitor stands after the latest report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Improving,
    /// Epochs since the last improvement.
    Stalled(usize),
    Stopped,
}

/// Stops training once the score has not improved by more than `delta` for
/// `patience` consecutive reports, saving a snapshot on every improvement.
#[derive(Debug)]
pub struct EarlyStopping {
    pub patience: usize,
    pub delta: f64,
    pub verbose: bool,
    store: CheckpointStore,
    counter: usize,
    best_score: Option<f64>,
    state: MonitorState,
}

impl EarlyStopping {
    pub fn new(store: CheckpointStore, patience: usize, delta: f64) -> Self {
        Self {
            patience,
            delta,
            verbose: false,
            store,
            counter: 0,
            best_score: None,
            state: MonitorState::Improving,
        }
    }

    pub fn from_config(config: &EarlyStoppingConfig) -> Self {
        let mut monitor = Self::new(
            CheckpointStore::new(&config.checkpoint_path),
            config.patience,
            config.delta,
        );
        monitor.verbose = config.verbose;
        if let Some(min_loss) = config.min_loss {
            monitor = monitor.with_min_loss(min_loss);
        }
        monitor
    }

    /// Start from a known loss, i.e. a best score of `-min_loss`.
    pub fn with_min_loss(mut self, min_loss: f64) -> Self {
        if min_loss.is_finite() {
            self.best_score = Some(-min_loss);
        }
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Report the score of `epoch`, persisting a snapshot if it is the best so far.
    pub fn step(
        &mut self,
        score: f64,
        epoch: usize,
        bundle: &ModelBundle,
        optimizer: &dyn Stateful,
    ) -> Result<MonitorState> {
        if self.state == MonitorState::Stopped {
            return Ok(self.state);
        }

        match self.best_score {
            Some(best) if score <= best + self.delta => {
                self.counter += 1;
                tracing::info!(
                    counter = self.counter,
                    patience = self.patience,
                    "EarlyStopping counter: {} out of {}",
                    self.counter,
                    self.patience
                );
                self.state = if self.counter >= self.patience {
                    tracing::info!(epoch, best = best, "Early stopping triggered");
                    MonitorState::Stopped
                } else {
                    MonitorState::Stalled(self.counter)
                };
            }
            previous => {
                self.save_checkpoint(previous, score, epoch, bundle, optimizer)?;
                self.best_score = Some(score);
                self.counter = 0;
                self.state = MonitorState::Improving;
            }
        }
        Ok(self.state)
    }

    fn save_checkpoint(
        &self,
        previous: Option<f64>,
        score: f64,
        epoch: usize,
        bundle: &ModelBundle,
        optimizer: &dyn Stateful,
    ) -> Result<()> {
        if self.verbose {
            match previous {
                Some(prev) => tracing::info!(
                    "Validation score changed ({prev:.6} --> {score:.6}). Saving model ..."
                ),
                None => tracing::info!("Validation score {score:.6}. Saving model ..."),
            }
        }
        let snapshot = Snapshot::capture(epoch, score, bundle, optimizer);
        self.store.save(&snapshot)?;
        Ok(())
    }

    pub fn early_stop(&self) -> bool {
        self.state == MonitorState::Stopped
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::checkpoint::StateDict;
    use crate::training::device::Device;
    use serde_json::json;
    use tempfile::TempDir;

    struct Opt;

    impl Stateful for Opt {
        fn state_dict(&self) -> StateDict {
            json!({ "step": 1 })
        }

        fn load_state_dict(&mut self, _state: StateDict, _device: Device) -> Result<()> {
            Ok(())
        }
    }

    fn monitor(dir: &TempDir, patience: usize, delta: f64) -> EarlyStopping {
        EarlyStopping::new(CheckpointStore::new(dir.path().join("best.json")), patience, delta)
    }

    #[test]
    fn test_early_stopping() {
        let dir = TempDir::new().unwrap();
        let mut es = monitor(&dir, 3, 0.01);
        let bundle = ModelBundle::new(0.5);
        let s = |es: &mut EarlyStopping, score| es.step(score, 0, &bundle, &Opt).unwrap();

        assert_eq!(s(&mut es, 0.5), MonitorState::Improving); // first: sets best=0.5
        assert_eq!(s(&mut es, 0.6), MonitorState::Improving); // improves: best=0.6
        assert_eq!(s(&mut es, 0.605), MonitorState::Stalled(1)); // within delta
        assert_eq!(s(&mut es, 0.6), MonitorState::Stalled(2));
        assert_eq!(s(&mut es, 0.6), MonitorState::Stopped); // counter=3 >= patience
        assert!(es.early_stop());
        assert_eq!(es.best_score(), Some(0.6));
    }

    #[test]
    fn test_stopped_is_terminal() {
        let dir = TempDir::new().unwrap();
        let mut es = monitor(&dir, 1, 0.0);
        let bundle = ModelBundle::new(0.5);
        es.step(0.3, 0, &bundle, &Opt).unwrap();
        assert_eq!(es.step(0.3, 1, &bundle, &Opt).unwrap(), MonitorState::Stopped);
        // A later improvement does not revive the monitor or write a snapshot.
        assert_eq!(es.step(0.9, 2, &bundle, &Opt).unwrap(), MonitorState::Stopped);
        assert_eq!(es.store().load().unwrap().epoch, 0);
    }

    #[test]
    fn test_corrupt_history_keeps_monitor_in_sync() {
        let dir = TempDir::new().unwrap();
        let mut es = monitor(&dir, 3, 0.0);
        std::fs::write(es.store().history_path(), b"garbage").unwrap();
        let bundle = ModelBundle::new(0.5);

        assert_eq!(es.step(0.7, 0, &bundle, &Opt).unwrap(), MonitorState::Improving);
        assert_eq!(es.best_score(), Some(0.7));
        assert_eq!(es.store().load().unwrap().score, 0.7);
        assert_eq!(es.step(0.7, 1, &bundle, &Opt).unwrap(), MonitorState::Stalled(1));
        assert_eq!(es.counter(), 1);
    }

    #[test]
    fn test_min_loss_seeds_best() {
        let dir = TempDir::new().unwrap();
        let mut es = monitor(&dir, 2, 0.0).with_min_loss(0.2);
        assert_eq!(es.best_score(), Some(-0.2));
        let bundle = ModelBundle::new(0.5);
        assert_eq!(
            es.step(-0.25, 0, &bundle, &Opt).unwrap(),
            MonitorState::Stalled(1)
        );
        assert!(es.store().load().is_err());
    }

    #[test]
    fn test_from_config() {
        let cfg = EarlyStoppingConfig {
            patience: 4,
            delta: 0.02,
            min_loss: Some(1.5),
            verbose: true,
            ..EarlyStoppingConfig::default()
        };
        let es = EarlyStopping::from_config(&cfg);
        assert_eq!(es.patience, 4);
        assert_eq!(es.delta, 0.02);
        assert!(es.verbose);
        assert_eq!(es.best_score(), Some(-1.5));
        assert_eq!(es.store().path(), cfg.checkpoint_path.as_path());
    }
}
