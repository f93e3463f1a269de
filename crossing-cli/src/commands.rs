//! CLI subcommand handlers.

use crate::CheckpointAction;
use crate::Commands;
use crate::ConfigAction;
use crossing_core::{CrossingConfig, DevicePreference};
use crossing_ml::training::{CheckpointStore, Device, SystemProbe};
use crossing_ml::{BatchSource, VecSource, WeightedMultiplexer};
use std::path::{Path, PathBuf};

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Plan {
            sizes,
            weights,
            max_batches,
        } => handle_plan(&sizes, weights, max_batches),
        Commands::Sample { max_batches, epoch } => handle_sample(workspace, max_batches, epoch),
        Commands::Checkpoint { action } => handle_checkpoint(action, workspace),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<CrossingConfig> {
    Ok(crossing_core::load_workspace_config(workspace)?)
}

/// Interleaving of `sizes` as rendered by `plan`.
#[derive(Debug, PartialEq)]
struct Plan {
    n_batches: usize,
    weights: Vec<f64>,
    order: Vec<usize>,
    counts: Vec<usize>,
}

fn plan(
    sizes: &[usize],
    weights: Option<Vec<f64>>,
    max_batches: Option<usize>,
) -> anyhow::Result<Plan> {
    let sources: Vec<VecSource<usize>> = sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| VecSource::new(format!("source{i}"), (0..n).collect()))
        .collect();
    let dyn_sources: Vec<&dyn BatchSource<Batch = usize>> = sources
        .iter()
        .map(|s| s as &dyn BatchSource<Batch = usize>)
        .collect();
    let mux = WeightedMultiplexer::new(dyn_sources, weights, max_batches)?;

    let mut iter = mux.iter();
    let order: Vec<usize> = iter.by_ref().map(|t| t.source_index).collect();
    Ok(Plan {
        n_batches: mux.len(),
        weights: mux.weights().to_vec(),
        order,
        counts: iter.loaded().to_vec(),
    })
}

fn handle_plan(
    sizes: &[usize],
    weights: Option<Vec<f64>>,
    max_batches: Option<usize>,
) -> anyhow::Result<()> {
    let plan = plan(sizes, weights, max_batches)?;
    let weights: Vec<String> = plan.weights.iter().map(|w| format!("{w:.4}")).collect();
    let order: Vec<String> = plan.order.iter().map(|i| i.to_string()).collect();

    println!("n_batches: {}", plan.n_batches);
    println!("weights:   [{}]", weights.join(", "));
    println!("order:     {}", order.join(","));
    for (i, (count, size)) in plan.counts.iter().zip(sizes).enumerate() {
        println!("  source {i}: {count}/{size} batches");
    }
    if plan.order.len() < plan.n_batches {
        println!(
            "Epoch ended after {} of {} batches: a source ran out.",
            plan.order.len(),
            plan.n_batches
        );
    }
    Ok(())
}

fn handle_sample(workspace: &Path, max_batches: Option<usize>, epoch: u64) -> anyhow::Result<()> {
    let mut config = load(workspace)?;
    if max_batches.is_some() {
        config.sampler.max_batches = max_batches;
    }

    let mut loaders = crossing_ml::build_loaders(&config)?;
    for loader in &mut loaders {
        loader.set_epoch(epoch);
    }
    let mux = crossing_ml::multiplex(&loaders, &config)?;

    let mut batches = vec![0usize; loaders.len()];
    let mut samples = vec![0usize; loaders.len()];
    let mut flipped = 0usize;
    let mut iter = mux.iter();
    for tagged in iter.by_ref() {
        batches[tagged.source_index] += 1;
        samples[tagged.source_index] += tagged.batch.len();
        flipped += tagged.batch.samples.iter().filter(|s| s.flipped).count();
    }

    println!(
        "Epoch {epoch}: {} of {} batches",
        iter.yielded(),
        mux.len()
    );
    for (i, loader) in loaders.iter().enumerate() {
        println!(
            "  {:<6} weight {:.4}  batches {:>5}/{:<5}  samples {}",
            loader.kind(),
            mux.weights()[i],
            batches[i],
            loader.len(),
            samples[i]
        );
    }
    if flipped > 0 {
        println!("  flipped sequences: {flipped}");
    }
    Ok(())
}

fn handle_checkpoint(action: CheckpointAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        CheckpointAction::Inspect { path } => {
            let (path, preference): (PathBuf, DevicePreference) = match path {
                Some(p) => (
                    p,
                    load(workspace)
                        .map(|c| c.early_stopping.device)
                        .unwrap_or_default(),
                ),
                None => {
                    let config = load(workspace)?;
                    (
                        config.early_stopping.checkpoint_path,
                        config.early_stopping.device,
                    )
                }
            };
            let store = CheckpointStore::new(path);
            let snapshot = store.load()?;
            let roles: Vec<String> = snapshot.roles().iter().map(|r| r.to_string()).collect();

            println!("Checkpoint: {}", store.path().display());
            println!("  epoch:     {}", snapshot.epoch);
            println!("  score:     {:.6}", snapshot.score);
            println!("  best_thr:  {:.4}", snapshot.best_thr);
            println!(
                "  roles:     {}",
                if roles.is_empty() {
                    "none".to_string()
                } else {
                    roles.join(", ")
                }
            );
            println!(
                "  optimizer: {}",
                serde_json::to_string(&snapshot.optimizer_state)?
            );
            println!(
                "  restore:   {} ({preference})",
                Device::resolve(preference, &SystemProbe)
            );

            let history = store.history()?;
            if !history.is_empty() {
                println!("History ({} saves):", history.len());
                for record in history.iter().rev().take(10) {
                    println!(
                        "  {}  epoch {:>4}  score {:.6}  {}  {}",
                        record.created_at.format("%Y-%m-%d %H:%M:%S"),
                        record.epoch,
                        record.score,
                        &record.hash[..12.min(record.hash.len())],
                        record.id
                    );
                }
            }
            Ok(())
        }
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".crossing");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&CrossingConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = crossing_core::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_plan_small_source_small_weight() {
        let p = plan(&[4, 20], Some(vec![0.2, 0.8]), None).unwrap();
        assert_eq!(p.n_batches, 20);
        assert_eq!(p.counts, vec![4, 16]);
        assert_eq!(&p.order[..5], &[0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_plan_remainder_and_cap() {
        let p = plan(&[10, 10], None, Some(5)).unwrap();
        assert_eq!(p.order, vec![0, 1, 0, 1, 0]);

        let p = plan(&[2, 3], Some(vec![0.3]), None).unwrap();
        assert_eq!(p.n_batches, 4);
        assert_eq!(p.order, vec![0, 1, 1, 1]);
    }

    #[test]
    fn test_plan_rejects_bad_weights() {
        assert!(plan(&[2, 3], Some(vec![0.3, 0.3, 0.4]), None).is_err());
        assert!(plan(&[], None, None).is_err());
    }

    #[test]
    fn test_config_init_then_show() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        let path = dir.path().join(".crossing").join("config.toml");
        let written: CrossingConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.sampler.batch_size, 8);
        handle_config(ConfigAction::Show, dir.path()).unwrap();
    }
}
