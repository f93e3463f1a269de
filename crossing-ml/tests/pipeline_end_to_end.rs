//! Annotation files on disk through configured loaders and the multiplexer.

use crossing_core::{ConfigError, CrossingConfig, CrossingError, DatasetConfig, DatasetKind};
use crossing_ml::{BatchSource, PipelineError, build_loaders, multiplex};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn write_annotations(dir: &Path, kind: DatasetKind, count: usize) -> DatasetConfig {
    let samples: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            json!({
                "id": format!("{kind}_{i}"),
                "source": kind.as_str(),
                "video_number": format!("video_{:04}", i % 3),
                "set_number": "set01",
                "frames": [10, 11, 12],
                "bbox": [[100.0, 50.0, 140.0, 160.0], [102.0, 50.0, 142.0, 160.0], [104.0, 51.0, 144.0, 161.0]],
                "action": [0, 0, 1],
                "trans_label": 1.0,
                "TTE": 1.3,
            })
        })
        .collect();
    let path = dir.join(format!("{}.json", kind.as_str().to_lowercase()));
    std::fs::write(&path, serde_json::to_vec(&samples).unwrap()).unwrap();
    DatasetConfig {
        kind,
        annotations: path,
        image_root: dir.join("images").join(kind.as_str()),
        enabled: true,
    }
}

fn config(dir: &Path) -> CrossingConfig {
    let mut cfg = CrossingConfig {
        datasets: vec![
            write_annotations(dir, DatasetKind::Jaad, 6),
            write_annotations(dir, DatasetKind::Titan, 12),
        ],
        ..CrossingConfig::default()
    };
    cfg.sampler.batch_size = 2;
    cfg.sampler.padded_length = 4;
    cfg
}

#[test]
fn uniform_weights_interleave_datasets() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let loaders = build_loaders(&cfg).unwrap();
    assert_eq!(loaders.iter().map(|l| l.len()).collect::<Vec<_>>(), vec![3, 6]);

    let mux = multiplex(&loaders, &cfg).unwrap();
    assert_eq!(mux.weights(), &[0.5, 0.5]);
    assert_eq!(mux.len(), 6);

    let tagged: Vec<_> = mux.iter().collect();
    let order: Vec<usize> = tagged.iter().map(|t| t.source_index).collect();
    assert_eq!(order, vec![0, 1, 0, 1, 0, 1]);
    for t in &tagged {
        assert_eq!(t.batch.source, loaders[t.source_index].kind());
        assert_eq!(t.batch.len(), 2);
        for sample in &t.batch.samples {
            assert_eq!(sample.seq_length, 3);
            assert_eq!(sample.bbox.len(), 4);
            assert_eq!(sample.tte.bucket(), Some(3));
        }
    }
}

#[test]
fn remainder_weight_shifts_the_mix() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.sampler.weights = Some(vec![0.25]);
    let loaders = build_loaders(&cfg).unwrap();
    let mux = multiplex(&loaders, &cfg).unwrap();
    assert_eq!(mux.weights(), &[0.25, 0.75]);
    assert_eq!(mux.len(), 8);

    let mut it = mux.iter();
    let batches = it.by_ref().count();
    assert_eq!(batches, 8);
    assert_eq!(it.loaded(), &[2, 6]);
}

#[test]
fn max_batches_caps_the_epoch() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.sampler.max_batches = Some(3);
    let loaders = build_loaders(&cfg).unwrap();
    let mux = multiplex(&loaders, &cfg).unwrap();
    assert_eq!(mux.len(), 3);
    assert_eq!(mux.iter().map(|t| t.source_index).collect::<Vec<_>>(), vec![0, 1, 0]);
}

#[test]
fn disabled_datasets_are_skipped() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.datasets[0].enabled = false;
    let loaders = build_loaders(&cfg).unwrap();
    assert_eq!(loaders.len(), 1);
    assert_eq!(loaders[0].kind(), DatasetKind::Titan);

    cfg.datasets[1].enabled = false;
    assert!(matches!(
        build_loaders(&cfg),
        Err(PipelineError::InvalidConfiguration(_))
    ));
}

#[test]
fn weight_count_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.sampler.weights = Some(vec![0.2, 0.3, 0.5]);
    let loaders = build_loaders(&cfg).unwrap();
    assert!(matches!(
        multiplex(&loaders, &cfg),
        Err(PipelineError::InvalidConfiguration(_))
    ));
}

#[test]
fn missing_annotation_file_is_dataset_error() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.datasets[0].annotations = dir.path().join("nope.json");
    assert!(matches!(build_loaders(&cfg), Err(PipelineError::Dataset(_))));
}

#[test]
fn invalid_sampler_settings_surface_as_config_errors() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.sampler.batch_size = 0;
    assert!(matches!(
        build_loaders(&cfg),
        Err(PipelineError::Core(CrossingError::Config(ConfigError::Invalid { .. })))
    ));
}
