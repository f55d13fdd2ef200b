use std::fs;
use std::path::Path;

use clap::Parser;
use rerank_cli::{Cli, Commands};
use serde_json::json;

fn row(sign: f32, jitter: f32) -> Vec<f32> {
    (0..11)
        .map(|c| sign * (0.6 + 0.1 * ((c % 3) as f32)) + jitter)
        .collect()
}

fn write_fixtures(dir: &Path) {
    let layout = json!({
        "user_profile": [0, 2],
        "user_behavior": [2, 8],
        "item": [8, 10],
        "context": [10, 11],
        "total_width": 11,
        "behavior_seq_len": 3,
        "behavior_dim": 2
    });
    let data = json!({
        "features": [row(-1.0, 0.05), row(-1.0, -0.05), row(1.0, 0.05), row(1.0, -0.05)],
        "labels": [0.0, 0.0, 1.0, 1.0]
    });
    let unlabeled = json!({ "features": [row(1.0, 0.0), row(-1.0, 0.0), row(1.0, 0.02)] });
    let config = json!({
        "model": { "type": "din" },
        "train": { "batch_size": 2, "epochs": 200, "early_stop_patience": 0, "log_every_n_epochs": 0 },
        "predict": { "batch_size": 3 }
    });
    fs::write(dir.join("layout.json"), layout.to_string()).unwrap();
    fs::write(dir.join("data.json"), data.to_string()).unwrap();
    fs::write(dir.join("unlabeled.json"), unlabeled.to_string()).unwrap();
    fs::write(dir.join("config.json"), config.to_string()).unwrap();
}

fn parse(args: &[&str]) -> Commands {
    Cli::try_parse_from(args).unwrap().command
}

fn path(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

#[test]
fn train_then_predict_and_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let (data, layout, config) = (
        path(dir.path(), "data.json"),
        path(dir.path(), "layout.json"),
        path(dir.path(), "config.json"),
    );
    let model = path(dir.path(), "out/model.bin.gz");

    let Commands::Train(train) = parse(&[
        "rerank", "train", "--data", &data, "--layout", &layout, "--config", &config,
        "--output", &model, "--gzip",
    ]) else {
        panic!("expected train");
    };
    let report = train.execute().unwrap();
    assert_eq!(report.epochs_run, 200);
    assert_eq!(report.batches_per_epoch, 2);
    assert!(Path::new(&model).exists());

    let Commands::Predict(predict) = parse(&[
        "rerank", "predict", "-i", &data, "-l", &layout, "-m", &model, "-c", &config,
    ]) else {
        panic!("expected predict");
    };
    let (scores, _) = predict.execute().unwrap();
    assert_eq!(scores.len(), 4);
    assert!(scores[0] < 0.5 && scores[1] < 0.5, "{:?}", scores);
    assert!(scores[2] > 0.5 && scores[3] > 0.5, "{:?}", scores);

    let Commands::Evaluate(evaluate) = parse(&[
        "rerank", "evaluate", "-i", &data, "-l", &layout, "-m", &model, "-c", &config, "-b", "1",
    ]) else {
        panic!("expected evaluate");
    };
    let metrics = evaluate.execute().unwrap();
    assert_eq!(metrics.auc, Some(1.0));
    assert_eq!(metrics.accuracy, Some(1.0));

    let unlabeled = path(dir.path(), "unlabeled.json");
    let Commands::Predict(predict) = parse(&[
        "rerank", "predict", "-i", &unlabeled, "-l", &layout, "-m", &model, "-c", &config,
    ]) else {
        panic!("expected predict");
    };
    let (scores, dataset) = predict.execute().unwrap();
    assert_eq!(scores.len(), 3);
    assert!(dataset.labels.is_none());
    assert!(scores[0] > 0.5 && scores[1] < 0.5);

    let Commands::Evaluate(evaluate) = parse(&[
        "rerank", "evaluate", "-i", &unlabeled, "-l", &layout, "-m", &model, "-c", &config,
    ]) else {
        panic!("expected evaluate");
    };
    assert!(evaluate.execute().is_err());
}

#[test]
fn cli_overrides_replace_config_values() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let Commands::Train(train) = parse(&[
        "rerank",
        "train",
        "--data",
        &path(dir.path(), "data.json"),
        "--layout",
        &path(dir.path(), "layout.json"),
        "--config",
        &path(dir.path(), "config.json"),
        "--output",
        &path(dir.path(), "model.bin"),
        "--epochs",
        "3",
        "--batch-size",
        "4",
    ]) else {
        panic!("expected train");
    };
    let report = train.execute().unwrap();
    assert_eq!(report.epochs_run, 3);
    assert_eq!(report.batches_per_epoch, 1);
}

#[test]
fn missing_inputs_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let Commands::Predict(predict) = parse(&[
        "rerank",
        "predict",
        "-i",
        &path(dir.path(), "data.json"),
        "-l",
        &path(dir.path(), "layout.json"),
        "-m",
        &path(dir.path(), "absent.bin"),
    ]) else {
        panic!("expected predict");
    };
    assert!(predict.execute().is_err());

    assert!(Cli::try_parse_from(["rerank", "train", "--data", "x.json"]).is_err());
}
