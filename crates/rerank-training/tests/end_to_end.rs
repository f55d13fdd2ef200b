use rerank_layers::prelude::*;
use rerank_tensor::Tensor;
use rerank_training::{
    load_model, roc_auc, save_model, Compression, ModelConfig, Objective, Predictor,
    SampleLayout, TrainConfig, Trainer,
};

/// profile 2, behavior 3 x 2, item 2, context 1.
fn layout() -> SampleLayout {
    SampleLayout::new(0..2, 2..8, 8..10, 10..11, 11, 3, 2).unwrap()
}

/// Four samples whose every block points the same way as the label.
fn separable() -> (Tensor, Tensor) {
    let row = |sign: f32, jitter: f32| -> Vec<f32> {
        (0..11)
            .map(|c| sign * (0.6 + 0.1 * ((c % 3) as f32)) + jitter)
            .collect()
    };
    let features = Tensor::from_rows(&[
        row(-1.0, 0.05),
        row(-1.0, -0.05),
        row(1.0, 0.05),
        row(1.0, -0.05),
    ])
    .unwrap();
    (features, Tensor::column(vec![0.0, 0.0, 1.0, 1.0]))
}

fn train_config() -> TrainConfig {
    TrainConfig::default()
        .with_batch_size(2)
        .with_epochs(200)
        .with_early_stop_patience(0)
        .with_log_every_n_epochs(50)
}

#[test]
fn din_ranker_learns_a_separable_problem() {
    let (features, labels) = separable();
    let mut model = DinRanker::default();
    let mut trainer = Trainer::new(train_config()).unwrap();
    let report = trainer
        .train(&mut model, &layout(), &features, &labels)
        .unwrap();
    assert_eq!(report.epochs_run, 200);
    assert!(report.epoch_losses.last().unwrap() < report.epoch_losses.first().unwrap());

    let predictor = Predictor::new(&mut model, &layout(), 4).unwrap();
    let scores = predictor.predict(&mut model, &features).unwrap();
    assert!(scores[0] < 0.5 && scores[1] < 0.5, "{:?}", scores);
    assert!(scores[2] > 0.5 && scores[3] > 0.5, "{:?}", scores);
    assert_eq!(roc_auc(&scores, labels.data()), Some(1.0));
}

#[test]
fn mlp_ranker_learns_a_separable_problem() {
    let (features, labels) = separable();
    let mut model = ModelConfig::Mlp(MlpRankerConfig::default()).build();
    let mut trainer = Trainer::new(train_config()).unwrap();
    trainer
        .train(model.as_mut(), &layout(), &features, &labels)
        .unwrap();

    let predictor = Predictor::new(model.as_mut(), &layout(), 3).unwrap();
    let scores = predictor.predict(model.as_mut(), &features).unwrap();
    assert!(scores[0] < 0.5 && scores[1] < 0.5, "{:?}", scores);
    assert!(scores[2] > 0.5 && scores[3] > 0.5, "{:?}", scores);
}

#[test]
fn saved_model_scores_identically_after_reload() {
    let (features, labels) = separable();
    let mut trained = DinRanker::default();
    Trainer::new(train_config().with_epochs(20))
        .unwrap()
        .train(&mut trained, &layout(), &features, &labels)
        .unwrap();
    let predictor = Predictor::new(&mut trained, &layout(), 4).unwrap();
    let expected = predictor.predict(&mut trained, &features).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models/din.bin.gz");
    save_model(&path, &trained, Compression::Gzip).unwrap();

    // Restoring needs the same topology, which the predictor builds first.
    let mut restored = DinRanker::default();
    let predictor = Predictor::new(&mut restored, &layout(), 4).unwrap();
    let untrained = predictor.predict(&mut restored, &features).unwrap();
    assert_ne!(untrained, expected);

    load_model(&path, &mut restored).unwrap();
    let scores = predictor.predict(&mut restored, &features).unwrap();
    assert_eq!(scores, expected);
}

#[test]
fn predictor_evaluation_matches_training_objective() {
    let (features, labels) = separable();
    let mut model = DinRanker::default();
    Trainer::new(train_config())
        .unwrap()
        .train(&mut model, &layout(), &features, &labels)
        .unwrap();

    let predictor = Predictor::new(&mut model, &layout(), 2).unwrap();
    let metrics = predictor
        .evaluate(&mut model, &features, labels.data(), &Objective::default())
        .unwrap();
    assert_eq!(metrics.auc, Some(1.0));
    assert_eq!(metrics.accuracy, Some(1.0));
    assert!(metrics.loss < std::f64::consts::LN_2);
}
