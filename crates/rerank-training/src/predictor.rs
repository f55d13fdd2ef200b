//! Forward-only batched scoring.

use rerank_layers::model::Model;
use rerank_layers::LayerError;
use rerank_tensor::{compile, ExecMode, Graph, Machine, NodeId, Tensor};
use tracing::{debug, info};

use crate::batch::{batch_ranges, bind_features, TailPolicy};
use crate::error::{TrainError, TrainResult};
use crate::layout::SampleLayout;
use crate::metrics::{accuracy, roc_auc, Metrics};
use crate::objective::Objective;
use crate::trainer::prepare_forward;

/// Scores feature rows with a model's forward graph.
///
/// A predictor compiles a gradient-free program for the model's output and
/// attaches it to the model as its execution handle. Every batch, the final
/// partial one included, runs at the full batch width; padding rows are
/// zero and their outputs are discarded.
///
/// # Example
///
/// ```
/// use rerank_layers::prelude::*;
/// use rerank_tensor::Tensor;
/// use rerank_training::layout::SampleLayout;
/// use rerank_training::predictor::Predictor;
///
/// let layout = SampleLayout::new(0..1, 1..3, 3..4, 4..5, 5, 2, 1).unwrap();
/// let mut model = MlpRanker::new(MlpRankerConfig::default());
/// let predictor = Predictor::new(&mut model, &layout, 2).unwrap();
///
/// let features = Tensor::from_data(&[3, 5], vec![0.5; 15]).unwrap();
/// let scores = predictor.predict(&mut model, &features).unwrap();
/// assert_eq!(scores.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Predictor {
    layout: SampleLayout,
    batch_size: usize,
    inputs: [NodeId; 4],
    output: NodeId,
}

impl Predictor {
    /// Prepares `model` for scoring batches of `batch_size` rows.
    ///
    /// A model without a forward graph (fresh, or about to be restored with
    /// [`Model::unmarshal`]) is built for `layout` first. The new execution
    /// handle replaces any handle attached to the model.
    pub fn new<M: Model + ?Sized>(
        model: &mut M,
        layout: &SampleLayout,
        batch_size: usize,
    ) -> TrainResult<Self> {
        if batch_size == 0 {
            return Err(TrainError::InvalidConfig {
                message: "prediction batch_size must be positive".to_string(),
            });
        }
        let inputs = prepare_forward(model, layout, batch_size)?;
        let output = model
            .output()
            .ok_or(TrainError::Model(LayerError::NotBuilt))?;
        let predictor = Self {
            layout: layout.clone(),
            batch_size,
            inputs,
            output,
        };
        predictor.attach(model)?;
        Ok(predictor)
    }

    /// Compiles a fresh forward program and attaches it to `model`.
    ///
    /// Needed again after training replaced the model's handle.
    pub fn attach<M: Model + ?Sized>(&self, model: &mut M) -> TrainResult<()> {
        let program = compile(
            model.graph(),
            ExecMode::Forward {
                output: self.output,
            },
        )?;
        model.set_machine(Machine::new(program, self.batch_size)?);
        debug!(batch_size = self.batch_size, "Attached forward handle");
        Ok(())
    }

    /// Rows per forward pass.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Layout the predictor slices rows with.
    pub fn layout(&self) -> &SampleLayout {
        &self.layout
    }

    fn owns(&self, machine: &Machine) -> bool {
        machine.batch_size() == self.batch_size
            && *machine.program().mode()
                == ExecMode::Forward {
                    output: self.output,
                }
    }

    /// Scores every row of `features`, in row order.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::MissingMachine`] when the model has no handle
    /// attached, [`TrainError::MachineMismatch`] when the attached handle was
    /// not made by this predictor, and [`TrainError::Shape`] when `features`
    /// does not match the layout.
    pub fn predict<M: Model + ?Sized>(
        &self,
        model: &mut M,
        features: &Tensor,
    ) -> TrainResult<Vec<f32>> {
        self.layout.check_inputs(features)?;
        let mut machine = model.take_machine().ok_or(TrainError::MissingMachine)?;
        let result = if self.owns(&machine) {
            self.score(model.graph(), &mut machine, features)
        } else {
            Err(TrainError::MachineMismatch)
        };
        model.set_machine(machine);
        result
    }

    fn score(
        &self,
        graph: &Graph,
        machine: &mut Machine,
        features: &Tensor,
    ) -> TrainResult<Vec<f32>> {
        let rows = features.rows();
        let mut scores = Vec::with_capacity(rows);
        for batch in batch_ranges(rows, self.batch_size, TailPolicy::Pad) {
            bind_features(machine, graph, &self.layout, &self.inputs, features, batch)?;
            machine.run(graph)?;
            let output = machine.value(self.output)?.into_data();
            scores.extend_from_slice(&output[..batch.len()]);
            machine.reset();
        }
        debug!(rows, "Scored rows");
        Ok(scores)
    }

    /// Scores `features` and measures the scores against `labels`.
    ///
    /// The returned metrics carry the objective value as `loss`, accuracy,
    /// and AUC when both classes are present.
    pub fn evaluate<M: Model + ?Sized>(
        &self,
        model: &mut M,
        features: &Tensor,
        labels: &[f32],
        objective: &Objective,
    ) -> TrainResult<Metrics> {
        if labels.len() != features.rows() {
            return Err(TrainError::Shape {
                message: format!(
                    "{} labels for {} feature rows",
                    labels.len(),
                    features.rows()
                ),
            });
        }
        let scores = self.predict(model, features)?;
        let mut metrics = Metrics::new(objective.evaluate(&scores, labels) as f64, 0);
        if let Some(acc) = accuracy(&scores, labels) {
            metrics = metrics.with_accuracy(acc);
        }
        if let Some(auc) = roc_auc(&scores, labels) {
            metrics = metrics.with_auc(auc);
        }
        info!(
            rows = scores.len(),
            loss = metrics.loss,
            accuracy = ?metrics.accuracy,
            auc = ?metrics.auc,
            "Evaluation complete"
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rerank_layers::din_ranker::{DinRanker, DinRankerConfig};

    fn layout() -> SampleLayout {
        SampleLayout::new(0..2, 2..8, 8..10, 10..11, 11, 3, 2).unwrap()
    }

    fn features(rows: usize) -> Tensor {
        let data = (0..rows * 11).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();
        Tensor::from_data(&[rows, 11], data).unwrap()
    }

    fn model() -> DinRanker {
        DinRanker::new(DinRankerConfig::default().with_hidden_units(vec![8, 4]))
    }

    #[test]
    fn test_rejects_zero_batch() {
        assert!(matches!(
            Predictor::new(&mut model(), &layout(), 0),
            Err(TrainError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_tail_rows_match_full_width_scores() {
        let mut model = model();
        let rows = features(10);
        let whole = Predictor::new(&mut model, &layout(), 10).unwrap();
        let expected = whole.predict(&mut model, &rows).unwrap();

        let batched = Predictor::new(&mut model, &layout(), 3).unwrap();
        let actual = batched.predict(&mut model, &rows).unwrap();
        assert_eq!(actual.len(), 10);
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-5);
        }
    }

    #[test]
    fn test_empty_input_scores_nothing() {
        let mut model = model();
        let predictor = Predictor::new(&mut model, &layout(), 4).unwrap();
        let scores = predictor.predict(&mut model, &features(0)).unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn test_missing_and_foreign_machine() {
        let mut model = model();
        let first = Predictor::new(&mut model, &layout(), 4).unwrap();
        let second = Predictor::new(&mut model, &layout(), 2).unwrap();
        assert!(matches!(
            first.predict(&mut model, &features(3)),
            Err(TrainError::MachineMismatch)
        ));
        // the handle survives the failed call
        assert!(second.predict(&mut model, &features(3)).is_ok());

        model.take_machine();
        assert!(matches!(
            second.predict(&mut model, &features(3)),
            Err(TrainError::MissingMachine)
        ));

        second.attach(&mut model).unwrap();
        assert!(second.predict(&mut model, &features(3)).is_ok());
    }

    #[test]
    fn test_rejects_layout_with_other_sequence_shape() {
        let mut model = model();
        Predictor::new(&mut model, &layout(), 4).unwrap();
        // 6 behavior columns read as 2 x 3 instead of 3 x 2
        let resplit = SampleLayout::new(0..2, 2..8, 8..10, 10..11, 11, 2, 3).unwrap();
        assert!(matches!(
            Predictor::new(&mut model, &resplit, 4),
            Err(TrainError::GraphConstruction { .. })
        ));
    }

    #[test]
    fn test_rejects_wrong_width() {
        let mut model = model();
        let predictor = Predictor::new(&mut model, &layout(), 4).unwrap();
        let narrow = Tensor::zeros(&[3, 10]);
        assert!(matches!(
            predictor.predict(&mut model, &narrow),
            Err(TrainError::Shape { .. })
        ));
    }

    #[test]
    fn test_evaluate_reports_metrics() {
        let mut model = model();
        let predictor = Predictor::new(&mut model, &layout(), 4).unwrap();
        let labels = [0.0, 1.0, 0.0, 1.0, 1.0];
        let metrics = predictor
            .evaluate(&mut model, &features(5), &labels, &Objective::default())
            .unwrap();
        assert!(metrics.loss.is_finite() && metrics.loss > 0.0);
        assert!(metrics.auc.is_some());
        assert!(metrics.accuracy.is_some());

        assert!(predictor
            .evaluate(&mut model, &features(5), &labels[..4], &Objective::default())
            .is_err());
    }
}
