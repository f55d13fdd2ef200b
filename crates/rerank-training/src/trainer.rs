//! Supervised training loop.
//!
//! [`Trainer::train`] builds the model's forward graph if needed, appends the
//! objective over a label input (once per objective, reused by later calls),
//! compiles one training program and then runs
//! epochs of contiguous row batches. Every batch binds the four feature
//! blocks and the label column, executes forward and backward passes, applies
//! one optimizer step per learnable and resets the execution state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rerank_layers::model::{Model, ModelInputs, ModelShape, TrainingHead};
use rerank_layers::LayerError;
use rerank_optimizer::{create_optimizer, OptimizerDyn};
use rerank_tensor::{compile, ExecMode, Graph, Machine, NodeId, Tensor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::{batch_ranges, bind_features, Batch, TailPolicy};
use crate::config::TrainConfig;
use crate::early_stopping::EarlyStopping;
use crate::error::{TrainError, TrainResult};
use crate::hooks::{Hook, HookAction, HookList, LoggingHook};
use crate::layout::{Block, SampleLayout};
use crate::metrics::{accuracy, roc_auc, Metrics};
use crate::objective::Objective;

/// Outcome of one [`Trainer::train`] call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainReport {
    /// Number of completed epochs.
    pub epochs_run: usize,
    /// Mean batch objective of every completed epoch.
    pub epoch_losses: Vec<f32>,
    /// Lowest epoch objective.
    pub best_loss: Option<f32>,
    /// Epoch (0-based) of the lowest objective.
    pub best_epoch: Option<usize>,
    /// Whether early stopping ended the run.
    pub early_stopped: bool,
    /// Whether a hook ended the run.
    pub stopped_by_hook: bool,
    /// Whether the cancellation flag ended the run.
    pub cancelled: bool,
    /// Full batches per epoch.
    pub batches_per_epoch: usize,
    /// Metrics of the last completed epoch.
    pub final_metrics: Option<Metrics>,
}

/// Trains a [`Model`] on an in-memory feature tensor.
///
/// # Example
///
/// ```
/// use rerank_layers::prelude::*;
/// use rerank_tensor::Tensor;
/// use rerank_training::config::TrainConfig;
/// use rerank_training::layout::SampleLayout;
/// use rerank_training::trainer::Trainer;
///
/// let layout = SampleLayout::new(0..1, 1..3, 3..4, 4..5, 5, 2, 1).unwrap();
/// let features = Tensor::from_rows(&[
///     [0.1, 0.2, 0.3, 0.4, 0.5],
///     [0.5, 0.4, 0.3, 0.2, 0.1],
/// ])
/// .unwrap();
/// let labels = Tensor::column(vec![1.0, 0.0]);
///
/// let mut model = MlpRanker::new(MlpRankerConfig::default().with_hidden_units(vec![4]));
/// let mut trainer = Trainer::new(TrainConfig::default().with_batch_size(2).with_epochs(3)).unwrap();
/// let report = trainer.train(&mut model, &layout, &features, &labels).unwrap();
/// assert_eq!(report.epochs_run, 3);
/// ```
#[derive(Debug)]
pub struct Trainer {
    config: TrainConfig,
    hooks: HookList,
    cancel: Option<Arc<AtomicBool>>,
}

impl Trainer {
    /// Creates a trainer after validating `config`.
    pub fn new(config: TrainConfig) -> TrainResult<Self> {
        config.validate()?;
        let mut hooks = HookList::new();
        if config.log_every_n_epochs > 0 {
            hooks.add(LoggingHook::new(config.log_every_n_epochs));
        }
        Ok(Self {
            config,
            hooks,
            cancel: None,
        })
    }

    /// Registers an additional hook.
    pub fn with_hook<H: Hook + 'static>(mut self, hook: H) -> Self {
        self.hooks.add(hook);
        self
    }

    /// Stops training at the next batch boundary once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Trains `model` on `features` (`[rows, total_width]`) against `labels`
    /// (`[rows, 1]`).
    ///
    /// The trailing rows that do not fill a whole batch are not trained on.
    /// On return the model carries the training execution handle.
    ///
    /// # Errors
    ///
    /// - [`TrainError::Shape`] when the tensors disagree with the layout
    /// - [`TrainError::GraphConstruction`] when the model cannot be built for it
    /// - [`TrainError::InvalidConfig`] when no full batch fits in `rows`
    /// - [`TrainError::NumericDivergence`] when an epoch objective is not finite
    pub fn train<M: Model + ?Sized>(
        &mut self,
        model: &mut M,
        layout: &SampleLayout,
        features: &Tensor,
        labels: &Tensor,
    ) -> TrainResult<TrainReport> {
        layout.check_inputs(features)?;
        let rows = features.rows();
        if labels.ndim() != 2 || labels.cols() != 1 || labels.rows() != rows {
            return Err(TrainError::Shape {
                message: format!(
                    "label tensor has shape {:?}, expected [{}, 1]",
                    labels.shape(),
                    rows
                ),
            });
        }

        let batch_size = self.config.batch_size;
        let batches = batch_ranges(rows, batch_size, TailPolicy::Drop);
        if batches.is_empty() {
            return Err(TrainError::InvalidConfig {
                message: format!("{} rows do not fill one batch of {}", rows, batch_size),
            });
        }
        if rows % batch_size != 0 {
            debug!(
                dropped = rows % batch_size,
                "Trailing partial batch is not trained on"
            );
        }

        let input_nodes = prepare_forward(model, layout, batch_size)?;
        let output = model
            .output()
            .ok_or(TrainError::Model(LayerError::NotBuilt))?;

        let (label, loss) = training_head(model, &self.config.objective, output)?;

        let learnables = model.learnables().to_vec();
        let program = compile(
            model.graph(),
            ExecMode::Train {
                loss,
                params: learnables.clone(),
            },
        )?;
        let mut machine = Machine::new(program, batch_size)?;

        let mut optimizers = Vec::with_capacity(learnables.len());
        for _ in &learnables {
            let mut optimizer = create_optimizer(self.config.optimizer.clone())?;
            optimizer.set_batch_size(batch_size);
            optimizers.push(optimizer);
        }

        // The previous handle belongs to another mode.
        model.take_machine();

        info!(
            model = model.name(),
            rows,
            batch_size,
            batches = batches.len(),
            epochs = self.config.epochs,
            params = learnables.len(),
            optimizer = self.config.optimizer.name(),
            "Starting training"
        );

        let nodes = TrainNodes {
            inputs: input_nodes,
            label,
            output,
            loss,
            learnables: &learnables,
        };
        let result = self.run_epochs(
            model.graph(),
            &mut machine,
            &mut optimizers,
            &nodes,
            layout,
            features,
            labels,
            &batches,
        );
        model.set_machine(machine);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_epochs(
        &mut self,
        graph: &Graph,
        machine: &mut Machine,
        optimizers: &mut [Box<dyn OptimizerDyn>],
        nodes: &TrainNodes<'_>,
        layout: &SampleLayout,
        features: &Tensor,
        labels: &Tensor,
        batches: &[Batch],
    ) -> TrainResult<TrainReport> {
        let mut report = TrainReport {
            batches_per_epoch: batches.len(),
            ..TrainReport::default()
        };
        let mut stopper = EarlyStopping::new(self.config.early_stop_patience)
            .with_min_delta(self.config.min_delta);

        'epochs: for epoch in 0..self.config.epochs {
            let mut loss_sum = 0.0f32;
            let mut scores = Vec::with_capacity(batches.len() * machine.batch_size());
            let mut seen_labels = Vec::with_capacity(scores.capacity());

            for batch in batches {
                if self.is_cancelled() {
                    info!(epoch, batch_start = batch.start, "Training cancelled");
                    report.cancelled = true;
                    break 'epochs;
                }

                bind_features(machine, graph, layout, &nodes.inputs, features, *batch)?;
                let y = labels.slice_2d(batch.rows(), 0..1)?;
                machine.bind(graph, nodes.label, &y)?;
                machine.run(graph)?;

                loss_sum += machine.scalar(nodes.loss)?;
                scores.extend(machine.value(nodes.output)?.into_data());
                seen_labels.extend_from_slice(y.data());

                for (param, optimizer) in nodes.learnables.iter().zip(optimizers.iter_mut()) {
                    let gradient = machine.gradient(graph, *param)?;
                    let mut values = graph.param_data(*param)?;
                    optimizer.apply_gradients(&mut values, &gradient);
                    graph.set_param_data(*param, values)?;
                }
                machine.reset();
            }

            let epoch_loss = loss_sum / batches.len() as f32;
            if !epoch_loss.is_finite() {
                warn!(epoch, loss = epoch_loss, "Objective diverged");
                return Err(TrainError::NumericDivergence {
                    epoch,
                    loss: epoch_loss,
                });
            }

            report.epochs_run = epoch + 1;
            report.epoch_losses.push(epoch_loss);

            let mut metrics = Metrics::new(epoch_loss as f64, epoch);
            if let Some(acc) = accuracy(&scores, &seen_labels) {
                metrics = metrics.with_accuracy(acc);
            }
            if let Some(auc) = roc_auc(&scores, &seen_labels) {
                metrics = metrics.with_auc(auc);
            }
            debug!(epoch, loss = epoch_loss, "Epoch finished");

            let hook_action = self.hooks.after_epoch(epoch, &metrics)?;
            let stop_action = stopper.observe(epoch, epoch_loss);
            report.final_metrics = Some(metrics);

            if stop_action == HookAction::Stop {
                report.early_stopped = true;
            }
            if hook_action == HookAction::Stop {
                report.stopped_by_hook = true;
            }
            if report.early_stopped || report.stopped_by_hook {
                break;
            }
        }

        report.best_loss = stopper.best_loss();
        report.best_epoch = stopper.best_epoch();
        self.hooks
            .end(report.epochs_run, report.final_metrics.as_ref())?;
        info!(
            epochs = report.epochs_run,
            best_loss = ?report.best_loss,
            best_epoch = ?report.best_epoch,
            early_stopped = report.early_stopped,
            "Training complete"
        );
        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

struct TrainNodes<'a> {
    inputs: [NodeId; 4],
    label: NodeId,
    output: NodeId,
    loss: NodeId,
    learnables: &'a [NodeId],
}

/// Returns the label and loss nodes for `objective`, appending them to the
/// graph only when the model has none for it yet.
fn training_head<M: Model + ?Sized>(
    model: &mut M,
    objective: &Objective,
    output: NodeId,
) -> TrainResult<(NodeId, NodeId)> {
    let key = format!("{:?}", objective);
    if let Some(head) = model.state().training_head(&key) {
        return Ok((head.label, head.loss));
    }
    let graph = model.graph_mut();
    let label = graph.input("label", 1);
    let loss = objective.build(graph, output, label)?;
    model
        .state_mut()
        .set_training_head(TrainingHead { key, label, loss });
    Ok((label, loss))
}

/// Builds the forward graph for `layout` on a fresh model, or checks that an
/// already built model's inputs match it. Returns the input nodes.
pub(crate) fn prepare_forward<M: Model + ?Sized>(
    model: &mut M,
    layout: &SampleLayout,
    batch_size: usize,
) -> TrainResult<[NodeId; 4]> {
    if let Some(inputs) = model.inputs() {
        let wanted = layout.model_shape(batch_size);
        if let Some(built) = model.shape() {
            let built = ModelShape { batch_size, ..*built };
            if built != wanted {
                return Err(TrainError::GraphConstruction {
                    message: format!(
                        "model was built for {:?}, layout needs {:?}",
                        built, wanted
                    ),
                });
            }
        }
        for (block, id) in Block::ALL.iter().zip(inputs) {
            let width = model.graph().shape(id)?.width();
            if width != Some(layout.width(*block)) {
                return Err(TrainError::GraphConstruction {
                    message: format!(
                        "model input for {} has width {:?}, layout has {}",
                        block,
                        width,
                        layout.width(*block)
                    ),
                });
            }
        }
        return Ok(inputs);
    }

    let shape = layout.model_shape(batch_size);
    let inputs = ModelInputs::declare(model.graph_mut(), &shape);
    model.forward(inputs, &shape)?;
    Ok(inputs.as_array())
}
