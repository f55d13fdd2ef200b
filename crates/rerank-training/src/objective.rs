//! Binary cross-entropy objectives.

use rerank_tensor::{Graph, NodeId, TensorResult};
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};

/// Offset inside the negative-class logarithm of [`Objective::LegacyLogLoss`].
pub const LEGACY_EPSILON: f64 = 1e-8;

/// Default clamp margin of [`Objective::ClampedLogLoss`].
pub const DEFAULT_LOSS_EPSILON: f32 = 1e-7;

/// Training objective: negative mean log-likelihood of the labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Objective {
    /// `-mean(y·log(p) + (1-y)·log(1-p))` with `p` clamped into
    /// `[epsilon, 1 - epsilon]` before both logarithms.
    ClampedLogLoss {
        /// Clamp margin.
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    /// `-mean(y·log(p) + (1-y)·log(1 + 1e-8 - p))`, kept for reproducing
    /// older training runs. The offset vanishes in f32, so a saturated
    /// negative-class prediction yields an infinite objective.
    LegacyLogLoss,
}

fn default_epsilon() -> f32 {
    DEFAULT_LOSS_EPSILON
}

impl Default for Objective {
    fn default() -> Self {
        Objective::ClampedLogLoss {
            epsilon: DEFAULT_LOSS_EPSILON,
        }
    }
}

impl Objective {
    /// Checks the clamp margin.
    pub fn validate(&self) -> TrainResult<()> {
        if let Objective::ClampedLogLoss { epsilon } = self {
            if !(*epsilon > 0.0 && *epsilon < 0.5) {
                return Err(TrainError::InvalidConfig {
                    message: format!("loss epsilon must be in (0, 0.5), got {}", epsilon),
                });
            }
        }
        Ok(())
    }

    /// Appends the objective over `pred` and `label` (both `[B, 1]`) to the
    /// graph and returns the scalar loss node.
    pub fn build(&self, graph: &mut Graph, pred: NodeId, label: NodeId) -> TensorResult<NodeId> {
        let (positive, negative) = match *self {
            Objective::ClampedLogLoss { epsilon } => {
                let p = graph.clamp(pred, epsilon, 1.0 - epsilon)?;
                let one_minus_p = graph.affine(p, -1.0, 1.0)?;
                (graph.log(p)?, graph.log(one_minus_p)?)
            }
            Objective::LegacyLogLoss => {
                let shifted = graph.affine(pred, -1.0, 1.0 + LEGACY_EPSILON)?;
                (graph.log(pred)?, graph.log(shifted)?)
            }
        };
        let one_minus_y = graph.affine(label, -1.0, 1.0)?;
        let pos_term = graph.mul(label, positive)?;
        let neg_term = graph.mul(one_minus_y, negative)?;
        let likelihood = graph.add(pos_term, neg_term)?;
        let mean = graph.mean(likelihood)?;
        graph.neg(mean)
    }

    /// Host-side value of the objective for already computed scores.
    pub fn evaluate(&self, scores: &[f32], labels: &[f32]) -> f32 {
        if scores.is_empty() {
            return 0.0;
        }
        let total: f32 = scores
            .iter()
            .zip(labels)
            .map(|(&p, &y)| {
                let (pos, neg) = match *self {
                    Objective::ClampedLogLoss { epsilon } => {
                        let p = p.clamp(epsilon, 1.0 - epsilon);
                        (p.ln(), (1.0 - p).ln())
                    }
                    Objective::LegacyLogLoss => (p.ln(), (1.0 + LEGACY_EPSILON as f32 - p).ln()),
                };
                y * pos + (1.0 - y) * neg
            })
            .sum();
        -total / scores.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rerank_tensor::{compile, ExecMode, Machine, Tensor};

    fn graph_loss(objective: Objective, preds: &[f32], labels: &[f32]) -> f32 {
        let mut graph = Graph::new();
        let pred = graph.input("pred", 1);
        let label = graph.input("label", 1);
        let loss = objective.build(&mut graph, pred, label).unwrap();
        let program = compile(&graph, ExecMode::Forward { output: loss }).unwrap();
        let mut machine = Machine::new(program, preds.len()).unwrap();
        machine
            .bind(&graph, pred, &Tensor::column(preds.to_vec()))
            .unwrap();
        machine
            .bind(&graph, label, &Tensor::column(labels.to_vec()))
            .unwrap();
        machine.run(&graph).unwrap();
        machine.scalar(loss).unwrap()
    }

    #[test]
    fn test_graph_matches_host_evaluation() {
        let preds = [0.9, 0.2, 0.6, 0.4];
        let labels = [1.0, 0.0, 1.0, 0.0];
        let objective = Objective::default();
        let expected = objective.evaluate(&preds, &labels);
        let actual = graph_loss(objective, &preds, &labels);
        assert!((expected - actual).abs() < 1e-5, "{} vs {}", expected, actual);

        let manual = -((0.9f32).ln() + (0.8f32).ln() + (0.6f32).ln() + (0.6f32).ln()) / 4.0;
        assert!((expected - manual).abs() < 1e-5);
    }

    #[test]
    fn test_clamped_loss_is_finite_when_saturated() {
        let loss = graph_loss(Objective::default(), &[1.0, 0.0], &[0.0, 1.0]);
        assert!(loss.is_finite());
        assert!(loss > 10.0);
    }

    #[test]
    fn test_legacy_loss_diverges_when_saturated() {
        let loss = graph_loss(Objective::LegacyLogLoss, &[1.0], &[0.0]);
        assert!(!loss.is_finite());
        assert!(!Objective::LegacyLogLoss.evaluate(&[1.0], &[0.0]).is_finite());
    }

    #[test]
    fn test_validate_epsilon() {
        assert!(Objective::default().validate().is_ok());
        assert!(Objective::ClampedLogLoss { epsilon: 0.0 }.validate().is_err());
        assert!(Objective::LegacyLogLoss.validate().is_ok());
    }

    #[test]
    fn test_serde_default_epsilon() {
        let obj: Objective = serde_json::from_str(r#"{"type":"clamped_log_loss"}"#).unwrap();
        assert_eq!(obj, Objective::default());
        let legacy: Objective = serde_json::from_str(r#"{"type":"legacy_log_loss"}"#).unwrap();
        assert_eq!(legacy, Objective::LegacyLogLoss);
    }
}
