//! The ranking model capability.
//!
//! A [`Model`] owns a [`Graph`], builds its forward subgraph exactly once from
//! four input blocks, and carries at most one attached execution [`Machine`].
//! Trainers and predictors work against this trait only, so any network that
//! can be expressed on the graph can be trained and served the same way.

use rerank_tensor::{Graph, Machine, NodeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LayerError, LayerResult};
use crate::snapshot::ParamSnapshot;

/// Dimensions a model is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelShape {
    /// Samples per execution.
    pub batch_size: usize,
    /// Width of the user-profile block.
    pub profile_dim: usize,
    /// Number of behaviors in the user-behavior sequence.
    pub behavior_seq_len: usize,
    /// Width of one behavior vector.
    pub behavior_dim: usize,
    /// Width of the item block.
    pub item_dim: usize,
    /// Width of the context block.
    pub ctx_dim: usize,
}

impl ModelShape {
    /// Width of the flattened behavior block.
    pub fn behavior_width(&self) -> usize {
        self.behavior_seq_len * self.behavior_dim
    }

    /// Width of the concatenated `[profile, pooled behavior, item, context]` row.
    pub fn pooled_width(&self) -> usize {
        self.profile_dim + self.behavior_dim + self.item_dim + self.ctx_dim
    }

    /// Checks that every dimension is positive.
    pub fn validate(&self) -> LayerResult<()> {
        let dims = [
            ("batch_size", self.batch_size),
            ("profile_dim", self.profile_dim),
            ("behavior_seq_len", self.behavior_seq_len),
            ("behavior_dim", self.behavior_dim),
            ("item_dim", self.item_dim),
            ("ctx_dim", self.ctx_dim),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(LayerError::GraphConstruction {
                    message: format!("{} must be positive", name),
                });
            }
        }
        Ok(())
    }
}

/// The four input nodes of a model, in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInputs {
    /// User-profile block `[B, profile_dim]`.
    pub profile: NodeId,
    /// Flattened behavior sequence `[B, behavior_seq_len * behavior_dim]`.
    pub behavior: NodeId,
    /// Item block `[B, item_dim]`.
    pub item: NodeId,
    /// Context block `[B, ctx_dim]`.
    pub ctx: NodeId,
}

impl ModelInputs {
    /// Declares the four input nodes sized for `shape`.
    pub fn declare(graph: &mut Graph, shape: &ModelShape) -> Self {
        Self {
            profile: graph.input("user_profile", shape.profile_dim),
            behavior: graph.input("user_behavior", shape.behavior_width()),
            item: graph.input("item_feature", shape.item_dim),
            ctx: graph.input("ctx_feature", shape.ctx_dim),
        }
    }

    /// Returns the nodes as `[profile, behavior, item, context]`.
    pub fn as_array(&self) -> [NodeId; 4] {
        [self.profile, self.behavior, self.item, self.ctx]
    }

    fn check(&self, graph: &Graph, shape: &ModelShape) -> LayerResult<()> {
        let expected = [
            shape.profile_dim,
            shape.behavior_width(),
            shape.item_dim,
            shape.ctx_dim,
        ];
        for (id, width) in self.as_array().into_iter().zip(expected) {
            let node = graph.node(id)?;
            if node.shape().width() != Some(width) || !node.shape().is_batched() {
                return Err(LayerError::GraphConstruction {
                    message: format!(
                        "input '{}' has shape {}, expected [B, {}]",
                        node.name(),
                        node.shape(),
                        width
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Graph and bookkeeping shared by every model implementation.
#[derive(Debug, Default)]
pub struct ModelState {
    graph: Graph,
    learnables: Vec<NodeId>,
    inputs: Option<ModelInputs>,
    shape: Option<ModelShape>,
    output: Option<NodeId>,
    machine: Option<Machine>,
    training_head: Option<TrainingHead>,
}

/// Label input and loss node appended for one training objective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingHead {
    /// Identifies the objective the loss was built for.
    pub key: String,
    /// Label input node.
    pub label: NodeId,
    /// Scalar loss node.
    pub loss: NodeId,
}

impl ModelState {
    /// Creates an empty state with a fresh graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Returns the graph mutably.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Registers trainable parameters created while building the forward graph.
    pub fn add_learnables(&mut self, params: impl IntoIterator<Item = NodeId>) {
        self.learnables.extend(params);
    }

    /// Returns whether the forward graph has been built.
    pub fn is_built(&self) -> bool {
        self.output.is_some()
    }

    /// The training head built for `key`, if it is the current one.
    pub fn training_head(&self, key: &str) -> Option<&TrainingHead> {
        self.training_head.as_ref().filter(|head| head.key == key)
    }

    /// Records the training head, replacing any earlier one.
    pub fn set_training_head(&mut self, head: TrainingHead) {
        self.training_head = Some(head);
    }
}

/// A ranking network built on a graph.
///
/// Implementors provide [`Model::build_forward`] and access to their
/// [`ModelState`]; every other operation has a default implementation.
///
/// # Example
///
/// ```
/// use rerank_layers::prelude::*;
///
/// let shape = ModelShape {
///     batch_size: 4,
///     profile_dim: 2,
///     behavior_seq_len: 3,
///     behavior_dim: 2,
///     item_dim: 2,
///     ctx_dim: 1,
/// };
/// let mut model = DinRanker::new(DinRankerConfig::default());
/// assert!(model.learnables().is_empty());
///
/// let inputs = ModelInputs::declare(model.graph_mut(), &shape);
/// model.forward(inputs, &shape).unwrap();
/// assert!(model.output().is_some());
/// assert!(!model.learnables().is_empty());
/// ```
pub trait Model {
    /// Short identifier of the architecture, stored in snapshots.
    fn name(&self) -> &str;

    /// Returns the shared state.
    fn state(&self) -> &ModelState;

    /// Returns the shared state mutably.
    fn state_mut(&mut self) -> &mut ModelState;

    /// Appends the network to the graph and returns its output node.
    ///
    /// Implementations register their parameters with
    /// [`ModelState::add_learnables`]. Called at most once, after `inputs`
    /// have been checked against `shape`.
    fn build_forward(&mut self, inputs: &ModelInputs, shape: &ModelShape) -> LayerResult<NodeId>;

    /// Builds the forward subgraph from the four input nodes.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::AlreadyBuilt`] on a second call and
    /// [`LayerError::GraphConstruction`] when the input widths disagree with
    /// `shape`.
    fn forward(&mut self, inputs: ModelInputs, shape: &ModelShape) -> LayerResult<()> {
        if self.state().is_built() {
            return Err(LayerError::AlreadyBuilt);
        }
        shape.validate()?;
        inputs.check(self.graph(), shape)?;

        let registered = self.learnables().len();
        match self.build_forward(&inputs, shape) {
            Ok(output) => {
                let state = self.state_mut();
                state.inputs = Some(inputs);
                state.shape = Some(*shape);
                state.output = Some(output);
                debug!(
                    params = state.learnables.len(),
                    nodes = state.graph.len(),
                    "Built forward graph"
                );
                Ok(())
            }
            Err(err) => {
                self.state_mut().learnables.truncate(registered);
                Err(err.into_construction())
            }
        }
    }

    /// The scalar-per-sample output node, once built.
    fn output(&self) -> Option<NodeId> {
        self.state().output
    }

    /// The input nodes as `[user-profile, behavior, item, context]`, once built.
    fn inputs(&self) -> Option<[NodeId; 4]> {
        self.state().inputs.map(|inputs| inputs.as_array())
    }

    /// Dimensions the forward graph was built for.
    fn shape(&self) -> Option<&ModelShape> {
        self.state().shape.as_ref()
    }

    /// Trainable parameter nodes; empty until the forward graph is built.
    fn learnables(&self) -> &[NodeId] {
        &self.state().learnables
    }

    /// Returns the owned graph.
    fn graph(&self) -> &Graph {
        self.state().graph()
    }

    /// Returns the owned graph mutably.
    fn graph_mut(&mut self) -> &mut Graph {
        self.state_mut().graph_mut()
    }

    /// Returns the attached execution handle.
    fn machine(&self) -> Option<&Machine> {
        self.state().machine.as_ref()
    }

    /// Returns the attached execution handle mutably.
    fn machine_mut(&mut self) -> Option<&mut Machine> {
        self.state_mut().machine.as_mut()
    }

    /// Attaches an execution handle, returning the one it replaces.
    fn set_machine(&mut self, machine: Machine) -> Option<Machine> {
        self.state_mut().machine.replace(machine)
    }

    /// Detaches the execution handle.
    fn take_machine(&mut self) -> Option<Machine> {
        self.state_mut().machine.take()
    }

    /// Exports the trained parameters as an opaque byte sequence.
    fn marshal(&self) -> LayerResult<Vec<u8>> {
        if !self.state().is_built() {
            return Err(LayerError::NotBuilt);
        }
        ParamSnapshot::capture(self.name(), self.graph(), self.learnables())?.to_bytes()
    }

    /// Restores parameters exported by [`Model::marshal`].
    ///
    /// The forward graph must already be built with the same topology.
    fn unmarshal(&mut self, bytes: &[u8]) -> LayerResult<()> {
        if !self.state().is_built() {
            return Err(LayerError::NotBuilt);
        }
        let snapshot = ParamSnapshot::from_bytes(bytes)?;
        snapshot.restore(self.name(), self.graph(), self.learnables())
    }
}
