//! Computation graph arena.
//!
//! A [`Graph`] owns every node of a model: inputs, trainable parameters and the
//! operations connecting them. Nodes are referenced by [`NodeId`], a plain index
//! into the arena, so models and executors can hold handles without borrowing
//! the graph.
//!
//! Trainable values are stored in the graph itself (as backend variables), which
//! lets several compiled programs share one set of weights: a training program
//! and a forward-only program built from the same graph observe the same values.
//!
//! # Example
//!
//! ```
//! use rerank_tensor::{Graph, NodeShape};
//!
//! let mut graph = Graph::new();
//! let x = graph.input("x", 3);
//! let w = graph.param("w", &[3, 2], vec![0.1; 6]).unwrap();
//! let b = graph.param("b", &[2], vec![0.0; 2]).unwrap();
//! let h = graph.matmul(x, w).unwrap();
//! let y = graph.add_bias(h, b).unwrap();
//! assert_eq!(graph.shape(y).unwrap(), &NodeShape::Batch { width: 2 });
//! ```

use candle_core::{Device, Tensor as BackendTensor, Var};
use serde::{Deserialize, Serialize};

use crate::shape::NodeShape;
use crate::{TensorError, TensorResult};

/// Index of a node inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the arena index.
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Operation computed by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Value supplied by the caller at run time.
    Input,
    /// Trainable parameter stored in the graph.
    Param,
    /// `a @ w`
    MatMul(NodeId, NodeId),
    /// `a + b` with `b` broadcast over the leading dimension.
    AddBias(NodeId, NodeId),
    /// Elementwise `a + b`.
    Add(NodeId, NodeId),
    /// Elementwise `a - b`.
    Sub(NodeId, NodeId),
    /// Elementwise `a * b`.
    Mul(NodeId, NodeId),
    /// `a * b` with `a` broadcast over the innermost dimension of `b`.
    BroadcastMul(NodeId, NodeId),
    /// `input * mul + add`
    Affine {
        /// Operand.
        input: NodeId,
        /// Multiplier.
        mul: f64,
        /// Offset.
        add: f64,
    },
    /// Logistic sigmoid.
    Sigmoid(NodeId),
    /// Rectified linear unit.
    Relu(NodeId),
    /// Natural logarithm.
    Log(NodeId),
    /// Negation.
    Neg(NodeId),
    /// Clamp into `[min, max]`.
    Clamp {
        /// Operand.
        input: NodeId,
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },
    /// Mean of all elements.
    Mean(NodeId),
    /// Concatenation along the innermost dimension.
    Concat(Vec<NodeId>),
    /// `[B, len * w] -> [B, len, w]`
    SplitSeq {
        /// Operand.
        input: NodeId,
        /// Sequence length.
        len: usize,
    },
    /// `[B, len, w] -> [B * len, w]`
    FlattenSeq(NodeId),
    /// `[B * len, w] -> [B, len, w]`
    UnflattenSeq {
        /// Operand.
        input: NodeId,
        /// Sequence length.
        len: usize,
    },
    /// `[B, w] -> [B * times, w]`, each row repeated `times` times.
    RepeatRows {
        /// Operand.
        input: NodeId,
        /// Repetitions per row.
        times: usize,
    },
    /// Sum over the sequence axis, `[B, len, w] -> [B, w]`.
    SumSeq(NodeId),
    /// Mean over the sequence axis, `[B, len, w] -> [B, w]`.
    MeanSeq(NodeId),
}

impl Op {
    /// Returns the operand nodes of this operation.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Op::Input | Op::Param => Vec::new(),
            Op::MatMul(a, b)
            | Op::AddBias(a, b)
            | Op::Add(a, b)
            | Op::Sub(a, b)
            | Op::Mul(a, b)
            | Op::BroadcastMul(a, b) => vec![*a, *b],
            Op::Affine { input, .. }
            | Op::Clamp { input, .. }
            | Op::SplitSeq { input, .. }
            | Op::UnflattenSeq { input, .. }
            | Op::RepeatRows { input, .. } => vec![*input],
            Op::Sigmoid(a)
            | Op::Relu(a)
            | Op::Log(a)
            | Op::Neg(a)
            | Op::Mean(a)
            | Op::FlattenSeq(a)
            | Op::SumSeq(a)
            | Op::MeanSeq(a) => vec![*a],
            Op::Concat(parts) => parts.clone(),
        }
    }

    /// Short operation name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Op::Input => "input",
            Op::Param => "param",
            Op::MatMul(..) => "matmul",
            Op::AddBias(..) => "add_bias",
            Op::Add(..) => "add",
            Op::Sub(..) => "sub",
            Op::Mul(..) => "mul",
            Op::BroadcastMul(..) => "broadcast_mul",
            Op::Affine { .. } => "affine",
            Op::Sigmoid(..) => "sigmoid",
            Op::Relu(..) => "relu",
            Op::Log(..) => "log",
            Op::Neg(..) => "neg",
            Op::Clamp { .. } => "clamp",
            Op::Mean(..) => "mean",
            Op::Concat(..) => "concat",
            Op::SplitSeq { .. } => "split_seq",
            Op::FlattenSeq(..) => "flatten_seq",
            Op::UnflattenSeq { .. } => "unflatten_seq",
            Op::RepeatRows { .. } => "repeat_rows",
            Op::SumSeq(..) => "sum_seq",
            Op::MeanSeq(..) => "mean_seq",
        }
    }
}

/// A node of the graph.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    op: Op,
    shape: NodeShape,
    value: Option<Var>,
}

impl Node {
    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operation computed by the node.
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Symbolic shape of the node.
    pub fn shape(&self) -> &NodeShape {
        &self.shape
    }

    /// Returns whether the node is a trainable parameter.
    pub fn is_param(&self) -> bool {
        matches!(self.op, Op::Param)
    }
}

/// Arena of computation nodes plus the storage for trainable parameters.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    device: Device,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph on the CPU device.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            device: Device::Cpu,
        }
    }

    /// Returns the device parameters live on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node.
    pub fn node(&self, id: NodeId) -> TensorResult<&Node> {
        self.nodes.get(id.0).ok_or(TensorError::UnknownNode(id.0))
    }

    /// Returns the symbolic shape of a node.
    pub fn shape(&self, id: NodeId) -> TensorResult<&NodeShape> {
        Ok(&self.node(id)?.shape)
    }

    /// Returns the ids of all parameter nodes in creation order.
    pub fn params(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_param())
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    fn push(&mut self, name: impl Into<String>, op: Op, shape: NodeShape) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            op,
            shape,
            value: None,
        });
        id
    }

    fn derived(&mut self, op: Op, shape: NodeShape) -> NodeId {
        let name = format!("{}_{}", op.kind(), self.nodes.len());
        self.push(name, op, shape)
    }

    /// Declares a `[batch, width]` input.
    pub fn input(&mut self, name: impl Into<String>, width: usize) -> NodeId {
        self.push(name, Op::Input, NodeShape::Batch { width })
    }

    /// Declares a trainable parameter initialised with `data`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidShape`] if `data` does not fill `dims`.
    pub fn param(
        &mut self,
        name: impl Into<String>,
        dims: &[usize],
        data: Vec<f32>,
    ) -> TensorResult<NodeId> {
        let numel: usize = dims.iter().product();
        if data.len() != numel || dims.is_empty() {
            return Err(TensorError::InvalidShape(format!(
                "parameter of shape {:?} needs {} values, got {}",
                dims,
                numel,
                data.len()
            )));
        }
        let tensor = BackendTensor::from_vec(data, dims, &self.device)?;
        let var = Var::from_tensor(&tensor)?;
        let id = self.push(name, Op::Param, NodeShape::Fixed(dims.to_vec()));
        self.nodes[id.0].value = Some(var);
        Ok(id)
    }

    pub(crate) fn param_var(&self, id: NodeId) -> TensorResult<&Var> {
        let node = self.node(id)?;
        node.value
            .as_ref()
            .ok_or_else(|| TensorError::NotAParameter(node.name.clone()))
    }

    /// Returns a flat copy of a parameter's current value.
    pub fn param_data(&self, id: NodeId) -> TensorResult<Vec<f32>> {
        let var = self.param_var(id)?;
        Ok(var.as_tensor().flatten_all()?.to_vec1::<f32>()?)
    }

    /// Overwrites a parameter's value in place.
    ///
    /// Every compiled program sharing this graph observes the new value on its
    /// next run.
    pub fn set_param_data(&self, id: NodeId, data: Vec<f32>) -> TensorResult<()> {
        let var = self.param_var(id)?;
        let dims = var.as_tensor().dims().to_vec();
        let numel: usize = dims.iter().product();
        if data.len() != numel {
            return Err(TensorError::ShapeMismatch {
                expected: dims,
                actual: vec![data.len()],
            });
        }
        let tensor = BackendTensor::from_vec(data, dims.as_slice(), &self.device)?;
        var.set(&tensor)?;
        Ok(())
    }

    fn invalid(op: &'static str, message: String) -> TensorError {
        TensorError::InvalidOperand { op, message }
    }

    fn batched_shape(&self, op: &'static str, id: NodeId) -> TensorResult<NodeShape> {
        let shape = self.shape(id)?.clone();
        match shape {
            NodeShape::Batch { .. } | NodeShape::Flat { .. } => Ok(shape),
            other => Err(Self::invalid(
                op,
                format!("expected a [B, w] or [B*L, w] operand, got {}", other),
            )),
        }
    }

    /// `a @ w` where `w` is a `[k, n]` parameter.
    pub fn matmul(&mut self, a: NodeId, w: NodeId) -> TensorResult<NodeId> {
        let lhs = self.batched_shape("matmul", a)?;
        let (k, n) = match self.shape(w)? {
            NodeShape::Fixed(dims) if dims.len() == 2 => (dims[0], dims[1]),
            other => {
                return Err(Self::invalid(
                    "matmul",
                    format!("weight must be a [k, n] parameter, got {}", other),
                ))
            }
        };
        if lhs.width() != Some(k) {
            return Err(Self::invalid(
                "matmul",
                format!("operand {} does not match weight [{}, {}]", lhs, k, n),
            ));
        }
        Ok(self.derived(Op::MatMul(a, w), lhs.with_width(n)))
    }

    /// Adds a `[n]` bias to every row of `a`.
    pub fn add_bias(&mut self, a: NodeId, bias: NodeId) -> TensorResult<NodeId> {
        let lhs = self.batched_shape("add_bias", a)?;
        match self.shape(bias)? {
            NodeShape::Fixed(dims) if dims.len() == 1 && Some(dims[0]) == lhs.width() => {}
            other => {
                return Err(Self::invalid(
                    "add_bias",
                    format!("bias {} does not match operand {}", other, lhs),
                ))
            }
        }
        Ok(self.derived(Op::AddBias(a, bias), lhs))
    }

    fn same_shape(&self, op: &'static str, a: NodeId, b: NodeId) -> TensorResult<NodeShape> {
        let lhs = self.shape(a)?;
        let rhs = self.shape(b)?;
        if lhs != rhs {
            return Err(Self::invalid(op, format!("{} vs {}", lhs, rhs)));
        }
        Ok(lhs.clone())
    }

    /// Elementwise `a + b`.
    pub fn add(&mut self, a: NodeId, b: NodeId) -> TensorResult<NodeId> {
        let shape = self.same_shape("add", a, b)?;
        Ok(self.derived(Op::Add(a, b), shape))
    }

    /// Elementwise `a - b`.
    pub fn sub(&mut self, a: NodeId, b: NodeId) -> TensorResult<NodeId> {
        let shape = self.same_shape("sub", a, b)?;
        Ok(self.derived(Op::Sub(a, b), shape))
    }

    /// Elementwise `a * b`.
    pub fn mul(&mut self, a: NodeId, b: NodeId) -> TensorResult<NodeId> {
        let shape = self.same_shape("mul", a, b)?;
        Ok(self.derived(Op::Mul(a, b), shape))
    }

    /// Scales every element of sequence `values` by the matching scalar in
    /// `weights` (`[B, L, 1] * [B, L, w]`).
    pub fn broadcast_mul(&mut self, weights: NodeId, values: NodeId) -> TensorResult<NodeId> {
        let (w_len, w_width) = match self.shape(weights)? {
            NodeShape::Seq { len, width } => (*len, *width),
            other => {
                return Err(Self::invalid(
                    "broadcast_mul",
                    format!("weights must be a sequence, got {}", other),
                ))
            }
        };
        let out = match self.shape(values)? {
            NodeShape::Seq { len, width } if *len == w_len && (w_width == 1 || w_width == *width) => {
                NodeShape::Seq {
                    len: *len,
                    width: *width,
                }
            }
            other => {
                return Err(Self::invalid(
                    "broadcast_mul",
                    format!("weights [B, {}, {}] do not broadcast to {}", w_len, w_width, other),
                ))
            }
        };
        Ok(self.derived(Op::BroadcastMul(weights, values), out))
    }

    /// `a * mul + add`.
    pub fn affine(&mut self, a: NodeId, mul: f64, add: f64) -> TensorResult<NodeId> {
        let shape = self.shape(a)?.clone();
        Ok(self.derived(Op::Affine { input: a, mul, add }, shape))
    }

    fn unary(&mut self, a: NodeId, make: fn(NodeId) -> Op) -> TensorResult<NodeId> {
        let shape = self.shape(a)?.clone();
        Ok(self.derived(make(a), shape))
    }

    /// Logistic sigmoid.
    pub fn sigmoid(&mut self, a: NodeId) -> TensorResult<NodeId> {
        self.unary(a, Op::Sigmoid)
    }

    /// Rectified linear unit.
    pub fn relu(&mut self, a: NodeId) -> TensorResult<NodeId> {
        self.unary(a, Op::Relu)
    }

    /// Natural logarithm.
    pub fn log(&mut self, a: NodeId) -> TensorResult<NodeId> {
        self.unary(a, Op::Log)
    }

    /// Negation.
    pub fn neg(&mut self, a: NodeId) -> TensorResult<NodeId> {
        self.unary(a, Op::Neg)
    }

    /// Clamps every element into `[min, max]`.
    pub fn clamp(&mut self, a: NodeId, min: f32, max: f32) -> TensorResult<NodeId> {
        if min > max {
            return Err(Self::invalid(
                "clamp",
                format!("min {} is greater than max {}", min, max),
            ));
        }
        let shape = self.shape(a)?.clone();
        Ok(self.derived(Op::Clamp { input: a, min, max }, shape))
    }

    /// Mean of all elements, producing a scalar.
    pub fn mean(&mut self, a: NodeId) -> TensorResult<NodeId> {
        self.node(a)?;
        Ok(self.derived(Op::Mean(a), NodeShape::Scalar))
    }

    /// Concatenates row blocks along the innermost dimension.
    pub fn concat(&mut self, parts: &[NodeId]) -> TensorResult<NodeId> {
        let first = match parts.first() {
            Some(id) => self.batched_shape("concat", *id)?,
            None => return Err(Self::invalid("concat", "no operands".to_string())),
        };
        let mut width = 0;
        for id in parts {
            let shape = self.batched_shape("concat", *id)?;
            if shape.with_width(0) != first.with_width(0) {
                return Err(Self::invalid(
                    "concat",
                    format!("operand {} is incompatible with {}", shape, first),
                ));
            }
            width += shape.width().unwrap_or(0);
        }
        Ok(self.derived(Op::Concat(parts.to_vec()), first.with_width(width)))
    }

    /// Splits `[B, len * w]` into a `[B, len, w]` sequence.
    pub fn split_seq(&mut self, a: NodeId, len: usize) -> TensorResult<NodeId> {
        let width = match self.shape(a)? {
            NodeShape::Batch { width } => *width,
            other => {
                return Err(Self::invalid(
                    "split_seq",
                    format!("expected [B, w], got {}", other),
                ))
            }
        };
        if len == 0 || width % len != 0 {
            return Err(Self::invalid(
                "split_seq",
                format!("width {} is not a multiple of sequence length {}", width, len),
            ));
        }
        Ok(self.derived(
            Op::SplitSeq { input: a, len },
            NodeShape::Seq {
                len,
                width: width / len,
            },
        ))
    }

    /// Folds the sequence axis into the row axis.
    pub fn flatten_seq(&mut self, a: NodeId) -> TensorResult<NodeId> {
        match self.shape(a)?.clone() {
            NodeShape::Seq { len, width } => {
                Ok(self.derived(Op::FlattenSeq(a), NodeShape::Flat { len, width }))
            }
            other => Err(Self::invalid(
                "flatten_seq",
                format!("expected a sequence, got {}", other),
            )),
        }
    }

    /// Restores the sequence axis folded by [`Graph::flatten_seq`] or [`Graph::repeat_rows`].
    pub fn unflatten_seq(&mut self, a: NodeId) -> TensorResult<NodeId> {
        match self.shape(a)?.clone() {
            NodeShape::Flat { len, width } => Ok(self.derived(
                Op::UnflattenSeq { input: a, len },
                NodeShape::Seq { len, width },
            )),
            other => Err(Self::invalid(
                "unflatten_seq",
                format!("expected [B*L, w], got {}", other),
            )),
        }
    }

    /// Repeats every row `times` times, `[B, w] -> [B * times, w]`.
    pub fn repeat_rows(&mut self, a: NodeId, times: usize) -> TensorResult<NodeId> {
        match self.shape(a)?.clone() {
            NodeShape::Batch { width } if times > 0 => Ok(self.derived(
                Op::RepeatRows { input: a, times },
                NodeShape::Flat { len: times, width },
            )),
            other => Err(Self::invalid(
                "repeat_rows",
                format!("cannot repeat {} {} times", other, times),
            )),
        }
    }

    fn reduce_seq(&mut self, a: NodeId, make: fn(NodeId) -> Op) -> TensorResult<NodeId> {
        match self.shape(a)?.clone() {
            NodeShape::Seq { width, .. } => Ok(self.derived(make(a), NodeShape::Batch { width })),
            other => Err(Self::invalid(
                "reduce_seq",
                format!("expected a sequence, got {}", other),
            )),
        }
    }

    /// Sums a sequence over its sequence axis.
    pub fn sum_seq(&mut self, a: NodeId) -> TensorResult<NodeId> {
        self.reduce_seq(a, Op::SumSeq)
    }

    /// Averages a sequence over its sequence axis.
    pub fn mean_seq(&mut self, a: NodeId) -> TensorResult<NodeId> {
        self.reduce_seq(a, Op::MeanSeq)
    }
}
