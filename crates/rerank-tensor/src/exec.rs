//! Compiling and running graphs.
//!
//! Execution is split in two phases. [`compile`] walks the graph backwards from
//! a target node and records the evaluation order. A [`Machine`] then owns the
//! compiled [`Program`] together with the per-run state: bound inputs, computed
//! values and, for training programs, parameter gradients.

use std::collections::HashMap;

use candle_core::backprop::GradStore;
use candle_core::{Tensor as BackendTensor, D};
use tracing::{debug, trace};

use crate::graph::{Graph, NodeId, Op};
use crate::shape::NodeShape;
use crate::tensor::Tensor;
use crate::{TensorError, TensorResult};

/// What a compiled program computes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecMode {
    /// Evaluate `output` without tracking gradients.
    Forward {
        /// Node to evaluate.
        output: NodeId,
    },
    /// Evaluate the scalar `loss` and differentiate it with respect to `params`.
    Train {
        /// Scalar loss node.
        loss: NodeId,
        /// Parameters whose gradients are collected.
        params: Vec<NodeId>,
    },
}

impl ExecMode {
    /// The node this program is compiled for.
    pub fn target(&self) -> NodeId {
        match self {
            ExecMode::Forward { output } => *output,
            ExecMode::Train { loss, .. } => *loss,
        }
    }
}

/// A compiled evaluation plan.
#[derive(Debug, Clone)]
pub struct Program {
    mode: ExecMode,
    order: Vec<NodeId>,
    inputs: Vec<NodeId>,
}

impl Program {
    /// Returns the execution mode.
    pub fn mode(&self) -> &ExecMode {
        &self.mode
    }

    /// Nodes in evaluation order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Input nodes that must be bound before running.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Returns whether the program differentiates its target.
    pub fn is_training(&self) -> bool {
        matches!(self.mode, ExecMode::Train { .. })
    }
}

/// Compiles the nodes required to evaluate `mode`'s target.
///
/// Operands always precede their consumers in the arena, so the reachable set
/// in index order is a valid evaluation order.
///
/// # Errors
///
/// Fails if a node is unknown, if a training loss is not a scalar, or if a
/// listed training parameter is not a parameter node.
pub fn compile(graph: &Graph, mode: ExecMode) -> TensorResult<Program> {
    let target = mode.target();
    graph.node(target)?;

    if let ExecMode::Train { loss, params } = &mode {
        let shape = graph.shape(*loss)?;
        if *shape != NodeShape::Scalar {
            return Err(TensorError::InvalidShape(format!(
                "training loss must be a scalar, got {}",
                shape
            )));
        }
        for id in params {
            let node = graph.node(*id)?;
            if !node.is_param() {
                return Err(TensorError::NotAParameter(node.name().to_string()));
            }
        }
    }

    let mut reachable = vec![false; graph.len()];
    let mut stack = vec![target];
    while let Some(id) = stack.pop() {
        if reachable[id.index()] {
            continue;
        }
        reachable[id.index()] = true;
        for operand in graph.node(id)?.op().operands() {
            graph.node(operand)?;
            stack.push(operand);
        }
    }

    let order: Vec<NodeId> = reachable
        .iter()
        .enumerate()
        .filter(|(_, r)| **r)
        .map(|(i, _)| NodeId::from_index(i))
        .collect();
    let mut inputs = Vec::new();
    for id in &order {
        if matches!(graph.node(*id)?.op(), Op::Input) {
            inputs.push(*id);
        }
    }

    debug!(
        target_node = target.index(),
        nodes = order.len(),
        inputs = inputs.len(),
        training = matches!(mode, ExecMode::Train { .. }),
        "Compiled program"
    );

    Ok(Program {
        mode,
        order,
        inputs,
    })
}

/// Execution handle for a compiled program at a fixed batch size.
#[derive(Debug)]
pub struct Machine {
    program: Program,
    batch_size: usize,
    bindings: HashMap<NodeId, BackendTensor>,
    values: HashMap<NodeId, BackendTensor>,
    grads: Option<GradStore>,
}

impl Machine {
    /// Creates a machine for `program` that runs `batch_size` samples at a time.
    pub fn new(program: Program, batch_size: usize) -> TensorResult<Self> {
        if batch_size == 0 {
            return Err(TensorError::InvalidShape(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(Self {
            program,
            batch_size,
            bindings: HashMap::new(),
            values: HashMap::new(),
            grads: None,
        })
    }

    /// Returns the compiled program.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Returns the number of samples per run.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Binds a `[batch_size, width]` value to an input node.
    pub fn bind(&mut self, graph: &Graph, id: NodeId, value: &Tensor) -> TensorResult<()> {
        let node = graph.node(id)?;
        if !matches!(node.op(), Op::Input) {
            return Err(TensorError::NotAnInput(node.name().to_string()));
        }
        let expected = node.shape().concrete(self.batch_size);
        if value.shape() != expected.as_slice() {
            return Err(TensorError::ShapeMismatch {
                expected,
                actual: value.shape().to_vec(),
            });
        }
        let tensor = BackendTensor::from_vec(value.data().to_vec(), value.shape(), graph.device())?;
        self.bindings.insert(id, tensor);
        Ok(())
    }

    /// Evaluates the program against the current bindings.
    ///
    /// Training programs also compute gradients of the loss with respect to
    /// the compiled parameters.
    pub fn run(&mut self, graph: &Graph) -> TensorResult<()> {
        self.values.clear();
        self.grads = None;
        let training = self.program.is_training();
        let order = self.program.order.clone();

        for id in order {
            let node = graph.node(id)?;
            let value = match node.op() {
                Op::Input => self
                    .bindings
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| TensorError::UnboundInput(node.name().to_string()))?,
                Op::Param => {
                    let var = graph.param_var(id)?;
                    if training {
                        var.as_tensor().clone()
                    } else {
                        var.as_tensor().detach()
                    }
                }
                op => self.eval(op)?,
            };
            trace!(node = node.name(), dims = ?value.dims(), "Evaluated node");
            self.values.insert(id, value);
        }

        if let ExecMode::Train { loss, .. } = &self.program.mode {
            let loss = self.computed(*loss)?;
            self.grads = Some(loss.backward()?);
        }
        Ok(())
    }

    fn computed(&self, id: NodeId) -> TensorResult<&BackendTensor> {
        self.values
            .get(&id)
            .ok_or_else(|| TensorError::NotComputed(format!("node {}", id.index())))
    }

    fn eval(&self, op: &Op) -> TensorResult<BackendTensor> {
        let v = |id: &NodeId| self.computed(*id);
        let out = match op {
            Op::Input | Op::Param => {
                return Err(TensorError::InvalidShape(format!(
                    "{} nodes are not evaluated",
                    op.kind()
                )))
            }
            Op::MatMul(a, w) => v(a)?.matmul(v(w)?)?,
            Op::AddBias(a, b) => v(a)?.broadcast_add(v(b)?)?,
            Op::Add(a, b) => v(a)?.add(v(b)?)?,
            Op::Sub(a, b) => v(a)?.sub(v(b)?)?,
            Op::Mul(a, b) => v(a)?.mul(v(b)?)?,
            Op::BroadcastMul(weights, values) => v(values)?.broadcast_mul(v(weights)?)?,
            Op::Affine { input, mul, add } => v(input)?.affine(*mul, *add)?,
            // 0.5 * (1 + tanh(x / 2)) stays finite for large |x|.
            Op::Sigmoid(a) => v(a)?.affine(0.5, 0.0)?.tanh()?.affine(0.5, 0.5)?,
            Op::Relu(a) => v(a)?.relu()?,
            Op::Log(a) => v(a)?.log()?,
            Op::Neg(a) => v(a)?.neg()?,
            Op::Clamp { input, min, max } => v(input)?.clamp(*min, *max)?,
            Op::Mean(a) => v(a)?.mean_all()?,
            Op::Concat(parts) => {
                let tensors = parts.iter().map(v).collect::<TensorResult<Vec<_>>>()?;
                BackendTensor::cat(&tensors, D::Minus1)?
            }
            Op::SplitSeq { input, len } => {
                let x = v(input)?;
                let (b, w) = x.dims2()?;
                x.reshape((b, *len, w / len))?
            }
            Op::FlattenSeq(a) => {
                let x = v(a)?;
                let (b, l, w) = x.dims3()?;
                x.reshape((b * l, w))?
            }
            Op::UnflattenSeq { input, len } => {
                let x = v(input)?;
                let (rows, w) = x.dims2()?;
                x.reshape((rows / len, *len, w))?
            }
            Op::RepeatRows { input, times } => {
                let x = v(input)?;
                let (b, w) = x.dims2()?;
                x.unsqueeze(1)?
                    .broadcast_as((b, *times, w))?
                    .contiguous()?
                    .reshape((b * times, w))?
            }
            Op::SumSeq(a) => v(a)?.sum(1)?,
            Op::MeanSeq(a) => v(a)?.mean(1)?,
        };
        Ok(out)
    }

    /// Returns the computed value of a node as a host tensor.
    pub fn value(&self, id: NodeId) -> TensorResult<Tensor> {
        let t = self.computed(id)?;
        let dims = t.dims().to_vec();
        let data = t.flatten_all()?.to_vec1::<f32>()?;
        Tensor::from_data(&dims, data)
    }

    /// Returns the computed value of a scalar node.
    pub fn scalar(&self, id: NodeId) -> TensorResult<f32> {
        let t = self.computed(id)?;
        if t.rank() != 0 {
            return Err(TensorError::ShapeMismatch {
                expected: vec![],
                actual: t.dims().to_vec(),
            });
        }
        Ok(t.to_scalar::<f32>()?)
    }

    /// Returns the loss gradient for a parameter after a training run.
    ///
    /// Parameters the loss does not depend on have an all-zero gradient.
    pub fn gradient(&self, graph: &Graph, id: NodeId) -> TensorResult<Vec<f32>> {
        let grads = self
            .grads
            .as_ref()
            .ok_or_else(|| TensorError::NotComputed("gradients".to_string()))?;
        let var = graph.param_var(id)?;
        match grads.get(var.as_tensor()) {
            Some(g) => Ok(g.flatten_all()?.to_vec1::<f32>()?),
            None => Ok(vec![0.0; var.as_tensor().elem_count()]),
        }
    }

    /// Clears bindings, computed values and gradients.
    pub fn reset(&mut self) {
        self.bindings.clear();
        self.values.clear();
        self.grads = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_forward_matmul_bias() {
        let mut g = Graph::new();
        let x = g.input("x", 2);
        let w = g.param("w", &[2, 2], vec![1.0, 0.0, 0.0, 2.0]).unwrap();
        let b = g.param("b", &[2], vec![0.5, -0.5]).unwrap();
        let h = g.matmul(x, w).unwrap();
        let y = g.add_bias(h, b).unwrap();

        let program = compile(&g, ExecMode::Forward { output: y }).unwrap();
        assert_eq!(program.inputs(), &[x]);
        let mut m = Machine::new(program, 1).unwrap();
        m.bind(&g, x, &Tensor::from_data(&[1, 2], vec![1.0, 1.0]).unwrap())
            .unwrap();
        m.run(&g).unwrap();
        assert!(close(m.value(y).unwrap().data(), &[1.5, 1.5]));
    }

    #[test]
    fn test_unbound_input() {
        let mut g = Graph::new();
        let x = g.input("x", 1);
        let y = g.relu(x).unwrap();
        let program = compile(&g, ExecMode::Forward { output: y }).unwrap();
        let mut m = Machine::new(program, 1).unwrap();
        assert!(matches!(m.run(&g), Err(TensorError::UnboundInput(_))));
    }

    #[test]
    fn test_bind_checks_batch_shape() {
        let mut g = Graph::new();
        let x = g.input("x", 3);
        let program = compile(&g, ExecMode::Forward { output: x }).unwrap();
        let mut m = Machine::new(program, 2).unwrap();
        let wrong = Tensor::zeros(&[3, 3]);
        assert!(matches!(
            m.bind(&g, x, &wrong),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut g = Graph::new();
        let x = g.input("x", 1);
        let program = compile(&g, ExecMode::Forward { output: x }).unwrap();
        assert!(Machine::new(program, 0).is_err());
    }

    #[test]
    fn test_sigmoid_values() {
        let mut g = Graph::new();
        let x = g.input("x", 3);
        let y = g.sigmoid(x).unwrap();
        let program = compile(&g, ExecMode::Forward { output: y }).unwrap();
        let mut m = Machine::new(program, 1).unwrap();
        m.bind(&g, x, &Tensor::from_data(&[1, 3], vec![0.0, 100.0, -100.0]).unwrap())
            .unwrap();
        m.run(&g).unwrap();
        let out = m.value(y).unwrap();
        assert!(close(&out.data()[..1], &[0.5]));
        assert!(out.data()[1] > 0.999 && out.data()[2] < 0.001);
        assert!(out.is_finite());
    }

    #[test]
    fn test_sequence_pipeline() {
        // Two samples, sequence of 2 elements of width 1.
        let mut g = Graph::new();
        let seq_in = g.input("seq", 2);
        let q = g.input("q", 1);
        let seq = g.split_seq(seq_in, 2).unwrap();
        let flat = g.flatten_seq(seq).unwrap();
        let rep = g.repeat_rows(q, 2).unwrap();
        let prod = g.mul(flat, rep).unwrap();
        let back = g.unflatten_seq(prod).unwrap();
        let pooled = g.sum_seq(back).unwrap();

        let program = compile(&g, ExecMode::Forward { output: pooled }).unwrap();
        let mut m = Machine::new(program, 2).unwrap();
        m.bind(&g, seq_in, &Tensor::from_data(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap())
            .unwrap();
        m.bind(&g, q, &Tensor::from_data(&[2, 1], vec![10.0, 100.0]).unwrap())
            .unwrap();
        m.run(&g).unwrap();
        let out = m.value(pooled).unwrap();
        assert_eq!(out.shape(), &[2, 1]);
        assert!(close(out.data(), &[30.0, 700.0]));
    }

    #[test]
    fn test_training_gradient() {
        // loss = mean((x @ w)) with x = [[1, 2]] gives dloss/dw = [1, 2].
        let mut g = Graph::new();
        let x = g.input("x", 2);
        let w = g.param("w", &[2, 1], vec![0.3, 0.7]).unwrap();
        let unused = g.param("unused", &[1], vec![0.0]).unwrap();
        let y = g.matmul(x, w).unwrap();
        let loss = g.mean(y).unwrap();

        let program = compile(
            &g,
            ExecMode::Train {
                loss,
                params: vec![w, unused],
            },
        )
        .unwrap();
        let mut m = Machine::new(program, 1).unwrap();
        m.bind(&g, x, &Tensor::from_data(&[1, 2], vec![1.0, 2.0]).unwrap())
            .unwrap();
        m.run(&g).unwrap();

        assert!((m.scalar(loss).unwrap() - 1.7).abs() < 1e-5);
        assert!(close(&m.gradient(&g, w).unwrap(), &[1.0, 2.0]));
        assert_eq!(m.gradient(&g, unused).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_train_requires_scalar_loss() {
        let mut g = Graph::new();
        let x = g.input("x", 2);
        let w = g.param("w", &[2, 1], vec![0.0; 2]).unwrap();
        let y = g.matmul(x, w).unwrap();
        let result = compile(
            &g,
            ExecMode::Train {
                loss: y,
                params: vec![w],
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_params_visible_to_forward_program() {
        let mut g = Graph::new();
        let x = g.input("x", 1);
        let w = g.param("w", &[1, 1], vec![1.0]).unwrap();
        let y = g.matmul(x, w).unwrap();
        let program = compile(&g, ExecMode::Forward { output: y }).unwrap();
        let mut m = Machine::new(program, 1).unwrap();
        m.bind(&g, x, &Tensor::from_data(&[1, 1], vec![2.0]).unwrap())
            .unwrap();

        m.run(&g).unwrap();
        assert!(close(m.value(y).unwrap().data(), &[2.0]));

        g.set_param_data(w, vec![3.0]).unwrap();
        m.run(&g).unwrap();
        assert!(close(m.value(y).unwrap().data(), &[6.0]));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut g = Graph::new();
        let x = g.input("x", 1);
        let program = compile(&g, ExecMode::Forward { output: x }).unwrap();
        let mut m = Machine::new(program, 1).unwrap();
        m.bind(&g, x, &Tensor::zeros(&[1, 1])).unwrap();
        m.run(&g).unwrap();
        assert!(m.value(x).is_ok());
        m.reset();
        assert!(matches!(m.value(x), Err(TensorError::NotComputed(_))));
        assert!(m.run(&g).is_err());
    }
}
