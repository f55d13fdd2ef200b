//! Graph execution substrate for the rerank models.
//!
//! This crate provides the pieces a model needs to describe and run its
//! computation:
//!
//! - [`Tensor`]: a host-side dense `f32` array used to pass features, labels and
//!   predictions across the API boundary.
//! - [`Graph`]: an arena of computation nodes. Inputs declare only their width,
//!   so one graph can be run with any batch size.
//! - [`compile`] and [`Machine`]: a two-phase executor. Compiling fixes the set
//!   of nodes to evaluate for a target (a forward output or a training loss);
//!   a machine binds concrete inputs, runs the program and exposes node values
//!   and parameter gradients.
//!
//! Numerics and reverse-mode differentiation run on `candle-core`.
//!
//! # Example
//!
//! ```rust
//! use rerank_tensor::{compile, ExecMode, Graph, Machine, Tensor};
//!
//! let mut graph = Graph::new();
//! let x = graph.input("x", 2);
//! let w = graph.param("w", &[2, 1], vec![1.0, -1.0]).unwrap();
//! let y = graph.matmul(x, w).unwrap();
//!
//! let program = compile(&graph, ExecMode::Forward { output: y }).unwrap();
//! let mut machine = Machine::new(program, 2).unwrap();
//! machine
//!     .bind(&graph, x, &Tensor::from_data(&[2, 2], vec![3.0, 1.0, 0.5, 2.0]).unwrap())
//!     .unwrap();
//! machine.run(&graph).unwrap();
//! assert_eq!(machine.value(y).unwrap().data(), &[2.0, -1.5]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod exec;
pub mod graph;
pub mod shape;
pub mod tensor;

pub use exec::{compile, ExecMode, Machine, Program};
pub use graph::{Graph, Node, NodeId, Op};
pub use shape::NodeShape;
pub use tensor::Tensor;

/// Error types for graph construction and execution.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// Shape mismatch error.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        actual: Vec<usize>,
    },

    /// Invalid shape error.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// An operation was given operands it cannot combine.
    #[error("Invalid operand for {op}: {message}")]
    InvalidOperand {
        /// The operation being built.
        op: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// An input required by the program was not bound.
    #[error("Input '{0}' is not bound")]
    UnboundInput(String),

    /// A node id does not belong to the graph.
    #[error("Unknown node {0}")]
    UnknownNode(usize),

    /// A value was requested before it was computed.
    #[error("Value of {0} has not been computed")]
    NotComputed(String),

    /// A parameter operation was applied to a non-parameter node.
    #[error("Node '{0}' is not a parameter")]
    NotAParameter(String),

    /// A binding was attempted on a node that is not an input.
    #[error("Node '{0}' is not an input")]
    NotAnInput(String),

    /// Error raised by the numeric backend.
    #[error("Backend error: {0}")]
    Backend(#[from] candle_core::Error),
}

/// Result type for tensor operations.
pub type TensorResult<T> = Result<T, TensorError>;
