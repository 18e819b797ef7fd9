//! Numerics primitives used by the solver.
//!
//! Smoothness bound of the multinomial loss, row-wise log-softmax and
//! cross-entropy, and the SVD-based proximal operator of the trace norm.
pub mod lipschitz;
pub mod prox;
pub mod softmax;

pub use lipschitz::lipschitz_constant;
pub use prox::{matrix_rank, proximal_operator, svd, trace_norm, Svd};
pub use softmax::{cross_entropy, log_softmax_rows};
