//! Trace-norm regularized multinomial solver.
//!
//! `engine` computes stacked predictions, losses and gradients,
//! `backtracking` takes one proximal-gradient step with an adaptive step size,
//! and `ista` runs the accelerated outer loop over an exclusively owned
//! `Workspace`.
pub mod backtracking;
pub mod engine;
pub mod ista;
pub mod observer;
pub mod workspace;

pub use backtracking::{prox_grad_step, LineSearch, StepOutcome};
pub use engine::Problem;
pub use ista::{ista_loop, LoopSettings, SolverOutcome};
pub use observer::{FitObserver, IterationReport, LogObserver, RecordingObserver, StallReport};
pub use workspace::Workspace;
