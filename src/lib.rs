//! cogspaces: multi-study multinomial classification with a shared low-rank
//! coefficient matrix.
//!
//! Several labelled studies living in the same feature space are fit jointly.
//! Each study keeps its own classes, but all class columns are stacked into
//! one coefficient matrix whose trace norm is penalized, so the studies end
//! up sharing a low-dimensional set of directions. The solver is an
//! accelerated proximal-gradient method with backtracking on the step size.
//!
//! The crate is organised in small layers: data stacking and validation,
//! numerics primitives, the solver itself, and the estimator façade in
//! `models`. Progress is reported through the `log` facade or an injectable
//! observer; nothing is printed.
pub mod config;
pub mod data_handling;
pub mod error;
pub mod math;
pub mod models;
pub mod solver;
pub mod stats;
pub mod synthetic;

pub use config::{load_config, TraceNormConfig};
pub use data_handling::{Labels, StackedStudies, Study};
pub use error::{CogspacesError, Result};
pub use models::{
    MultiStudyClassifier, MultiStudyEstimator, StudyPrediction, StudyScore, TraceNormEstimator,
    TraceNormModel,
};
pub use solver::{FitObserver, IterationReport, LogObserver, RecordingObserver, StallReport};
