pub mod classifier_trait;
pub mod trace;

pub use classifier_trait::{MultiStudyClassifier, MultiStudyEstimator, StudyPrediction, StudyScore};
pub use trace::{TraceNormEstimator, TraceNormModel};
