use ndarray::{Array2, ArrayView2};

use crate::data_handling::Study;
use crate::error::Result;

/// Class probabilities of one study, (samples, that study's classes).
#[derive(Debug, Clone, PartialEq)]
pub struct StudyPrediction {
    pub name: String,
    pub probabilities: Array2<f32>,
}

/// Per-study evaluation value, e.g. cross-entropy or accuracy.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyScore {
    pub name: String,
    pub value: f64,
}

/// Something that can be trained jointly on several studies.
///
/// Fitting returns a separate model value instead of mutating the estimator,
/// so one configured estimator can be reused across folds or grid points.
pub trait MultiStudyEstimator {
    type Model: MultiStudyClassifier;

    /// Fit on `studies`. `weights` scale each study's share of the loss and
    /// are normalized to mean 1; `None` weighs studies equally.
    fn fit(&self, studies: &[Study], weights: Option<&[f32]>) -> Result<Self::Model>;

    /// Optional human readable name for the estimator
    fn name(&self) -> &str {
        "estimator"
    }
}

/// A fitted multi-study classifier.
pub trait MultiStudyClassifier {
    /// Class probabilities for each `(study name, features)` pair, in input
    /// order. Every study must have been part of the fit.
    fn predict_proba(&self, inputs: &[(&str, ArrayView2<f32>)]) -> Result<Vec<StudyPrediction>>;

    /// Mean cross-entropy of the predictions against each study's labels.
    fn score(&self, studies: &[Study]) -> Result<Vec<StudyScore>>;
}
