//! Buffers mutated by one fit.
//!
//! A `Workspace` is allocated once per fit and owned exclusively by it. The
//! solver overwrites its arrays in place every iteration; after the last
//! iteration `coef` and `intercept` hold the trained model.
use ndarray::{Array1, Array2};

#[derive(Debug, Clone)]
pub struct Workspace {
    /// Point the next gradient step starts from (extrapolated under momentum).
    pub coef: Array2<f32>,
    pub intercept: Array1<f32>,
    /// Candidate produced by the last proximal-gradient step.
    pub prox_coef: Array2<f32>,
    pub prox_intercept: Array1<f32>,
    /// Previous accepted candidate, used for momentum.
    pub old_prox_coef: Array2<f32>,
    pub coef_grad: Array2<f32>,
    pub intercept_grad: Array1<f32>,
    pub coef_diff: Array2<f32>,
    pub intercept_diff: Array1<f32>,
    /// Log-probabilities (later residuals), (total samples, total classes).
    pub preds: Array2<f32>,
}

impl Workspace {
    /// Coefficients start at one and intercepts at zero.
    pub fn new(n_features: usize, n_classes: usize, n_samples: usize) -> Self {
        let coef_shape = (n_features, n_classes);
        Workspace {
            coef: Array2::ones(coef_shape),
            intercept: Array1::zeros(n_classes),
            prox_coef: Array2::zeros(coef_shape),
            prox_intercept: Array1::zeros(n_classes),
            old_prox_coef: Array2::zeros(coef_shape),
            coef_grad: Array2::zeros(coef_shape),
            intercept_grad: Array1::zeros(n_classes),
            coef_diff: Array2::zeros(coef_shape),
            intercept_diff: Array1::zeros(n_classes),
            preds: Array2::zeros((n_samples, n_classes)),
        }
    }

    pub fn n_features(&self) -> usize {
        self.coef.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.coef.ncols()
    }

    /// Rank of a coefficient matrix that was not thresholded.
    pub fn full_rank(&self) -> usize {
        self.n_features().min(self.n_classes())
    }
}
