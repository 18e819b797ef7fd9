//! Error type shared by validation, the numerics primitives and the solver.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CogspacesError>;

#[derive(Debug, Error)]
pub enum CogspacesError {
    #[error("no studies were provided")]
    EmptyStudies,

    #[error("study '{study}' has no samples")]
    EmptyStudy { study: String },

    #[error("study '{study}' has no feature columns")]
    NoFeatures { study: String },

    #[error("study '{study}' has {found} features, expected {expected}")]
    FeatureMismatch {
        study: String,
        expected: usize,
        found: usize,
    },

    #[error("study '{study}' has {features} feature rows but {labels} label rows")]
    LabelRowMismatch {
        study: String,
        features: usize,
        labels: usize,
    },

    #[error("study '{study}': row {row} is not a valid one-hot label ({reason})")]
    InvalidOneHot {
        study: String,
        row: usize,
        reason: &'static str,
    },

    #[error("study '{study}': row {row} has class code {code}, valid codes are 0..{n_classes}")]
    InvalidLabelCode {
        study: String,
        row: usize,
        code: i64,
        n_classes: usize,
    },

    #[error("study '{study}' has {n_classes} class(es), at least 2 are required")]
    TooFewClasses { study: String, n_classes: usize },

    #[error("study '{study}' declares {n_classes} classes, at most {limit} fit in memory")]
    TooManyClasses {
        study: String,
        n_classes: usize,
        limit: usize,
    },

    #[error("study '{study}': feature ({row}, {col}) is not finite")]
    NonFiniteFeature {
        study: String,
        row: usize,
        col: usize,
    },

    #[error("study '{study}' has labels over {found} classes, the model has {expected}")]
    ClassCountMismatch {
        study: String,
        expected: usize,
        found: usize,
    },

    #[error("study '{study}' appears more than once")]
    DuplicateStudy { study: String },

    #[error("study '{study}' was not part of the fitted model")]
    UnknownStudy { study: String },

    #[error("got {found} study weights for {expected} studies")]
    WeightLengthMismatch { expected: usize, found: usize },

    #[error("study weight {index} is {value}, weights must be finite and positive")]
    InvalidWeight { index: usize, value: f32 },

    #[error("invalid configuration: {field} = {value} ({reason})")]
    InvalidConfig {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("SVD failed to converge on a {rows}x{cols} matrix")]
    SvdNoConvergence { rows: usize, cols: usize },

    #[error("loss became non-finite ({value}) at iteration {iteration}")]
    NonFiniteLoss { iteration: usize, value: f64 },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl CogspacesError {
    /// Whether the error was raised while checking inputs, before any
    /// optimization work started.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            CogspacesError::SvdNoConvergence { .. } | CogspacesError::NonFiniteLoss { .. }
        )
    }
}
