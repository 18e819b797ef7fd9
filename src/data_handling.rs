//! Data structures for multi-study inputs.
//!
//! A `Study` holds the samples of one dataset: a feature matrix sharing its
//! column space with every other study, and labels over the study's own
//! classes. `StackedStudies` concatenates a group of studies into a single
//! design matrix, remembering which rows (sample slices) and which class
//! columns (class slices) belong to each study.
use std::collections::HashSet;
use std::ops::Range;

use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};

use crate::error::{CogspacesError, Result};

/// Labels of one study, either integer-coded or one-hot.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    Codes { codes: Array1<i64>, n_classes: usize },
    OneHot(Array2<i64>),
}

impl Labels {
    /// Integer codes with the class count inferred as `max + 1`.
    ///
    /// The count saturates instead of overflowing; oversized counts are
    /// rejected when the studies are stacked.
    pub fn from_codes(codes: Array1<i64>) -> Self {
        let n_classes = codes
            .iter()
            .copied()
            .max()
            .map_or(0, |max| usize::try_from(max).map_or(0, |max| max.saturating_add(1)));
        Labels::Codes { codes, n_classes }
    }

    pub fn with_n_classes(codes: Array1<i64>, n_classes: usize) -> Self {
        Labels::Codes { codes, n_classes }
    }

    pub fn n_rows(&self) -> usize {
        match self {
            Labels::Codes { codes, .. } => codes.len(),
            Labels::OneHot(y) => y.nrows(),
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            Labels::Codes { n_classes, .. } => *n_classes,
            Labels::OneHot(y) => y.ncols(),
        }
    }

    /// Class index of every row, checking that each row names exactly one
    /// valid class.
    pub fn class_indices(&self, study: &str) -> Result<Vec<usize>> {
        match self {
            Labels::Codes { codes, n_classes } => codes
                .iter()
                .enumerate()
                .map(|(row, &code)| {
                    if code < 0 || code as usize >= *n_classes {
                        Err(CogspacesError::InvalidLabelCode {
                            study: study.to_string(),
                            row,
                            code,
                            n_classes: *n_classes,
                        })
                    } else {
                        Ok(code as usize)
                    }
                })
                .collect(),
            Labels::OneHot(y) => y
                .outer_iter()
                .enumerate()
                .map(|(row, values)| {
                    let mut hot = None;
                    for (col, &v) in values.iter().enumerate() {
                        match v {
                            0 => {}
                            1 if hot.is_none() => hot = Some(col),
                            1 => {
                                return Err(CogspacesError::InvalidOneHot {
                                    study: study.to_string(),
                                    row,
                                    reason: "more than one active class",
                                })
                            }
                            _ => {
                                return Err(CogspacesError::InvalidOneHot {
                                    study: study.to_string(),
                                    row,
                                    reason: "entries must be 0 or 1",
                                })
                            }
                        }
                    }
                    hot.ok_or_else(|| CogspacesError::InvalidOneHot {
                        study: study.to_string(),
                        row,
                        reason: "no active class",
                    })
                })
                .collect(),
        }
    }
}

/// One dataset of a multi-study problem.
#[derive(Debug, Clone)]
pub struct Study {
    pub name: String,
    pub x: Array2<f32>,
    pub labels: Labels,
}

impl Study {
    pub fn new(name: impl Into<String>, x: Array2<f32>, labels: Labels) -> Self {
        Study {
            name: name.into(),
            x,
            labels,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    /// Split into the first `n` samples and the rest, e.g. for a held-out
    /// evaluation set. Both halves keep the study's name and class count.
    pub fn split_at(&self, n: usize) -> (Study, Study) {
        let n = n.min(self.n_samples());
        let labels = |range: Range<usize>| match &self.labels {
            Labels::Codes { codes, n_classes } => Labels::Codes {
                codes: codes.slice(s![range]).to_owned(),
                n_classes: *n_classes,
            },
            Labels::OneHot(y) => Labels::OneHot(y.slice(s![range, ..]).to_owned()),
        };
        let head = Study::new(
            self.name.clone(),
            self.x.slice(s![..n, ..]).to_owned(),
            labels(0..n),
        );
        let tail = Study::new(
            self.name.clone(),
            self.x.slice(s![n.., ..]).to_owned(),
            labels(n..self.labels.n_rows()),
        );
        (head, tail)
    }
}

/// Check a feature matrix: non-empty, expected width, finite entries.
pub fn validate_features(study: &str, x: ArrayView2<f32>, n_features: Option<usize>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(CogspacesError::EmptyStudy {
            study: study.to_string(),
        });
    }
    if x.ncols() == 0 {
        return Err(CogspacesError::NoFeatures {
            study: study.to_string(),
        });
    }
    if let Some(expected) = n_features {
        if x.ncols() != expected {
            return Err(CogspacesError::FeatureMismatch {
                study: study.to_string(),
                expected,
                found: x.ncols(),
            });
        }
    }
    if let Some(((row, col), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(CogspacesError::NonFiniteFeature {
            study: study.to_string(),
            row,
            col,
        });
    }
    Ok(())
}

/// Normalize study weights to mean 1. `None` gives unit weights.
pub fn normalize_weights(weights: Option<&[f32]>, n_studies: usize) -> Result<Array1<f32>> {
    let weights = match weights {
        None => return Ok(Array1::ones(n_studies)),
        Some(w) => w,
    };
    if weights.len() != n_studies {
        return Err(CogspacesError::WeightLengthMismatch {
            expected: n_studies,
            found: weights.len(),
        });
    }
    if let Some((index, &value)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w <= 0.0)
    {
        return Err(CogspacesError::InvalidWeight { index, value });
    }
    let weights = Array1::from_vec(weights.to_vec());
    let mean = weights.sum() / n_studies as f32;
    Ok(weights / mean)
}

/// Contiguous ranges of the given sizes, laid end to end from 0.
pub fn slices_from_sizes(sizes: &[usize]) -> Vec<Range<usize>> {
    let mut start = 0;
    sizes
        .iter()
        .map(|&size| {
            let slice = start..start + size;
            start += size;
            slice
        })
        .collect()
}

/// Largest total class count whose solver buffers, (samples, classes) and
/// (features, classes) of `f32`, stay within the allocation limit.
pub fn max_total_classes(n_samples: usize, n_features: usize) -> usize {
    (isize::MAX as usize / std::mem::size_of::<f32>()) / n_samples.max(n_features).max(1)
}

/// Error for a study whose classes do not fit in the remaining budget.
fn class_budget_error(study: &Study, limit: usize) -> CogspacesError {
    if let Labels::Codes { codes, .. } = &study.labels {
        let largest = codes.iter().enumerate().max_by_key(|&(_, code)| *code);
        if let Some((row, &code)) = largest {
            if usize::try_from(code).map_or(false, |code| code >= limit) {
                return CogspacesError::InvalidLabelCode {
                    study: study.name.clone(),
                    row,
                    code,
                    n_classes: limit,
                };
            }
        }
    }
    CogspacesError::TooManyClasses {
        study: study.name.clone(),
        n_classes: study.labels.n_classes(),
        limit,
    }
}

/// Concatenate feature matrices along the sample axis.
pub fn stack_rows(parts: &[ArrayView2<f32>]) -> Result<Array2<f32>> {
    Ok(concatenate(Axis(0), parts)?)
}

/// A group of studies stacked into one design matrix.
#[derive(Debug, Clone)]
pub struct StackedStudies {
    pub names: Vec<String>,
    /// (total samples, features)
    pub x: Array2<f32>,
    /// Global class column of each sample's label.
    pub targets: Vec<usize>,
    pub sample_slices: Vec<Range<usize>>,
    pub class_slices: Vec<Range<usize>>,
    /// Mean-1 study weights.
    pub weights: Array1<f32>,
}

impl StackedStudies {
    /// Validate every study and stack them.
    ///
    /// All checks run here so that malformed inputs never reach the solver.
    pub fn from_studies(studies: &[Study], weights: Option<&[f32]>) -> Result<Self> {
        let first = studies.first().ok_or(CogspacesError::EmptyStudies)?;
        let n_features = first.x.ncols();

        let total_samples: usize = studies.iter().map(Study::n_samples).sum();
        let mut class_budget = max_total_classes(total_samples, n_features);

        let mut seen = HashSet::new();
        let mut local_targets = Vec::with_capacity(studies.len());
        for study in studies {
            if !seen.insert(study.name.as_str()) {
                return Err(CogspacesError::DuplicateStudy {
                    study: study.name.clone(),
                });
            }
            validate_features(&study.name, study.x.view(), Some(n_features))?;
            if study.labels.n_rows() != study.n_samples() {
                return Err(CogspacesError::LabelRowMismatch {
                    study: study.name.clone(),
                    features: study.n_samples(),
                    labels: study.labels.n_rows(),
                });
            }
            let n_classes = study.labels.n_classes();
            if n_classes < 2 {
                return Err(CogspacesError::TooFewClasses {
                    study: study.name.clone(),
                    n_classes,
                });
            }
            if n_classes > class_budget {
                return Err(class_budget_error(study, class_budget));
            }
            class_budget -= n_classes;
            local_targets.push(study.labels.class_indices(&study.name)?);
        }
        let weights = normalize_weights(weights, studies.len())?;

        let sample_sizes: Vec<usize> = studies.iter().map(Study::n_samples).collect();
        let class_sizes: Vec<usize> = studies.iter().map(|s| s.labels.n_classes()).collect();
        let sample_slices = slices_from_sizes(&sample_sizes);
        let class_slices = slices_from_sizes(&class_sizes);

        let views: Vec<ArrayView2<f32>> = studies.iter().map(|s| s.x.view()).collect();
        let x = stack_rows(&views)?;

        let targets = local_targets
            .iter()
            .zip(class_slices.iter())
            .flat_map(|(local, slice)| local.iter().map(move |&c| slice.start + c))
            .collect();

        log::debug!(
            "Stacked {} studies: {} samples, {} features, {} classes",
            studies.len(),
            x.nrows(),
            n_features,
            class_slices.last().map_or(0, |s| s.end)
        );

        Ok(StackedStudies {
            names: studies.iter().map(|s| s.name.clone()).collect(),
            x,
            targets,
            sample_slices,
            class_slices,
            weights,
        })
    }

    pub fn n_studies(&self) -> usize {
        self.names.len()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn total_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn total_classes(&self) -> usize {
        self.class_slices.last().map_or(0, |s| s.end)
    }

    /// Class ranges each study's softmax runs over during training: the full
    /// class range for every study in split-loss mode, the study's own slice
    /// otherwise.
    pub fn training_class_slices(&self, split_loss: bool) -> Vec<Range<usize>> {
        if split_loss {
            vec![0..self.total_classes(); self.n_studies()]
        } else {
            self.class_slices.clone()
        }
    }

    /// Dense one-hot target matrix, (total samples, total classes).
    pub fn target_matrix(&self) -> Array2<i64> {
        let mut y = Array2::zeros((self.total_samples(), self.total_classes()));
        for (row, &col) in self.targets.iter().enumerate() {
            y[[row, col]] = 1;
        }
        y
    }
}
