//! Trace-norm regularized multinomial regression over several studies.
//!
//! `TraceNormEstimator` stacks the studies, bounds the step size and runs the
//! accelerated proximal-gradient solver. The resulting `TraceNormModel` owns
//! one coefficient matrix whose column blocks are the per-study classifiers.
use std::ops::Range;

use ndarray::{s, Array1, Array2, ArrayView2};

use crate::config::TraceNormConfig;
use crate::data_handling::{slices_from_sizes, stack_rows, validate_features, StackedStudies, Study};
use crate::error::{CogspacesError, Result};
use crate::math::{cross_entropy, lipschitz_constant, trace_norm};
use crate::models::classifier_trait::{
    MultiStudyClassifier, MultiStudyEstimator, StudyPrediction, StudyScore,
};
use crate::solver::engine::predict_into;
use crate::solver::{
    ista_loop, FitObserver, LineSearch, LogObserver, LoopSettings, Problem, Workspace,
};
use crate::stats::{accuracy, argmax_rows};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceNormEstimator {
    pub config: TraceNormConfig,
}

impl TraceNormEstimator {
    pub fn new(config: TraceNormConfig) -> Self {
        TraceNormEstimator { config }
    }

    /// Fit and hand progress reports to `observer` instead of the log.
    ///
    /// Configuration and inputs are fully validated before the first
    /// iteration.
    pub fn fit_with_observer(
        &self,
        studies: &[Study],
        weights: Option<&[f32]>,
        observer: &mut dyn FitObserver,
    ) -> Result<TraceNormModel> {
        let config = &self.config;
        config.validate()?;
        let stacked = StackedStudies::from_studies(studies, weights)?;
        let training_slices = stacked.training_class_slices(config.split_loss);

        let lipschitz = lipschitz_constant(
            stacked.x.view(),
            &stacked.sample_slices,
            stacked.weights.view(),
            config.fit_intercept,
            config.split_loss,
        );
        // the L2 term adds beta to the curvature
        let lipschitz_max = (lipschitz + config.beta as f32).max(f32::EPSILON);
        let search = LineSearch::new(
            lipschitz_max,
            config.step_size_multiplier as f32,
            config.max_backtracking_iter,
            config.backtracking_divider as f32,
        );

        log::info!(
            "Fitting trace-norm model on {} studies ({} samples, {} features, {} classes) \
             with alpha = {}, beta = {}",
            stacked.n_studies(),
            stacked.total_samples(),
            stacked.n_features(),
            stacked.total_classes(),
            config.alpha,
            config.beta
        );

        let problem = Problem {
            x: stacked.x.view(),
            targets: &stacked.targets,
            sample_slices: &stacked.sample_slices,
            class_slices: &training_slices,
            weights: stacked.weights.view(),
            beta: config.beta as f32,
            fit_intercept: config.fit_intercept,
        };
        let settings = LoopSettings {
            alpha: config.alpha as f32,
            max_iter: config.max_iter,
            momentum: config.momentum,
            report_every: config.report_every(),
        };
        let mut ws = Workspace::new(
            stacked.n_features(),
            stacked.total_classes(),
            stacked.total_samples(),
        );
        let outcome = ista_loop(&problem, &mut ws, search, &settings, observer)?;

        if outcome.n_stalls > 0 {
            log::warn!(
                "{} of {} steps accepted without satisfying the majorizer",
                outcome.n_stalls,
                config.max_iter
            );
        }
        log::info!(
            "Fit finished: loss {:.6} (initial {:.6}), rank {}",
            outcome.final_loss(),
            outcome.initial_loss,
            outcome.rank
        );

        let Workspace {
            coef, intercept, ..
        } = ws;
        Ok(TraceNormModel {
            coefficients: coef,
            intercepts: intercept,
            class_slices: stacked.class_slices,
            names: stacked.names,
            rank: outcome.rank,
            step_size: outcome.search.step_size(),
            initial_loss: outcome.initial_loss,
            loss_history: outcome.loss_history,
            n_stalls: outcome.n_stalls,
        })
    }
}

impl MultiStudyEstimator for TraceNormEstimator {
    type Model = TraceNormModel;

    fn fit(&self, studies: &[Study], weights: Option<&[f32]>) -> Result<TraceNormModel> {
        self.fit_with_observer(studies, weights, &mut LogObserver)
    }

    fn name(&self) -> &str {
        "trace_norm"
    }
}

/// A fitted trace-norm model.
#[derive(Debug, Clone)]
pub struct TraceNormModel {
    /// (features, total classes); study `d` owns columns `class_slices[d]`.
    pub coefficients: Array2<f32>,
    pub intercepts: Array1<f32>,
    pub class_slices: Vec<Range<usize>>,
    /// Study names in fit order.
    pub names: Vec<String>,
    /// Rank of the last proximal candidate.
    pub rank: usize,
    /// Final step size, `1 / L`.
    pub step_size: f64,
    pub initial_loss: f64,
    pub loss_history: Vec<f64>,
    /// Steps accepted without satisfying the quadratic majorizer.
    pub n_stalls: usize,
}

impl TraceNormModel {
    pub fn n_features(&self) -> usize {
        self.coefficients.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.coefficients.ncols()
    }

    pub fn final_loss(&self) -> f64 {
        self.loss_history.last().copied().unwrap_or(self.initial_loss)
    }

    /// Columns owned by the study called `name`.
    pub fn class_slice(&self, name: &str) -> Result<Range<usize>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.class_slices[i].clone())
            .ok_or_else(|| CogspacesError::UnknownStudy {
                study: name.to_string(),
            })
    }

    /// Coefficient block of one study, (features, its classes).
    pub fn study_coefficients(&self, name: &str) -> Result<ArrayView2<'_, f32>> {
        let cols = self.class_slice(name)?;
        Ok(self.coefficients.slice(s![.., cols]))
    }

    /// Sum of singular values of the full coefficient matrix.
    pub fn trace_norm(&self) -> Result<f32> {
        trace_norm(self.coefficients.view())
    }

    /// Stack `inputs` and run the forward pass.
    ///
    /// Returns per-study log-probabilities along with the row and column
    /// block of every input.
    fn log_probabilities(
        &self,
        inputs: &[(&str, ArrayView2<f32>)],
    ) -> Result<(Array2<f32>, Vec<Range<usize>>, Vec<Range<usize>>)> {
        let mut class_slices = Vec::with_capacity(inputs.len());
        for (name, x) in inputs {
            class_slices.push(self.class_slice(name)?);
            if x.nrows() > 0 {
                validate_features(name, x.view(), Some(self.n_features()))?;
            } else if x.ncols() != self.n_features() {
                return Err(CogspacesError::FeatureMismatch {
                    study: name.to_string(),
                    expected: self.n_features(),
                    found: x.ncols(),
                });
            }
        }
        let sizes: Vec<usize> = inputs.iter().map(|(_, x)| x.nrows()).collect();
        let sample_slices = slices_from_sizes(&sizes);
        let views: Vec<ArrayView2<f32>> = inputs.iter().map(|(_, x)| x.view()).collect();
        let x = stack_rows(&views)?;

        let mut preds = Array2::zeros((x.nrows(), self.n_classes()));
        predict_into(
            x.view(),
            self.coefficients.view(),
            self.intercepts.view(),
            &sample_slices,
            &class_slices,
            &mut preds,
        );
        Ok((preds, sample_slices, class_slices))
    }

    /// Class probabilities of each `(study name, features)` pair.
    ///
    /// Studies may be any subset of the fitted ones, in any order. Each
    /// output has one column per class of its study and rows summing to 1.
    /// A study queried with zero rows gets an empty `(0, classes)` matrix.
    pub fn predict(&self, inputs: &[(&str, ArrayView2<f32>)]) -> Result<Vec<StudyPrediction>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let (preds, sample_slices, class_slices) = self.log_probabilities(inputs)?;
        Ok(inputs
            .iter()
            .zip(sample_slices.into_iter().zip(class_slices))
            .map(|((name, _), (rows, cols))| StudyPrediction {
                name: name.to_string(),
                probabilities: preds.slice(s![rows, cols]).mapv(f32::exp),
            })
            .collect())
    }

    /// Most likely class of every sample, indexed within its study.
    pub fn predict_labels(&self, inputs: &[(&str, ArrayView2<f32>)]) -> Result<Vec<Array1<usize>>> {
        Ok(self
            .predict(inputs)?
            .iter()
            .map(|p| argmax_rows(p.probabilities.view()))
            .collect())
    }

    /// Check a labelled study against the fitted layout and return its
    /// class indices.
    fn study_targets(&self, study: &Study) -> Result<Vec<usize>> {
        let expected = self.class_slice(&study.name)?.len();
        if study.labels.n_classes() != expected {
            return Err(CogspacesError::ClassCountMismatch {
                study: study.name.clone(),
                expected,
                found: study.labels.n_classes(),
            });
        }
        if study.labels.n_rows() != study.n_samples() {
            return Err(CogspacesError::LabelRowMismatch {
                study: study.name.clone(),
                features: study.n_samples(),
                labels: study.labels.n_rows(),
            });
        }
        study.labels.class_indices(&study.name)
    }

    /// Fraction of correctly classified samples in each study.
    pub fn accuracy(&self, studies: &[Study]) -> Result<Vec<StudyScore>> {
        let targets = studies
            .iter()
            .map(|study| self.study_targets(study))
            .collect::<Result<Vec<_>>>()?;
        let inputs: Vec<(&str, ArrayView2<f32>)> =
            studies.iter().map(|s| (s.name.as_str(), s.x.view())).collect();
        let predicted = self.predict_labels(&inputs)?;
        Ok(studies
            .iter()
            .zip(predicted.iter().zip(targets))
            .map(|(study, (predicted, truth))| StudyScore {
                name: study.name.clone(),
                value: accuracy(predicted, &Array1::from_vec(truth)),
            })
            .collect())
    }
}

impl MultiStudyClassifier for TraceNormModel {
    fn predict_proba(&self, inputs: &[(&str, ArrayView2<f32>)]) -> Result<Vec<StudyPrediction>> {
        self.predict(inputs)
    }

    fn score(&self, studies: &[Study]) -> Result<Vec<StudyScore>> {
        if studies.is_empty() {
            return Ok(Vec::new());
        }
        let targets = studies
            .iter()
            .map(|study| self.study_targets(study))
            .collect::<Result<Vec<_>>>()?;
        let inputs: Vec<(&str, ArrayView2<f32>)> =
            studies.iter().map(|s| (s.name.as_str(), s.x.view())).collect();
        let (preds, sample_slices, class_slices) = self.log_probabilities(&inputs)?;

        Ok(studies
            .iter()
            .zip(targets.iter())
            .zip(sample_slices.into_iter().zip(class_slices))
            .map(|((study, targets), (rows, cols))| StudyScore {
                name: study.name.clone(),
                value: cross_entropy(preds.slice(s![rows, cols]), targets),
            })
            .collect())
    }
}
