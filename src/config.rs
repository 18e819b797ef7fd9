use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{CogspacesError, Result};

/// Hyper-parameters of the trace-norm estimator.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TraceNormConfig {
    /// Trace-norm penalty weight.
    pub alpha: f64,
    /// L2 (Frobenius) penalty weight.
    pub beta: f64,
    pub max_iter: usize,
    pub momentum: bool,
    pub fit_intercept: bool,
    /// Number of progress reports over the whole fit, 0 is silent.
    pub verbose: usize,
    pub max_backtracking_iter: usize,
    /// Factor applied to the Lipschitz estimate when a step is rejected.
    pub backtracking_divider: f64,
    /// The first step uses `L = Lmax / step_size_multiplier`.
    pub step_size_multiplier: f64,
    pub split_loss: bool,
}

impl Default for TraceNormConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.0,
            max_iter: 1000,
            momentum: true,
            fit_intercept: true,
            verbose: 0,
            max_backtracking_iter: 5,
            backtracking_divider: 2.0,
            step_size_multiplier: 1.0,
            split_loss: true,
        }
    }
}

impl TraceNormConfig {
    pub fn new(alpha: f64, beta: f64, max_iter: usize) -> Self {
        Self {
            alpha,
            beta,
            max_iter,
            ..Self::default()
        }
    }

    pub fn with_momentum(mut self, momentum: bool) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_split_loss(mut self, split_loss: bool) -> Self {
        self.split_loss = split_loss;
        self
    }

    pub fn with_verbose(mut self, verbose: usize) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_backtracking(mut self, max_backtracking_iter: usize, divider: f64) -> Self {
        self.max_backtracking_iter = max_backtracking_iter;
        self.backtracking_divider = divider;
        self
    }

    pub fn with_step_size_multiplier(mut self, multiplier: f64) -> Self {
        self.step_size_multiplier = multiplier;
        self
    }

    /// Check every field before a fit starts.
    pub fn validate(&self) -> Result<()> {
        non_negative("alpha", self.alpha)?;
        non_negative("beta", self.beta)?;
        if self.max_backtracking_iter == 0 {
            return Err(CogspacesError::InvalidConfig {
                field: "max_backtracking_iter",
                value: 0.0,
                reason: "at least one attempt is required",
            });
        }
        if !self.backtracking_divider.is_finite() || self.backtracking_divider <= 1.0 {
            return Err(CogspacesError::InvalidConfig {
                field: "backtracking_divider",
                value: self.backtracking_divider,
                reason: "must be finite and greater than 1",
            });
        }
        if !self.step_size_multiplier.is_finite() || self.step_size_multiplier <= 0.0 {
            return Err(CogspacesError::InvalidConfig {
                field: "step_size_multiplier",
                value: self.step_size_multiplier,
                reason: "must be finite and positive",
            });
        }
        Ok(())
    }

    /// Iterations between two progress reports, `None` when silent.
    pub fn report_every(&self) -> Option<usize> {
        if self.verbose == 0 {
            None
        } else {
            Some((self.max_iter / self.verbose).max(1))
        }
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CogspacesError::InvalidConfig {
            field,
            value,
            reason: "must be finite and non-negative",
        });
    }
    Ok(())
}

/// Load an estimator configuration from a JSON file.
///
/// Missing fields fall back to their defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<TraceNormConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: TraceNormConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config: {}", path.as_ref().display()))?;
    Ok(config)
}
