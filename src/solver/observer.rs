//! Progress reporting for the iteration loop.
//!
//! The solver never prints. It hands structured reports to a `FitObserver`
//! at the cadence set by `TraceNormConfig::verbose`; stalled backtracking
//! steps are always forwarded.

/// State of the solver at the start of an iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    /// Rank of the last proximal candidate.
    pub rank: usize,
    /// Smooth loss: cross-entropy plus L2 term.
    pub loss: f64,
    /// Smooth loss plus `alpha * trace_norm(coef)`.
    pub objective: f64,
    pub step_size: f64,
}

/// A backtracking step that ran out of attempts without satisfying the
/// quadratic majorizer. The last candidate was accepted anyway.
#[derive(Debug, Clone, PartialEq)]
pub struct StallReport {
    pub iteration: usize,
    pub loss: f64,
    pub majorizer: f64,
    pub lipschitz: f64,
}

pub trait FitObserver {
    fn on_iteration(&mut self, report: &IterationReport);

    fn on_stall(&mut self, _stall: &StallReport) {}
}

/// Forwards reports to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl FitObserver for LogObserver {
    fn on_iteration(&mut self, report: &IterationReport) {
        log::info!(
            "Iteration {} rank {} loss {:.6} objective {:.6} step size {:.4e}",
            report.iteration,
            report.rank,
            report.loss,
            report.objective,
            report.step_size
        );
    }
}

/// Keeps every report, mostly useful in tests and notebooks.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub iterations: Vec<IterationReport>,
    pub stalls: Vec<StallReport>,
}

impl FitObserver for RecordingObserver {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.iterations.push(report.clone());
    }

    fn on_stall(&mut self, stall: &StallReport) {
        self.stalls.push(stall.clone());
    }
}
