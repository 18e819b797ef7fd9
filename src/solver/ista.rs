//! Accelerated proximal-gradient loop.
//!
//! Runs a fixed number of backtracking steps. With momentum enabled the next
//! step starts from an over-relaxed point (FISTA); the intercept always
//! restarts from its plain candidate.
use ndarray::Zip;

use crate::error::{CogspacesError, Result};
use crate::math::{matrix_rank, trace_norm};
use crate::solver::backtracking::{prox_grad_step, LineSearch};
use crate::solver::engine::{smooth_loss, Problem};
use crate::solver::observer::{FitObserver, IterationReport};
use crate::solver::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    pub alpha: f32,
    pub max_iter: usize,
    pub momentum: bool,
    /// Report every that many iterations, `None` for silence.
    pub report_every: Option<usize>,
}

/// Summary of a finished optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    /// Smooth loss at the initial point.
    pub initial_loss: f64,
    /// Smooth loss of every accepted candidate, one entry per iteration.
    pub loss_history: Vec<f64>,
    pub rank: usize,
    pub search: LineSearch,
    pub n_stalls: usize,
}

impl SolverOutcome {
    pub fn final_loss(&self) -> f64 {
        self.loss_history.last().copied().unwrap_or(self.initial_loss)
    }
}

/// Next momentum scalar, `t' = (1 + sqrt(1 + 4 t^2)) / 2`.
pub fn next_momentum(t: f64) -> f64 {
    0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt())
}

/// Optimize `ws.coef`/`ws.intercept` in place.
///
/// After at least one iteration the workspace holds the last accepted
/// candidate in both `coef`/`intercept` and `prox_coef`/`prox_intercept`.
pub fn ista_loop(
    problem: &Problem,
    ws: &mut Workspace,
    mut search: LineSearch,
    settings: &LoopSettings,
    observer: &mut dyn FitObserver,
) -> Result<SolverOutcome> {
    ws.old_prox_coef.fill(0.0);
    let mut t = 1.0f64;
    let initial_loss = smooth_loss(problem, ws.coef.view(), ws.intercept.view(), &mut ws.preds);
    if !initial_loss.is_finite() {
        return Err(CogspacesError::NonFiniteLoss {
            iteration: 0,
            value: initial_loss,
        });
    }
    let mut loss = initial_loss;
    let mut rank = matrix_rank(ws.coef.view())?;
    let mut loss_history = Vec::with_capacity(settings.max_iter);
    let mut n_stalls = 0;

    log::debug!(
        "Starting {} iterations, Lmax = {:.4e}, initial loss {:.6}",
        settings.max_iter,
        search.lipschitz_max,
        initial_loss
    );

    for iteration in 0..settings.max_iter {
        if settings
            .report_every
            .map_or(false, |every| iteration % every == 0)
        {
            let objective = if settings.alpha > 0.0 {
                // the loss and rank describe the last accepted candidate
                let candidate = if iteration == 0 { &ws.coef } else { &ws.prox_coef };
                loss + settings.alpha as f64 * trace_norm(candidate.view())? as f64
            } else {
                loss
            };
            observer.on_iteration(&IterationReport {
                iteration,
                rank,
                loss,
                objective,
                step_size: search.step_size(),
            });
        }

        let step = prox_grad_step(problem, ws, &mut search, settings.alpha, iteration)?;
        if !step.loss.is_finite() {
            return Err(CogspacesError::NonFiniteLoss {
                iteration,
                value: step.loss,
            });
        }
        if let Some(stall) = step.stall.as_ref() {
            log::warn!(
                "Backtracking stalled at iteration {}: loss {:.6} above majorizer {:.6} \
                 with L = Lmax = {:.4e}, accepting last candidate",
                stall.iteration,
                stall.loss,
                stall.majorizer,
                stall.lipschitz
            );
            observer.on_stall(stall);
            n_stalls += 1;
        }
        loss = step.loss;
        rank = step.rank;
        loss_history.push(loss);

        if settings.momentum {
            let old_t = t;
            t = next_momentum(old_t);
            let relax = ((old_t - 1.0) / t) as f32;
            Zip::from(&mut ws.coef)
                .and(&ws.prox_coef)
                .and(&ws.old_prox_coef)
                .for_each(|c, &p, &o| *c = p + relax * (p - o));
            ws.old_prox_coef.assign(&ws.prox_coef);
        } else {
            ws.coef.assign(&ws.prox_coef);
        }
        ws.intercept.assign(&ws.prox_intercept);
    }

    if settings.max_iter > 0 {
        ws.coef.assign(&ws.prox_coef);
    }

    log::debug!(
        "Finished: loss {:.6}, rank {}, step size {:.4e}, {} stalled step(s)",
        loss,
        rank,
        search.step_size(),
        n_stalls
    );

    Ok(SolverOutcome {
        initial_loss,
        loss_history,
        rank,
        search,
        n_stalls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::observer::RecordingObserver;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1, Array2};
    use std::ops::Range;

    #[test]
    fn momentum_sequence() {
        assert_relative_eq!(next_momentum(1.0), 0.5 * (1.0 + 5.0f64.sqrt()));
        let mut t = 1.0;
        for _ in 0..50 {
            let next = next_momentum(t);
            assert!(next > t);
            t = next;
        }
    }

    struct Fixture {
        x: Array2<f32>,
        targets: Vec<usize>,
        sample_slices: Vec<Range<usize>>,
        class_slices: Vec<Range<usize>>,
        weights: Array1<f32>,
    }

    fn fixture() -> Fixture {
        Fixture {
            x: array![
                [1.0, 0.0, 0.5],
                [0.0, 1.0, -0.5],
                [1.0, 1.0, 0.0],
                [0.9, -0.2, 0.4],
                [-1.0, 0.5, 1.0],
                [0.5, -1.0, 0.0],
                [0.0, 0.0, 1.0]
            ],
            targets: vec![0, 1, 2, 0, 3, 4, 3],
            sample_slices: vec![0..4, 4..7],
            class_slices: vec![0..3, 3..5],
            weights: array![1.0, 1.0],
        }
    }

    const LIPSCHITZ_MAX: f32 = 0.5 * 3.25 + 0.01;

    fn run_with(
        lipschitz_max: f32,
        alpha: f32,
        momentum: bool,
        max_iter: usize,
        verbose_every: Option<usize>,
    ) -> (SolverOutcome, RecordingObserver, Workspace) {
        let f = fixture();
        let problem = Problem {
            x: f.x.view(),
            targets: &f.targets,
            sample_slices: &f.sample_slices,
            class_slices: &f.class_slices,
            weights: f.weights.view(),
            beta: 0.01,
            fit_intercept: true,
        };
        let mut ws = Workspace::new(3, 5, 7);
        let search = LineSearch::new(lipschitz_max, 1.0, 5, 2.0);
        let settings = LoopSettings {
            alpha,
            max_iter,
            momentum,
            report_every: verbose_every,
        };
        let mut observer = RecordingObserver::default();
        let outcome = ista_loop(&problem, &mut ws, search, &settings, &mut observer).unwrap();
        if max_iter > 0 {
            assert_eq!(ws.coef, ws.prox_coef);
        }
        (outcome, observer, ws)
    }

    fn run(
        momentum: bool,
        max_iter: usize,
        verbose_every: Option<usize>,
    ) -> (SolverOutcome, RecordingObserver) {
        let (outcome, observer, _) =
            run_with(LIPSCHITZ_MAX, 0.0, momentum, max_iter, verbose_every);
        (outcome, observer)
    }

    #[test]
    fn loss_is_monotone_without_momentum() {
        let (outcome, _) = run(false, 40, None);
        assert_eq!(outcome.loss_history.len(), 40);
        let mut previous = outcome.initial_loss;
        for &loss in outcome.loss_history.iter() {
            assert!(loss <= previous + 1e-6, "{} > {}", loss, previous);
            previous = loss;
        }
        assert_eq!(outcome.n_stalls, 0);
    }

    #[test]
    fn momentum_reaches_lower_loss() {
        let (outcome, _) = run(true, 40, None);
        assert!(outcome.final_loss() < outcome.initial_loss);
        assert_eq!(outcome.rank, 3);
    }

    #[test]
    fn reports_follow_cadence() {
        let (_, observer) = run(true, 20, Some(5));
        let iterations: Vec<usize> = observer.iterations.iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![0, 5, 10, 15]);
        // the all-ones start has rank 1
        assert_eq!(observer.iterations[0].rank, 1);
        assert!(observer.stalls.is_empty());
    }

    #[test]
    fn zero_iterations_keep_initial_point() {
        let (outcome, observer) = run(true, 0, Some(1));
        assert!(outcome.loss_history.is_empty());
        assert_eq!(outcome.final_loss(), outcome.initial_loss);
        assert!(observer.iterations.is_empty());
    }

    #[test]
    fn objective_uses_accepted_candidate() {
        let alpha = 0.05;
        let (before, _, ws) = run_with(LIPSCHITZ_MAX, alpha, true, 6, None);
        let (_, observer, _) = run_with(LIPSCHITZ_MAX, alpha, true, 7, Some(1));
        let report = &observer.iterations[6];
        assert_eq!(report.iteration, 6);
        assert_eq!(report.rank, before.rank);
        let penalty = alpha as f64 * trace_norm(ws.coef.view()).unwrap() as f64;
        let expected = before.final_loss() + penalty;
        assert_relative_eq!(report.objective, expected, max_relative = 1e-6);
    }

    #[test]
    fn underestimated_bound_stalls_are_reported() {
        let (outcome, observer, _) = run_with(1.0e-3, 0.0, false, 3, None);
        assert_eq!(outcome.n_stalls, 3);
        assert_eq!(observer.stalls.len(), 3);
        assert_eq!(outcome.search.max_attempts, 1);
        assert_eq!(outcome.search.lipschitz, 1.0e-3);
        for (i, stall) in observer.stalls.iter().enumerate() {
            assert_eq!(stall.iteration, i);
            assert!(stall.loss > stall.majorizer);
        }
        assert_eq!(outcome.loss_history.len(), 3);
    }
}
