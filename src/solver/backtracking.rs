//! One proximal-gradient step with backtracking on the step size.
use ndarray::Zip;

use crate::error::{CogspacesError, Result};
use crate::math::proximal_operator;
use crate::solver::engine::{loss_and_gradient, quadratic_majorizer, smooth_loss, Problem};
use crate::solver::observer::StallReport;
use crate::solver::workspace::Workspace;

/// Relative slack before an unconditionally accepted step counts as a stall.
const STALL_RTOL: f64 = 1e-5;

/// Step-size state carried from one iteration to the next.
///
/// The step is `1 / lipschitz`. Rejected candidates grow `lipschitz` by
/// `divider` up to `lipschitz_max`; once it saturates, every later step gets a
/// single attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearch {
    pub lipschitz: f32,
    pub lipschitz_max: f32,
    pub max_attempts: usize,
    pub divider: f32,
}

impl LineSearch {
    pub fn new(
        lipschitz_max: f32,
        step_size_multiplier: f32,
        max_attempts: usize,
        divider: f32,
    ) -> Self {
        LineSearch {
            lipschitz: lipschitz_max / step_size_multiplier,
            lipschitz_max,
            max_attempts,
            divider,
        }
    }

    pub fn step_size(&self) -> f64 {
        1.0 / self.lipschitz as f64
    }

    /// Grow the local estimate after a rejection. Returns true when it hit
    /// `lipschitz_max`.
    fn grow(&mut self) -> bool {
        self.lipschitz *= self.divider;
        if self.lipschitz > self.lipschitz_max {
            self.lipschitz = self.lipschitz_max;
            self.max_attempts = 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Smooth loss at the accepted candidate.
    pub loss: f64,
    pub rank: usize,
    pub stall: Option<StallReport>,
}

/// Take one proximal-gradient step from `ws.coef`/`ws.intercept`.
///
/// The accepted candidate is left in `ws.prox_coef`/`ws.prox_intercept`. The
/// intercept is never thresholded.
///
/// # Arguments
///
/// * `problem` - Stacked inputs.
/// * `ws` - Solver buffers, mutated in place.
/// * `search` - Step-size state, possibly tightened on return.
/// * `alpha` - Trace-norm penalty weight.
/// * `iteration` - Index used in error and stall reports.
pub fn prox_grad_step(
    problem: &Problem,
    ws: &mut Workspace,
    search: &mut LineSearch,
    alpha: f32,
    iteration: usize,
) -> Result<StepOutcome> {
    let loss = loss_and_gradient(
        problem,
        ws.coef.view(),
        ws.intercept.view(),
        &mut ws.preds,
        &mut ws.coef_grad,
        &mut ws.intercept_grad,
    );
    if !loss.is_finite() {
        return Err(CogspacesError::NonFiniteLoss {
            iteration,
            value: loss,
        });
    }

    let mut remaining = search.max_attempts;
    loop {
        remaining -= 1;
        let inv_lipschitz = 1.0 / search.lipschitz;
        Zip::from(&mut ws.prox_coef)
            .and(&ws.coef)
            .and(&ws.coef_grad)
            .for_each(|p, &c, &g| *p = c - g * inv_lipschitz);
        Zip::from(&mut ws.prox_intercept)
            .and(&ws.intercept)
            .and(&ws.intercept_grad)
            .for_each(|p, &c, &g| *p = c - g * inv_lipschitz);

        let rank = if alpha > 0.0 {
            let (shrunk, rank) = proximal_operator(ws.prox_coef.view(), alpha * inv_lipschitz)?;
            ws.prox_coef.assign(&shrunk);
            rank
        } else {
            ws.full_rank()
        };

        let new_loss = smooth_loss(
            problem,
            ws.prox_coef.view(),
            ws.prox_intercept.view(),
            &mut ws.preds,
        );
        let majorizer = quadratic_majorizer(
            ws.coef.view(),
            ws.intercept.view(),
            ws.prox_coef.view(),
            ws.prox_intercept.view(),
            ws.coef_grad.view(),
            ws.intercept_grad.view(),
            &mut ws.coef_diff,
            &mut ws.intercept_diff,
            loss,
            search.lipschitz,
        );

        if remaining == 0 {
            let stalled = !(new_loss <= majorizer + STALL_RTOL * majorizer.abs().max(1.0));
            let stall = stalled.then(|| StallReport {
                iteration,
                loss: new_loss,
                majorizer,
                lipschitz: search.lipschitz as f64,
            });
            return Ok(StepOutcome {
                loss: new_loss,
                rank,
                stall,
            });
        }
        if new_loss <= majorizer {
            return Ok(StepOutcome {
                loss: new_loss,
                rank,
                stall: None,
            });
        }

        log::trace!(
            "Backtracking at iteration {}: loss {:.6} above majorizer {:.6} (L = {:.4e})",
            iteration,
            new_loss,
            majorizer,
            search.lipschitz
        );
        if search.grow() {
            remaining = 1;
        }
    }
}
