//! Stacked forward pass, smooth loss and gradients.
//!
//! Every study owns a block of rows (its sample slice) and a block of columns
//! (its training class slice) of the shared prediction buffer. The forward
//! pass only writes inside those blocks, so log-probabilities are normalized
//! per study.
use std::ops::Range;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

use crate::math::{cross_entropy, log_softmax_rows};

/// Immutable inputs of one fit, as seen by the solver.
#[derive(Debug, Clone, Copy)]
pub struct Problem<'a> {
    pub x: ArrayView2<'a, f32>,
    /// Global class column of each sample.
    pub targets: &'a [usize],
    pub sample_slices: &'a [Range<usize>],
    pub class_slices: &'a [Range<usize>],
    pub weights: ArrayView1<'a, f32>,
    pub beta: f32,
    pub fit_intercept: bool,
}

/// Write per-study log-probabilities into `preds`.
pub fn predict_into(
    x: ArrayView2<f32>,
    coef: ArrayView2<f32>,
    intercept: ArrayView1<f32>,
    sample_slices: &[Range<usize>],
    class_slices: &[Range<usize>],
    preds: &mut Array2<f32>,
) {
    for (rows, cols) in sample_slices.iter().zip(class_slices.iter()) {
        let x_block = x.slice(s![rows.clone(), ..]);
        let coef_block = coef.slice(s![.., cols.clone()]);
        let mut block = preds.slice_mut(s![rows.clone(), cols.clone()]);
        block.assign(&x_block.dot(&coef_block));
        block += &intercept.slice(s![cols.clone()]);
        log_softmax_rows(block);
    }
}

fn l2_penalty(coef: ArrayView2<f32>, beta: f32) -> f64 {
    if beta == 0.0 {
        return 0.0;
    }
    let squared: f64 = coef.iter().map(|&v| (v as f64) * (v as f64)).sum();
    0.5 * beta as f64 * squared
}

/// Weighted cross-entropy of the log-probabilities already in `preds`.
fn data_loss(problem: &Problem, preds: &Array2<f32>) -> f64 {
    problem
        .sample_slices
        .iter()
        .zip(problem.weights.iter())
        .map(|(rows, &w)| {
            let log_probs = preds.slice(s![rows.clone(), ..]);
            w as f64 * cross_entropy(log_probs, &problem.targets[rows.clone()])
        })
        .sum()
}

/// Smooth loss (cross-entropy plus L2 term) at `(coef, intercept)`.
///
/// Overwrites `preds`.
pub fn smooth_loss(
    problem: &Problem,
    coef: ArrayView2<f32>,
    intercept: ArrayView1<f32>,
    preds: &mut Array2<f32>,
) -> f64 {
    predict_into(
        problem.x,
        coef,
        intercept,
        problem.sample_slices,
        problem.class_slices,
        preds,
    );
    data_loss(problem, preds) + l2_penalty(coef, problem.beta)
}

/// Smooth loss and its gradient at `(coef, intercept)`.
///
/// The gradient of study `d` over its class columns is
/// `w_d * X_d^T (P_d - Y_d) / n_d`. Blocks of studies sharing columns (split
/// loss) accumulate. `preds` ends up holding the residuals `P - Y`.
pub fn loss_and_gradient(
    problem: &Problem,
    coef: ArrayView2<f32>,
    intercept: ArrayView1<f32>,
    preds: &mut Array2<f32>,
    coef_grad: &mut Array2<f32>,
    intercept_grad: &mut Array1<f32>,
) -> f64 {
    let loss = smooth_loss(problem, coef, intercept, preds);
    if !loss.is_finite() {
        return loss;
    }

    coef_grad.fill(0.0);
    intercept_grad.fill(0.0);
    for ((rows, cols), &w) in problem
        .sample_slices
        .iter()
        .zip(problem.class_slices.iter())
        .zip(problem.weights.iter())
    {
        let n_samples = rows.len() as f32;
        let mut residual = preds.slice_mut(s![rows.clone(), cols.clone()]);
        residual.mapv_inplace(f32::exp);
        for (i, &target) in problem.targets[rows.clone()].iter().enumerate() {
            residual[[i, target - cols.start]] -= 1.0;
        }

        let x_block = problem.x.slice(s![rows.clone(), ..]);
        let scale = w / n_samples;
        let mut grad_block = coef_grad.slice_mut(s![.., cols.clone()]);
        grad_block.scaled_add(scale, &x_block.t().dot(&residual));
        if problem.fit_intercept {
            let mut intercept_block = intercept_grad.slice_mut(s![cols.clone()]);
            intercept_block.scaled_add(scale, &residual.sum_axis(Axis(0)));
        }
    }

    if problem.beta > 0.0 {
        coef_grad.scaled_add(problem.beta, &coef);
    }
    loss
}

/// Quadratic upper model of the loss at a candidate.
///
/// `loss + <g, d> + L/2 ||d||^2` with `d = candidate - current`, over both
/// coefficients and intercepts. Fills `coef_diff` and `intercept_diff`.
#[allow(clippy::too_many_arguments)]
pub fn quadratic_majorizer(
    coef: ArrayView2<f32>,
    intercept: ArrayView1<f32>,
    prox_coef: ArrayView2<f32>,
    prox_intercept: ArrayView1<f32>,
    coef_grad: ArrayView2<f32>,
    intercept_grad: ArrayView1<f32>,
    coef_diff: &mut Array2<f32>,
    intercept_diff: &mut Array1<f32>,
    loss: f64,
    lipschitz: f32,
) -> f64 {
    Zip::from(&mut *coef_diff)
        .and(&prox_coef)
        .and(&coef)
        .for_each(|d, &p, &c| *d = p - c);
    Zip::from(&mut *intercept_diff)
        .and(&prox_intercept)
        .and(&intercept)
        .for_each(|d, &p, &c| *d = p - c);

    let coef_inner = Zip::from(&*coef_diff)
        .and(&coef_grad)
        .fold(0.0f64, |acc, &a, &b| acc + a as f64 * b as f64);
    let intercept_inner = Zip::from(&*intercept_diff)
        .and(&intercept_grad)
        .fold(0.0f64, |acc, &a, &b| acc + a as f64 * b as f64);
    let squared = coef_diff.iter().map(|&a| a as f64 * a as f64).sum::<f64>()
        + intercept_diff.iter().map(|&a| a as f64 * a as f64).sum::<f64>();

    loss + coef_inner + intercept_inner + 0.5 * lipschitz as f64 * squared
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    struct Fixture {
        x: Array2<f32>,
        targets: Vec<usize>,
        sample_slices: Vec<Range<usize>>,
        class_slices: Vec<Range<usize>>,
        weights: Array1<f32>,
    }

    impl Fixture {
        fn new(split_loss: bool) -> Self {
            let class_slices = if split_loss {
                vec![0..5, 0..5]
            } else {
                vec![0..3, 3..5]
            };
            Fixture {
                x: array![
                    [0.5, -1.0, 0.2],
                    [1.0, 0.3, -0.4],
                    [-0.7, 0.8, 0.1],
                    [0.2, 0.2, 0.9],
                    [-1.2, 0.4, 0.3]
                ],
                targets: vec![0, 2, 1, 3, 4],
                sample_slices: vec![0..3, 3..5],
                class_slices,
                weights: array![0.8, 1.2],
            }
        }

        fn problem(&self, beta: f32) -> Problem<'_> {
            Problem {
                x: self.x.view(),
                targets: &self.targets,
                sample_slices: &self.sample_slices,
                class_slices: &self.class_slices,
                weights: self.weights.view(),
                beta,
                fit_intercept: true,
            }
        }
    }

    fn coef() -> Array2<f32> {
        Array2::from_shape_fn((3, 5), |(i, j)| 0.1 * (i as f32 + 1.0) - 0.05 * j as f32)
    }

    #[test]
    fn blocks_are_normalized_per_study() {
        let fixture = Fixture::new(false);
        let mut preds = Array2::from_elem((5, 5), 7.0f32);
        let intercept = array![0.1f32, -0.1, 0.0, 0.3, 0.2];
        predict_into(
            fixture.x.view(),
            coef().view(),
            intercept.view(),
            &fixture.sample_slices,
            &fixture.class_slices,
            &mut preds,
        );
        for (rows, cols) in fixture.sample_slices.iter().zip(fixture.class_slices.iter()) {
            for i in rows.clone() {
                let total: f32 = cols.clone().map(|j| preds[[i, j]].exp()).sum();
                assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
            }
        }
        // cells outside a study's block are left alone
        assert_eq!(preds[[0, 4]], 7.0);
        assert_eq!(preds[[4, 0]], 7.0);
    }

    fn check_gradient(split_loss: bool, beta: f32) {
        let fixture = Fixture::new(split_loss);
        let problem = fixture.problem(beta);
        let coef = coef();
        let intercept = array![0.1f32, -0.1, 0.0, 0.3, 0.2];
        let mut preds = Array2::zeros((5, 5));
        let mut coef_grad = Array2::zeros((3, 5));
        let mut intercept_grad = Array1::zeros(5);
        loss_and_gradient(
            &problem,
            coef.view(),
            intercept.view(),
            &mut preds,
            &mut coef_grad,
            &mut intercept_grad,
        );

        let eps = 1e-2f32;
        for i in 0..3 {
            for j in 0..5 {
                let mut plus = coef.clone();
                plus[[i, j]] += eps;
                let mut minus = coef.clone();
                minus[[i, j]] -= eps;
                let numeric = (smooth_loss(&problem, plus.view(), intercept.view(), &mut preds)
                    - smooth_loss(&problem, minus.view(), intercept.view(), &mut preds))
                    / (2.0 * eps as f64);
                assert_abs_diff_eq!(coef_grad[[i, j]] as f64, numeric, epsilon = 1e-3);
            }
        }
        for j in 0..5 {
            let mut plus = intercept.clone();
            plus[j] += eps;
            let mut minus = intercept.clone();
            minus[j] -= eps;
            let numeric = (smooth_loss(&problem, coef.view(), plus.view(), &mut preds)
                - smooth_loss(&problem, coef.view(), minus.view(), &mut preds))
                / (2.0 * eps as f64);
            assert_abs_diff_eq!(intercept_grad[j] as f64, numeric, epsilon = 1e-3);
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        check_gradient(false, 0.0);
        check_gradient(true, 0.0);
        check_gradient(true, 0.5);
    }

    #[test]
    fn loss_at_zero_is_log_class_count() {
        let fixture = Fixture::new(false);
        let problem = fixture.problem(0.0);
        let mut preds = Array2::zeros((5, 5));
        let loss = smooth_loss(
            &problem,
            Array2::<f32>::zeros((3, 5)).view(),
            Array1::<f32>::zeros(5).view(),
            &mut preds,
        );
        let expected = 0.8 * (3.0f64).ln() + 1.2 * (2.0f64).ln();
        assert_abs_diff_eq!(loss, expected, epsilon = 1e-5);
    }

    #[test]
    fn majorizer_at_zero_step_is_loss() {
        let coef = coef();
        let intercept = Array1::<f32>::zeros(5);
        let grad = Array2::<f32>::ones((3, 5));
        let mut coef_diff = Array2::zeros((3, 5));
        let mut intercept_diff = Array1::zeros(5);
        let value = quadratic_majorizer(
            coef.view(),
            intercept.view(),
            coef.view(),
            intercept.view(),
            grad.view(),
            intercept.view(),
            &mut coef_diff,
            &mut intercept_diff,
            1.25,
            10.0,
        );
        assert_abs_diff_eq!(value, 1.25, epsilon = 1e-12);

        let mut moved = coef.clone();
        moved[[0, 0]] -= 0.1;
        let value = quadratic_majorizer(
            coef.view(),
            intercept.view(),
            moved.view(),
            intercept.view(),
            grad.view(),
            intercept.view(),
            &mut coef_diff,
            &mut intercept_diff,
            1.25,
            10.0,
        );
        assert_abs_diff_eq!(value, 1.25 - 0.1 + 0.5 * 10.0 * 0.01, epsilon = 1e-6);
    }
}
