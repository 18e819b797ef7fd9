use std::ops::Range;

use ndarray::{s, ArrayView1, ArrayView2};

/// Upper bound on the Lipschitz constant of the multinomial loss gradient.
///
/// For each study, the largest squared row norm of its feature block (plus one
/// for the bias column when an intercept is fit) is scaled by the study weight.
/// Per-study terms are summed in split-loss mode, where every study
/// contributes to every coefficient column, and maxed otherwise, where the
/// per-study blocks are independent.
///
/// # Arguments
///
/// * `x` - Stacked design matrix, (total samples, features).
/// * `sample_slices` - Rows of `x` owned by each study.
/// * `weights` - Mean-1 study weights, one per slice.
/// * `fit_intercept` - Whether a bias column is fit.
/// * `split_loss` - Sum (true) or max (false) combination.
///
/// # Returns
///
/// `0.5 * combined`, a non-negative scalar.
pub fn lipschitz_constant(
    x: ArrayView2<f32>,
    sample_slices: &[Range<usize>],
    weights: ArrayView1<f32>,
    fit_intercept: bool,
    split_loss: bool,
) -> f32 {
    let per_study = sample_slices.iter().zip(weights.iter()).map(|(slice, &w)| {
        let block = x.slice(s![slice.clone(), ..]);
        let max_squared_sum = block
            .rows()
            .into_iter()
            .map(|row| row.dot(&row))
            .fold(0.0f32, f32::max);
        let bias = if fit_intercept { 1.0 } else { 0.0 };
        (max_squared_sum + bias) * w
    });
    let combined = if split_loss {
        per_study.sum::<f32>()
    } else {
        per_study.fold(0.0f32, f32::max)
    };
    0.5 * combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn sum_and_max_combinations() {
        let x = array![[1.0f32, 1.0], [2.0, 0.0], [0.0, 3.0]];
        let slices = vec![0..2, 2..3];
        let w = array![1.0f32, 1.0];
        // max squared norms: 4 and 9
        let l = lipschitz_constant(x.view(), &slices, w.view(), false, true);
        assert_relative_eq!(l, 0.5 * 13.0);
        let l = lipschitz_constant(x.view(), &slices, w.view(), false, false);
        assert_relative_eq!(l, 0.5 * 9.0);
        let l = lipschitz_constant(x.view(), &slices, w.view(), true, false);
        assert_relative_eq!(l, 0.5 * 10.0);
    }

    #[test]
    fn weights_scale_each_study() {
        let x = array![[2.0f32, 0.0], [0.0, 1.0]];
        let slices = vec![0..1, 1..2];
        let w = array![1.5f32, 0.5];
        let l = lipschitz_constant(x.view(), &slices, w.view(), true, true);
        assert_relative_eq!(l, 0.5 * (5.0 * 1.5 + 2.0 * 0.5));
    }

    #[test]
    fn single_sample_slice() {
        let x = array![[3.0f32, 4.0]];
        let l = lipschitz_constant(x.view(), &[0..1], array![1.0f32].view(), false, true);
        assert_relative_eq!(l, 12.5);
    }
}
