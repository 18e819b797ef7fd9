use ndarray::{ArrayView2, ArrayViewMut2, Axis};
use rayon::prelude::*;

/// Replace each row of raw scores with its log-softmax, in place.
///
/// The row maximum is subtracted before exponentiating so large scores do not
/// overflow. Rows are independent and processed in parallel.
pub fn log_softmax_rows(mut scores: ArrayViewMut2<f32>) {
    scores
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            row.mapv_inplace(|v| v - max);
            let log_sum_exp = row.iter().map(|v| v.exp()).sum::<f32>().ln();
            row.mapv_inplace(|v| v - log_sum_exp);
        });
}

/// Mean negative log-probability of the true class.
///
/// `targets[i]` is the column of row `i` holding the true class. Only those
/// entries contribute, everything else counts as a zero label.
pub fn cross_entropy(log_probs: ArrayView2<f32>, targets: &[usize]) -> f64 {
    debug_assert_eq!(log_probs.nrows(), targets.len());
    let n_samples = targets.len();
    if n_samples == 0 {
        return 0.0;
    }
    let total: f64 = targets
        .iter()
        .enumerate()
        .map(|(i, &t)| -(log_probs[[i, t]] as f64))
        .sum();
    total / n_samples as f64
}
