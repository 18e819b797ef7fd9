use ndarray::{Array1, ArrayView2, Axis};

/// Index of the largest entry of each row.
///
/// Ties resolve to the first column. NaN entries never win unless the whole
/// row is NaN, in which case column 0 is returned.
///
/// # Arguments
///
/// * `scores` - A 2D array of per-class scores or probabilities, (samples, classes).
///
/// # Returns
///
/// A 1D array with the predicted class index of every row.
pub fn argmax_rows(scores: ArrayView2<f32>) -> Array1<usize> {
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |(best, best_value), (col, &v)| {
                    if v > best_value {
                        (col, v)
                    } else {
                        (best, best_value)
                    }
                })
                .0
        })
        .collect()
}

/// Fraction of entries where `predicted` matches `truth`.
///
/// Returns 0 for empty inputs.
pub fn accuracy(predicted: &Array1<usize>, truth: &Array1<usize>) -> f64 {
    debug_assert_eq!(predicted.len(), truth.len());
    if truth.is_empty() {
        return 0.0;
    }
    let hits = predicted
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p == t)
        .count();
    hits as f64 / truth.len() as f64
}
