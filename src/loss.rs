//! Host-side loss evaluation.
//!
//! The layers only produce loss *gradients* on the device. Drivers and tests
//! that want to print or compare the loss value itself pull the prediction
//! and evaluate it here:
//!
//! - [`sum_of_squares`] - the loss whose gradient [`SumOfSquares`](crate::SumOfSquares) emits
//! - [`cross_entropy`] - mean negative log-likelihood of [`Softmax`](crate::Softmax) outputs
//!
//! # Example
//!
//! ```rust
//! use ffnet::loss::sum_of_squares;
//!
//! let pred = vec![1.0, 2.0, 3.0];
//! let target = vec![1.0, 1.0, 1.0];
//! assert_eq!(sum_of_squares(&pred, &target), 5.0);
//! ```

use crate::config::EPSILON;

/// Sum of squared differences `Σ (pred − target)²`.
///
/// Extra elements in the longer slice are ignored.
pub fn sum_of_squares(predictions: &[f32], targets: &[f32]) -> f32 {
    debug_assert_eq!(predictions.len(), targets.len());
    predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t) * (p - t))
        .sum()
}

/// Mean cross-entropy of row-major `probabilities` against one class label
/// per row.
///
/// # Arguments
///
/// * `probabilities` - Softmax output: `[rows * classes]`
/// * `labels` - Class index per row, stored as `f32` and truncated
/// * `classes` - Row width
///
/// Probabilities are clamped at [`EPSILON`] before the logarithm. Labels
/// outside `[0, classes)` contribute zero. Returns `0.0` for an empty batch.
pub fn cross_entropy(probabilities: &[f32], labels: &[f32], classes: usize) -> f32 {
    if classes == 0 || labels.is_empty() {
        return 0.0;
    }
    debug_assert_eq!(probabilities.len(), labels.len() * classes);

    let total: f32 = probabilities
        .chunks_exact(classes)
        .zip(labels)
        .filter_map(|(row, &label)| {
            let class = label as i64;
            if class < 0 || class as usize >= classes {
                return None;
            }
            Some(-row[class as usize].max(EPSILON).ln())
        })
        .sum();
    total / labels.len() as f32
}
