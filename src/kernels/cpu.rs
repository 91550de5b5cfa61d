//! Host reference kernels.
//!
//! Each function computes one output element per parallel work item, using
//! the same `(row, col)` decomposition as the WGSL kernels: the flat output
//! index `i` maps to `row = i / cols`, `col = i % cols`. The two softmax
//! passes and the bias reduction are parallel over rows or columns instead,
//! as on the GPU.
//!
//! All matrices are row-major with the column index fastest. Inputs may be
//! longer than the logical extent; outputs must be exactly the extent.

use rayon::prelude::*;

use super::{Extent, MatmulShape, COLUMN_BLOCK, SOFTMAX_ROWS_PER_BLOCK};
use crate::config::SOFTMAX_EPSILON;
use crate::optimizer::AdamStep;

/// Minimum elements per rayon task for element-wise kernels.
const MIN_ELEMENTS_PER_TASK: usize = 256;

/// `y[r, c] = Σᵢ x[r, i] · w[i, c] + b[c]`.
///
/// `w` is stored `[in_dim, out_dim]`; `y` must hold `rows × out_dim` elements.
pub fn affine(shape: MatmulShape, x: &[f32], w: &[f32], b: &[f32], y: &mut [f32]) {
    let MatmulShape { in_dim, out_dim, .. } = shape;
    y.par_iter_mut()
        .with_min_len(MIN_ELEMENTS_PER_TASK)
        .enumerate()
        .for_each(|(idx, out)| {
            let (row, col) = (idx / out_dim, idx % out_dim);
            let x_row = &x[row * in_dim..(row + 1) * in_dim];
            let mut sum = 0.0f32;
            for (i, &xv) in x_row.iter().enumerate() {
                sum += xv * w[i * out_dim + col];
            }
            *out = sum + b[col];
        });
}

/// `wG[r, c] = Σₙ x[n, r] · yG[n, c]`, contracted over the batch.
///
/// `wg` must hold `in_dim × out_dim` elements.
pub fn weight_grad(shape: MatmulShape, x: &[f32], yg: &[f32], wg: &mut [f32]) {
    let MatmulShape {
        rows,
        in_dim,
        out_dim,
    } = shape;
    wg.par_iter_mut()
        .with_min_len(MIN_ELEMENTS_PER_TASK)
        .enumerate()
        .for_each(|(idx, out)| {
            let (row, col) = (idx / out_dim, idx % out_dim);
            let mut sum = 0.0f32;
            for n in 0..rows {
                sum += x[n * in_dim + row] * yg[n * out_dim + col];
            }
            *out = sum;
        });
}

/// `xG[r, c] = Σᵢ yG[r, i] · w[c, i]`.
///
/// `xg` must hold `rows × in_dim` elements.
pub fn input_grad(shape: MatmulShape, yg: &[f32], w: &[f32], xg: &mut [f32]) {
    let MatmulShape { in_dim, out_dim, .. } = shape;
    xg.par_iter_mut()
        .with_min_len(MIN_ELEMENTS_PER_TASK)
        .enumerate()
        .for_each(|(idx, out)| {
            let (row, col) = (idx / in_dim, idx % in_dim);
            let yg_row = &yg[row * out_dim..(row + 1) * out_dim];
            let w_row = &w[col * out_dim..(col + 1) * out_dim];
            *out = yg_row.iter().zip(w_row).map(|(g, w)| g * w).sum();
        });
}

/// `bG[c] = Σᵣ yG[r, c]`, one work item per column.
pub fn bias_grad(extent: Extent, yg: &[f32], bg: &mut [f32]) {
    let Extent { rows, cols } = extent;
    bg.par_iter_mut()
        .with_min_len(COLUMN_BLOCK)
        .enumerate()
        .for_each(|(col, out)| {
            let mut sum = 0.0f32;
            for r in 0..rows {
                sum += yg[r * cols + col];
            }
            *out = sum;
        });
}

/// `y = max(x, 0)`.
pub fn relu(x: &[f32], y: &mut [f32]) {
    y.par_iter_mut()
        .with_min_len(MIN_ELEMENTS_PER_TASK)
        .zip(x.par_iter())
        .for_each(|(out, &v)| *out = v.max(0.0));
}

/// `g = x > 0 ? g : 0`, in place on `g`.
pub fn relu_grad(x: &[f32], g: &mut [f32]) {
    g.par_iter_mut()
        .with_min_len(MIN_ELEMENTS_PER_TASK)
        .zip(x.par_iter())
        .for_each(|(out, &v)| {
            if v <= 0.0 || v.is_nan() {
                *out = 0.0;
            }
        });
}

/// Softmax pass 1: `stats[2r] = max(x[r, ..])`, `stats[2r + 1] = ε + Σ exp(x[r, c] - max)`.
pub fn softmax_row_stats(extent: Extent, x: &[f32], stats: &mut [f32]) {
    let cols = extent.cols;
    if cols == 0 {
        return;
    }
    stats
        .par_chunks_mut(2)
        .with_min_len(SOFTMAX_ROWS_PER_BLOCK)
        .enumerate()
        .for_each(|(row, out)| {
            let x_row = &x[row * cols..(row + 1) * cols];
            let mut max_val = x_row[0];
            for &v in &x_row[1..] {
                max_val = max_val.max(v);
            }
            let mut sum = SOFTMAX_EPSILON;
            for &v in x_row {
                sum += (v - max_val).exp();
            }
            out[0] = max_val;
            out[1] = sum;
        });
}

/// Softmax pass 2: `y[r, c] = exp(x[r, c] - max[r]) / sum[r]`.
pub fn softmax_normalize(extent: Extent, x: &[f32], stats: &[f32], y: &mut [f32]) {
    let cols = extent.cols;
    if cols == 0 {
        return;
    }
    y.par_chunks_mut(cols)
        .with_min_len(SOFTMAX_ROWS_PER_BLOCK)
        .enumerate()
        .for_each(|(row, y_row)| {
            let x_row = &x[row * cols..(row + 1) * cols];
            let max_val = stats[2 * row];
            let inv_sum = 1.0 / stats[2 * row + 1];
            for (out, &v) in y_row.iter_mut().zip(x_row) {
                *out = (v - max_val).exp() * inv_sum;
            }
        });
}

/// `g[r, c] = p[r, c] - (c == label[r])`.
///
/// Labels are class indices stored as `f32` and truncated toward zero, as
/// WGSL's `i32()` conversion does.
pub fn softmax_cross_entropy_grad(extent: Extent, p: &[f32], labels: &[f32], g: &mut [f32]) {
    let cols = extent.cols;
    g.par_iter_mut()
        .with_min_len(MIN_ELEMENTS_PER_TASK)
        .enumerate()
        .for_each(|(idx, out)| {
            let (row, col) = (idx / cols, idx % cols);
            let one_hot = if labels[row] as i64 == col as i64 { 1.0 } else { 0.0 };
            *out = p[idx] - one_hot;
        });
}

/// `g = 2 · (y - t)`.
pub fn sum_of_squares_grad(y: &[f32], t: &[f32], g: &mut [f32]) {
    g.par_iter_mut()
        .with_min_len(MIN_ELEMENTS_PER_TASK)
        .zip(y.par_iter().zip(t.par_iter()))
        .for_each(|(out, (&yv, &tv))| *out = 2.0 * (yv - tv));
}

/// Applies one Adam step element-wise.
///
/// All four slices must have the same length.
pub fn adam_update(step: &AdamStep, param: &mut [f32], grad: &[f32], m: &mut [f32], v: &mut [f32]) {
    param
        .par_iter_mut()
        .with_min_len(MIN_ELEMENTS_PER_TASK)
        .zip(m.par_iter_mut())
        .zip(v.par_iter_mut())
        .zip(grad.par_iter())
        .for_each(|(((p, m), v), &g)| adam_element(step, p, m, v, g));
}

/// One Adam update of a single parameter.
#[inline]
pub fn adam_element(step: &AdamStep, param: &mut f32, m: &mut f32, v: &mut f32, g: f32) {
    *m = step.beta1 * *m + (1.0 - step.beta1) * g;
    *v = step.beta2 * *v + (1.0 - step.beta2) * g * g;
    let m_hat = *m / (1.0 - step.beta1_t);
    let v_hat = *v / (1.0 - step.beta2_t);
    *param -= step.learning_rate * m_hat / (v_hat.sqrt() + step.epsilon);
}
