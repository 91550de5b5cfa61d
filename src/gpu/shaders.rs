//! WGSL shader source code for the compute kernels.
//!
//! One shader module per kernel. Every module binds its uniforms at
//! `@binding(0)` and its storage buffers at `@binding(1..)` in the order
//! listed by [`Kernel::storage_access`](super::Kernel::storage_access).
//!
//! # Work Partitioning
//!
//! - Matrix and element-wise kernels: `@workgroup_size(16, 16)`, one
//!   invocation per output element with `global_id.x` as the column and
//!   `global_id.y` as the row.
//! - Bias gradient: `@workgroup_size(64)`, one invocation per column.
//! - Softmax passes: `@workgroup_size(64)`, one invocation per row.
//!
//! Storage buffers may be larger than the logical extent (capacity never
//! shrinks), so every kernel bounds-checks against the uniforms rather than
//! `arrayLength`.

/// Affine transform: `y[r, c] = Σᵢ x[r, i] · w[i, c] + b[c]`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows = batch, cols = out_dim, inner = in_dim
/// - 1: x (storage, read) - [batch, in_dim]
/// - 2: w (storage, read) - [in_dim, out_dim]
/// - 3: b (storage, read) - [out_dim]
/// - 4: y (storage, read_write) - [batch, out_dim]
pub const AFFINE_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> x: array<f32>;
@group(0) @binding(2) var<storage, read> w: array<f32>;
@group(0) @binding(3) var<storage, read> b: array<f32>;
@group(0) @binding(4) var<storage, read_write> y: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn affine_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    let row = global_id.y;
    if (row >= config.rows || col >= config.cols) {
        return;
    }

    var sum = 0.0;
    for (var i = 0u; i < config.inner; i++) {
        sum += x[row * config.inner + i] * w[i * config.cols + col];
    }
    y[row * config.cols + col] = sum + b[col];
}
"#;

/// Weight gradient: `wG[r, c] = Σₙ x[n, r] · yG[n, c]`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows = in_dim, cols = out_dim, inner = batch
/// - 1: x (storage, read) - [batch, in_dim]
/// - 2: yg (storage, read) - [batch, out_dim]
/// - 3: wg (storage, read_write) - [in_dim, out_dim]
pub const WEIGHT_GRAD_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> x: array<f32>;
@group(0) @binding(2) var<storage, read> yg: array<f32>;
@group(0) @binding(3) var<storage, read_write> wg: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn weight_grad_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    let row = global_id.y;
    if (row >= config.rows || col >= config.cols) {
        return;
    }

    var sum = 0.0;
    for (var n = 0u; n < config.inner; n++) {
        sum += x[n * config.rows + row] * yg[n * config.cols + col];
    }
    wg[row * config.cols + col] = sum;
}
"#;

/// Input gradient: `xG[r, c] = Σᵢ yG[r, i] · w[c, i]`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows = batch, cols = in_dim, inner = out_dim
/// - 1: yg (storage, read) - [batch, out_dim]
/// - 2: w (storage, read) - [in_dim, out_dim]
/// - 3: xg (storage, read_write) - [batch, in_dim]
pub const INPUT_GRAD_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> yg: array<f32>;
@group(0) @binding(2) var<storage, read> w: array<f32>;
@group(0) @binding(3) var<storage, read_write> xg: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn input_grad_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    let row = global_id.y;
    if (row >= config.rows || col >= config.cols) {
        return;
    }

    var sum = 0.0;
    for (var i = 0u; i < config.inner; i++) {
        sum += yg[row * config.inner + i] * w[col * config.inner + i];
    }
    xg[row * config.cols + col] = sum;
}
"#;

/// Bias gradient: `bG[c] = Σᵣ yG[r, c]`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows = batch, cols = out_dim
/// - 1: yg (storage, read) - [batch, out_dim]
/// - 2: bg (storage, read_write) - [out_dim]
pub const BIAS_GRAD_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> yg: array<f32>;
@group(0) @binding(2) var<storage, read_write> bg: array<f32>;

@compute @workgroup_size(64, 1, 1)
fn bias_grad_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    if (col >= config.cols) {
        return;
    }

    var sum = 0.0;
    for (var r = 0u; r < config.rows; r++) {
        sum += yg[r * config.cols + col];
    }
    bg[col] = sum;
}
"#;

/// ReLU activation: `y = max(x, 0)`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows, cols
/// - 1: x (storage, read)
/// - 2: y (storage, read_write)
pub const RELU_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> x: array<f32>;
@group(0) @binding(2) var<storage, read_write> y: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn relu_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    let row = global_id.y;
    if (row >= config.rows || col >= config.cols) {
        return;
    }

    let idx = row * config.cols + col;
    y[idx] = max(x[idx], 0.0);
}
"#;

/// ReLU gradient, in place: `g = x > 0 ? g : 0`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows, cols
/// - 1: x (storage, read) - pre-activation input
/// - 2: g (storage, read_write) - gradient, masked in place
pub const RELU_GRAD_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> x: array<f32>;
@group(0) @binding(2) var<storage, read_write> g: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn relu_grad_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    let row = global_id.y;
    if (row >= config.rows || col >= config.cols) {
        return;
    }

    let idx = row * config.cols + col;
    g[idx] = select(0.0, g[idx], x[idx] > 0.0);
}
"#;

/// Softmax pass 1: per-row maximum and partition sum.
///
/// Writes `stats[2r] = max(x[r, ..])` and
/// `stats[2r + 1] = ε + Σ exp(x[r, c] - max)`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows, cols
/// - 1: x (storage, read) - logits
/// - 2: stats (storage, read_write) - [rows, 2]
pub const SOFTMAX_STATS_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

const SOFTMAX_EPSILON: f32 = 1e-8;

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> x: array<f32>;
@group(0) @binding(2) var<storage, read_write> stats: array<f32>;

@compute @workgroup_size(64, 1, 1)
fn softmax_stats_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let row = global_id.x;
    if (row >= config.rows || config.cols == 0u) {
        return;
    }

    let offset = row * config.cols;
    var max_val = x[offset];
    for (var c = 1u; c < config.cols; c++) {
        max_val = max(max_val, x[offset + c]);
    }

    var sum = SOFTMAX_EPSILON;
    for (var c = 0u; c < config.cols; c++) {
        sum += exp(x[offset + c] - max_val);
    }

    stats[2u * row] = max_val;
    stats[2u * row + 1u] = sum;
}
"#;

/// Softmax pass 2: `y[r, c] = exp(x[r, c] - max[r]) / sum[r]`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows, cols
/// - 1: x (storage, read) - logits
/// - 2: stats (storage, read) - output of pass 1
/// - 3: y (storage, read_write) - probabilities
pub const SOFTMAX_NORMALIZE_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> x: array<f32>;
@group(0) @binding(2) var<storage, read> stats: array<f32>;
@group(0) @binding(3) var<storage, read_write> y: array<f32>;

@compute @workgroup_size(64, 1, 1)
fn softmax_normalize_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let row = global_id.x;
    if (row >= config.rows) {
        return;
    }

    let offset = row * config.cols;
    let max_val = stats[2u * row];
    let inv_sum = 1.0 / stats[2u * row + 1u];
    for (var c = 0u; c < config.cols; c++) {
        y[offset + c] = exp(x[offset + c] - max_val) * inv_sum;
    }
}
"#;

/// Softmax cross-entropy gradient: `g[r, c] = p[r, c] - (c == label[r])`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows, cols
/// - 1: p (storage, read) - probabilities
/// - 2: labels (storage, read) - one class index per row
/// - 3: g (storage, read_write)
pub const SOFTMAX_CE_GRAD_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> p: array<f32>;
@group(0) @binding(2) var<storage, read> labels: array<f32>;
@group(0) @binding(3) var<storage, read_write> g: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn softmax_ce_grad_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    let row = global_id.y;
    if (row >= config.rows || col >= config.cols) {
        return;
    }

    let idx = row * config.cols + col;
    let one_hot = select(0.0, 1.0, i32(labels[row]) == i32(col));
    g[idx] = p[idx] - one_hot;
}
"#;

/// Sum-of-squares gradient: `g = 2 · (y - t)`.
///
/// # Bindings
///
/// - 0: config (uniform) - rows, cols
/// - 1: y (storage, read) - prediction
/// - 2: t (storage, read) - target
/// - 3: g (storage, read_write)
pub const SUM_OF_SQUARES_GRAD_SHADER: &str = r#"
struct Uniforms {
    rows: u32,
    cols: u32,
    inner: u32,
    _padding: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read> y: array<f32>;
@group(0) @binding(2) var<storage, read> t: array<f32>;
@group(0) @binding(3) var<storage, read_write> g: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn sum_of_squares_grad_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    let row = global_id.y;
    if (row >= config.rows || col >= config.cols) {
        return;
    }

    let idx = row * config.cols + col;
    g[idx] = 2.0 * (y[idx] - t[idx]);
}
"#;

/// Adam update with bias correction from running decay powers.
///
/// # Bindings
///
/// - 0: config (uniform) - AdamUniforms
/// - 1: param (storage, read_write)
/// - 2: grad (storage, read)
/// - 3: m (storage, read_write) - first moment
/// - 4: v (storage, read_write) - second moment
pub const ADAM_SHADER: &str = r#"
struct Uniforms {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    epsilon: f32,
    rows: u32,
    cols: u32,
}

@group(0) @binding(0) var<uniform> config: Uniforms;
@group(0) @binding(1) var<storage, read_write> param: array<f32>;
@group(0) @binding(2) var<storage, read> grad: array<f32>;
@group(0) @binding(3) var<storage, read_write> m: array<f32>;
@group(0) @binding(4) var<storage, read_write> v: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn adam_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let col = global_id.x;
    let row = global_id.y;
    if (row >= config.rows || col >= config.cols) {
        return;
    }

    let idx = row * config.cols + col;
    let g = grad[idx];
    let m_new = config.beta1 * m[idx] + (1.0 - config.beta1) * g;
    let v_new = config.beta2 * v[idx] + (1.0 - config.beta2) * g * g;
    m[idx] = m_new;
    v[idx] = v_new;

    let m_hat = m_new / (1.0 - config.beta1_t);
    let v_hat = v_new / (1.0 - config.beta2_t);
    param[idx] = param[idx] - config.learning_rate * m_hat / (sqrt(v_hat) + config.epsilon);
}
"#;
