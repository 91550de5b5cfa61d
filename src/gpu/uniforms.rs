//! Uniform buffer structures for the compute kernels.
//!
//! These are `#[repr(C)]` structures whose layout matches the `Uniforms`
//! struct declared at the top of each WGSL kernel in [`shaders`](super::shaders).
//! Every member is a 4-byte scalar and each struct is a whole number of
//! 16-byte rows, which satisfies the uniform address space alignment rules.

use bytemuck::{Pod, Zeroable};

use crate::error::{FfnetError, FfnetResult};
use crate::optimizer::AdamStep;

/// Grid description shared by the matrix and element-wise kernels.
///
/// # Layout
///
/// Total size: 16 bytes (1 × vec4).
///
/// ```text
/// Offset  Size  Field
/// 0       4     rows
/// 4       4     cols
/// 8       4     inner
/// 12      4     _padding
/// ```
///
/// `rows × cols` is the output extent. `inner` is the contraction length of
/// the matrix-product kernels and zero otherwise.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GridUniforms {
    /// Output rows.
    pub rows: u32,
    /// Output columns.
    pub cols: u32,
    /// Contraction length.
    pub inner: u32,
    /// Padding for alignment.
    pub _padding: u32,
}

impl GridUniforms {
    /// Creates grid uniforms, failing if a dimension does not fit in `u32`.
    pub fn new(rows: usize, cols: usize, inner: usize) -> FfnetResult<Self> {
        Ok(Self {
            rows: to_u32(rows, "rows")?,
            cols: to_u32(cols, "cols")?,
            inner: to_u32(inner, "inner")?,
            _padding: 0,
        })
    }

    /// Returns the size in bytes.
    pub const fn size_bytes() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Uniforms for the Adam update kernel.
///
/// # Layout
///
/// Total size: 32 bytes (2 × vec4).
///
/// ```text
/// Offset  Size  Field
/// 0       4     learning_rate
/// 4       4     beta1
/// 8       4     beta2
/// 12      4     beta1_t
/// 16      4     beta2_t
/// 20      4     epsilon
/// 24      4     rows
/// 28      4     cols
/// ```
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct AdamUniforms {
    /// Learning rate.
    pub learning_rate: f32,
    /// First moment decay.
    pub beta1: f32,
    /// Second moment decay.
    pub beta2: f32,
    /// Running power of `beta1`.
    pub beta1_t: f32,
    /// Running power of `beta2`.
    pub beta2_t: f32,
    /// Denominator epsilon.
    pub epsilon: f32,
    /// Parameter rows.
    pub rows: u32,
    /// Parameter columns.
    pub cols: u32,
}

impl AdamUniforms {
    /// Creates Adam uniforms for a `rows × cols` parameter.
    pub fn new(step: &AdamStep, rows: usize, cols: usize) -> FfnetResult<Self> {
        Ok(Self {
            learning_rate: step.learning_rate,
            beta1: step.beta1,
            beta2: step.beta2,
            beta1_t: step.beta1_t,
            beta2_t: step.beta2_t,
            epsilon: step.epsilon,
            rows: to_u32(rows, "rows")?,
            cols: to_u32(cols, "cols")?,
        })
    }

    /// Returns the size in bytes.
    pub const fn size_bytes() -> usize {
        std::mem::size_of::<Self>()
    }
}

fn to_u32(value: usize, what: &str) -> FfnetResult<u32> {
    u32::try_from(value)
        .map_err(|_| FfnetError::overflow(format!("{what} = {value} does not fit in a u32 uniform")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_uniforms_size() {
        // Must be 16 bytes (1 vec4)
        assert_eq!(GridUniforms::size_bytes(), 16);
    }

    #[test]
    fn test_adam_uniforms_size() {
        // Must be 32 bytes (2 vec4)
        assert_eq!(AdamUniforms::size_bytes(), 32);
    }

    #[test]
    fn test_grid_uniforms_overflow() {
        assert!(GridUniforms::new(8, 4, 3).is_ok());
        assert!(matches!(
            GridUniforms::new(u32::MAX as usize + 1, 1, 0),
            Err(FfnetError::Overflow(_))
        ));
    }

    #[test]
    fn test_adam_uniforms_from_step() {
        let step = AdamStep {
            learning_rate: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            beta1_t: 0.81,
            beta2_t: 0.998,
            epsilon: 1e-8,
        };
        let uniforms = AdamUniforms::new(&step, 3, 5).unwrap();
        assert_eq!(uniforms.beta1_t, 0.81);
        assert_eq!(uniforms.rows, 3);
        assert_eq!(uniforms.cols, 5);

        let bytes: &[u8] = bytemuck::bytes_of(&uniforms);
        assert_eq!(bytes.len(), 32);
    }
}
