/*
 * // Copyright (c) Radzivon Bartoshyk 1/2026. All rights reserved.
 * //
 * // Redistribution and use in source and binary forms, with or without modification,
 * // are permitted provided that the following conditions are met:
 * //
 * // 1.  Redistributions of source code must retain the above copyright notice, this
 * // list of conditions and the following disclaimer.
 * //
 * // 2.  Redistributions in binary form must reproduce the above copyright notice,
 * // this list of conditions and the following disclaimer in the documentation
 * // and/or other materials provided with the distribution.
 * //
 * // 3.  Neither the name of the copyright holder nor the names of its
 * // contributors may be used to endorse or promote products derived from
 * // this software without specific prior written permission.
 * //
 * // THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
 * // AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
 * // IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
 * // DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
 * // FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
 * // DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
 * // SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
 * // CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
 * // OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
 * // OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */
//! Probable-prime testing engine for generalized Fermat numbers b^N + 1.
//!
//! The residue is kept as the forward outer-FFT image of a weighted,
//! split-base digit vector; [`Transform::square_dup`] squares it modulo
//! b^N + 1 with a cache-blocked, lane-vectorized, multi-threaded complex
//! FFT and reports the worst rounding distance seen by the carry stage.
//!
//! ```no_run
//! use gfnprp::Transform;
//!
//! let mut t = gfnprp::create_transform(399998300, 1024, 4, 1, true).unwrap();
//! t.set(1);
//! let err = t.square_dup(true);
//! assert!(err < gfnprp::ERROR_LIMIT);
//! let (is_one, residue) = t.is_one();
//! println!("{is_one} {residue:016x}");
//! ```

mod arena;
mod engine;
mod err;
mod lane;
mod radix;
mod tile;
mod twiddle;

use engine::SplitBaseTransform;
pub use err::GfnError;
use std::io::{Read, Write};

/// Per-squaring rounding errors above this value deserve a warning.
pub const ERROR_WARN: f64 = 0.4;
/// At this distance from the nearest integer the residue can no longer be
/// trusted; drivers should treat the run as failed.
pub const ERROR_LIMIT: f64 = 0.4375;

/// Lane width selection for the transform, in doubles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimdWidth {
    /// Pick from runtime CPU features.
    Auto,
    X2,
    X4,
    X8,
}

/// One resident residue plus `num_regs - 1` spare registers modulo b^N + 1.
///
/// Register 0 is the working residue; every operation that returns an `f64`
/// reports the maximum per-lane rounding error of that call, which is also
/// folded into [`Transform::max_error`].
pub trait Transform: Send {
    fn base(&self) -> u32;
    fn size(&self) -> usize;
    fn lane_width(&self) -> usize;
    fn mem_size(&self) -> usize;

    /// r0 = a
    fn set(&mut self, a: i32);
    /// r0 = the given balanced digit vector (length must equal `size()`).
    fn set_int(&mut self, digits: &[i64]) -> Result<(), GfnError>;
    /// Reads the balanced digits of r0 without disturbing the spectral state.
    fn get_int(&self, out: &mut [i64]) -> Result<(), GfnError>;

    /// r0 = r0^2, doubled when `dup`. Returns the rounding error of the call.
    fn square_dup(&mut self, dup: bool) -> f64;
    /// Prepares r_src as the multiplicand consumed by [`Transform::mul`].
    fn init_multiplicand(&mut self, src: usize) -> Result<(), GfnError>;
    /// r0 = r0 * multiplicand. Returns the rounding error of the call.
    fn mul(&mut self) -> f64;
    /// r_dst = r_src
    fn copy(&mut self, dst: usize, src: usize) -> Result<(), GfnError>;

    /// Whether r0 equals one, plus the 64-bit fingerprint built from the low
    /// bytes of the last eight canonical digits.
    fn is_one(&self) -> (bool, u64);
    /// The running maximum rounding error since construction (or the last
    /// restored context).
    fn max_error(&self) -> f64;

    /// Writes the lane-width tag, the running error and the raw register
    /// bytes. Host-native layout, no portability guarantee.
    fn save_context(&self, out: &mut dyn Write) -> std::io::Result<()>;
    /// Restores a context written by [`Transform::save_context`]; returns
    /// false when the tag does not match this engine.
    fn read_context(&mut self, input: &mut dyn Read) -> std::io::Result<bool>;
}

fn detected_lanes() -> usize {
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("avx512f") {
            return 8;
        }
        if std::arch::is_x86_feature_detected!("avx") {
            return 4;
        }
    }
    2
}

/// Creates an engine for b^n + 1 with the lane width detected from the CPU.
///
/// `b` must be even, `n` a power of two in `2^10 ..= 2^23`. `num_threads` is
/// clamped so that every thread owns at least one block of each pass.
/// `check_error` enables per-squaring rounding-error tracking.
pub fn create_transform(
    b: u32,
    n: usize,
    num_threads: usize,
    num_regs: usize,
    check_error: bool,
) -> Result<Box<dyn Transform>, GfnError> {
    create_transform_with_width(b, n, num_threads, num_regs, check_error, SimdWidth::Auto)
}

/// Same as [`create_transform`] with an explicit lane width.
pub fn create_transform_with_width(
    b: u32,
    n: usize,
    num_threads: usize,
    num_regs: usize,
    check_error: bool,
    width: SimdWidth,
) -> Result<Box<dyn Transform>, GfnError> {
    let lanes = match width {
        SimdWidth::Auto => detected_lanes(),
        SimdWidth::X2 => 2,
        SimdWidth::X4 => 4,
        SimdWidth::X8 => 8,
    };
    Ok(match lanes {
        8 => Box::new(SplitBaseTransform::<8>::new(
            b,
            n,
            num_threads,
            num_regs,
            check_error,
        )?),
        4 => Box::new(SplitBaseTransform::<4>::new(
            b,
            n,
            num_threads,
            num_regs,
            check_error,
        )?),
        _ => Box::new(SplitBaseTransform::<2>::new(
            b,
            n,
            num_threads,
            num_regs,
            check_error,
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            create_transform(3, 1024, 1, 1, false),
            Err(GfnError::UnsupportedBase(3))
        ));
        assert!(matches!(
            create_transform(0, 1024, 1, 1, false),
            Err(GfnError::UnsupportedBase(0))
        ));
        assert!(matches!(
            create_transform(399998300, 1000, 1, 1, false),
            Err(GfnError::UnsupportedTransformSize(1000))
        ));
        assert!(matches!(
            create_transform(399998300, 512, 1, 1, false),
            Err(GfnError::UnsupportedTransformSize(512))
        ));
        assert!(matches!(
            create_transform(399998300, 1024, 0, 1, false),
            Err(GfnError::InvalidThreadCount(0))
        ));
        assert!(matches!(
            create_transform(399998300, 1024, 1, 0, false),
            Err(GfnError::InvalidRegisterCount(0))
        ));
    }

    #[test]
    fn test_explicit_widths_construct() {
        for width in [SimdWidth::X2, SimdWidth::X4, SimdWidth::X8] {
            let t = create_transform_with_width(399998300, 1024, 2, 1, true, width).unwrap();
            assert_eq!(t.size(), 1024);
            assert_eq!(t.base(), 399998300);
        }
        let auto = create_transform(399998300, 1024, 1, 1, true).unwrap();
        assert!([2, 4, 8].contains(&auto.lane_width()));
    }
}
