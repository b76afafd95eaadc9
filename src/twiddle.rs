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
use num_complex::Complex;

/// Reverses the bits of `i` over the bit length of `n`.
pub(crate) fn bit_rev(i: usize, n: usize) -> usize {
    let mut r = 0;
    let mut k = n;
    let mut j = i;
    while k > 1 {
        r = (2 * r) | (j % 2);
        k /= 2;
        j /= 2;
    }
    r
}

/// e^{2πi·a/b} in Gentleman form: the stored pair is (cos α, tan α), so a
/// twiddle multiply costs two multiplies and one add per component. This is
/// an exact re-association, not an approximation.
pub(crate) fn exp_2i_pi(a: usize, b: usize) -> Complex<f64> {
    let alpha = 2.0 * std::f64::consts::PI * a as f64 / b as f64;
    let cs = alpha.cos();
    Complex::new(cs, alpha.sin() / cs)
}

/// Fills the `w122i` table: for every halving radix level `s`, bit-reversed
/// triples (w, w^1/2 even, w^1/2 odd) packed at offset `s/2`. The `+1` in the
/// root index folds the negacyclic weight into the twiddles, which is what
/// keeps the resident buffer weighted with no re-weighting between squarings.
pub(crate) fn fill_w122i(w122i: &mut [f64], n: usize) {
    debug_assert_eq!(w122i.len(), n / 8 * 2);
    let mut s = n / 16;
    while s >= 4 {
        for j in 0..s / 2 {
            let r = bit_rev(j, 2 * s) + 1;
            let base = 2 * (2 * s / 4 + 3 * j);
            put(w122i, base, exp_2i_pi(r, 8 * s));
            put(w122i, base + 2, exp_2i_pi(r, 2 * 8 * s));
            put(w122i, base + 4, exp_2i_pi(r + 2 * s, 2 * 8 * s));
        }
        s /= 4;
    }
}

/// Fills the pointwise-squaring roots `ws`, packed `lanes` per vector group
/// in split re/im layout.
pub(crate) fn fill_ws(ws: &mut [f64], n: usize, lanes: usize) {
    debug_assert_eq!(ws.len(), n / 8 * 2);
    for j in 0..n / 8 / lanes {
        for i in 0..lanes {
            let w = exp_2i_pi(bit_rev(lanes * j + i, 2 * (n / 4)) + 1, 8 * (n / 4));
            ws[2 * lanes * j + i] = w.re;
            ws[2 * lanes * j + lanes + i] = w.im;
        }
    }
}

#[inline]
fn put(mem: &mut [f64], at: usize, w: Complex<f64>) {
    mem[at] = w.re;
    mem[at + 1] = w.im;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_rev() {
        assert_eq!(bit_rev(0, 8), 0);
        assert_eq!(bit_rev(1, 8), 4);
        assert_eq!(bit_rev(3, 8), 6);
        assert_eq!(bit_rev(5, 16), 10);
    }

    #[test]
    fn test_exp_2i_pi_is_cos_tan() {
        let w = exp_2i_pi(1, 16);
        let alpha = 2.0 * std::f64::consts::PI / 16.0;
        assert!((w.re - alpha.cos()).abs() < 1e-15);
        assert!((w.re * w.im - alpha.sin()).abs() < 1e-15);
    }

    #[test]
    fn test_w122i_levels_cover_table() {
        let n = 1024;
        let mut w = vec![0.0f64; n / 8 * 2];
        fill_w122i(&mut w, n);
        // the top level s = n/16 writes the last triple at index n/8 - 1
        assert_ne!(w[2 * (n / 8 - 1)], 0.0);
        // the bottom level s = 4 starts at offset 2
        assert_ne!(w[2 * 2], 0.0);
    }

    #[test]
    fn test_ws_lane_packing() {
        let n = 1024;
        let lanes = 4;
        let mut ws = vec![0.0f64; n / 8 * 2];
        fill_ws(&mut ws, n, lanes);
        let j = 3;
        let i = 1;
        let w = exp_2i_pi(bit_rev(lanes * j + i, n / 2) + 1, 2 * n);
        assert_eq!(ws[2 * lanes * j + i], w.re);
        assert_eq!(ws[2 * lanes * j + lanes + i], w.im);
    }
}
