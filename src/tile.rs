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
use crate::lane::Vcx;

/// The base parameters of the split-base digit encoding. A logical digit d
/// is stored as a pair (r, h) with d = r + h·√b and |r|, |h| around √b/2,
/// which halves the dynamic range the floating-point transform has to carry.
/// (isb, fsb) is a double-double refinement of √b standing in for an 80-bit
/// square root.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SplitBase {
    pub(crate) b: f64,
    pub(crate) b_inv: f64,
    pub(crate) sb: f64,
    pub(crate) sb_inv: f64,
    pub(crate) isb: f64,
    pub(crate) fsb: f64,
}

impl SplitBase {
    pub(crate) fn new(b: u32) -> Self {
        let bf = b as f64;
        let sb = bf.sqrt();
        // Newton correction: hi + lo = √b to about 2^-104
        let lo = (-sb).mul_add(sb, bf) / (2.0 * sb);
        SplitBase {
            b: bf,
            b_inv: 1.0 / bf,
            sb,
            sb_inv: 1.0 / sb,
            isb: sb,
            fsb: lo,
        }
    }
}

/// An 8-by-W register tile. Loaded from eight vector groups (consecutive for
/// pass 1, column-strided for pass 2), transposed in-register so that each
/// lane becomes one independent row of 8 samples, which is the shape the
/// squaring butterflies and the carry loops consume.
pub(crate) struct Vcx8<const W: usize> {
    z: [Vcx<W>; 8],
}

impl<const W: usize> Vcx8<W> {
    /// # Safety
    /// `mem` must cover 8 consecutive vector groups.
    #[inline(always)]
    pub(crate) unsafe fn load(mem: *const f64) -> Self {
        let mut z = [Vcx::zero(); 8];
        for (i, v) in z.iter_mut().enumerate() {
            *v = Vcx::read(mem.add(2 * i * W));
        }
        Vcx8 { z }
    }

    /// # Safety
    /// See [`Vcx8::load`].
    #[inline(always)]
    pub(crate) unsafe fn store(&self, mem: *mut f64) {
        for (i, v) in self.z.iter().enumerate() {
            v.write(mem.add(2 * i * W));
        }
    }

    /// Loads 8 columns across W rows at complex stride `step`.
    ///
    /// # Safety
    /// `mem` must cover the strided footprint.
    #[inline(always)]
    pub(crate) unsafe fn load_strided(mem: *const f64, step: usize) -> Self {
        let mut z = [Vcx::zero(); 8];
        for (i, v) in z.iter_mut().enumerate() {
            let i_h = (W * i) / 8;
            let i_l = (W * i) % 8;
            *v = Vcx::read(mem.add(2 * (step * i_h + i_l)));
        }
        Vcx8 { z }
    }

    /// # Safety
    /// See [`Vcx8::load_strided`].
    #[inline(always)]
    pub(crate) unsafe fn store_strided(&self, mem: *mut f64, step: usize) {
        for (i, v) in self.z.iter().enumerate() {
            let i_h = (W * i) / 8;
            let i_l = (W * i) % 8;
            v.write(mem.add(2 * (step * i_h + i_l)));
        }
    }

    #[inline(always)]
    pub(crate) fn transpose_in(&mut self) {
        let mut t = [Vcx::zero(); 8];
        for i in 0..W {
            for (j, v) in t.iter_mut().enumerate() {
                let ind = 8 * i + j;
                v.set(i, self.z[ind / W].get(ind % W));
            }
        }
        self.z = t;
    }

    #[inline(always)]
    pub(crate) fn transpose_out(&mut self) {
        let mut t = [Vcx::zero(); 8];
        for i in 0..W {
            for (j, v) in self.z.iter().enumerate() {
                let ind = 8 * i + j;
                t[ind / W].set(ind % W, v.get(i));
            }
        }
        self.z = t;
    }

    /// Fused final-forward-radix-4, pointwise square, first-backward-radix-4
    /// on the even subproblem (rows 0..4). One twiddle w and its conjugate.
    #[inline(always)]
    pub(crate) fn square4e(&mut self, w: Vcx<W>) {
        let u0 = self.z[0];
        let u2 = self.z[2].mul_w(w);
        let u1 = self.z[1];
        let u3 = self.z[3].mul_w(w);
        let v0 = u0 + u2;
        let v2 = u0 - u2;
        let v1 = u1 + u3;
        let v3 = u1 - u3;
        let s0 = v0.sqr() + v1.sqr().mul_w(w);
        let s1 = (v0 + v0) * v1;
        let s2 = v2.sqr() - v3.sqr().mul_w(w);
        let s3 = (v2 + v2) * v3;
        self.z[0] = s0 + s2;
        self.z[2] = (s0 - s2).mul_w_conj(w);
        self.z[1] = s1 + s3;
        self.z[3] = (s1 - s3).mul_w_conj(w);
    }

    /// The odd subproblem (rows 4..8); the asymmetric form realizes the
    /// right-angle convolution, evaluating the product modulo x^N + 1.
    #[inline(always)]
    pub(crate) fn square4o(&mut self, w: Vcx<W>) {
        let u0 = self.z[4];
        let u2 = self.z[6].mul_w(w);
        let u1 = self.z[5];
        let u3 = self.z[7].mul_w(w);
        let v0 = u0.addi(u2);
        let v2 = u0.subi(u2);
        let v1 = u1.addi(u3);
        let v3 = u3.addi(u1);
        let s0 = v1.sqr().mul_w(w).subi(v0.sqr());
        let s1 = (v0 + v0) * v1;
        let s2 = v2.sqr().addi(v3.sqr().mul_w(w));
        let s3 = (v2 + v2) * v3;
        self.z[4] = s2.addi(s0);
        self.z[6] = s0.addi(s2).mul_w_conj(w);
        self.z[5] = s1.subi(s3);
        self.z[7] = s3.subi(s1).mul_w_conj(w);
    }

    /// Applies only the forward half of the squaring butterflies, leaving the
    /// tile in the intermediate domain `mul4` expects from a multiplicand.
    #[inline(always)]
    pub(crate) fn mul4_forward(&mut self, w: Vcx<W>) {
        let u0 = self.z[0];
        let u2 = self.z[2].mul_w(w);
        let u1 = self.z[1];
        let u3 = self.z[3].mul_w(w);
        self.z[0] = u0 + u2;
        self.z[2] = u0 - u2;
        self.z[1] = u1 + u3;
        self.z[3] = u1 - u3;
        let u4 = self.z[4];
        let u6 = self.z[6].mul_w(w);
        let u5 = self.z[5];
        let u7 = self.z[7].mul_w(w);
        self.z[4] = u4.addi(u6);
        self.z[6] = u4.subi(u6);
        self.z[5] = u5.addi(u7);
        self.z[7] = u7.addi(u5);
    }

    /// Pointwise multiplication by a tile prepared with [`Vcx8::mul4_forward`].
    #[inline(always)]
    pub(crate) fn mul4(&mut self, rhs: &Self, w: Vcx<W>) {
        let u0 = self.z[0];
        let u2 = self.z[2].mul_w(w);
        let u1 = self.z[1];
        let u3 = self.z[3].mul_w(w);
        let v0 = u0 + u2;
        let v2 = u0 - u2;
        let v1 = u1 + u3;
        let v3 = u1 - u3;
        let vp0 = rhs.z[0];
        let vp2 = rhs.z[2];
        let vp1 = rhs.z[1];
        let vp3 = rhs.z[3];
        let s0 = v0 * vp0 + (v1 * vp1).mul_w(w);
        let s1 = v0 * vp1 + vp0 * v1;
        let s2 = v2 * vp2 - (v3 * vp3).mul_w(w);
        let s3 = v2 * vp3 + vp2 * v3;
        self.z[0] = s0 + s2;
        self.z[2] = (s0 - s2).mul_w_conj(w);
        self.z[1] = s1 + s3;
        self.z[3] = (s1 - s3).mul_w_conj(w);

        let u4 = self.z[4];
        let u6 = self.z[6].mul_w(w);
        let u5 = self.z[5];
        let u7 = self.z[7].mul_w(w);
        let v4 = u4.addi(u6);
        let v6 = u4.subi(u6);
        let v5 = u5.addi(u7);
        let v7 = u7.addi(u5);
        let vp4 = rhs.z[4];
        let vp6 = rhs.z[6];
        let vp5 = rhs.z[5];
        let vp7 = rhs.z[7];
        let s4 = (v5 * vp5).mul_w(w).subi(v4 * vp4);
        let s5 = v4 * vp5 + vp4 * v5;
        let s6 = (v6 * vp6).addi((v7 * vp7).mul_w(w));
        let s7 = v6 * vp7 + vp6 * v7;
        self.z[4] = s6.addi(s4);
        self.z[6] = s4.addi(s6).mul_w_conj(w);
        self.z[5] = s5.subi(s7);
        self.z[7] = s7.subi(s5).mul_w_conj(w);
    }

    /// The rounding carry of pass 2 over the tile's four digit pairs. Each
    /// pair (z0, z1) recombines to o = (z0 + z1·√b)·2/N, the implicit
    /// transform scale is divided out, the digit is balanced against b and
    /// re-split. `g` is 2 when the squaring also doubles. Returns the carry
    /// leaving the tile.
    #[inline(always)]
    pub(crate) fn carry_round(&mut self, f_prev: Vcx<W>, g: f64, sb: &SplitBase, t2_n: f64) -> Vcx<W> {
        let mut f = f_prev;
        for l in 0..4 {
            let z0 = self.z[2 * l];
            let z1 = self.z[2 * l + 1];
            let o = (z0 + z1 * sb.sb) * t2_n;
            let oi = o.round();
            let f_i = f + oi * g;
            let f_o = (f_i * sb.b_inv).round();
            let r = f_i - f_o * sb.b;
            f = f_o;
            let irh = (r * sb.sb_inv).round();
            self.z[2 * l] = (r - irh * sb.isb) - irh * sb.fsb;
            self.z[2 * l + 1] = irh;
        }
        f
    }

    /// Same as [`Vcx8::carry_round`], accumulating the distance of each raw
    /// value from the nearest integer into `err`.
    #[inline(always)]
    pub(crate) fn carry_round_tracked(
        &mut self,
        f_prev: Vcx<W>,
        g: f64,
        sb: &SplitBase,
        t2_n: f64,
        err: &mut Vcx<W>,
    ) -> Vcx<W> {
        let mut f = f_prev;
        for l in 0..4 {
            let z0 = self.z[2 * l];
            let z1 = self.z[2 * l + 1];
            let o = (z0 + z1 * sb.sb) * t2_n;
            let oi = o.round();
            *err = err.max((o - oi).abs());
            let f_i = f + oi * g;
            let f_o = (f_i * sb.b_inv).round();
            let r = f_i - f_o * sb.b;
            f = f_o;
            let irh = (r * sb.sb_inv).round();
            self.z[2 * l] = (r - irh * sb.isb) - irh * sb.fsb;
            self.z[2 * l + 1] = irh;
        }
        f
    }

    /// The carry stitch of pass 2_1: propagates an incoming carry with no
    /// rounding scale, stopping as soon as it is absorbed. A carry still
    /// alive at the last pair folds into it without further propagation.
    #[inline(always)]
    pub(crate) fn carry_propagate(&mut self, f_in: Vcx<W>, sb: &SplitBase) {
        let mut f = f_in;
        for l in 0..3 {
            let z0 = self.z[2 * l];
            let z1 = self.z[2 * l + 1];
            let o = z0 + z1 * sb.sb;
            let oi = o.round();
            f += oi;
            let f_o = (f * sb.b_inv).round();
            let r = f - f_o * sb.b;
            f = f_o;
            let irh = (r * sb.sb_inv).round();
            self.z[2 * l] = (r - irh * sb.isb) - irh * sb.fsb;
            self.z[2 * l + 1] = irh;
            if f.is_zero() {
                return;
            }
        }
        let z0 = self.z[6];
        let z1 = self.z[7];
        let o = z0 + z1 * sb.sb;
        let oi = o.round();
        let r = f + oi;
        let irh = (r * sb.sb_inv).round();
        self.z[6] = (r - irh * sb.isb) - irh * sb.fsb;
        self.z[7] = irh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;
    use rand::Rng;

    fn random_tile<const W: usize>() -> Vcx8<W> {
        let mut mem = vec![0.0f64; 16 * W];
        for v in mem.iter_mut() {
            *v = rand::rng().random::<f64>() - 0.5;
        }
        unsafe { Vcx8::<W>::load(mem.as_ptr()) }
    }

    fn tiles_equal<const W: usize>(a: &Vcx8<W>, b: &Vcx8<W>) -> bool {
        for (x, y) in a.z.iter().zip(b.z.iter()) {
            for i in 0..W {
                if x.get(i) != y.get(i) {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn test_transpose_is_an_involution() {
        let t = random_tile::<4>();
        let mut u = Vcx8 { z: t.z };
        u.transpose_in();
        u.transpose_out();
        assert!(tiles_equal(&t, &u));

        let t = random_tile::<8>();
        let mut u = Vcx8 { z: t.z };
        u.transpose_in();
        u.transpose_out();
        assert!(tiles_equal(&t, &u));
    }

    #[test]
    fn test_transpose_gathers_rows() {
        // after transpose_in, register j lane i must hold flat sample 8i + j
        let mut mem = vec![0.0f64; 32];
        let mut flat = vec![Complex::new(0.0, 0.0); 16];
        for (k, f) in flat.iter_mut().enumerate() {
            *f = Complex::new(k as f64, -(k as f64));
        }
        for g in 0..8 {
            for lane in 0..2 {
                mem[4 * g + lane] = flat[2 * g + lane].re;
                mem[4 * g + 2 + lane] = flat[2 * g + lane].im;
            }
        }
        let mut t = unsafe { Vcx8::<2>::load(mem.as_ptr()) };
        t.transpose_in();
        for j in 0..8 {
            for i in 0..2 {
                assert_eq!(t.z[j].get(i), flat[8 * i + j]);
            }
        }
    }

    #[test]
    fn test_strided_load_store_round_trip() {
        let step = 20;
        let mut mem = vec![0.0f64; 2 * step * 8];
        for v in mem.iter_mut() {
            *v = rand::rng().random();
        }
        let snapshot = mem.to_vec();
        let t = unsafe { Vcx8::<2>::load_strided(mem.as_ptr(), step) };
        unsafe { t.store_strided(mem.as_mut_ptr(), step) };
        assert_eq!(mem, snapshot);
    }

    #[test]
    fn test_carry_round_balances_digits() {
        let sb = SplitBase::new(1000000);
        let mut t = unsafe { Vcx8::<2>::load(vec![0.0f64; 32].as_ptr()) };
        // one digit of value 3_400_000 = 3*b + 400_000 in lane 0 of pair 0
        t.z[0].set(0, Complex::new(3_400_000.0, 0.0));
        let f = t.carry_round(Vcx::zero(), 1.0, &sb, 1.0);
        // 400_000 splits as r + h*1000 with the balanced remainder
        let d0 = t.z[0].get(0).re + sb.sb * t.z[1].get(0).re;
        assert!((d0 - 400_000.0).abs() < 1e-6);
        assert_eq!(f.get(0).re, 3.0);
    }

    #[test]
    fn test_carry_propagate_absorbs_incoming() {
        let sb = SplitBase::new(1000000);
        let mut t = unsafe { Vcx8::<2>::load(vec![0.0f64; 32].as_ptr()) };
        t.carry_propagate(Vcx::broadcast(Complex::new(7.0, 0.0)), &sb);
        let d0 = t.z[0].get(0).re + sb.sb * t.z[1].get(0).re;
        assert!((d0 - 7.0).abs() < 1e-9);
        // absorbed immediately, later pairs untouched
        assert!(t.z[4].is_zero() && t.z[5].is_zero());
    }
}
