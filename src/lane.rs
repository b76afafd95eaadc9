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
use std::ops::{Add, AddAssign, Mul, Sub};

/// A lane of `W` double-precision reals. `W` is 2, 4 or 8 depending on the
/// selected vector width; all loops below have compile-time trip counts so
/// the backend can keep them in vector registers.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Vd<const W: usize> {
    r: [f64; W],
}

impl<const W: usize> Vd<W> {
    #[inline(always)]
    pub(crate) fn zero() -> Self {
        Vd { r: [0.0; W] }
    }

    /// Lane 0 receives `f`, all other lanes are zero.
    #[inline(always)]
    pub(crate) fn scalar(f: f64) -> Self {
        let mut r = [0.0; W];
        r[0] = f;
        Vd { r }
    }

    #[inline(always)]
    pub(crate) fn broadcast(f: f64) -> Self {
        Vd { r: [f; W] }
    }

    /// Lower half lanes receive `f_l`, upper half `f_h`.
    #[inline(always)]
    pub(crate) fn broadcast2(f_l: f64, f_h: f64) -> Self {
        let mut r = [f_l; W];
        for v in r.iter_mut().skip(W / 2) {
            *v = f_h;
        }
        Vd { r }
    }

    /// # Safety
    /// `mem` must be readable for `W` doubles.
    #[inline(always)]
    pub(crate) unsafe fn read(mem: *const f64) -> Self {
        let mut r = [0.0; W];
        std::ptr::copy_nonoverlapping(mem, r.as_mut_ptr(), W);
        Vd { r }
    }

    /// # Safety
    /// `mem` must be writable for `W` doubles.
    #[inline(always)]
    pub(crate) unsafe fn write(self, mem: *mut f64) {
        std::ptr::copy_nonoverlapping(self.r.as_ptr(), mem, W);
    }

    #[inline(always)]
    pub(crate) fn get(&self, i: usize) -> f64 {
        self.r[i]
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, i: usize, f: f64) {
        self.r[i] = f;
    }

    #[inline(always)]
    pub(crate) fn is_zero(&self) -> bool {
        let mut zero = true;
        for i in 0..W {
            zero &= self.r[i] == 0.0;
        }
        zero
    }

    #[inline(always)]
    pub(crate) fn abs(self) -> Self {
        let mut r = self.r;
        for v in r.iter_mut() {
            *v = v.abs();
        }
        Vd { r }
    }

    /// Nearest integer, halves away from zero.
    #[inline(always)]
    pub(crate) fn round(self) -> Self {
        let mut r = self.r;
        for v in r.iter_mut() {
            *v = v.round();
        }
        Vd { r }
    }

    #[inline(always)]
    pub(crate) fn max(self, rhs: Self) -> Self {
        let mut r = self.r;
        for (v, o) in r.iter_mut().zip(rhs.r.iter()) {
            *v = v.max(*o);
        }
        Vd { r }
    }

    #[inline(always)]
    pub(crate) fn hmax(self) -> f64 {
        let mut m = self.r[0];
        for i in 1..W {
            m = m.max(self.r[i]);
        }
        m
    }
}

impl<const W: usize> Add for Vd<W> {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        let mut r = self.r;
        for (v, o) in r.iter_mut().zip(rhs.r.iter()) {
            *v += *o;
        }
        Vd { r }
    }
}

impl<const W: usize> Sub for Vd<W> {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        let mut r = self.r;
        for (v, o) in r.iter_mut().zip(rhs.r.iter()) {
            *v -= *o;
        }
        Vd { r }
    }
}

impl<const W: usize> Mul for Vd<W> {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        let mut r = self.r;
        for (v, o) in r.iter_mut().zip(rhs.r.iter()) {
            *v *= *o;
        }
        Vd { r }
    }
}

impl<const W: usize> Mul<f64> for Vd<W> {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: f64) -> Self {
        let mut r = self.r;
        for v in r.iter_mut() {
            *v *= rhs;
        }
        Vd { r }
    }
}

impl<const W: usize> AddAssign for Vd<W> {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        for (v, o) in self.r.iter_mut().zip(rhs.r.iter()) {
            *v += *o;
        }
    }
}

/// A lane of `W` complex numbers as a (real-lane, imag-lane) pair.
///
/// In memory a group of `W` complex samples is stored split: `W` reals
/// followed by `W` imaginaries. Every buffer access in the engine goes
/// through [`Vcx::read`]/[`Vcx::write`] at group-consistent offsets, so the
/// split layout never leaks.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Vcx<const W: usize> {
    pub(crate) re: Vd<W>,
    pub(crate) im: Vd<W>,
}

impl<const W: usize> Vcx<W> {
    #[inline(always)]
    pub(crate) fn zero() -> Self {
        Vcx {
            re: Vd::zero(),
            im: Vd::zero(),
        }
    }

    /// Lane 0 receives `f + 0i`, all other lanes are zero.
    #[inline(always)]
    pub(crate) fn scalar(f: f64) -> Self {
        Vcx {
            re: Vd::scalar(f),
            im: Vd::zero(),
        }
    }

    #[inline(always)]
    pub(crate) fn broadcast(w: Complex<f64>) -> Self {
        Vcx {
            re: Vd::broadcast(w.re),
            im: Vd::broadcast(w.im),
        }
    }

    #[inline(always)]
    pub(crate) fn broadcast2(w_l: Complex<f64>, w_h: Complex<f64>) -> Self {
        Vcx {
            re: Vd::broadcast2(w_l.re, w_h.re),
            im: Vd::broadcast2(w_l.im, w_h.im),
        }
    }

    /// # Safety
    /// `mem` must be readable for `2 * W` doubles.
    #[inline(always)]
    pub(crate) unsafe fn read(mem: *const f64) -> Self {
        Vcx {
            re: Vd::read(mem),
            im: Vd::read(mem.add(W)),
        }
    }

    /// # Safety
    /// `mem` must be writable for `2 * W` doubles.
    #[inline(always)]
    pub(crate) unsafe fn write(self, mem: *mut f64) {
        self.re.write(mem);
        self.im.write(mem.add(W));
    }

    #[inline(always)]
    pub(crate) fn get(&self, i: usize) -> Complex<f64> {
        Complex::new(self.re.get(i), self.im.get(i))
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, i: usize, z: Complex<f64>) {
        self.re.set(i, z.re);
        self.im.set(i, z.im);
    }

    /// Interleaves the half-lanes of two vectors: the results hold
    /// (lo(a) | lo(b)) and (hi(a) | hi(b)).
    #[inline(always)]
    pub(crate) fn swap(vc1: &mut Self, vc2: &mut Self) {
        let mut n1 = Self::zero();
        let mut n2 = Self::zero();
        for i in 0..W / 2 {
            n1.set(i, vc1.get(i));
            n1.set(i + W / 2, vc2.get(i));
            n2.set(i, vc1.get(i + W / 2));
            n2.set(i + W / 2, vc2.get(i + W / 2));
        }
        *vc1 = n1;
        *vc2 = n2;
    }

    #[inline(always)]
    pub(crate) fn is_zero(&self) -> bool {
        self.re.is_zero() & self.im.is_zero()
    }

    /// self + i*rhs
    #[inline(always)]
    pub(crate) fn addi(self, rhs: Self) -> Self {
        Vcx {
            re: self.re - rhs.im,
            im: self.im + rhs.re,
        }
    }

    /// self - i*rhs
    #[inline(always)]
    pub(crate) fn subi(self, rhs: Self) -> Self {
        Vcx {
            re: self.re + rhs.im,
            im: self.im - rhs.re,
        }
    }

    /// i*(rhs - self)
    #[inline(always)]
    pub(crate) fn sub_i(self, rhs: Self) -> Self {
        Vcx {
            re: rhs.im - self.im,
            im: self.re - rhs.re,
        }
    }

    /// self * (1 + i)
    #[inline(always)]
    pub(crate) fn mul1i(self) -> Self {
        Vcx {
            re: self.re - self.im,
            im: self.im + self.re,
        }
    }

    /// self * (1 - i)
    #[inline(always)]
    pub(crate) fn mul1mi(self) -> Self {
        Vcx {
            re: self.re + self.im,
            im: self.im - self.re,
        }
    }

    #[inline(always)]
    pub(crate) fn sqr(self) -> Self {
        Vcx {
            re: self.re * self.re - self.im * self.im,
            im: (self.re + self.re) * self.im,
        }
    }

    /// Multiplication by a twiddle stored in Gentleman form (cos α, tan α):
    /// `(re - im*t)*c + i*(im + re*t)*c` is exactly `self * e^{iα}`.
    #[inline(always)]
    pub(crate) fn mul_w(self, rhs: Self) -> Self {
        Vcx {
            re: (self.re - self.im * rhs.im) * rhs.re,
            im: (self.im + self.re * rhs.im) * rhs.re,
        }
    }

    #[inline(always)]
    pub(crate) fn mul_w_conj(self, rhs: Self) -> Self {
        Vcx {
            re: (self.re + self.im * rhs.im) * rhs.re,
            im: (self.im - self.re * rhs.im) * rhs.re,
        }
    }

    #[inline(always)]
    pub(crate) fn abs(self) -> Self {
        Vcx {
            re: self.re.abs(),
            im: self.im.abs(),
        }
    }

    #[inline(always)]
    pub(crate) fn round(self) -> Self {
        Vcx {
            re: self.re.round(),
            im: self.im.round(),
        }
    }

    #[inline(always)]
    pub(crate) fn max(self, rhs: Self) -> Self {
        Vcx {
            re: self.re.max(rhs.re),
            im: self.im.max(rhs.im),
        }
    }

    #[inline(always)]
    pub(crate) fn hmax(self) -> f64 {
        self.re.hmax().max(self.im.hmax())
    }

    /// Walks a carry lane forward by one position: lane i receives lane i-1
    /// of self, lane 0 receives the last lane of `rhs`. With `rotate` the
    /// incoming element is rotated by 90 degrees ((re, im) -> (-im, re)),
    /// which is how the wrap across the ring boundary realizes x^N = -1 in
    /// the packed representation. Not an endian shuffle.
    #[inline(always)]
    pub(crate) fn shift(&mut self, rhs: &Self, rotate: bool) {
        for i in (1..W).rev() {
            self.re.set(i, self.re.get(i - 1));
            self.im.set(i, self.im.get(i - 1));
        }
        if rotate {
            self.re.set(0, -rhs.im.get(W - 1));
            self.im.set(0, rhs.re.get(W - 1));
        } else {
            self.re.set(0, rhs.re.get(W - 1));
            self.im.set(0, rhs.im.get(W - 1));
        }
    }
}

impl<const W: usize> Add for Vcx<W> {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Vcx {
            re: self.re + rhs.re,
            im: self.im + rhs.im,
        }
    }
}

impl<const W: usize> Sub for Vcx<W> {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Vcx {
            re: self.re - rhs.re,
            im: self.im - rhs.im,
        }
    }
}

impl<const W: usize> Mul for Vcx<W> {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        Vcx {
            re: self.re * rhs.re - self.im * rhs.im,
            im: self.im * rhs.re + self.re * rhs.im,
        }
    }
}

impl<const W: usize> Mul<f64> for Vcx<W> {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: f64) -> Self {
        Vcx {
            re: self.re * rhs,
            im: self.im * rhs,
        }
    }
}

impl<const W: usize> AddAssign for Vcx<W> {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        self.re += rhs.re;
        self.im += rhs.im;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twiddle::exp_2i_pi;
    use rand::Rng;

    fn random_vcx<const W: usize>() -> Vcx<W> {
        let mut v = Vcx::<W>::zero();
        for i in 0..W {
            v.set(
                i,
                Complex::new(rand::rng().random::<f64>(), rand::rng().random::<f64>()),
            );
        }
        v
    }

    #[test]
    fn test_mul_w_matches_complex_mul() {
        let w = exp_2i_pi(3, 64);
        let full = Complex::new(w.re, w.re * w.im);
        let v = random_vcx::<4>();
        let lhs = v.mul_w(Vcx::broadcast(w));
        for i in 0..4 {
            let expected = v.get(i) * full;
            assert!((lhs.get(i).re - expected.re).abs() < 1e-12);
            assert!((lhs.get(i).im - expected.im).abs() < 1e-12);
        }
        let lhs = v.mul_w_conj(Vcx::broadcast(w));
        for i in 0..4 {
            let expected = v.get(i) * full.conj();
            assert!((lhs.get(i).re - expected.re).abs() < 1e-12);
            assert!((lhs.get(i).im - expected.im).abs() < 1e-12);
        }
    }

    #[test]
    fn test_shift_rotates_wrapped_element() {
        let mut v = Vcx::<4>::zero();
        for i in 0..4 {
            v.set(i, Complex::new(i as f64 + 1.0, -(i as f64 + 1.0)));
        }
        let incoming = v;
        let mut s = v;
        s.shift(&incoming, false);
        assert_eq!(s.get(0), Complex::new(4.0, -4.0));
        assert_eq!(s.get(1), Complex::new(1.0, -1.0));
        let mut r = v;
        r.shift(&incoming, true);
        // (re, im) -> (-im, re) on the element crossing the boundary
        assert_eq!(r.get(0), Complex::new(4.0, 4.0));
        assert_eq!(r.get(3), Complex::new(3.0, -3.0));
    }

    #[test]
    fn test_swap_interleaves_halves() {
        let mut a = Vcx::<4>::zero();
        let mut b = Vcx::<4>::zero();
        for i in 0..4 {
            a.set(i, Complex::new(i as f64, 0.0));
            b.set(i, Complex::new(10.0 + i as f64, 0.0));
        }
        Vcx::swap(&mut a, &mut b);
        assert_eq!(a.get(0).re, 0.0);
        assert_eq!(a.get(1).re, 1.0);
        assert_eq!(a.get(2).re, 10.0);
        assert_eq!(a.get(3).re, 11.0);
        assert_eq!(b.get(0).re, 2.0);
        assert_eq!(b.get(2).re, 12.0);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        let mut v = Vd::<2>::zero();
        v.set(0, 0.5);
        v.set(1, -2.5);
        let r = v.round();
        assert_eq!(r.get(0), 1.0);
        assert_eq!(r.get(1), -3.0);
    }

    #[test]
    fn test_read_write_group_layout() {
        let mut mem = [0.0f64; 8];
        let mut v = Vcx::<4>::zero();
        for i in 0..4 {
            v.set(i, Complex::new(i as f64, 100.0 + i as f64));
        }
        unsafe { v.write(mem.as_mut_ptr()) };
        // W reals then W imaginaries
        assert_eq!(mem[..4], [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(mem[4..], [100.0, 101.0, 102.0, 103.0]);
        let back = unsafe { Vcx::<4>::read(mem.as_ptr()) };
        for i in 0..4 {
            assert_eq!(back.get(i), v.get(i));
        }
    }
}
