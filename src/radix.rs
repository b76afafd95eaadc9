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
use num_complex::Complex;

pub(crate) const SQRT2_2: f64 = 0.707106781186547524400844362104849039284835937688;
// (cos α, tan α) pairs for the fixed top-level roots
pub(crate) const CS2PI_1_16: Complex<f64> = Complex::new(
    0.92387953251128675612818318939678828682,
    0.41421356237309504880168872420969807857,
);
pub(crate) const CS2PI_1_32: Complex<f64> = Complex::new(
    0.98078528040323044912618223613423903697,
    0.19891236737965800691159762264467622860,
);
pub(crate) const CS2PI_5_32: Complex<f64> = Complex::new(
    0.55557023301960222474283081394853287438,
    1.49660576266548901760113513494247691870,
);

/// Four W-wide complex registers holding one decimation-in-time radix-4
/// butterfly. Even (`4e`) and odd (`4o`) forms drive the two halves of a
/// split subproblem; the `4_0` form is the top level with the e^{iπ/8} root
/// and √½ folded in.
pub(crate) struct Vradix4<const W: usize> {
    z: [Vcx<W>; 4],
}

impl<const W: usize> Vradix4<W> {
    /// # Safety
    /// `mem` must cover 4 vector groups at complex stride `step`.
    #[inline(always)]
    pub(crate) unsafe fn load(mem: *const f64, step: usize) -> Self {
        let mut z = [Vcx::zero(); 4];
        for (i, v) in z.iter_mut().enumerate() {
            *v = Vcx::read(mem.add(2 * i * step));
        }
        Vradix4 { z }
    }

    /// # Safety
    /// See [`Vradix4::load`].
    #[inline(always)]
    pub(crate) unsafe fn store(&self, mem: *mut f64, step: usize) {
        for (i, v) in self.z.iter().enumerate() {
            v.write(mem.add(2 * i * step));
        }
    }

    #[inline(always)]
    pub(crate) fn from_regs(regs: &[Vcx<W>]) -> Self {
        Vradix4 {
            z: [regs[0], regs[1], regs[2], regs[3]],
        }
    }

    #[inline(always)]
    pub(crate) fn to_regs(&self, regs: &mut [Vcx<W>]) {
        regs[..4].copy_from_slice(&self.z);
    }

    #[inline(always)]
    pub(crate) fn forward4e(&mut self, w0: Vcx<W>, w1: Vcx<W>) {
        let u0 = self.z[0];
        let u2 = self.z[2].mul_w(w0);
        let u1 = self.z[1];
        let u3 = self.z[3].mul_w(w0);
        let v0 = u0 + u2;
        let v2 = u0 - u2;
        let v1 = (u1 + u3).mul_w(w1);
        let v3 = (u1 - u3).mul_w(w1);
        self.z[0] = v0 + v1;
        self.z[1] = v0 - v1;
        self.z[2] = v2.addi(v3);
        self.z[3] = v2.subi(v3);
    }

    #[inline(always)]
    pub(crate) fn forward4o(&mut self, w0: Vcx<W>, w2: Vcx<W>) {
        let u0 = self.z[0];
        let u2 = self.z[2].mul_w(w0);
        let u1 = self.z[1];
        let u3 = self.z[3].mul_w(w0);
        let v0 = u0.addi(u2);
        let v2 = u0.subi(u2);
        let v1 = u1.addi(u3).mul_w(w2);
        let v3 = u1.subi(u3).mul_w(w2);
        self.z[0] = v0 + v1;
        self.z[1] = v0 - v1;
        self.z[2] = v2.addi(v3);
        self.z[3] = v2.subi(v3);
    }

    #[inline(always)]
    pub(crate) fn backward4e(&mut self, w0: Vcx<W>, w1: Vcx<W>) {
        let v0 = self.z[0];
        let v1 = self.z[1];
        let v2 = self.z[2];
        let v3 = self.z[3];
        let u0 = v0 + v1;
        let u1 = (v0 - v1).mul_w_conj(w1);
        let u2 = v2 + v3;
        let u3 = (v2 - v3).mul_w_conj(w1);
        self.z[0] = u0 + u2;
        self.z[2] = (u0 - u2).mul_w_conj(w0);
        self.z[1] = u1.subi(u3);
        self.z[3] = u1.addi(u3).mul_w_conj(w0);
    }

    #[inline(always)]
    pub(crate) fn backward4o(&mut self, w0: Vcx<W>, w2: Vcx<W>) {
        let v0 = self.z[0];
        let v1 = self.z[1];
        let v2 = self.z[2];
        let v3 = self.z[3];
        let u0 = v0 + v1;
        let u1 = (v0 - v1).mul_w_conj(w2);
        let u2 = v2 + v3;
        let u3 = (v2 - v3).mul_w_conj(w2);
        self.z[0] = u0 + u2;
        self.z[2] = u2.sub_i(u0).mul_w_conj(w0);
        self.z[1] = u1.subi(u3);
        self.z[3] = u3.subi(u1).mul_w_conj(w0);
    }

    #[inline(always)]
    pub(crate) fn forward4_0(&mut self, w0: Vcx<W>) {
        let u0 = self.z[0];
        let u2 = self.z[2].mul1i();
        let u1 = self.z[1].mul_w(w0);
        let u3 = self.z[3].mul_w_conj(w0);
        let v0 = u0 + u2 * SQRT2_2;
        let v2 = u0 - u2 * SQRT2_2;
        let v1 = u1.addi(u3);
        let v3 = u3.addi(u1);
        self.z[0] = v0 + v1;
        self.z[1] = v0 - v1;
        self.z[2] = v2 + v3;
        self.z[3] = v2 - v3;
    }

    #[inline(always)]
    pub(crate) fn backward4_0(&mut self, w0: Vcx<W>) {
        let v0 = self.z[0];
        let v1 = self.z[1];
        let v2 = self.z[2];
        let v3 = self.z[3];
        let u0 = v0 + v1;
        let u1 = v0 - v1;
        let u2 = v2 + v3;
        let u3 = v2 - v3;
        self.z[0] = u0 + u2;
        self.z[2] = (u0 - u2).mul1mi() * SQRT2_2;
        self.z[1] = u1.subi(u3).mul_w_conj(w0);
        self.z[3] = u3.subi(u1).mul_w(w0);
    }
}

/// Eight W-wide complex registers for the fused top-two-level butterfly,
/// used when the outer stage count is odd.
pub(crate) struct Vradix8<const W: usize> {
    z: [Vcx<W>; 8],
}

impl<const W: usize> Vradix8<W> {
    /// # Safety
    /// `mem` must cover 8 vector groups at complex stride `step`.
    #[inline(always)]
    pub(crate) unsafe fn load(mem: *const f64, step: usize) -> Self {
        let mut z = [Vcx::zero(); 8];
        for (i, v) in z.iter_mut().enumerate() {
            *v = Vcx::read(mem.add(2 * i * step));
        }
        Vradix8 { z }
    }

    /// # Safety
    /// See [`Vradix8::load`].
    #[inline(always)]
    pub(crate) unsafe fn store(&self, mem: *mut f64, step: usize) {
        for (i, v) in self.z.iter().enumerate() {
            v.write(mem.add(2 * i * step));
        }
    }

    #[inline(always)]
    pub(crate) fn forward8_0(&mut self) {
        let w0 = Vcx::broadcast(CS2PI_1_16);
        let u0 = self.z[0];
        let u4 = self.z[4].mul1i();
        let u2 = self.z[2].mul_w(w0);
        let u6 = self.z[6].mul1i().mul_w(w0);
        let u1 = self.z[1];
        let u5 = self.z[5].mul1i();
        let u3 = self.z[3].mul_w(w0);
        let u7 = self.z[7].mul1i().mul_w(w0);
        let v0 = u0 + u4 * SQRT2_2;
        let v4 = u0 - u4 * SQRT2_2;
        let v2 = u2 + u6 * SQRT2_2;
        let v6 = u2 - u6 * SQRT2_2;
        let w1 = Vcx::broadcast(CS2PI_1_32);
        let w2 = Vcx::broadcast(CS2PI_5_32);
        let v1 = (u1 + u5 * SQRT2_2).mul_w(w1);
        let v5 = (u1 - u5 * SQRT2_2).mul_w(w2);
        let v3 = (u3 + u7 * SQRT2_2).mul_w(w1);
        let v7 = (u3 - u7 * SQRT2_2).mul_w(w2);
        let s0 = v0 + v2;
        let s2 = v0 - v2;
        let s1 = v1 + v3;
        let s3 = v1 - v3;
        let s4 = v4.addi(v6);
        let s6 = v4.subi(v6);
        let s5 = v5.addi(v7);
        let s7 = v5.subi(v7);
        self.z[0] = s0 + s1;
        self.z[1] = s0 - s1;
        self.z[2] = s2.addi(s3);
        self.z[3] = s2.subi(s3);
        self.z[4] = s4 + s5;
        self.z[5] = s4 - s5;
        self.z[6] = s6.addi(s7);
        self.z[7] = s6.subi(s7);
    }

    #[inline(always)]
    pub(crate) fn backward8_0(&mut self) {
        let s0 = self.z[0];
        let s1 = self.z[1];
        let s2 = self.z[2];
        let s3 = self.z[3];
        let s4 = self.z[4];
        let s5 = self.z[5];
        let s6 = self.z[6];
        let s7 = self.z[7];
        let w1 = Vcx::broadcast(CS2PI_1_32);
        let w2 = Vcx::broadcast(CS2PI_5_32);
        let v0 = s0 + s1;
        let v1 = (s0 - s1).mul_w_conj(w1);
        let v2 = s2 + s3;
        let v3 = (s2 - s3).mul_w_conj(w1);
        let v4 = s4 + s5;
        let v5 = (s4 - s5).mul_w_conj(w2);
        let v6 = s6 + s7;
        let v7 = (s6 - s7).mul_w_conj(w2);
        let u0 = v0 + v2;
        let u2 = v0 - v2;
        let u4 = v4 + v6;
        let u6 = v4 - v6;
        let u1 = v1.subi(v3);
        let u3 = v1.addi(v3);
        let u5 = v5.subi(v7);
        let u7 = v5.addi(v7);
        let w0 = Vcx::broadcast(CS2PI_1_16);
        self.z[0] = u0 + u4;
        self.z[4] = (u0 - u4).mul1mi() * SQRT2_2;
        self.z[2] = u2.subi(u6).mul_w_conj(w0);
        self.z[6] = u6.subi(u2).mul_w(w0);
        self.z[1] = u1 + u5;
        self.z[5] = (u1 - u5).mul1mi() * SQRT2_2;
        self.z[3] = u3.subi(u7).mul_w_conj(w0);
        self.z[7] = u7.subi(u3).mul_w(w0);
    }
}

// Strided drivers shared by the cache-resident inner FFT (stepi == 1,
// count == 1) and the column-wise outer FFT (stepi == index(n_io),
// count == 8).

/// # Safety
/// `z` must cover the strided butterfly footprint.
pub(crate) unsafe fn forward4e<const W: usize>(
    mi: usize,
    stepi: usize,
    count: usize,
    z: *mut f64,
    w0: Vcx<W>,
    w1: Vcx<W>,
) {
    let jstep = if stepi == 1 { W } else { stepi };
    let mut j = 0;
    while j < mi {
        let mut i = 0;
        while i < count {
            let zi = z.add(2 * (j + i));
            let mut v = Vradix4::load(zi, mi);
            v.forward4e(w0, w1);
            v.store(zi, mi);
            i += W;
        }
        j += jstep;
    }
}

/// # Safety
/// `z` must cover the strided butterfly footprint.
pub(crate) unsafe fn forward4o<const W: usize>(
    mi: usize,
    stepi: usize,
    count: usize,
    z: *mut f64,
    w0: Vcx<W>,
    w2: Vcx<W>,
) {
    let jstep = if stepi == 1 { W } else { stepi };
    let mut j = 0;
    while j < mi {
        let mut i = 0;
        while i < count {
            let zi = z.add(2 * (j + i));
            let mut v = Vradix4::load(zi, mi);
            v.forward4o(w0, w2);
            v.store(zi, mi);
            i += W;
        }
        j += jstep;
    }
}

/// # Safety
/// `z` must cover the strided butterfly footprint.
pub(crate) unsafe fn backward4e<const W: usize>(
    mi: usize,
    stepi: usize,
    count: usize,
    z: *mut f64,
    w0: Vcx<W>,
    w1: Vcx<W>,
) {
    let jstep = if stepi == 1 { W } else { stepi };
    let mut j = 0;
    while j < mi {
        let mut i = 0;
        while i < count {
            let zi = z.add(2 * (j + i));
            let mut v = Vradix4::load(zi, mi);
            v.backward4e(w0, w1);
            v.store(zi, mi);
            i += W;
        }
        j += jstep;
    }
}

/// # Safety
/// `z` must cover the strided butterfly footprint.
pub(crate) unsafe fn backward4o<const W: usize>(
    mi: usize,
    stepi: usize,
    count: usize,
    z: *mut f64,
    w0: Vcx<W>,
    w2: Vcx<W>,
) {
    let jstep = if stepi == 1 { W } else { stepi };
    let mut j = 0;
    while j < mi {
        let mut i = 0;
        while i < count {
            let zi = z.add(2 * (j + i));
            let mut v = Vradix4::load(zi, mi);
            v.backward4o(w0, w2);
            v.store(zi, mi);
            i += W;
        }
        j += jstep;
    }
}

/// # Safety
/// `z` must cover the strided butterfly footprint.
pub(crate) unsafe fn forward4_0<const W: usize>(mi: usize, stepi: usize, count: usize, z: *mut f64) {
    let w0: Vcx<W> = Vcx::broadcast(CS2PI_1_16);
    let mut j = 0;
    while j < mi {
        let mut i = 0;
        while i < count {
            let zi = z.add(2 * (j + i));
            let mut v: Vradix4<W> = Vradix4::load(zi, mi);
            v.forward4_0(w0);
            v.store(zi, mi);
            i += W;
        }
        j += stepi;
    }
}

/// # Safety
/// `z` must cover the strided butterfly footprint.
pub(crate) unsafe fn backward4_0<const W: usize>(
    mi: usize,
    stepi: usize,
    count: usize,
    z: *mut f64,
) {
    let w0: Vcx<W> = Vcx::broadcast(CS2PI_1_16);
    let mut j = 0;
    while j < mi {
        let mut i = 0;
        while i < count {
            let zi = z.add(2 * (j + i));
            let mut v: Vradix4<W> = Vradix4::load(zi, mi);
            v.backward4_0(w0);
            v.store(zi, mi);
            i += W;
        }
        j += stepi;
    }
}

/// # Safety
/// `z` must cover the strided butterfly footprint.
pub(crate) unsafe fn forward8_0<const W: usize>(mi: usize, stepi: usize, count: usize, z: *mut f64) {
    let mut j = 0;
    while j < mi {
        let mut i = 0;
        while i < count {
            let zi = z.add(2 * (j + i));
            let mut v: Vradix8<W> = Vradix8::load(zi, mi);
            v.forward8_0();
            v.store(zi, mi);
            i += W;
        }
        j += stepi;
    }
}

/// # Safety
/// `z` must cover the strided butterfly footprint.
pub(crate) unsafe fn backward8_0<const W: usize>(
    mi: usize,
    stepi: usize,
    count: usize,
    z: *mut f64,
) {
    let mut j = 0;
    while j < mi {
        let mut i = 0;
        while i < count {
            let zi = z.add(2 * (j + i));
            let mut v: Vradix8<W> = Vradix8::load(zi, mi);
            v.backward8_0();
            v.store(zi, mi);
            i += W;
        }
        j += stepi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twiddle::exp_2i_pi;
    use num_complex::Complex;
    use rand::Rng;

    fn random_regs<const W: usize, const K: usize>() -> [Vcx<W>; K] {
        let mut regs = [Vcx::<W>::zero(); K];
        for r in regs.iter_mut() {
            for i in 0..W {
                r.set(
                    i,
                    Complex::new(
                        rand::rng().random::<f64>() - 0.5,
                        rand::rng().random::<f64>() - 0.5,
                    ),
                );
            }
        }
        regs
    }

    fn assert_scaled<const W: usize>(got: &[Vcx<W>], src: &[Vcx<W>], scale: f64) {
        for (g, s) in got.iter().zip(src.iter()) {
            for i in 0..W {
                assert!((g.get(i).re - scale * s.get(i).re).abs() < 1e-10);
                assert!((g.get(i).im - scale * s.get(i).im).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_radix4e_backward_inverts_forward() {
        let src = random_regs::<4, 4>();
        let w0 = Vcx::broadcast(exp_2i_pi(3, 256));
        let w1 = Vcx::broadcast(exp_2i_pi(3, 512));
        let mut v = Vradix4::from_regs(&src);
        v.forward4e(w0, w1);
        v.backward4e(w0, w1);
        let mut out = [Vcx::<4>::zero(); 4];
        v.to_regs(&mut out);
        assert_scaled(&out, &src, 4.0);
    }

    #[test]
    fn test_radix4o_backward_inverts_forward() {
        let src = random_regs::<2, 4>();
        let w0 = Vcx::broadcast(exp_2i_pi(5, 256));
        let w2 = Vcx::broadcast(exp_2i_pi(5 + 64, 512));
        let mut v = Vradix4::from_regs(&src);
        v.forward4o(w0, w2);
        v.backward4o(w0, w2);
        let mut out = [Vcx::<2>::zero(); 4];
        v.to_regs(&mut out);
        assert_scaled(&out, &src, 4.0);
    }

    #[test]
    fn test_radix4_0_backward_inverts_forward() {
        let src = random_regs::<4, 4>();
        let w0 = Vcx::broadcast(CS2PI_1_16);
        let mut v = Vradix4::from_regs(&src);
        v.forward4_0(w0);
        v.backward4_0(w0);
        let mut out = [Vcx::<4>::zero(); 4];
        v.to_regs(&mut out);
        assert_scaled(&out, &src, 4.0);
    }

    #[test]
    fn test_radix8_0_backward_inverts_forward() {
        let src = random_regs::<2, 8>();
        let mut mem = vec![0.0f64; 8 * 2 * 2];
        for (i, r) in src.iter().enumerate() {
            unsafe { r.write(mem.as_mut_ptr().add(2 * i * 2)) };
        }
        unsafe {
            let mut v = Vradix8::<2>::load(mem.as_ptr(), 2);
            v.forward8_0();
            v.backward8_0();
            v.store(mem.as_mut_ptr(), 2);
        }
        let mut out = [Vcx::<2>::zero(); 8];
        for (i, r) in out.iter_mut().enumerate() {
            *r = unsafe { Vcx::read(mem.as_ptr().add(2 * i * 2)) };
        }
        assert_scaled(&out, &src, 8.0);
    }
}
