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
use crate::arena::Arena;
use crate::err::GfnError;
use crate::lane::Vcx;
use crate::radix;
use crate::tile::{SplitBase, Vcx8};
use crate::twiddle::{fill_w122i, fill_ws};
use crate::Transform;
use novtb::{ParallelZonedIterator, TbSliceMut};
use num_complex::Complex;
use std::io::{Read, Write};

// one cache line of padding after every n_io row of the spectral buffer
const GAP_COMPLEX: usize = 64 / size_of::<Complex<f64>>();

/// Blocking factor of the inner FFT. Pass 1 works on n_io contiguous complex
/// samples, passes 2/2_1 on n / n_io strided columns.
/// n_io is a power of 4 with 64 <= n_io <= n/16 and n >= num_threads * n_io.
fn n_io_for(n: usize) -> usize {
    if n <= (1 << 11) {
        64
    } else if n <= (1 << 13) {
        256
    } else if n <= (1 << 17) {
        1024
    } else {
        4096
    }
}

#[derive(Clone, Copy)]
enum PassKind {
    Square { dup: bool },
    Mul,
}

/// The split-base weighted transform modulo b^N + 1 over W-wide double
/// lanes. The resident buffer holds the forward outer-FFT image of the
/// weighted residue; one squaring runs pass 1 (inner forward FFT, pointwise
/// square, inner backward FFT per block), pass 2 (outer backward FFT, carry
/// round per column group) and pass 2_1 (cross-thread carry stitch, outer
/// forward FFT).
pub(crate) struct SplitBaseTransform<const W: usize> {
    b: u32,
    n: usize,
    n_io: usize,
    n_io_s: usize,
    n_io_inv: usize,
    s_io: usize,
    num_threads: usize,
    num_regs: usize,
    check_error: bool,
    max_err: f64,
    sb: SplitBase,
    mem: Arena,
    w_off: usize,
    ws_off: usize,
    z_off: usize,
    f_off: usize,
    zp_off: usize,
    zc_off: usize,
    zr_off: usize,
    reg_len: usize,
    thread_err: Vec<f64>,
    pool: novtb::ThreadPool,
}

// The passes partition the spectral buffer into per-thread disjoint ranges;
// the only cross-thread read (the carry ring) happens across a dispatch
// boundary, which establishes happens-before.
unsafe impl<const W: usize> Send for SplitBaseTransform<W> {}
unsafe impl<const W: usize> Sync for SplitBaseTransform<W> {}

impl<const W: usize> SplitBaseTransform<W> {
    pub(crate) fn new(
        b: u32,
        n: usize,
        num_threads: usize,
        num_regs: usize,
        check_error: bool,
    ) -> Result<Self, GfnError> {
        if b < 2 || b % 2 != 0 {
            return Err(GfnError::UnsupportedBase(b));
        }
        if !n.is_power_of_two() || n < (1 << 10) || n > (1 << 23) {
            return Err(GfnError::UnsupportedTransformSize(n));
        }
        if num_threads == 0 {
            return Err(GfnError::InvalidThreadCount(num_threads));
        }
        if num_regs == 0 {
            return Err(GfnError::InvalidRegisterCount(num_regs));
        }

        let n_io = n_io_for(n);
        let s_io = n / n_io;
        let n_io_s = n_io / 8;
        let n_io_inv = n / n_io / W;
        let num_threads = num_threads.min(n_io_s).min(s_io).min(64);

        let index_n = s_io * (n_io + GAP_COMPLEX);
        let reg_len = 2 * index_n;
        let align = |x: usize| (x + 7) & !7;

        let w_off = 0;
        let ws_off = align(w_off + n / 8 * 2);
        let z_off = align(ws_off + n / 8 * 2);
        let f_off = align(z_off + reg_len);
        let zp_off = align(f_off + num_threads * n_io_inv * 2 * W);
        let zc_off = align(zp_off + reg_len);
        let zr_off = align(zc_off + reg_len);
        let total = zr_off + (num_regs - 1) * reg_len;

        let mem = Arena::zeroed(total)?;
        unsafe {
            let w = std::slice::from_raw_parts_mut(mem.as_ptr().add(w_off), n / 8 * 2);
            fill_w122i(w, n);
            let ws = std::slice::from_raw_parts_mut(mem.as_ptr().add(ws_off), n / 8 * 2);
            fill_ws(ws, n, W);
        }

        let mut engine = SplitBaseTransform {
            b,
            n,
            n_io,
            n_io_s,
            n_io_inv,
            s_io,
            num_threads,
            num_regs,
            check_error,
            max_err: 0.0,
            sb: SplitBase::new(b),
            mem,
            w_off,
            ws_off,
            z_off,
            f_off,
            zp_off,
            zc_off,
            zr_off,
            reg_len,
            thread_err: vec![0.0; num_threads],
            pool: novtb::ThreadPool::new(num_threads),
        };
        engine.set(1);
        Ok(engine)
    }

    /// Strided addressing of the spectral buffer, in complex units.
    #[inline(always)]
    fn index(&self, k: usize) -> usize {
        let j = k / self.n_io;
        let i = k % self.n_io;
        j * (self.n_io + GAP_COMPLEX) + i
    }

    #[inline(always)]
    fn reg_ptr(&self, r: usize) -> *mut f64 {
        let off = if r == 0 {
            self.z_off
        } else {
            self.zr_off + (r - 1) * self.reg_len
        };
        unsafe { self.mem.as_ptr().add(off) }
    }

    #[inline(always)]
    fn zp_ptr(&self) -> *mut f64 {
        unsafe { self.mem.as_ptr().add(self.zp_off) }
    }

    #[inline(always)]
    fn zc_ptr(&self) -> *mut f64 {
        unsafe { self.mem.as_ptr().add(self.zc_off) }
    }

    #[inline(always)]
    fn f_ptr(&self) -> *mut f64 {
        unsafe { self.mem.as_ptr().add(self.f_off) }
    }

    /// Reads entry `idx` of the w122i table.
    #[inline(always)]
    unsafe fn wc(&self, idx: usize) -> Complex<f64> {
        let p = self.mem.as_ptr().add(self.w_off + 2 * idx);
        Complex::new(*p, *p.add(1))
    }

    #[inline(always)]
    fn slice_range(&self, thread_id: usize, count: usize) -> (usize, usize) {
        let l_min = thread_id * count / self.num_threads;
        let l_max = if thread_id + 1 == self.num_threads {
            count
        } else {
            (thread_id + 1) * count / self.num_threads
        };
        (l_min, l_max)
    }

    // ---- inner FFT over one contiguous block of n_io samples ----

    unsafe fn forward_in(&self, z_l: *mut f64, l: usize) {
        let s_io = self.s_io;
        {
            let wi = s_io / 2 + 3 * (l / 2);
            let w0 = Vcx::<W>::broadcast(self.wc(wi));
            if l % 2 == 0 {
                let w1 = Vcx::<W>::broadcast(self.wc(wi + 1));
                radix::forward4e::<W>(self.n_io / 4, 1, 1, z_l, w0, w1);
            } else {
                let w2 = Vcx::<W>::broadcast(self.wc(wi + 2));
                radix::forward4o::<W>(self.n_io / 4, 1, 1, z_l, w0, w2);
            }
        }

        let m_lo = if W == 8 { 16 } else { 4 };
        let mut m = self.n_io / 16;
        let mut s = 2usize;
        while m >= m_lo {
            for j in 0..s {
                let zj = z_l.add(2 * (8 * m * j));
                let wi = (s_io + 3 * l) * s + 3 * j;
                let w0 = Vcx::<W>::broadcast(self.wc(wi));
                let w1 = Vcx::<W>::broadcast(self.wc(wi + 1));
                radix::forward4e::<W>(m, 1, 1, zj, w0, w1);
                let w2 = Vcx::<W>::broadcast(self.wc(wi + 2));
                radix::forward4o::<W>(m, 1, 1, zj.add(2 * (4 * m)), w0, w2);
            }
            m /= 4;
            s *= 4;
        }

        if W == 8 {
            self.forward_in_lanes(z_l, l);
        }
    }

    unsafe fn backward_in(&self, z_l: *mut f64, l: usize) {
        if W == 8 {
            self.backward_in_lanes(z_l, l);
        }

        let s_io = self.s_io;
        let m_lo = if W == 8 { 16 } else { 4 };
        let mut m = m_lo;
        let mut s = self.n_io / 4 / m_lo / 2;
        while m <= self.n_io / 16 {
            for j in 0..s {
                let zj = z_l.add(2 * (8 * m * j));
                let wi = (s_io + 3 * l) * s + 3 * j;
                let w0 = Vcx::<W>::broadcast(self.wc(wi));
                let w1 = Vcx::<W>::broadcast(self.wc(wi + 1));
                radix::backward4e::<W>(m, 1, 1, zj, w0, w1);
                let w2 = Vcx::<W>::broadcast(self.wc(wi + 2));
                radix::backward4o::<W>(m, 1, 1, zj.add(2 * (4 * m)), w0, w2);
            }
            m *= 4;
            s /= 4;
        }

        {
            let wi = s_io / 2 + 3 * (l / 2);
            let w0 = Vcx::<W>::broadcast(self.wc(wi));
            if l % 2 == 0 {
                let w1 = Vcx::<W>::broadcast(self.wc(wi + 1));
                radix::backward4e::<W>(self.n_io / 4, 1, 1, z_l, w0, w1);
            } else {
                let w2 = Vcx::<W>::broadcast(self.wc(wi + 2));
                radix::backward4o::<W>(self.n_io / 4, 1, 1, z_l, w0, w2);
            }
        }
    }

    // With 8 lanes the innermost stage crosses lane boundaries; the
    // half-lane swap interleaves two subproblems into each register pair.

    unsafe fn forward_in_lanes(&self, z_l: *mut f64, l: usize) {
        let s = self.n_io / 32;
        let mut j = 0;
        while j < s {
            let zj = z_l.add(2 * (32 * j));
            let wi = (self.s_io + 3 * l) * s + 3 * j;
            let w0 = Vcx::<W>::broadcast2(self.wc(wi), self.wc(wi + 3));
            let w1 = Vcx::<W>::broadcast2(self.wc(wi + 1), self.wc(wi + 4));

            let mut t = [Vcx::<W>::zero(); 8];
            for (i, v) in t.iter_mut().enumerate() {
                *v = Vcx::read(zj.add(2 * i * W));
            }
            {
                let (lo, hi) = t.split_at_mut(4);
                for i in 0..4 {
                    Vcx::swap(&mut lo[i], &mut hi[i]);
                }
            }
            let mut nt = [Vcx::<W>::zero(); 8];
            for i in 0..4 {
                nt[2 * i] = t[i];
                nt[2 * i + 1] = t[i + 4];
            }

            let mut v4 = radix::Vradix4::from_regs(&nt[0..4]);
            v4.forward4e(w0, w1);
            v4.to_regs(&mut nt[0..4]);
            let w2 = Vcx::<W>::broadcast2(self.wc(wi + 2), self.wc(wi + 5));
            let mut v4 = radix::Vradix4::from_regs(&nt[4..8]);
            v4.forward4o(w0, w2);
            v4.to_regs(&mut nt[4..8]);

            for i in 0..4 {
                t[i] = nt[2 * i];
                t[i + 4] = nt[2 * i + 1];
            }
            {
                let (lo, hi) = t.split_at_mut(4);
                for i in 0..4 {
                    Vcx::swap(&mut lo[i], &mut hi[i]);
                }
            }
            for (i, v) in t.iter().enumerate() {
                v.write(zj.add(2 * i * W));
            }
            j += 2;
        }
    }

    unsafe fn backward_in_lanes(&self, z_l: *mut f64, l: usize) {
        let s = self.n_io / 32;
        let mut j = 0;
        while j < s {
            let zj = z_l.add(2 * (32 * j));
            let wi = (self.s_io + 3 * l) * s + 3 * j;
            let w0 = Vcx::<W>::broadcast2(self.wc(wi), self.wc(wi + 3));
            let w1 = Vcx::<W>::broadcast2(self.wc(wi + 1), self.wc(wi + 4));

            let mut t = [Vcx::<W>::zero(); 8];
            for (i, v) in t.iter_mut().enumerate() {
                *v = Vcx::read(zj.add(2 * i * W));
            }
            {
                let (lo, hi) = t.split_at_mut(4);
                for i in 0..4 {
                    Vcx::swap(&mut lo[i], &mut hi[i]);
                }
            }
            let mut nt = [Vcx::<W>::zero(); 8];
            for i in 0..4 {
                nt[2 * i] = t[i];
                nt[2 * i + 1] = t[i + 4];
            }

            let mut v4 = radix::Vradix4::from_regs(&nt[0..4]);
            v4.backward4e(w0, w1);
            v4.to_regs(&mut nt[0..4]);
            let w2 = Vcx::<W>::broadcast2(self.wc(wi + 2), self.wc(wi + 5));
            let mut v4 = radix::Vradix4::from_regs(&nt[4..8]);
            v4.backward4o(w0, w2);
            v4.to_regs(&mut nt[4..8]);

            for i in 0..4 {
                t[i] = nt[2 * i];
                t[i + 4] = nt[2 * i + 1];
            }
            {
                let (lo, hi) = t.split_at_mut(4);
                for i in 0..4 {
                    Vcx::swap(&mut lo[i], &mut hi[i]);
                }
            }
            for (i, v) in t.iter().enumerate() {
                v.write(zj.add(2 * i * W));
            }
            j += 2;
        }
    }

    // ---- outer FFT over the strided column axis ----

    unsafe fn forward_out(&self, z: *mut f64, lh: usize) {
        let n = self.n;
        let stepi = self.index(self.n_io);
        let mut s = (n / 4) / self.n_io / 2;
        while s >= 4 * 2 {
            s /= 4;
        }

        if s == 4 {
            radix::forward8_0::<W>(self.index(n / 8), stepi, 2 * 4, z.add(2 * (2 * 4 * lh)));
        } else {
            radix::forward4_0::<W>(self.index(n / 4), stepi, 2 * 4, z.add(2 * (2 * 4 * lh)));
        }

        let mut mi = self.index(if s == 4 { n / 32 } else { n / 16 });
        while mi >= stepi {
            for j in 0..s {
                let k = 2 * 4 * lh + 8 * mi * j;
                let w0 = Vcx::<W>::broadcast(self.wc(s + 3 * j));
                let w1 = Vcx::<W>::broadcast(self.wc(s + 3 * j + 1));
                radix::forward4e::<W>(mi, stepi, 2 * 4, z.add(2 * k), w0, w1);
                let w2 = Vcx::<W>::broadcast(self.wc(s + 3 * j + 2));
                radix::forward4o::<W>(mi, stepi, 2 * 4, z.add(2 * (k + 4 * mi)), w0, w2);
            }
            mi /= 4;
            s *= 4;
        }
    }

    unsafe fn backward_out(&self, z: *mut f64, lh: usize) {
        let n = self.n;
        let stepi = self.index(self.n_io);
        let mut s = (n / 4) / self.n_io / 2;
        let mut mi = stepi;
        while s >= 2 {
            for j in 0..s {
                let k = 2 * 4 * lh + 8 * mi * j;
                let w0 = Vcx::<W>::broadcast(self.wc(s + 3 * j));
                let w1 = Vcx::<W>::broadcast(self.wc(s + 3 * j + 1));
                radix::backward4e::<W>(mi, stepi, 2 * 4, z.add(2 * k), w0, w1);
                let w2 = Vcx::<W>::broadcast(self.wc(s + 3 * j + 2));
                radix::backward4o::<W>(mi, stepi, 2 * 4, z.add(2 * (k + 4 * mi)), w0, w2);
            }
            mi *= 4;
            s /= 4;
        }

        if s == 1 {
            radix::backward8_0::<W>(self.index(n / 8), stepi, 2 * 4, z.add(2 * (2 * 4 * lh)));
        } else {
            radix::backward4_0::<W>(self.index(n / 4), stepi, 2 * 4, z.add(2 * (2 * 4 * lh)));
        }
    }

    // ---- the three phases of a squaring ----

    unsafe fn pass1(&self, thread_id: usize) {
        let z = self.reg_ptr(0);
        let ws = self.mem.as_ptr().add(self.ws_off) as *const f64;
        let per = self.n_io / (8 * W);
        let (l_min, l_max) = self.slice_range(thread_id, self.s_io);
        for l in l_min..l_max {
            let z_l = z.add(2 * self.index(self.n_io * l));
            self.forward_in(z_l, l);
            for j in 0..per {
                let zj = z_l.add(2 * (8 * j * W));
                let mut t = Vcx8::<W>::load(zj);
                t.transpose_in();
                let w = Vcx::<W>::read(ws.add(2 * W * (l * per + j)));
                t.square4e(w);
                t.square4o(w);
                t.transpose_out();
                t.store(zj);
            }
            self.backward_in(z_l, l);
        }
    }

    unsafe fn pass1_multiplicand(&self, thread_id: usize) {
        let zp = self.zp_ptr();
        let ws = self.mem.as_ptr().add(self.ws_off) as *const f64;
        let per = self.n_io / (8 * W);
        let (l_min, l_max) = self.slice_range(thread_id, self.s_io);
        for l in l_min..l_max {
            let zp_l = zp.add(2 * self.index(self.n_io * l));
            self.forward_in(zp_l, l);
            for j in 0..per {
                let zj = zp_l.add(2 * (8 * j * W));
                let mut t = Vcx8::<W>::load(zj);
                t.transpose_in();
                let w = Vcx::<W>::read(ws.add(2 * W * (l * per + j)));
                t.mul4_forward(w);
                // stored transposed, the shape pass1_mul consumes
                t.store(zj);
            }
        }
    }

    unsafe fn pass1_mul(&self, thread_id: usize) {
        let z = self.reg_ptr(0);
        let zp = self.zp_ptr() as *const f64;
        let ws = self.mem.as_ptr().add(self.ws_off) as *const f64;
        let per = self.n_io / (8 * W);
        let (l_min, l_max) = self.slice_range(thread_id, self.s_io);
        for l in l_min..l_max {
            let z_l = z.add(2 * self.index(self.n_io * l));
            let zp_l = zp.add(2 * self.index(self.n_io * l));
            self.forward_in(z_l, l);
            for j in 0..per {
                let zj = z_l.add(2 * (8 * j * W));
                let mut t = Vcx8::<W>::load(zj);
                t.transpose_in();
                let p = Vcx8::<W>::load(zp_l.add(2 * (8 * j * W)));
                let w = Vcx::<W>::read(ws.add(2 * W * (l * per + j)));
                t.mul4(&p, w);
                t.transpose_out();
                t.store(zj);
            }
            self.backward_in(z_l, l);
        }
    }

    unsafe fn pass2(&self, thread_id: usize, g: f64) -> f64 {
        let z = self.reg_ptr(0);
        let f_t = self.f_ptr().add(2 * W * (thread_id * self.n_io_inv));
        let sb = self.sb;
        let t2_n = 2.0 / self.n as f64;
        let stepi = self.index(self.n_io);

        let mut err = Vcx::<W>::zero();

        let (l_min, l_max) = self.slice_range(thread_id, self.n_io_s);
        for lh in l_min..l_max {
            self.backward_out(z, lh);

            for j in 0..self.n_io_inv {
                let zj = z.add(2 * (stepi * W * j + 2 * 4 * lh));
                let mut t = Vcx8::<W>::load_strided(zj, stepi);
                t.transpose_in();

                let f_prev = if lh != l_min {
                    Vcx::<W>::read(f_t.add(2 * W * j) as *const f64)
                } else {
                    Vcx::zero()
                };
                let f_next = if self.check_error {
                    t.carry_round_tracked(f_prev, g, &sb, t2_n, &mut err)
                } else {
                    t.carry_round(f_prev, g, &sb, t2_n)
                };
                f_next.write(f_t.add(2 * W * j));

                if lh != l_min {
                    t.transpose_out();
                }
                t.store_strided(zj, stepi); // transposed if lh == l_min
            }

            if lh != l_min {
                self.forward_out(z, lh);
            }
        }

        err.hmax()
    }

    unsafe fn pass2_1(&self, thread_id: usize) {
        let z = self.reg_ptr(0);
        let thread_id_prev = (if thread_id != 0 {
            thread_id
        } else {
            self.num_threads
        }) - 1;
        let lh = thread_id * self.n_io_s / self.num_threads; // l_min of pass 2
        let f_p = self.f_ptr().add(2 * W * (thread_id_prev * self.n_io_inv)) as *const f64;
        let sb = self.sb;
        let stepi = self.index(self.n_io);

        for j in 0..self.n_io_inv {
            let zj = z.add(2 * (stepi * W * j + 2 * 4 * lh));
            let mut t = Vcx8::<W>::load_strided(zj, stepi); // transposed

            let mut f_in = Vcx::<W>::read(f_p.add(2 * W * j));
            if thread_id == 0 {
                let j_prev = (if j == 0 { self.n_io_inv } else { j }) - 1;
                let wrap = Vcx::<W>::read(f_p.add(2 * W * j_prev));
                f_in.shift(&wrap, j == 0);
            }
            t.carry_propagate(f_in, &sb);

            t.transpose_out();
            t.store_strided(zj, stepi);
        }

        self.forward_out(z, lh);
    }

    fn run(&mut self, kind: PassKind) -> f64 {
        let g = match kind {
            PassKind::Square { dup } => {
                if dup {
                    2.0
                } else {
                    1.0
                }
            }
            PassKind::Mul => 1.0,
        };
        let mut e = std::mem::take(&mut self.thread_err);

        if self.num_threads <= 1 {
            unsafe {
                match kind {
                    PassKind::Square { .. } => self.pass1(0),
                    PassKind::Mul => self.pass1_mul(0),
                }
                e[0] = self.pass2(0, g);
                self.pass2_1(0);
            }
        } else {
            let this = &*self;
            match kind {
                PassKind::Square { .. } => e
                    .tb_par_chunks_exact_mut(1)
                    .for_each_enumerated(&this.pool, |t, _| unsafe { this.pass1(t) }),
                PassKind::Mul => e
                    .tb_par_chunks_exact_mut(1)
                    .for_each_enumerated(&this.pool, |t, _| unsafe { this.pass1_mul(t) }),
            }
            e.tb_par_chunks_exact_mut(1)
                .for_each_enumerated(&this.pool, |t, et| {
                    et[0] = unsafe { this.pass2(t, g) };
                });
            e.tb_par_chunks_exact_mut(1)
                .for_each_enumerated(&this.pool, |t, _| unsafe { this.pass2_1(t) });
        }

        let err = e.iter().copied().fold(0.0f64, f64::max);
        self.thread_err = e;
        self.max_err = self.max_err.max(err);
        err
    }

    // ---- residue readout ----

    fn read_digits(&self, out: &mut [i64]) {
        unsafe {
            let z = self.reg_ptr(0) as *const f64;
            let zc = self.zc_ptr();
            std::ptr::copy_nonoverlapping(z, zc, self.reg_len);

            for lh in 0..self.n_io_s {
                self.backward_out(zc, lh);
            }

            let scale = self.n_io as f64 / self.n as f64;
            let sb = self.sb.sb;
            let mut k = 0;
            while k < self.n / 2 {
                let vc = Vcx::<W>::read(zc.add(2 * self.index(2 * k)) as *const f64);
                for i in 0..W / 2 {
                    let z1 = vc.get(2 * i);
                    let z2 = vc.get(2 * i + 1);
                    out[k + i] = ((z1.re + sb * z2.re) * scale).round() as i64;
                    out[k + i + self.n / 2] = ((z1.im + sb * z2.im) * scale).round() as i64;
                }
                k += W / 2;
            }
        }
    }

    fn write_digits(&mut self, digits: &[i64]) {
        unsafe {
            let z = self.reg_ptr(0);
            std::ptr::write_bytes(z, 0, self.reg_len);

            let mut k = 0;
            while k < self.n / 2 {
                let mut vc = Vcx::<W>::zero();
                for i in 0..W / 2 {
                    let (r_lo, h_lo) = self.split_digit(digits[k + i]);
                    let (r_hi, h_hi) = self.split_digit(digits[k + i + self.n / 2]);
                    vc.set(2 * i, Complex::new(r_lo, r_hi));
                    vc.set(2 * i + 1, Complex::new(h_lo, h_hi));
                }
                vc.write(z.add(2 * self.index(2 * k)));
                k += W / 2;
            }

            for lh in 0..self.n_io_s {
                self.forward_out(z, lh);
            }
        }
    }

    fn split_digit(&self, d: i64) -> (f64, f64) {
        let d = d as f64;
        let irh = (d * self.sb.sb_inv).round();
        ((d - irh * self.sb.isb) - irh * self.sb.fsb, irh)
    }
}

/// Converts balanced digits to canonical [0, b), walking the carry around
/// the ring (x^N = -1 negates a wrapping carry). The residue -1 has no
/// canonical digit vector; it is encoded as all zeros with zi[0] = -1.
pub(crate) fn unbalance(zi: &mut [i64], b: u32) {
    let base = b as i64;

    let mut f: i64 = 0;
    for v in zi.iter_mut() {
        f += *v;
        let mut r = f % base;
        if r < 0 {
            r += base;
        }
        *v = r;
        f -= r;
        f /= base;
    }

    while f != 0 {
        f = -f; // a[n] = -a[0]

        for v in zi.iter_mut() {
            f += *v;
            let mut r = f % base;
            if r < 0 {
                r += base;
            }
            *v = r;
            f -= r;
            f /= base;
            if f == 0 {
                break;
            }
        }

        if f == 1 {
            let is_minus_one = zi.iter().all(|&v| v == 0);
            if is_minus_one {
                zi[0] = -1;
                break;
            }
        }
    }
}

impl<const W: usize> Transform for SplitBaseTransform<W> {
    fn base(&self) -> u32 {
        self.b
    }

    fn size(&self) -> usize {
        self.n
    }

    fn lane_width(&self) -> usize {
        W
    }

    fn mem_size(&self) -> usize {
        self.mem.size_bytes()
    }

    fn max_error(&self) -> f64 {
        self.max_err
    }

    fn set(&mut self, a: i32) {
        unsafe {
            let z = self.reg_ptr(0);
            std::ptr::write_bytes(z, 0, self.reg_len);
            Vcx::<W>::scalar(a as f64).write(z);
            for lh in 0..self.n_io_s {
                self.forward_out(z, lh);
            }
        }
    }

    fn set_int(&mut self, digits: &[i64]) -> Result<(), GfnError> {
        if digits.len() != self.n {
            return Err(GfnError::InvalidDigitsLength(self.n, digits.len()));
        }
        self.write_digits(digits);
        Ok(())
    }

    fn get_int(&self, out: &mut [i64]) -> Result<(), GfnError> {
        if out.len() != self.n {
            return Err(GfnError::InvalidDigitsLength(self.n, out.len()));
        }
        self.read_digits(out);
        Ok(())
    }

    fn square_dup(&mut self, dup: bool) -> f64 {
        self.run(PassKind::Square { dup })
    }

    fn init_multiplicand(&mut self, src: usize) -> Result<(), GfnError> {
        if src >= self.num_regs {
            return Err(GfnError::InvalidRegisterIndex(src, self.num_regs));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(self.reg_ptr(src) as *const f64, self.zp_ptr(), self.reg_len);
        }
        let mut e = std::mem::take(&mut self.thread_err);
        if self.num_threads <= 1 {
            unsafe { self.pass1_multiplicand(0) };
        } else {
            let this = &*self;
            e.tb_par_chunks_exact_mut(1)
                .for_each_enumerated(&this.pool, |t, _| unsafe { this.pass1_multiplicand(t) });
        }
        self.thread_err = e;
        Ok(())
    }

    fn mul(&mut self) -> f64 {
        self.run(PassKind::Mul)
    }

    fn copy(&mut self, dst: usize, src: usize) -> Result<(), GfnError> {
        if dst >= self.num_regs {
            return Err(GfnError::InvalidRegisterIndex(dst, self.num_regs));
        }
        if src >= self.num_regs {
            return Err(GfnError::InvalidRegisterIndex(src, self.num_regs));
        }
        if dst != src {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.reg_ptr(src) as *const f64,
                    self.reg_ptr(dst),
                    self.reg_len,
                );
            }
        }
        Ok(())
    }

    fn is_one(&self) -> (bool, u64) {
        let mut zi = vec![0i64; self.n];
        self.read_digits(&mut zi);
        unbalance(&mut zi, self.b);

        let mut one = zi[0] == 1;
        if one {
            for &v in zi[1..].iter() {
                one &= v == 0;
            }
        }

        let mut res = 0u64;
        for i in (1..=8).rev() {
            res = (res << 8) | (zi[self.n - i] as u8 as u64);
        }
        (one, res)
    }

    fn save_context(&self, out: &mut dyn Write) -> std::io::Result<()> {
        out.write_all(&(W as i32).to_ne_bytes())?;
        out.write_all(&self.max_err.to_ne_bytes())?;
        for r in 0..self.num_regs {
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    self.reg_ptr(r) as *const u8,
                    self.reg_len * size_of::<f64>(),
                )
            };
            out.write_all(bytes)?;
        }
        Ok(())
    }

    fn read_context(&mut self, input: &mut dyn Read) -> std::io::Result<bool> {
        let mut kind = [0u8; 4];
        input.read_exact(&mut kind)?;
        if i32::from_ne_bytes(kind) != W as i32 {
            return Ok(false);
        }
        let mut err = [0u8; 8];
        input.read_exact(&mut err)?;
        self.max_err = f64::from_ne_bytes(err);
        for r in 0..self.num_regs {
            let bytes = unsafe {
                std::slice::from_raw_parts_mut(
                    self.reg_ptr(r) as *mut u8,
                    self.reg_len * size_of::<f64>(),
                )
            };
            input.read_exact(bytes)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use rand::Rng;

    const B: u32 = 399998300;

    fn engine(n: usize, threads: usize) -> SplitBaseTransform<4> {
        SplitBaseTransform::<4>::new(B, n, threads, 2, true).unwrap()
    }

    fn digits_of(t: &impl Transform) -> Vec<i64> {
        let mut zi = vec![0i64; t.size()];
        t.get_int(&mut zi).unwrap();
        zi
    }

    #[test]
    fn test_set_get_round_trip() {
        let mut t = engine(1024, 1);
        for a in [1i32, 2, 7, 19999, 123456] {
            t.set(a);
            let zi = digits_of(&t);
            assert_eq!(zi[0], a as i64);
            assert!(zi[1..].iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn test_set_one_is_one() {
        let mut t = engine(1024, 1);
        t.set(1);
        assert_eq!(t.is_one(), (true, 1));
    }

    #[test]
    fn test_set_int_round_trip() {
        let mut t = engine(1024, 1);
        let half = (B / 2) as i64;
        let digits: Vec<i64> = (0..1024)
            .map(|_| rand::rng().random_range(-half + 1..=half))
            .collect();
        t.set_int(&digits).unwrap();
        assert_eq!(digits_of(&t), digits);
    }

    #[test]
    fn test_square_of_small_integers() {
        let mut t = engine(1024, 1);
        t.set(3);
        let err = t.square_dup(false);
        assert!((0.0..0.5).contains(&err));
        let zi = digits_of(&t);
        assert_eq!(zi[0], 9);
        assert!(zi[1..].iter().all(|&v| v == 0));

        // 40000^2 = 4*b + 6800
        t.set(40000);
        t.square_dup(false);
        let zi = digits_of(&t);
        assert_eq!(zi[0], 6800);
        assert_eq!(zi[1], 4);
        assert!(zi[2..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_square_dup_doubles() {
        let mut t = engine(1024, 1);
        t.set(5);
        t.square_dup(true);
        let zi = digits_of(&t);
        assert_eq!(zi[0], 50);
    }

    #[test]
    fn test_one_is_a_fixed_point() {
        let mut t = engine(1024, 3);
        t.set(1);
        for _ in 0..20 {
            let err = t.square_dup(false);
            assert!((0.0..1.0).contains(&err));
        }
        assert_eq!(t.is_one(), (true, 1));
    }

    #[test]
    fn test_minus_one_unbalance_encoding() {
        let mut t = engine(1024, 1);
        t.set(-1);
        let (one, res) = t.is_one();
        assert!(!one);
        assert_eq!(res, 0);
    }

    #[test]
    fn test_fingerprint_reads_trailing_digits() {
        let mut t = engine(1024, 1);
        let mut digits = vec![0i64; 1024];
        digits[1023] = 7;
        digits[1022] = 3;
        t.set_int(&digits).unwrap();
        let (one, res) = t.is_one();
        assert!(!one);
        assert_eq!(res, (3 << 8) | 7);
    }

    #[test]
    fn test_copy_between_registers() {
        let mut t = engine(1024, 1);
        t.set(12345);
        t.copy(1, 0).unwrap();
        t.set(77);
        t.copy(0, 1).unwrap();
        assert_eq!(digits_of(&t)[0], 12345);
        assert!(t.copy(2, 0).is_err());
    }

    #[test]
    fn test_mul_by_register() {
        let mut t = engine(1024, 1);
        t.set(6);
        t.copy(1, 0).unwrap();
        t.set(9);
        t.init_multiplicand(1).unwrap();
        let err = t.mul();
        assert!((0.0..0.5).contains(&err));
        let zi = digits_of(&t);
        assert_eq!(zi[0], 54);
        assert!(zi[1..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_thread_counts_agree() {
        let mut a = engine(1024, 1);
        let mut b = engine(1024, 4);
        a.set(3);
        b.set(3);
        for i in 0..16 {
            a.square_dup(i % 3 == 0);
            b.square_dup(i % 3 == 0);
        }
        assert_eq!(digits_of(&a), digits_of(&b));
    }

    #[test]
    fn test_lane_widths_agree() {
        let mut w2 = SplitBaseTransform::<2>::new(B, 1024, 2, 1, true).unwrap();
        let mut w4 = SplitBaseTransform::<4>::new(B, 1024, 2, 1, true).unwrap();
        let mut w8 = SplitBaseTransform::<8>::new(B, 1024, 2, 1, true).unwrap();
        for t in [&mut w2 as &mut dyn Transform, &mut w4, &mut w8] {
            t.set(3);
            for i in 0..12 {
                t.square_dup(i % 2 == 0);
            }
        }
        let d2 = digits_of(&w2);
        assert_eq!(d2, digits_of(&w4));
        assert_eq!(d2, digits_of(&w8));
    }

    #[test]
    fn test_larger_transform_sizes() {
        for n in [2048usize, 4096] {
            let mut t = SplitBaseTransform::<2>::new(B, n, 2, 1, true).unwrap();
            t.set(40000);
            t.square_dup(false);
            let zi = digits_of(&t);
            assert_eq!(zi[0], 6800);
            assert_eq!(zi[1], 4);
            assert!(zi[2..].iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn test_modpow_matches_bignum() {
        let n = 1024usize;
        let mut t = engine(n, 3);
        let e: u64 = 0xDEADBEEF12345678;
        t.set(1);
        let mut max_err = 0.0f64;
        for i in (0..64).rev() {
            max_err = max_err.max(t.square_dup((e >> i) & 1 == 1));
        }
        assert!(max_err < 0.4, "max err {max_err}");

        let mut digits = digits_of(&t);
        unbalance(&mut digits, B);

        let modulus = BigUint::from(B).pow(n as u32) + 1u32;
        let expected = BigUint::from(2u32).modpow(&BigUint::from(e), &modulus);
        let bb = BigUint::from(B);
        let mut rem = expected;
        for (k, &d) in digits.iter().enumerate() {
            let low = (&rem % &bb)
                .to_u64_digits()
                .first()
                .copied()
                .unwrap_or(0);
            assert_eq!(d as u64, low, "digit {k}");
            rem = &rem / &bb;
        }
        assert_eq!(rem, BigUint::from(0u32));
    }

    #[test]
    fn test_context_round_trip() {
        let mut t = engine(1024, 1);
        t.set(424242);
        t.square_dup(true);
        let saved_digits = digits_of(&t);
        let saved_err = t.max_error();

        let mut ctx = Vec::new();
        t.save_context(&mut ctx).unwrap();

        let mut u = engine(1024, 1);
        assert!(u.read_context(&mut ctx.as_slice()).unwrap());
        assert_eq!(digits_of(&u), saved_digits);
        assert_eq!(u.max_error(), saved_err);

        // a context written by another lane width is rejected
        let mut w2 = SplitBaseTransform::<2>::new(B, 1024, 1, 2, true).unwrap();
        assert!(!w2.read_context(&mut ctx.as_slice()).unwrap());
    }

    fn prp_residue(b: u32, n: usize) -> (bool, u64, f64) {
        let mut t = SplitBaseTransform::<4>::new(b, n, 4, 1, true).unwrap();
        let exponent = BigUint::from(b).pow(n as u32);
        t.set(1);
        let mut err = 0.0f64;
        for i in (0..exponent.bits()).rev() {
            err = err.max(t.square_dup(exponent.bit(i)));
        }
        let (one, res) = t.is_one();
        (one, res, err)
    }

    #[test]
    #[ignore = "full probable-prime run, use release mode"]
    fn test_reference_residue_1024() {
        let (one, res, err) = prp_residue(399998300, 1024);
        assert!(!one);
        assert_eq!(format!("{res:016x}"), "5a82277cc9c6f782");
        assert!(err < 0.25);
    }

    #[test]
    #[ignore = "full probable-prime run, use release mode"]
    fn test_reference_residue_2048() {
        let (one, res, _) = prp_residue(399998574, 2048);
        assert!(!one);
        assert_eq!(format!("{res:016x}"), "1907ebae0c183e35");
    }

    #[test]
    #[ignore = "full probable-prime run, use release mode"]
    fn test_reference_residue_4096() {
        let (one, res, _) = prp_residue(399987080, 4096);
        assert!(!one);
        assert_eq!(format!("{res:016x}"), "dced858499069664");
    }

    #[test]
    #[ignore = "full probable-prime run, use release mode"]
    fn test_reference_residue_8192() {
        let (one, res, _) = prp_residue(399992286, 8192);
        assert!(!one);
        assert_eq!(format!("{res:016x}"), "3c918e0f87815627");
    }

    #[test]
    #[ignore = "full Pepin run, use release mode"]
    fn test_pepin_rejects_composite_f10() {
        // 2^1024 + 1 is composite, so 3^(2^1023) mod 2^1024+1 is neither 1
        // nor -1 (the -1 encoding fingerprints as 0)
        let mut t = SplitBaseTransform::<4>::new(2, 1024, 4, 1, true).unwrap();
        t.set(3);
        for _ in 0..1023 {
            t.square_dup(false);
        }
        let (one, res) = t.is_one();
        assert!(!one);
        assert_ne!(res, 0);
    }
}
