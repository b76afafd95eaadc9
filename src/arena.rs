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
use crate::err::GfnError;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// One zero-initialized mega-buffer holding every engine region (twiddle
/// tables, spectral registers, carry slots, scratch). The 2 MiB base
/// alignment lets the allocator back it with huge pages. All slicing is done
/// by the engine through raw offsets; nothing is allocated after
/// construction.
pub(crate) struct Arena {
    ptr: NonNull<f64>,
    layout: Layout,
}

/// The engine partitions the arena into per-thread disjoint ranges; the only
/// cross-thread reads happen across pass barriers.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

pub(crate) const ARENA_ALIGN: usize = 2 * 1024 * 1024;

impl Arena {
    pub(crate) fn zeroed(len_f64: usize) -> Result<Arena, GfnError> {
        // a zero-size layout is undefined behavior for alloc_zeroed
        if len_f64 == 0 {
            return Err(GfnError::OutOfMemory(0));
        }
        let bytes = len_f64 * size_of::<f64>();
        let layout = Layout::from_size_align(bytes, ARENA_ALIGN)
            .map_err(|_| GfnError::OutOfMemory(bytes))?;
        let raw = unsafe { alloc_zeroed(layout) };
        match NonNull::new(raw as *mut f64) {
            Some(ptr) => Ok(Arena { ptr, layout }),
            None => Err(GfnError::OutOfMemory(bytes)),
        }
    }

    #[inline(always)]
    pub(crate) fn as_ptr(&self) -> *mut f64 {
        self.ptr.as_ptr()
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, self.layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_is_rejected() {
        assert!(Arena::zeroed(0).is_err());
    }

    #[test]
    fn test_arena_is_zeroed_and_aligned() {
        let a = Arena::zeroed(4096).unwrap();
        assert_eq!(a.as_ptr() as usize % ARENA_ALIGN, 0);
        for k in 0..4096 {
            assert_eq!(unsafe { *a.as_ptr().add(k) }, 0.0);
        }
    }
}
