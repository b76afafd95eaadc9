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
use std::error::Error;
use std::fmt::Formatter;

#[derive(Clone, Debug)]
pub enum GfnError {
    OutOfMemory(usize),
    /// The base of b^N + 1 must be even and at least 2.
    UnsupportedBase(u32),
    /// The transform length must be a power of two in `2^10 ..= 2^23`.
    UnsupportedTransformSize(usize),
    InvalidThreadCount(usize),
    InvalidRegisterCount(usize),
    InvalidRegisterIndex(usize, usize),
    InvalidDigitsLength(usize, usize),
}

impl Error for GfnError {}

impl std::fmt::Display for GfnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GfnError::OutOfMemory(length) => {
                f.write_fmt(format_args!("Cannot allocate {length} bytes"))
            }
            GfnError::UnsupportedBase(b) => f.write_fmt(format_args!(
                "Base {b} is not supported, it must be even and at least 2"
            )),
            GfnError::UnsupportedTransformSize(n) => f.write_fmt(format_args!(
                "Transform length {n} is not supported, it must be a power of two in 1024..=8388608"
            )),
            GfnError::InvalidThreadCount(t) => f.write_fmt(format_args!(
                "Thread count must be at least 1, but it was {t}"
            )),
            GfnError::InvalidRegisterCount(r) => f.write_fmt(format_args!(
                "Register count must be at least 1, but it was {r}"
            )),
            GfnError::InvalidRegisterIndex(r, count) => f.write_fmt(format_args!(
                "Register index {r} is out of range, only {count} register(s) were allocated"
            )),
            GfnError::InvalidDigitsLength(s0, s1) => f.write_fmt(format_args!(
                "Digits length expected to be {s0}, but it was {s1}"
            )),
        }
    }
}
