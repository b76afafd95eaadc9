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
use clap::Parser;
use gfnprp::{create_transform_with_width, SimdWidth, ERROR_LIMIT, ERROR_WARN};
use num_bigint::BigUint;
use std::process::ExitCode;
use std::time::Instant;

/// Fermat probable-prime test for generalized Fermat numbers b^n + 1.
#[derive(Parser)]
#[command(name = "gfnprp", version, about)]
struct Args {
    /// Even base b of b^n + 1
    b: u32,
    /// Number of digits n, a power of two in 2^10 ..= 2^23
    n: usize,
    /// Expected 64-bit residue in hex, verified after the run
    expected: Option<String>,
    /// Worker threads
    #[arg(short, long, default_value_t = default_threads())]
    threads: usize,
    /// Lane width override: 2, 4 or 8 doubles
    #[arg(long)]
    width: Option<usize>,
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|t| t.get())
        .unwrap_or(1)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let width = match args.width {
        None => SimdWidth::Auto,
        Some(2) => SimdWidth::X2,
        Some(4) => SimdWidth::X4,
        Some(8) => SimdWidth::X8,
        Some(w) => {
            eprintln!("error: unsupported lane width {w}");
            return ExitCode::FAILURE;
        }
    };

    let mut t = match create_transform_with_width(args.b, args.n, args.threads, 1, true, width) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!(
        "{}^{} + 1, {} thread(s), {} lanes, {} MB",
        args.b,
        args.n,
        args.threads,
        t.lane_width(),
        t.mem_size() >> 20
    );

    // Fermat test: 2^(b^n) mod b^n + 1, driven bit by bit from the MSB
    let exponent = BigUint::from(args.b).pow(args.n as u32);
    t.set(1);

    let start = Instant::now();
    let mut err = 0.0f64;
    for i in (0..exponent.bits()).rev() {
        let e = t.square_dup(exponent.bit(i));
        err = err.max(e);
        if e >= ERROR_LIMIT {
            eprintln!("error: rounding error {e} at bit {i}, the residue is unreliable");
            return ExitCode::FAILURE;
        }
    }
    let elapsed = start.elapsed().as_secs_f64();

    let (is_prp, res) = t.is_one();
    let residue = format!("{res:016x}");

    let verdict = if is_prp { "is a probable prime" } else { "is composite" };
    println!(
        "{}^{} + 1 {verdict}, err = {err:.4}, {elapsed:.2} sec, res = {residue}",
        args.b, args.n
    );
    if err >= ERROR_WARN {
        eprintln!("warning: rounding error {err} is close to the limit");
    }

    if let Some(expected) = &args.expected {
        if !expected.eq_ignore_ascii_case(&residue) {
            eprintln!("error: residue mismatch, expected {expected}");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
