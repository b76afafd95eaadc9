/*
 * // Copyright (c) Radzivon Bartoshyk 1/2026. All rights reserved.
 * //
 * // Use of this source code is governed by a BSD-style
 * // license that can be found in the LICENSE file.
 */
use criterion::{criterion_group, criterion_main, Criterion};
use gfnprp::{create_transform, create_transform_with_width, SimdWidth, Transform};

pub fn bench_square_dup(c: &mut Criterion) {
    let mut t = create_transform(399998300, 1024, 1, 1, false).unwrap();
    t.set(3);
    c.bench_function("square_dup n=1024", |b| b.iter(|| t.square_dup(true)));

    let mut t = create_transform(399992286, 8192, 4, 1, false).unwrap();
    t.set(3);
    c.bench_function("square_dup n=8192 t=4", |b| b.iter(|| t.square_dup(true)));

    let mut t = create_transform_with_width(399998300, 1024, 1, 1, false, SimdWidth::X2).unwrap();
    t.set(3);
    c.bench_function("square_dup n=1024 x2", |b| b.iter(|| t.square_dup(true)));
}

criterion_group!(benches, bench_square_dup);
criterion_main!(benches);
