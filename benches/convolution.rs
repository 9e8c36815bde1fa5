// SPDX-License-Identifier: MIT
//
// Convolution throughput over a synthetic image, single stripe. Run
// with `cargo bench`.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bmpfilterd::filters::{FilterId, Stripe};

const WIDTH: i32 = 256;
const HEIGHT: i32 = 256;
const STRIDE: usize = (WIDTH as usize * 3 + 3) / 4 * 4;

fn synthetic_pixels() -> Vec<u8> {
    (0..STRIDE * HEIGHT as usize)
        .map(|i| (i.wrapping_mul(2654435761)) as u8)
        .collect()
}

fn bench_filter(c: &mut Criterion, name: &str, id: FilterId) {
    let reference = synthetic_pixels();
    let mut out = reference.clone();
    c.bench_function(name, |b| {
        b.iter(|| {
            let mut stripe = Stripe {
                out: black_box(&mut out),
                start_row: 0,
                width: WIDTH,
                height: HEIGHT,
                stride: STRIDE,
                reference: Some(&reference),
            };
            (id.spec().run)(&mut stripe);
        })
    });
}

fn benches(c: &mut Criterion) {
    bench_filter(c, "gaussian_3x3_256", FilterId::GaussianBlur);
    bench_filter(c, "gaussian_5x5_256", FilterId::GaussianBlur5x5);
    bench_filter(c, "box_blur_256", FilterId::Blur);
    bench_filter(c, "black_and_white_256", FilterId::BlackAndWhite);
}

criterion_group!(convolution, benches);
criterion_main!(convolution);
