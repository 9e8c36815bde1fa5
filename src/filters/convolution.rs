// SPDX-License-Identifier: MIT
//
// Convolution-family filters. All matrix filters go through one generic
// kernel application: sample the reference copy with edge-extend
// clamping, accumulate per channel, normalise by the weight sum when it
// is positive (zero-sum kernels like Sobel pass through raw), clamp to
// [0, 255] and write into the mutable stripe.
//
// Kernels are small fixed arrays passed by value; nothing here
// allocates. Two filters of the same flag class (oil painting,
// crosshatch) are not matrix convolutions but share the reference-image
// requirement and the row-slicing contract.

use super::Stripe;

/// A square convolution matrix, at most 5×5.
struct Kernel {
    size: i32,
    weights: [f32; 25],
}

impl Kernel {
    fn k3(m: [f32; 9]) -> Self {
        let mut weights = [0.0; 25];
        weights[..9].copy_from_slice(&m);
        Self { size: 3, weights }
    }

    fn k5(weights: [f32; 25]) -> Self {
        Self { size: 5, weights }
    }

    fn at(&self, ky: i32, kx: i32) -> f32 {
        self.weights[(ky * self.size + kx) as usize]
    }

    fn weight_sum(&self) -> f32 {
        self.weights[..(self.size * self.size) as usize].iter().sum()
    }
}

/// Apply `kernel` to every pixel of the stripe, reading neighbours from
/// the pre-filter reference so threads never observe each other's
/// writes.
fn apply_kernel(stripe: &mut Stripe<'_>, kernel: &Kernel) {
    let Some(reference) = stripe.reference else {
        // Dispatcher invariant: convolution filters always get a
        // reference copy. Nothing sensible to do without one.
        return;
    };
    let half = kernel.size / 2;
    let (width, height, stride) = (stripe.width, stripe.height, stripe.stride);
    let weight_sum = kernel.weight_sum();

    for (local_y, row) in stripe.out.chunks_mut(stride).enumerate() {
        let y = stripe.start_row + local_y as i32;
        for x in 0..width {
            let mut sum_b = 0.0f32;
            let mut sum_g = 0.0f32;
            let mut sum_r = 0.0f32;
            for ky in -half..=half {
                for kx in -half..=half {
                    let px = (x + kx).clamp(0, width - 1);
                    let py = (y + ky).clamp(0, height - 1);
                    let off = py as usize * stride + px as usize * 3;
                    let weight = kernel.at(ky + half, kx + half);
                    sum_b += f32::from(reference[off]) * weight;
                    sum_g += f32::from(reference[off + 1]) * weight;
                    sum_r += f32::from(reference[off + 2]) * weight;
                }
            }
            if weight_sum > 0.0 {
                sum_b /= weight_sum;
                sum_g /= weight_sum;
                sum_r /= weight_sum;
            }
            let o = x as usize * 3;
            row[o] = sum_b.clamp(0.0, 255.0) as u8;
            row[o + 1] = sum_g.clamp(0.0, 255.0) as u8;
            row[o + 2] = sum_r.clamp(0.0, 255.0) as u8;
        }
    }
}

pub(super) fn box_blur(stripe: &mut Stripe<'_>) {
    apply_kernel(stripe, &Kernel::k3([1.0; 9]));
}

pub(super) fn gaussian_blur(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
        1.0, 2.0, 1.0,
        2.0, 4.0, 2.0,
        1.0, 2.0, 1.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn gaussian_blur_5x5(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k5([
        1.0,  4.0,  6.0,  4.0, 1.0,
        4.0, 16.0, 24.0, 16.0, 4.0,
        6.0, 24.0, 36.0, 24.0, 6.0,
        4.0, 16.0, 24.0, 16.0, 4.0,
        1.0,  4.0,  6.0,  4.0, 1.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn sharpen(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
         0.0, -1.0,  0.0,
        -1.0,  5.0, -1.0,
         0.0, -1.0,  0.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn sharpen_intense(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
        -1.0, -1.0, -1.0,
        -1.0,  9.0, -1.0,
        -1.0, -1.0, -1.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn edge_detect(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
        -1.0, -1.0, -1.0,
        -1.0,  8.0, -1.0,
        -1.0, -1.0, -1.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn sobel_horizontal(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
        -1.0, -2.0, -1.0,
         0.0,  0.0,  0.0,
         1.0,  2.0,  1.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn sobel_vertical(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
        -1.0, 0.0, 1.0,
        -2.0, 0.0, 2.0,
        -1.0, 0.0, 1.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn laplacian(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
         0.0, -1.0,  0.0,
        -1.0,  4.0, -1.0,
         0.0, -1.0,  0.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn emboss(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
        -2.0, -1.0, 0.0,
        -1.0,  1.0, 1.0,
         0.0,  1.0, 2.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn emboss_intense(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k3([
        -4.0, -2.0, 0.0,
        -2.0,  1.0, 2.0,
         0.0,  2.0, 4.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn motion_blur(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k5([
        1.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 1.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn motion_blur_horizontal(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k5([
        0.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0,
        1.0, 1.0, 1.0, 1.0, 1.0,
        0.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0,
    ]);
    apply_kernel(stripe, &kernel);
}

pub(super) fn motion_blur_vertical(stripe: &mut Stripe<'_>) {
    #[rustfmt::skip]
    let kernel = Kernel::k5([
        0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
    ]);
    apply_kernel(stripe, &kernel);
}

// ---------------------------------------------------------------------------
// Reference-image specials (same flag class, not matrix kernels)
// ---------------------------------------------------------------------------

const OIL_RADIUS: i32 = 2;
const OIL_LEVELS: usize = 20;

/// Oil painting: each pixel becomes the average colour of the most
/// populous intensity bucket in its radius-2 neighbourhood.
pub(super) fn oil_painting(stripe: &mut Stripe<'_>) {
    let Some(reference) = stripe.reference else {
        return;
    };
    let (width, height, stride) = (stripe.width, stripe.height, stripe.stride);

    for (local_y, row) in stripe.out.chunks_mut(stride).enumerate() {
        let y = stripe.start_row + local_y as i32;
        for x in 0..width {
            let mut count = [0u32; OIL_LEVELS];
            let mut sum_b = [0u32; OIL_LEVELS];
            let mut sum_g = [0u32; OIL_LEVELS];
            let mut sum_r = [0u32; OIL_LEVELS];

            for dy in -OIL_RADIUS..=OIL_RADIUS {
                for dx in -OIL_RADIUS..=OIL_RADIUS {
                    let px = (x + dx).clamp(0, width - 1);
                    let py = (y + dy).clamp(0, height - 1);
                    let off = py as usize * stride + px as usize * 3;
                    let (b, g, r) = (
                        u32::from(reference[off]),
                        u32::from(reference[off + 1]),
                        u32::from(reference[off + 2]),
                    );
                    let bucket = ((r + g + b) / 3) as usize * OIL_LEVELS / 256;
                    count[bucket] += 1;
                    sum_b[bucket] += b;
                    sum_g[bucket] += g;
                    sum_r[bucket] += r;
                }
            }

            let mut best = 0usize;
            for bucket in 1..OIL_LEVELS {
                if count[bucket] > count[best] {
                    best = bucket;
                }
            }

            let n = count[best].max(1);
            let o = x as usize * 3;
            row[o] = (sum_b[best] / n) as u8;
            row[o + 1] = (sum_g[best] / n) as u8;
            row[o + 2] = (sum_r[best] / n) as u8;
        }
    }
}

const HATCH_SPACING: i32 = 8;
const HATCH_INK: u8 = 25;
const HATCH_PAPER: u8 = 255;

/// Crosshatch: white paper with diagonal ink strokes layered in as the
/// local luminance drops. Darker source pixels accumulate more stroke
/// directions.
pub(super) fn crosshatch(stripe: &mut Stripe<'_>) {
    let Some(reference) = stripe.reference else {
        return;
    };
    let (width, stride) = (stripe.width, stripe.stride);

    for (local_y, row) in stripe.out.chunks_mut(stride).enumerate() {
        let y = stripe.start_row + local_y as i32;
        for x in 0..width {
            let off = y as usize * stride + x as usize * 3;
            let luminance = (0.299 * f32::from(reference[off + 2])
                + 0.587 * f32::from(reference[off + 1])
                + 0.114 * f32::from(reference[off])) as i32;

            let on_stroke = (luminance < 200 && (x + y) % HATCH_SPACING == 0)
                || (luminance < 150 && (x - y).rem_euclid(HATCH_SPACING) == 0)
                || (luminance < 100 && (x + y + HATCH_SPACING / 2) % HATCH_SPACING == 0)
                || (luminance < 50
                    && (x - y + HATCH_SPACING / 2).rem_euclid(HATCH_SPACING) == 0);

            let v = if on_stroke { HATCH_INK } else { HATCH_PAPER };
            let o = x as usize * 3;
            row[o] = v;
            row[o + 1] = v;
            row[o + 2] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a full-image stripe over `pixels` with a detached
    /// reference copy.
    fn run_full(
        filter: fn(&mut Stripe<'_>),
        pixels: &mut [u8],
        width: i32,
        height: i32,
        stride: usize,
    ) {
        let reference = pixels.to_vec();
        let mut stripe = Stripe {
            out: pixels,
            start_row: 0,
            width,
            height,
            stride,
            reference: Some(&reference),
        };
        filter(&mut stripe);
    }

    #[test]
    fn box_blur_keeps_a_uniform_image_uniform() {
        // 4x4 solid mid-grey; edge-extend means every tap samples 128.
        let mut px = vec![128u8; 12 * 4];
        run_full(box_blur, &mut px, 4, 4, 12);
        assert!(px.iter().all(|&v| v == 128));
    }

    #[test]
    fn box_blur_averages_with_edge_extend() {
        // 3x1 gradient, BGR all-equal per pixel: values 0, 90, 255.
        let mut px = vec![0, 0, 0, 90, 90, 90, 255, 255, 255, 0, 0, 0];
        run_full(box_blur, &mut px, 3, 1, 12);
        // x=0 taps (0,0,90) per kernel row: (2*0 + 90) / 3 = 30.
        assert_eq!(&px[0..3], &[30, 30, 30]);
        // x=1 taps the originals, not the freshly blurred x=0.
        assert_eq!(&px[3..6], &[115, 115, 115]);
        assert_eq!(&px[6..9], &[200, 200, 200]);
    }

    #[test]
    fn zero_sum_kernel_passes_through_unnormalised() {
        // Sobel over a uniform image: every accumulator cancels to 0.
        let mut px = vec![77u8; 12 * 3];
        run_full(sobel_horizontal, &mut px, 4, 3, 12);
        for row in px.chunks(12) {
            assert!(row[..4 * 3].iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn sharpen_is_identity_on_uniform_regions() {
        let mut px = vec![60u8; 12 * 3];
        run_full(sharpen, &mut px, 4, 3, 12);
        for row in px.chunks(12) {
            assert!(row[..4 * 3].iter().all(|&v| v == 60));
        }
    }

    #[test]
    fn stripes_compose_to_the_full_image_result() {
        // Run gaussian blur once over the whole image and once split
        // into two stripes; the outputs must match byte for byte.
        let width = 5;
        let height = 4;
        let stride = 16;
        let base: Vec<u8> = (0..stride * height).map(|i| (i * 37 % 256) as u8).collect();

        let mut whole = base.clone();
        run_full(gaussian_blur, &mut whole, width as i32, height as i32, stride);

        let reference = base.clone();
        let mut split = base.clone();
        let (top, bottom) = split.split_at_mut(stride * 2);
        for (out, start_row) in [(top, 0), (bottom, 2)] {
            let mut stripe = Stripe {
                out,
                start_row,
                width: width as i32,
                height: height as i32,
                stride,
                reference: Some(&reference),
            };
            gaussian_blur(&mut stripe);
        }
        assert_eq!(split, whole);
    }

    #[test]
    fn oil_painting_keeps_uniform_colour() {
        let mut px = vec![200u8; 12 * 4];
        run_full(oil_painting, &mut px, 4, 4, 12);
        assert!(px.iter().all(|&v| v == 200));
    }

    #[test]
    fn crosshatch_leaves_bright_paper_blank() {
        let mut px = vec![255u8; 12 * 4];
        run_full(crosshatch, &mut px, 4, 4, 12);
        for row in px.chunks(12) {
            assert!(row[..4 * 3].iter().all(|&v| v == HATCH_PAPER));
        }
    }

    #[test]
    fn crosshatch_inks_dark_regions() {
        let mut px = vec![0u8; 12 * 4];
        run_full(crosshatch, &mut px, 4, 4, 12);
        // (0,0) sits on the principal diagonal stroke.
        assert_eq!(px[0], HATCH_INK);
        // Some paper must survive even on black input.
        assert!(px.chunks(12).any(|row| row[..12].contains(&HATCH_PAPER)));
    }
}
