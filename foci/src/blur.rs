//! Separable Gaussian blur of each slice, used to build the search image.

use rayon::prelude::*;

use crate::image::Image;

/// Rows handed to each rayon task.
const ROWS_PER_CHUNK: usize = 8;

/// Normalized 1D Gaussian kernel with radius `ceil(3 * sigma)`.
pub fn gaussian_kernel_1d(sigma: f64) -> Vec<f32> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let radius = (3.0 * sigma).ceil() as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel.into_iter().map(|v| v as f32).collect()
}

/// Blur every x/y slice of `image` with a Gaussian of `sigma` pixels.
///
/// Pixels beyond the border repeat the edge value. A non-positive sigma
/// returns an unblurred copy.
pub fn gaussian_blur(image: &Image, sigma: f64) -> Image {
    if sigma <= 0.0 {
        return image.with_pixels(image.pixels().to_vec());
    }

    let geometry = image.geometry();
    let (width, height) = (geometry.width(), geometry.height());
    let kernel = gaussian_kernel_1d(sigma);

    let mut output = vec![0.0f32; image.pixels().len()];
    let mut temp = vec![0.0f32; geometry.slice_len()];
    for (input, out) in image
        .pixels()
        .chunks_exact(geometry.slice_len())
        .zip(output.chunks_exact_mut(geometry.slice_len()))
    {
        convolve_rows(input, &mut temp, width, &kernel);
        convolve_cols(&temp, out, width, height, &kernel);
    }

    image.with_pixels(output)
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

fn convolve_rows(input: &[f32], output: &mut [f32], width: usize, kernel: &[f32]) {
    let radius = kernel.len() / 2;
    output
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            let y_start = chunk_idx * ROWS_PER_CHUNK;
            for (local_y, out_row) in out_chunk.chunks_exact_mut(width).enumerate() {
                let y = y_start + local_y;
                let in_row = &input[y * width..(y + 1) * width];
                for (x, out) in out_row.iter_mut().enumerate() {
                    let mut sum = 0.0f32;
                    for (k, &kval) in kernel.iter().enumerate() {
                        let sx = clamp_index(x as isize + k as isize - radius as isize, width);
                        sum += in_row[sx] * kval;
                    }
                    *out = sum;
                }
            }
        });
}

fn convolve_cols(input: &[f32], output: &mut [f32], width: usize, height: usize, kernel: &[f32]) {
    let radius = kernel.len() / 2;
    output
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            let y_start = chunk_idx * ROWS_PER_CHUNK;
            for (local_y, out_row) in out_chunk.chunks_exact_mut(width).enumerate() {
                let y = y_start + local_y;
                for (x, out) in out_row.iter_mut().enumerate() {
                    let mut sum = 0.0f32;
                    for (k, &kval) in kernel.iter().enumerate() {
                        let sy = clamp_index(y as isize + k as isize - radius as isize, height);
                        sum += input[sy * width + x] * kval;
                    }
                    *out = sum;
                }
            }
        });
}
