//! Tests for level-ordered region growing.

use super::*;
use crate::image::initial_types;
use crate::maxima::find_maxima;

struct Grown {
    maxima: Vec<u32>,
    types: Vec<PixelType>,
    result: Result<()>,
}

fn grow(image: &Image, background: f64, limits: Option<Vec<f64>>, interrupt: &Interrupt) -> Grown {
    let mut types = initial_types(image, None, None);
    let mut maxima = vec![0u32; image.pixels().len()];
    let histogram = Histogram::from_values(image.pixels().iter().copied());
    let min = histogram.min().unwrap();
    let candidates =
        find_maxima(image, &mut types, &mut maxima, background, min, 1000).unwrap();
    let limits = limits.unwrap_or_else(|| vec![background; candidates.len() + 1]);
    let result = grow_regions(
        image,
        &mut types,
        &mut maxima,
        &histogram,
        &limits,
        background,
        interrupt,
    );
    Grown {
        maxima,
        types,
        result,
    }
}

#[test]
fn test_two_peaks_split_at_valley() {
    let image = Image::from_float(7, 1, 1, vec![1.0, 5.0, 10.0, 4.0, 8.0, 3.0, 1.0]);
    let grown = grow(&image, 0.0, None, &Interrupt::default());
    grown.result.unwrap();
    // The valley pixel joins its highest neighbour.
    assert_eq!(grown.maxima, vec![1, 1, 1, 1, 2, 2, 2]);
    assert!(
        grown
            .types
            .iter()
            .all(|t| t.contains(PixelType::MAX_AREA))
    );
}

#[test]
fn test_pixels_at_or_below_background_stay_unassigned() {
    let image = Image::from_float(5, 1, 1, vec![0.0, 2.0, 6.0, 2.0, 0.0]);
    let grown = grow(&image, 2.0, None, &Interrupt::default());
    grown.result.unwrap();
    assert_eq!(grown.maxima, vec![0, 0, 1, 0, 0]);
}

#[test]
fn test_flat_edge_preferred_on_ties() {
    #[rustfmt::skip]
    let pixels = vec![
        0.0, 0.0, 5.0,
        0.0, 1.0, 0.0,
        0.0, 5.0, 0.0,
    ];
    let image = Image::from_float(3, 3, 1, pixels);
    let grown = grow(&image, 0.0, None, &Interrupt::default());
    grown.result.unwrap();
    assert_eq!(grown.maxima[2], 1);
    assert_eq!(grown.maxima[7], 2);
    assert_eq!(grown.maxima[4], 2);
}

#[test]
fn test_flat_region_reached_by_sweeps() {
    // A long flat shelf below a single peak is assigned through repeated sweeps.
    let mut pixels = vec![3.0f32; 12];
    pixels[0] = 9.0;
    let image = Image::from_float(12, 1, 1, pixels);
    let grown = grow(&image, 0.0, None, &Interrupt::default());
    grown.result.unwrap();
    assert!(grown.maxima.iter().all(|&m| m == 1));
}

#[test]
fn test_peak_limits_prune_low_pixels() {
    let image = Image::from_float(7, 1, 1, vec![1.0, 5.0, 10.0, 4.0, 8.0, 3.0, 1.0]);
    let grown = grow(
        &image,
        0.0,
        Some(vec![0.0, 6.0, 2.0]),
        &Interrupt::default(),
    );
    grown.result.unwrap();
    assert_eq!(grown.maxima, vec![0, 0, 1, 0, 2, 2, 0]);
    assert!(
        grown
            .types
            .iter()
            .all(|t| !t.contains(PixelType::BELOW_SADDLE))
    );
}

#[test]
fn test_interrupt_checked_during_growth() {
    let pixels: Vec<f32> = (1..=100).map(|v| v as f32).collect();
    let image = Image::from_float(10, 10, 1, pixels);
    let interrupt = Interrupt::default();
    interrupt.set();
    let grown = grow(&image, 0.0, None, &interrupt);
    assert_eq!(grown.result, Err(Error::Interrupted));
}

#[test]
fn test_every_included_pixel_assigned_on_noise() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(7);
    let pixels: Vec<f32> = (0..40 * 30).map(|_| rng.random_range(0..50) as f32).collect();
    let image = Image::from_float(40, 30, 1, pixels);
    let min = image.pixels().iter().copied().fold(f32::INFINITY, f32::min);
    let grown = grow(&image, min as f64 - 1.0, None, &Interrupt::default());
    grown.result.unwrap();
    assert!(grown.maxima.iter().all(|&m| m != 0));
}
