use glam::DVec2;

use super::*;
use crate::result::Bounds;

/// A single region covering `bounds`, labelled 1 wherever `pixels > 0`.
fn region(width: usize, height: usize, pixels: Vec<f32>) -> (Image, Vec<u32>, PeakResult) {
    let image = Image::from_float(width, height, 1, pixels);
    let maxima: Vec<u32> = image.pixels().iter().map(|&v| u32::from(v > 0.0)).collect();

    let geometry = image.geometry();
    let mut best = 0;
    let mut bounds: Option<Bounds> = None;
    for (i, &m) in maxima.iter().enumerate() {
        if m == 0 {
            continue;
        }
        if image.pixels()[i] > image.pixels()[best] {
            best = i;
        }
        let c = geometry.coord(i);
        match &mut bounds {
            Some(b) => b.include(c),
            slot => *slot = Some(Bounds::point(c)),
        }
    }
    let mut peak = PeakResult::new(1, geometry.coord(best), image.pixels()[best], 0.0);
    peak.bounds = bounds.unwrap();
    (image, maxima, peak)
}

fn locate(
    image: &Image,
    maxima: &[u32],
    peak: &PeakResult,
    method: CentreMethod,
    parameter: f64,
    fitter: Option<&dyn GaussianFitter>,
) -> PeakResult {
    let mut peaks = vec![peak.clone()];
    locate_centres(&mut peaks, image, maxima, method, parameter, 0.0, fitter);
    peaks.pop().unwrap()
}

#[test]
fn test_max_value_ties_resolve_to_centroid() {
    let mut pixels = vec![0.0f32; 25];
    for x in 1..4 {
        pixels[2 * 5 + x] = 5.0;
    }
    pixels[5 + 2] = 1.0;
    let (image, maxima, peak) = region(5, 5, pixels);
    let located = locate(&image, &maxima, &peak, CentreMethod::MaxValueSearch, 0.0, None);
    assert_eq!((located.x, located.y), (2, 2));
    assert_eq!(located.centre, DVec3::new(2.0, 2.0, 0.0));
}

#[test]
fn test_max_value_even_tie_takes_lowest_index() {
    let mut pixels = vec![0.0f32; 25];
    pixels[2 * 5 + 1] = 5.0;
    pixels[2 * 5 + 2] = 5.0;
    let (image, maxima, peak) = region(5, 5, pixels);
    let located = locate(&image, &maxima, &peak, CentreMethod::MaxValueOriginal, 0.0, None);
    assert_eq!((located.x, located.y), (1, 2));
}

#[test]
fn test_centre_of_mass_shifts_towards_weight() {
    let mut pixels = vec![0.0f32; 25];
    pixels[2 * 5 + 2] = 4.0;
    pixels[2 * 5 + 3] = 2.0;
    let (image, maxima, peak) = region(5, 5, pixels);
    let located = locate(&image, &maxima, &peak, CentreMethod::CentreOfMassSearch, 2.0, None);
    assert!((located.centre.x - 14.0 / 6.0).abs() < 1e-9);
    assert_eq!(located.centre.y, 2.0);
    assert_eq!(located.x, 2);
}

#[test]
fn test_centre_of_mass_radius_limits_window() {
    // The far pixel is outside a radius of 1 around the peak.
    let mut pixels = vec![0.0f32; 9];
    pixels[0] = 9.0;
    pixels[1] = 1.0;
    pixels[8] = 1.0;
    let (image, maxima, peak) = region(9, 1, pixels);
    let windowed = locate(&image, &maxima, &peak, CentreMethod::CentreOfMassSearch, 1.0, None);
    assert!((windowed.centre.x - 0.1).abs() < 1e-9);

    let whole = locate(&image, &maxima, &peak, CentreMethod::CentreOfMassSearch, 0.0, None);
    assert!((whole.centre.x - 9.0 / 11.0).abs() < 1e-9);
}

#[test]
fn test_pixels_below_saddle_are_ignored() {
    let mut pixels = vec![0.0f32; 9];
    pixels[0] = 9.0;
    pixels[1] = 3.0;
    pixels[8] = 3.0;
    let (image, maxima, mut peak) = region(9, 1, pixels);
    peak.saddle_neighbour_id = 2;
    peak.highest_saddle_value = 3.0;
    let located = locate(&image, &maxima, &peak, CentreMethod::CentreOfMassSearch, 0.0, None);
    assert_eq!(located.centre.x, 0.0);
}

fn gaussian_image(width: usize, height: usize, centre: DVec2) -> Vec<f32> {
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let d2 = (x as f64 - centre.x).powi(2) + (y as f64 - centre.y).powi(2);
            pixels.push((1.0 + 100.0 * (-0.5 * d2 / 4.0).exp()) as f32);
        }
    }
    pixels
}

#[test]
fn test_gaussian_fit_locates_subpixel_centre() {
    let (image, maxima, peak) = region(15, 13, gaussian_image(15, 13, DVec2::new(7.3, 5.8)));
    let fitter = LmGaussianFitter::default();
    let located = locate(
        &image,
        &maxima,
        &peak,
        CentreMethod::GaussianSearch,
        0.0,
        Some(&fitter),
    );
    assert!((located.centre.x - 7.3).abs() < 0.02, "{}", located.centre);
    assert!((located.centre.y - 5.8).abs() < 0.02, "{}", located.centre);
    assert_eq!(located.centre.z, 0.0);
    assert_eq!((located.x, located.y), (7, 6));
}

#[test]
fn test_gaussian_without_fitter_is_a_no_op() {
    let (image, maxima, peak) = region(15, 13, gaussian_image(15, 13, DVec2::new(7.3, 5.8)));
    let located = locate(&image, &maxima, &peak, CentreMethod::GaussianOriginal, 0.0, None);
    assert_eq!(located, peak);
}

struct FailingFitter;

impl GaussianFitter for FailingFitter {
    fn fit(&self, _data: &[f64], _width: usize, _height: usize) -> Option<DVec2> {
        None
    }
}

#[test]
fn test_failed_fit_leaves_peak_unchanged() {
    let (image, maxima, peak) = region(15, 13, gaussian_image(15, 13, DVec2::new(7.3, 5.8)));
    let located = locate(
        &image,
        &maxima,
        &peak,
        CentreMethod::GaussianSearch,
        2.0,
        Some(&FailingFitter),
    );
    assert_eq!(located, peak);
}
