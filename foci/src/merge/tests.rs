//! Tests for the merge phases and result consolidation.

use super::*;
use crate::config::SortMethod;
use crate::image::initial_types;
use crate::maxima::find_maxima;
use crate::pipeline::Interrupt;
use crate::region::grow_regions;
use crate::stats::Histogram;

struct Fixture {
    image: Image,
    types: Vec<PixelType>,
    maxima: Vec<u32>,
    set: PeakSet,
}

fn stats_with_background(image: &Image, background: f64) -> Statistics {
    Statistics {
        background,
        image_minimum: image.pixels().iter().copied().fold(f32::INFINITY, f32::min),
        ..Default::default()
    }
}

/// Run the search stages on `image` with a fixed background.
fn search(image: Image, background: f64) -> Fixture {
    let mut types = initial_types(&image, None, None);
    let mut maxima = vec![0u32; image.pixels().len()];
    let histogram = Histogram::from_values(image.pixels().iter().copied());
    let stats = stats_with_background(&image, background);
    let candidates = find_maxima(
        &image,
        &mut types,
        &mut maxima,
        background,
        stats.image_minimum,
        1000,
    )
    .unwrap();
    let limits = vec![background; candidates.len() + 1];
    grow_regions(
        &image,
        &mut types,
        &mut maxima,
        &histogram,
        &limits,
        background,
        &Interrupt::default(),
    )
    .unwrap();
    let set = PeakSet::build(&image, &mut types, &maxima, &candidates, &stats);
    Fixture {
        image,
        types,
        maxima,
        set,
    }
}

/// Two regions with a dip below the saddle inside region 1.
fn hand_built() -> Fixture {
    let image = Image::from_float(5, 1, 1, vec![10.0, 2.0, 7.0, 3.0, 8.0]);
    let maxima = vec![1, 1, 1, 2, 2];
    let mut types = vec![PixelType::MAX_AREA; 5];
    let candidates = [
        Candidate {
            index: 0,
            id: 1,
            value: 10.0,
        },
        Candidate {
            index: 4,
            id: 2,
            value: 8.0,
        },
    ];
    let stats = stats_with_background(&image, 0.0);
    let set = PeakSet::build(&image, &mut types, &maxima, &candidates, &stats);
    Fixture {
        image,
        types,
        maxima,
        set,
    }
}

#[test]
fn test_build_collects_totals_and_saddles() {
    let f = search(Image::from_float(5, 1, 1, vec![5.0, 100.0, 15.0, 20.0, 5.0]), 0.0);
    assert_eq!(f.set.len(), 2);
    assert_eq!(f.set.peak(1).count, 3);
    assert_eq!(f.set.peak(1).total_intensity, 120.0);
    assert_eq!(f.set.peak(2).count, 2);
    assert_eq!(f.set.saddles(1).highest().map(|e| (e.id, e.value)), Some((2, 15.0)));
    assert_eq!(f.set.peak(2).bounds.min.x, 3);
    assert_eq!(f.set.peak(2).bounds.max.x, 4);
}

#[test]
fn test_height_merges_low_peak_into_neighbour() {
    let mut f = search(Image::from_float(5, 1, 1, vec![5.0, 100.0, 15.0, 20.0, 5.0]), 0.0);
    let changed = f
        .set
        .merge_by_height(&mut f.types, &mut f.maxima, PeakMethod::Absolute, 10.0);

    assert_eq!(changed, 1);
    assert_eq!(f.set.len(), 1);
    let peak = f.set.peak(1);
    assert_eq!(peak.count, 5);
    assert_eq!(peak.max_value, 100.0);
    assert_eq!(peak.x, 1);
    assert_eq!(peak.total_intensity, 145.0);
    assert!(f.set.peak(2).is_merged());
    assert!(f.set.saddles(1).is_empty());
    assert_eq!(f.maxima, vec![1; 5]);
}

#[test]
fn test_height_removes_peak_without_saddle() {
    let mut f = search(Image::from_float(5, 1, 1, vec![0.0, 0.0, 9.0, 0.0, 0.0]), 0.0);
    f.set
        .merge_by_height(&mut f.types, &mut f.maxima, PeakMethod::Absolute, 10.0);
    assert!(f.set.is_empty());
    assert_eq!(f.maxima, vec![0; 5]);
    assert!(f.types.iter().all(|t| !t.contains(PixelType::MAX_AREA)));
}

#[test]
fn test_higher_peak_moves_the_representative() {
    // Relative height 0.9 fails for both peaks; the first visited (id 1, the
    // higher) merges into id 2, which adopts its position and value.
    let mut f = search(Image::from_float(5, 1, 1, vec![5.0, 100.0, 15.0, 20.0, 5.0]), 0.0);
    f.set
        .merge_by_height(&mut f.types, &mut f.maxima, PeakMethod::Relative, 0.9);
    assert_eq!(f.set.len(), 1);
    let survivor = f.set.alive().next().unwrap();
    assert_eq!(survivor.max_value, 100.0);
    assert_eq!(survivor.x, 1);
    assert_eq!(survivor.count, 5);
}

#[test]
fn test_size_merges_small_neighbour() {
    let pixels = vec![9.0, 8.0, 7.0, 6.0, 5.0, 3.0, 4.0, 1.0];
    let mut f = search(Image::from_float(8, 1, 1, pixels), 0.0);
    assert_eq!(f.set.peak(1).count, 6);
    assert_eq!(f.set.peak(2).count, 2);

    let changed = f.set.merge_by_size(&mut f.types, &mut f.maxima, 5);
    assert_eq!(changed, 1);
    assert_eq!(f.set.len(), 1);
    assert_eq!(f.set.peak(1).count, 8);
    assert_eq!(f.maxima, vec![1; 8]);
}

#[test]
fn test_size_removes_isolated_small_region() {
    let pixels = vec![0.0, 6.0, 5.0, 0.0, 0.0, 0.0, 0.0];
    let mut f = search(Image::from_float(7, 1, 1, pixels), 0.0);
    assert_eq!(f.set.peak(1).count, 2);
    f.set.merge_by_size(&mut f.types, &mut f.maxima, 5);
    assert!(f.set.is_empty());
    assert!(f.maxima.iter().all(|&m| m == 0));
}

#[test]
fn test_above_saddle_counts() {
    let mut f = hand_built();
    let mut queue = Vec::new();
    let (count, intensity) =
        f.set
            .count_above_contiguous(&f.image, &mut f.types, &f.maxima, 1, &mut queue);
    assert_eq!((count, intensity), (1, 7.0));
    assert!(f.types.iter().all(|t| !t.contains(PixelType::LISTED)));

    let (count, intensity) = f.set.count_above_anywhere(&f.image, &f.maxima, 1);
    assert_eq!((count, intensity), (2, 11.0));

    let (count, intensity) = f.set.count_above_anywhere(&f.image, &f.maxima, 2);
    assert_eq!((count, intensity), (1, 5.0));
}

#[test]
fn test_above_saddle_phase_merges_and_recounts() {
    let mut f = hand_built();
    let changed = f.set.merge_above_saddle(
        &f.image,
        &mut f.types,
        &mut f.maxima,
        AboveSaddleMode::Contiguous,
        2,
    );
    assert_eq!(changed, 1);
    assert_eq!(f.set.len(), 1);
    let peak = f.set.peak(2);
    assert_eq!(peak.count, 5);
    assert_eq!(peak.max_value, 10.0);
    assert_eq!(peak.x, 0);
    // No saddle left: everything above the background is connected.
    assert_eq!(peak.count_above_saddle, 5);
    assert_eq!(f.maxima, vec![2; 5]);
}

/// Three peaks in a row: 20 (id 1), 15 (id 2) and a small 12 (id 3) cut off
/// from id 1 by a pixel of 2. Id 1 keeps its highest saddle of 9 towards id 2
/// when it absorbs id 3.
fn saddle_kept_after_merge() -> Fixture {
    let f = search(
        Image::from_float(7, 1, 1, vec![12.0, 2.0, 20.0, 18.0, 9.0, 15.0, 14.0]),
        0.0,
    );
    assert_eq!(f.maxima, vec![3, 1, 1, 1, 1, 2, 2]);
    assert_eq!(f.set.saddles(1).highest().map(|e| (e.id, e.value)), Some((2, 9.0)));
    assert_eq!(f.set.saddles(3).highest().map(|e| (e.id, e.value)), Some((1, 2.0)));
    f
}

#[test]
fn test_non_contiguous_phase_recounts_target() {
    let mut f = saddle_kept_after_merge();
    let changed = f.set.merge_above_saddle(
        &f.image,
        &mut f.types,
        &mut f.maxima,
        AboveSaddleMode::NonContiguous,
        2,
    );
    assert_eq!(changed, 1);
    assert_eq!(f.set.len(), 2);
    assert_eq!(f.maxima, vec![1, 1, 1, 1, 1, 2, 2]);

    // The absorbed 12 lies above the unchanged saddle of 9 and now counts.
    let peak = f.set.peak(1);
    assert_eq!(peak.count, 5);
    assert_eq!(peak.count_above_saddle, 3);
    assert_eq!(peak.intensity_above_saddle, 3.0 + 11.0 + 9.0);
    assert_eq!(f.set.peak(2).count_above_saddle, 2);
}

#[test]
fn test_contiguous_phase_keeps_count_when_saddle_unchanged() {
    let mut f = saddle_kept_after_merge();
    let changed = f.set.merge_above_saddle(
        &f.image,
        &mut f.types,
        &mut f.maxima,
        AboveSaddleMode::Contiguous,
        2,
    );
    assert_eq!(changed, 1);
    assert_eq!(f.set.len(), 2);

    let peak = f.set.peak(1);
    assert_eq!(peak.count, 5);
    assert_eq!(peak.count_above_saddle, 2);
    assert_eq!(peak.intensity_above_saddle, 11.0 + 9.0);

    // A fresh flood agrees: the absorbed pixel is cut off below the saddle.
    let mut queue = Vec::new();
    let flooded = f
        .set
        .count_above_contiguous(&f.image, &mut f.types, &f.maxima, 1, &mut queue);
    assert_eq!(flooded, (2, 20.0));
}

#[test]
fn test_above_saddle_off_does_nothing() {
    let mut f = hand_built();
    let changed =
        f.set
            .merge_above_saddle(&f.image, &mut f.types, &mut f.maxima, AboveSaddleMode::Off, 10);
    assert_eq!(changed, 0);
    assert_eq!(f.set.len(), 2);
}

#[test]
fn test_merge_folds_saddle_lists() {
    let mut f = search(Image::from_float(5, 1, 1, vec![9.0, 4.0, 8.0, 2.0, 7.0]), 0.0);
    assert_eq!(f.maxima, vec![1, 1, 2, 2, 3]);
    f.set.merge(2, 1);
    assert_eq!(f.set.saddles(1).edges().len(), 1);
    assert_eq!(f.set.saddles(1).get(3).map(|e| e.value), Some(2.0));
    assert_eq!(f.set.saddles(3).get(1).map(|e| e.value), Some(2.0));
    assert!(f.set.saddles(3).get(2).is_none());
    assert_eq!(f.set.ids.find(2), 1);

    f.set.remove(3);
    assert!(f.set.saddles(1).is_empty());
    f.set.flatten(&mut f.types, &mut f.maxima);
    assert_eq!(f.maxima, vec![1, 1, 1, 1, 0]);
}

#[test]
fn test_consolidate_truncates_and_clears_dangling_saddle() {
    let f = search(Image::from_float(5, 1, 1, vec![5.0, 100.0, 15.0, 20.0, 5.0]), 0.0);
    let Fixture {
        image,
        mut types,
        mut maxima,
        set,
    } = f;
    let params = Params {
        sort_method: SortMethod::MaxValue,
        max_peaks: 1,
        ..Params::default()
    };
    let peaks = set.consolidate(&image, &mut types, &mut maxima, &params, None);

    assert_eq!(peaks.len(), 1);
    let peak = &peaks[0];
    assert_eq!(peak.id, 1);
    assert_eq!(peak.max_value, 100.0);
    assert_eq!(peak.saddle_neighbour_id, 0);
    assert_eq!(peak.highest_saddle_value, 0.0);
    assert_eq!(peak.count_above_saddle, 1);
    assert_eq!(peak.intensity_above_saddle, 85.0);
    assert_eq!(maxima, vec![1, 1, 1, 0, 0]);
}

#[test]
fn test_consolidate_keeps_saddle_neighbours() {
    let f = search(Image::from_float(5, 1, 1, vec![5.0, 100.0, 15.0, 20.0, 5.0]), 0.0);
    let Fixture {
        image,
        mut types,
        mut maxima,
        set,
    } = f;
    let params = Params {
        sort_method: SortMethod::Count,
        ..Params::default()
    };
    let peaks = set.consolidate(&image, &mut types, &mut maxima, &params, None);
    assert_eq!(peaks.len(), 2);
    assert_eq!(peaks[0].saddle_neighbour_id, 2);
    assert_eq!(peaks[1].saddle_neighbour_id, 1);
    assert_eq!(peaks[0].highest_saddle_value, 15.0);
    assert_eq!(peaks[0].intensity_minus_background, 120.0);
    assert_eq!(peaks[0].intensity_minus_min, 120.0 - 3.0 * 5.0);
}

fn two_spots(width: usize, spot_x: usize) -> Image {
    let mut pixels = vec![1.0f32; width * width];
    let centre = width / 2;
    pixels[centre * width + centre] = 100.0;
    pixels[centre * width + spot_x] = 50.0;
    Image::from_float(width, width, 1, pixels)
}

#[test]
fn test_consolidate_removes_image_edge_maxima() {
    let f = search(two_spots(5, 0), 1.0);
    let Fixture {
        image,
        mut types,
        mut maxima,
        set,
    } = f;
    assert_eq!(set.len(), 2);
    let params = Params {
        remove_edge_maxima: true,
        ..Params::default()
    };
    let peaks = set.consolidate(&image, &mut types, &mut maxima, &params, None);
    assert_eq!(peaks.len(), 1);
    assert_eq!((peaks[0].x, peaks[0].y), (2, 2));
    assert_eq!(maxima.iter().filter(|&&m| m != 0).count(), 1);
    assert_eq!(maxima[12], 1);
}

#[test]
fn test_edge_removal_clears_dangling_saddle() {
    // Middle row of a 9x3 image: 60 (edge) | 50 45 80 30 70 | 1 1 1.
    let mut pixels = vec![1.0f32; 27];
    for (x, v) in [60.0, 50.0, 45.0, 80.0, 30.0, 70.0].into_iter().enumerate() {
        pixels[9 + x] = v;
    }
    let Fixture {
        image,
        mut types,
        mut maxima,
        set,
    } = search(Image::from_float(9, 3, 1, pixels), 1.0);
    assert_eq!(set.len(), 3);
    assert_eq!(set.saddles(1).highest().map(|e| (e.id, e.value)), Some((3, 45.0)));

    let params = Params {
        remove_edge_maxima: true,
        ..Params::default()
    };
    let peaks = set.consolidate(&image, &mut types, &mut maxima, &params, None);
    assert_eq!(peaks.len(), 2);

    let high = peaks.iter().find(|p| p.max_value == 80.0).unwrap();
    let low = peaks.iter().find(|p| p.max_value == 70.0).unwrap();
    assert_eq!(high.saddle_neighbour_id, 0);
    assert_eq!(high.highest_saddle_value, 0.0);
    assert_eq!(high.count_above_saddle, 1);
    assert_eq!(low.saddle_neighbour_id, high.id);
    assert_eq!(low.highest_saddle_value, 30.0);
    assert_eq!(maxima[9], 0);
    assert_eq!(maxima[10], 0);
}

#[test]
fn test_consolidate_removes_roi_edge_maxima() {
    let f = search(two_spots(7, 1), 1.0);
    let Fixture {
        image,
        mut types,
        mut maxima,
        set,
    } = f;
    let params = Params {
        remove_edge_maxima: true,
        ..Params::default()
    };
    let roi = Roi::new(1, 1, 5, 5);
    let peaks = set.consolidate(&image, &mut types, &mut maxima, &params, Some(&roi));
    assert_eq!(peaks.len(), 1);
    assert_eq!((peaks[0].x, peaks[0].y), (3, 3));
}

#[test]
fn test_phases_conserve_assigned_pixels() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(11);
    let pixels: Vec<f32> = (0..32 * 32).map(|_| rng.random_range(0..40) as f32).collect();
    let mut f = search(Image::from_float(32, 32, 1, pixels), 5.0);
    let initial = f.set.len();

    f.set
        .merge_by_height(&mut f.types, &mut f.maxima, PeakMethod::Absolute, 8.0);
    let after_height = f.set.len();
    f.set.merge_by_size(&mut f.types, &mut f.maxima, 4);
    let after_size = f.set.len();
    f.set.merge_above_saddle(
        &f.image,
        &mut f.types,
        &mut f.maxima,
        AboveSaddleMode::Contiguous,
        4,
    );
    let after_final = f.set.len();
    assert!(initial >= after_height && after_height >= after_size && after_size >= after_final);

    let assigned = f.maxima.iter().filter(|&&m| m != 0).count();
    let counted: usize = f.set.alive().map(|p| p.count).sum();
    assert_eq!(assigned, counted);
    for peak in f.set.alive() {
        assert!(f.maxima.contains(&peak.id));
        assert!(peak.count_above_saddle <= peak.count);
        if let Some(edge) = f.set.saddles(peak.id).highest() {
            assert!(edge.value <= peak.max_value);
        }
    }
}
