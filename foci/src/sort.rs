//! Result ordering and id renumbering.

use std::cmp::Ordering;

use crate::config::SortMethod;
use crate::pixel_type::PixelType;
use crate::result::PeakResult;

/// Sort key of a peak for a value-based method.
fn sort_value(peak: &PeakResult, method: SortMethod, background: f64) -> f64 {
    match method {
        SortMethod::Intensity => peak.total_intensity,
        SortMethod::IntensityMinusBackground => peak.intensity_minus_background,
        SortMethod::IntensityMinusMin => peak.intensity_minus_min,
        SortMethod::Count => peak.count as f64,
        SortMethod::MaxValue => peak.max_value as f64,
        SortMethod::AverageIntensity => peak.average_intensity(),
        SortMethod::AverageIntensityMinusBackground => peak.average_intensity_minus_background(),
        SortMethod::AverageIntensityMinusMin => peak.average_intensity_minus_min(),
        SortMethod::X => peak.x as f64,
        SortMethod::Y => peak.y as f64,
        SortMethod::Z => peak.z as f64,
        SortMethod::SaddleHeight => peak.highest_saddle_value,
        SortMethod::CountAboveSaddle => peak.count_above_saddle as f64,
        SortMethod::IntensityAboveSaddle => peak.intensity_above_saddle,
        SortMethod::AbsoluteHeight => peak.absolute_height(background),
        SortMethod::RelativeHeightAboveBackground => {
            peak.relative_height_above_background(background)
        }
        SortMethod::PeakId => peak.id as f64,
        SortMethod::Xyz => unreachable!("Xyz is compared lexicographically"),
    }
}

/// Order peaks by `method`. Value sorts are descending, coordinate and id
/// sorts ascending; ties break on ascending id so the order is total.
pub fn sort_peaks(peaks: &mut [PeakResult], method: SortMethod, background: f64) {
    let cmp = |a: &PeakResult, b: &PeakResult| -> Ordering {
        let primary = match method {
            SortMethod::Xyz => (a.x, a.y, a.z).cmp(&(b.x, b.y, b.z)),
            _ => {
                let va = sort_value(a, method, background);
                let vb = sort_value(b, method, background);
                if method.is_ascending() {
                    va.total_cmp(&vb)
                } else {
                    vb.total_cmp(&va)
                }
            }
        };
        primary.then(a.id.cmp(&b.id))
    };
    peaks.sort_by(cmp);
}

/// Renumber `peaks` 1..N in their current order and remap `maxima`.
///
/// Pixels of ids missing from `peaks` become unassigned. A saddle neighbour
/// that no longer exists, or that now maps onto the peak itself, is replaced
/// by "no saddle".
pub fn renumber(
    peaks: &mut [PeakResult],
    maxima: &mut [u32],
    types: &mut [PixelType],
    no_saddle: f64,
) {
    let max_id = peaks
        .iter()
        .map(|p| p.id)
        .chain(maxima.iter().copied())
        .max()
        .unwrap_or(0);
    let mut table = vec![0u32; max_id as usize + 1];
    for (rank, peak) in peaks.iter().enumerate() {
        table[peak.id as usize] = rank as u32 + 1;
    }

    for peak in peaks.iter_mut() {
        peak.id = table[peak.id as usize];
        let neighbour = table
            .get(peak.saddle_neighbour_id as usize)
            .copied()
            .unwrap_or(0);
        if neighbour == 0 || neighbour == peak.id {
            peak.saddle_neighbour_id = 0;
            peak.highest_saddle_value = no_saddle;
        } else {
            peak.saddle_neighbour_id = neighbour;
        }
    }

    for (m, t) in maxima.iter_mut().zip(types.iter_mut()) {
        if *m != 0 {
            *m = table[*m as usize];
            if *m == 0 {
                t.remove(PixelType::MAX_AREA);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coord;
    use strum::IntoEnumIterator;

    fn peak(id: u32, x: usize, intensity: f64, count: usize) -> PeakResult {
        let mut p = PeakResult::new(id, Coord::new(x, 0, 0), 10.0, 0.0);
        p.total_intensity = intensity;
        p.count = count;
        p
    }

    #[test]
    fn test_intensity_descending_ties_by_id() {
        let mut peaks = vec![peak(3, 0, 5.0, 1), peak(1, 1, 9.0, 1), peak(2, 2, 5.0, 1)];
        sort_peaks(&mut peaks, SortMethod::Intensity, 0.0);
        let ids: Vec<u32> = peaks.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_x_ascending() {
        let mut peaks = vec![peak(1, 5, 1.0, 1), peak(2, 2, 1.0, 1), peak(3, 9, 1.0, 1)];
        sort_peaks(&mut peaks, SortMethod::X, 0.0);
        let xs: Vec<usize> = peaks.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2, 5, 9]);
    }

    #[test]
    fn test_sort_then_renumber_is_idempotent_for_every_method() {
        for method in SortMethod::iter() {
            let mut peaks: Vec<PeakResult> = (1..=6)
                .map(|i| peak(i, (i as usize * 7) % 4, (i % 3) as f64, (i % 2) as usize + 1))
                .collect();
            let mut maxima: Vec<u32> = (1..=6).collect();
            let mut types = vec![PixelType::MAX_AREA; 6];

            sort_peaks(&mut peaks, method, 0.0);
            renumber(&mut peaks, &mut maxima, &mut types, 0.0);
            let first: Vec<PeakResult> = peaks.clone();

            sort_peaks(&mut peaks, method, 0.0);
            assert_eq!(peaks, first, "{method} order changed after renumbering");
        }
    }

    #[test]
    fn test_renumber_drops_missing_ids_and_dangling_saddles() {
        let mut a = peak(4, 0, 1.0, 1);
        a.saddle_neighbour_id = 2;
        a.highest_saddle_value = 3.0;
        let mut b = peak(7, 1, 1.0, 1);
        b.saddle_neighbour_id = 4;
        b.highest_saddle_value = 3.0;
        let mut peaks = vec![a, b];
        let mut maxima = vec![4, 2, 7, 0];
        let mut types = vec![
            PixelType::MAX_AREA,
            PixelType::MAX_AREA,
            PixelType::MAX_AREA,
            PixelType::NONE,
        ];
        renumber(&mut peaks, &mut maxima, &mut types, f64::NEG_INFINITY);

        assert_eq!(maxima, vec![1, 0, 2, 0]);
        assert!(!types[1].contains(PixelType::MAX_AREA));
        assert_eq!(peaks[0].id, 1);
        assert_eq!(peaks[0].saddle_neighbour_id, 0);
        assert_eq!(peaks[0].highest_saddle_value, f64::NEG_INFINITY);
        assert_eq!(peaks[1].saddle_neighbour_id, 1);
    }
}
