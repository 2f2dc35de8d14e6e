//! Tests for saddle discovery and saddle list maintenance.

use super::*;

fn edge(id: u32, value: f32) -> SaddleEdge {
    SaddleEdge { id, value }
}

#[test]
fn test_list_sorted_and_deduplicated() {
    let list = SaddleList::from_edges([edge(3, 5.0), edge(1, 9.0), edge(2, 5.0), edge(3, 7.0)]);
    assert_eq!(list.edges(), &[edge(1, 9.0), edge(3, 7.0), edge(2, 5.0)]);
    assert_eq!(list.highest(), Some(edge(1, 9.0)));
}

#[test]
fn test_equal_values_order_by_id() {
    let list = SaddleList::from_edges([edge(4, 2.0), edge(2, 2.0)]);
    assert_eq!(list.edges(), &[edge(2, 2.0), edge(4, 2.0)]);
}

#[test]
fn test_rename_keeps_max() {
    let mut list = SaddleList::from_edges([edge(1, 3.0), edge(2, 8.0)]);
    list.rename(1, 2);
    assert_eq!(list.edges(), &[edge(2, 8.0)]);

    let mut list = SaddleList::from_edges([edge(1, 9.0), edge(2, 8.0)]);
    list.rename(1, 2);
    assert_eq!(list.edges(), &[edge(2, 9.0)]);

    let mut list = SaddleList::from_edges([edge(1, 9.0)]);
    list.rename(5, 2);
    assert_eq!(list.edges(), &[edge(1, 9.0)]);
}

fn bounds_of(geometry: &Geometry, maxima: &[u32], peaks: usize) -> Vec<Bounds> {
    let mut bounds: Vec<Option<Bounds>> = vec![None; peaks];
    for (i, &m) in maxima.iter().enumerate() {
        if m == 0 {
            continue;
        }
        let c = geometry.coord(i);
        match &mut bounds[m as usize - 1] {
            Some(b) => b.include(c),
            slot => *slot = Some(Bounds::point(c)),
        }
    }
    bounds.into_iter().map(|b| b.unwrap()).collect()
}

#[test]
fn test_saddle_is_highest_boundary_minimum() {
    // Two regions meeting along a column; the boundary heights are the lower
    // of each touching pair.
    #[rustfmt::skip]
    let pixels = vec![
        2.0, 4.0, 3.0, 1.0,
        5.0, 9.0, 6.0, 8.0,
        2.0, 3.0, 2.0, 1.0,
    ];
    #[rustfmt::skip]
    let maxima = vec![
        1, 1, 2, 2,
        1, 1, 2, 2,
        1, 1, 2, 2,
    ];
    let image = Image::from_float(4, 3, 1, pixels);
    let mut types = vec![PixelType::MAX_AREA; 12];
    let bounds = bounds_of(image.geometry(), &maxima, 2);
    let mut scratch = SaddleScratch::with_capacity(2);
    let saddles = find_saddles(&image, &mut types, &maxima, &bounds, &mut scratch);

    // Pair (9, 6) gives 6; every other pair is lower.
    assert_eq!(saddles[1].edges(), &[edge(2, 6.0)]);
    assert_eq!(saddles[2].edges(), &[edge(1, 6.0)]);
    assert!(types.iter().all(|t| !t.contains(PixelType::SADDLE_SEARCH)));
}

#[test]
fn test_unassigned_gap_means_no_saddle() {
    let pixels = vec![5.0, 1.0, 0.0, 1.0, 5.0];
    let maxima = vec![1, 1, 0, 2, 2];
    let image = Image::from_float(5, 1, 1, pixels);
    let mut types = vec![PixelType::NONE; 5];
    let bounds = bounds_of(image.geometry(), &maxima, 2);
    let mut scratch = SaddleScratch::default();
    let saddles = find_saddles(&image, &mut types, &maxima, &bounds, &mut scratch);
    assert!(saddles[1].is_empty());
    assert!(saddles[2].is_empty());
}

#[test]
fn test_three_regions_keep_all_neighbours() {
    let pixels = vec![9.0, 4.0, 8.0, 2.0, 7.0];
    let maxima = vec![1, 1, 2, 3, 3];
    let image = Image::from_float(5, 1, 1, pixels);
    let mut types = vec![PixelType::NONE; 5];
    let bounds = bounds_of(image.geometry(), &maxima, 3);
    let mut scratch = SaddleScratch::with_capacity(3);
    let saddles = find_saddles(&image, &mut types, &maxima, &bounds, &mut scratch);
    assert_eq!(saddles[2].edges(), &[edge(1, 4.0), edge(3, 2.0)]);
    assert_eq!(saddles[1].edges(), &[edge(2, 4.0)]);
    assert_eq!(saddles[3].edges(), &[edge(2, 2.0)]);
}

#[test]
fn test_scratch_reused_across_calls() {
    let pixels = vec![9.0, 4.0, 8.0];
    let maxima = vec![1, 1, 2];
    let image = Image::from_float(3, 1, 1, pixels);
    let mut scratch = SaddleScratch::with_capacity(2);
    for _ in 0..2 {
        let mut types = vec![PixelType::NONE; 3];
        let bounds = bounds_of(image.geometry(), &maxima, 2);
        let saddles = find_saddles(&image, &mut types, &maxima, &bounds, &mut scratch);
        assert_eq!(saddles[1].edges(), &[edge(2, 4.0)]);
    }
}
