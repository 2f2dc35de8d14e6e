//! Image geometry: coordinate linearisation and neighbour tables.
//!
//! Pixels are stored z-major, then y, then x (`index = (z * height + y) * width + x`).
//! Every offset table in the crate is derived from this single linearisation.

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

/// Neighbours of a pixel in 3D (26-connectivity).
pub const MAX_NEIGHBOURS: usize = 26;

/// Forward half of the 3D neighbourhood; each unordered pixel pair is visited once.
pub const MAX_HALF_NEIGHBOURS: usize = 13;

/// Pixel position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Coord {
    #[inline]
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance to a floating point position.
    #[inline]
    pub fn distance_sq_to(&self, x: f64, y: f64, z: f64) -> f64 {
        let dx = self.x as f64 - x;
        let dy = self.y as f64 - y;
        let dz = self.z as f64 - z;
        dx * dx + dy * dy + dz * dz
    }
}

/// One step to a neighbouring pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Direction {
    pub dx: i8,
    pub dy: i8,
    pub dz: i8,
    /// Linear index offset, valid for pixels away from the border.
    pub offset: isize,
    /// Axis-aligned step (exactly one non-zero component).
    pub flat_edge: bool,
}

/// Width/height/depth of an image plus the neighbour tables for that shape.
///
/// Built once per image and passed by reference to every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    width: usize,
    height: usize,
    depth: usize,
    directions: ArrayVec<Direction, MAX_NEIGHBOURS>,
    half_directions: ArrayVec<Direction, MAX_HALF_NEIGHBOURS>,
}

impl Geometry {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        assert!(
            width > 0 && height > 0 && depth > 0,
            "image dimensions must be positive, got {width}x{height}x{depth}"
        );

        let row = width as isize;
        let slice = (width * height) as isize;

        // In-plane ring first (clockwise from "up"), then the slice below and above.
        const RING: [(i8, i8); 8] = [
            (0, -1),
            (1, -1),
            (1, 0),
            (1, 1),
            (0, 1),
            (-1, 1),
            (-1, 0),
            (-1, -1),
        ];

        let mut steps: ArrayVec<(i8, i8, i8), MAX_NEIGHBOURS> = ArrayVec::new();
        for &(dx, dy) in &RING {
            steps.push((dx, dy, 0));
        }
        if depth > 1 {
            for dz in [-1i8, 1] {
                steps.push((0, 0, dz));
                for &(dx, dy) in &RING {
                    steps.push((dx, dy, dz));
                }
            }
        }

        let mut directions = ArrayVec::new();
        let mut half_directions = ArrayVec::new();
        for (dx, dy, dz) in steps {
            let non_zero = [dx, dy, dz].iter().filter(|&&d| d != 0).count();
            let direction = Direction {
                dx,
                dy,
                dz,
                offset: dz as isize * slice + dy as isize * row + dx as isize,
                flat_edge: non_zero == 1,
            };
            if dz > 0 || (dz == 0 && (dy > 0 || (dy == 0 && dx > 0))) {
                half_directions.push(direction);
            }
            directions.push(direction);
        }

        Self {
            width,
            height,
            depth,
            directions,
            half_directions,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn is_3d(&self) -> bool {
        self.depth > 1
    }

    /// Total number of pixels.
    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn slice_len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn index(&self, c: Coord) -> usize {
        debug_assert!(c.x < self.width && c.y < self.height && c.z < self.depth);
        (c.z * self.height + c.y) * self.width + c.x
    }

    #[inline]
    pub fn coord(&self, index: usize) -> Coord {
        debug_assert!(index < self.len());
        let slice = self.slice_len();
        let z = index / slice;
        let rem = index - z * slice;
        let y = rem / self.width;
        Coord::new(rem - y * self.width, y, z)
    }

    /// All neighbour directions (8 in 2D, 26 in 3D).
    #[inline]
    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    /// Forward half of the neighbourhood (4 in 2D, 13 in 3D).
    #[inline]
    pub fn half_directions(&self) -> &[Direction] {
        &self.half_directions
    }

    /// True when every neighbour of `c` is inside the image.
    #[inline]
    pub fn is_inner(&self, c: Coord) -> bool {
        c.x > 0
            && c.x + 1 < self.width
            && c.y > 0
            && c.y + 1 < self.height
            && (self.depth == 1 || (c.z > 0 && c.z + 1 < self.depth))
    }

    /// True when `c` lies on the left/right/top/bottom border of its slice.
    #[inline]
    pub fn is_xy_edge(&self, c: Coord) -> bool {
        c.x == 0 || c.y == 0 || c.x + 1 == self.width || c.y + 1 == self.height
    }

    /// Linear index of the neighbour in `direction`, or `None` outside the image.
    #[inline]
    pub fn step(&self, c: Coord, direction: &Direction) -> Option<usize> {
        let x = c.x.checked_add_signed(direction.dx as isize)?;
        let y = c.y.checked_add_signed(direction.dy as isize)?;
        let z = c.z.checked_add_signed(direction.dz as isize)?;
        if x < self.width && y < self.height && z < self.depth {
            Some(self.index(Coord::new(x, y, z)))
        } else {
            None
        }
    }

    /// Iterate the in-bounds neighbours of a pixel as `(index, direction)`.
    #[inline]
    pub fn neighbours(&self, index: usize) -> Neighbours<'_> {
        Neighbours::new(self, index, &self.directions)
    }

    /// Iterate the in-bounds forward half-neighbours of a pixel.
    #[inline]
    pub fn half_neighbours(&self, index: usize) -> Neighbours<'_> {
        Neighbours::new(self, index, &self.half_directions)
    }
}

/// Iterator over the neighbours of one pixel.
///
/// Inner pixels use the precomputed linear offsets, border pixels fall back to
/// per-direction bounds checks.
pub struct Neighbours<'a> {
    geometry: &'a Geometry,
    directions: std::slice::Iter<'a, Direction>,
    index: usize,
    coord: Coord,
    inner: bool,
}

impl<'a> Neighbours<'a> {
    fn new(geometry: &'a Geometry, index: usize, directions: &'a [Direction]) -> Self {
        let coord = geometry.coord(index);
        Self {
            geometry,
            directions: directions.iter(),
            index,
            coord,
            inner: geometry.is_inner(coord),
        }
    }
}

impl<'a> Iterator for Neighbours<'a> {
    type Item = (usize, &'a Direction);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let direction = self.directions.next()?;
            if self.inner {
                return Some(((self.index as isize + direction.offset) as usize, direction));
            }
            if let Some(j) = self.geometry.step(self.coord, direction) {
                return Some((j, direction));
            }
        }
    }
}
