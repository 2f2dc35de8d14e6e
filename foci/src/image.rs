//! Pixel source, mask and ROI inputs.

use num_traits::{AsPrimitive, PrimInt};
use tracing::warn;

use crate::geometry::{Coord, Geometry};
use crate::pixel_type::PixelType;

/// Greyscale 2D/3D image stored as `f32` in z-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    geometry: Geometry,
    pixels: Vec<f32>,
    is_integer: bool,
}

impl Image {
    /// Wrap float data. Panics if the length does not match the dimensions.
    pub fn from_float(width: usize, height: usize, depth: usize, pixels: Vec<f32>) -> Self {
        let geometry = Geometry::new(width, height, depth);
        assert_eq!(
            pixels.len(),
            geometry.len(),
            "pixel buffer length {} does not match {}x{}x{}",
            pixels.len(),
            width,
            height,
            depth
        );
        Self {
            geometry,
            pixels,
            is_integer: false,
        }
    }

    /// Convert integer data (any primitive integer type).
    pub fn from_integer<T>(width: usize, height: usize, depth: usize, pixels: &[T]) -> Self
    where
        T: PrimInt + AsPrimitive<f32>,
    {
        let mut image = Self::from_float(
            width,
            height,
            depth,
            pixels.iter().map(|&v| v.as_()).collect(),
        );
        image.is_integer = true;
        image
    }

    /// Stack equally sized float slices into a 3D image.
    pub fn from_float_slices(width: usize, height: usize, slices: &[&[f32]]) -> Self {
        let mut pixels = Vec::with_capacity(width * height * slices.len());
        for slice in slices {
            pixels.extend_from_slice(slice);
        }
        Self::from_float(width, height, slices.len(), pixels)
    }

    /// Stack equally sized integer slices into a 3D image.
    pub fn from_integer_slices<T>(width: usize, height: usize, slices: &[&[T]]) -> Self
    where
        T: PrimInt + AsPrimitive<f32>,
    {
        let mut pixels: Vec<f32> = Vec::with_capacity(width * height * slices.len());
        for slice in slices {
            pixels.extend(slice.iter().map(|&v| v.as_()));
        }
        let mut image = Self::from_float(width, height, slices.len(), pixels);
        image.is_integer = true;
        image
    }

    /// Same geometry, new float pixels (e.g. a blurred copy).
    pub(crate) fn with_pixels(&self, pixels: Vec<f32>) -> Self {
        assert_eq!(pixels.len(), self.pixels.len());
        Self {
            geometry: self.geometry.clone(),
            pixels,
            is_integer: false,
        }
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.pixels[index]
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.pixels[self.geometry.index(Coord::new(x, y, z))]
    }

    /// True when the data came from an integer source (histogram bins are exact values).
    #[inline]
    pub fn is_integer(&self) -> bool {
        self.is_integer
    }
}

/// Inclusion mask. Non-zero pixels are analysed.
///
/// A single-slice mask applies to every slice of a 3D image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub data: Vec<u8>,
}

impl Mask {
    pub fn new(width: usize, height: usize, depth: usize, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), width * height * depth, "mask length mismatch");
        Self {
            width,
            height,
            depth,
            data,
        }
    }

    /// Single-slice mask from a predicate on (x, y).
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(u8::from(f(x, y)));
            }
        }
        Self::new(width, height, 1, data)
    }

    fn matches(&self, geometry: &Geometry) -> bool {
        self.width == geometry.width()
            && self.height == geometry.height()
            && (self.depth == 1 || self.depth == geometry.depth())
    }
}

/// Rectangular region of interest applied to every slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    /// True when (x, y) lies on the rectangle's border.
    #[inline]
    pub fn is_edge(&self, x: usize, y: usize) -> bool {
        x == self.x || y == self.y || x + 1 == self.x + self.width || y + 1 == self.y + self.height
    }

    /// Clip to the image; `None` if the intersection is empty.
    pub fn clipped(&self, geometry: &Geometry) -> Option<Roi> {
        let x1 = (self.x + self.width).min(geometry.width());
        let y1 = (self.y + self.height).min(geometry.height());
        if self.x >= x1 || self.y >= y1 {
            return None;
        }
        Some(Roi::new(self.x, self.y, x1 - self.x, y1 - self.y))
    }
}

/// Build the initial working flags: pixels outside the ROI, outside the mask
/// or not a number are `EXCLUDED`.
///
/// A mask whose dimensions do not match the image is ignored.
pub fn initial_types(image: &Image, mask: Option<&Mask>, roi: Option<&Roi>) -> Vec<PixelType> {
    let geometry = image.geometry();
    let mask = mask.filter(|m| {
        let ok = m.matches(geometry);
        if !ok {
            warn!(
                mask = format!("{}x{}x{}", m.width, m.height, m.depth),
                image = format!(
                    "{}x{}x{}",
                    geometry.width(),
                    geometry.height(),
                    geometry.depth()
                ),
                "Mask dimensions do not match the image, ignoring mask"
            );
        }
        ok
    });
    let roi = roi.and_then(|r| {
        let clipped = r.clipped(geometry);
        if clipped.is_none() {
            warn!(?r, "ROI lies outside the image, ignoring ROI");
        }
        clipped
    });

    let slice_len = geometry.slice_len();
    image
        .pixels()
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let c = geometry.coord(i);
            let outside_roi = roi.is_some_and(|r| !r.contains(c.x, c.y));
            let outside_mask = mask.is_some_and(|m| {
                let mi = if m.depth == 1 { i % slice_len } else { i };
                m.data[mi] == 0
            });
            if outside_roi || outside_mask || v.is_nan() {
                PixelType::EXCLUDED
            } else {
                PixelType::NONE
            }
        })
        .collect()
}
