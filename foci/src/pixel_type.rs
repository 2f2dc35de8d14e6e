//! Per-pixel working flags.
//!
//! Every flag has its own bit. Stages only rely on the flags listed in their
//! own docs; transient flags (`LISTED`, `PLATEAU`, `SADDLE_SEARCH`,
//! `BELOW_SADDLE`) are cleared by the routine that set them.

use std::ops::{BitAnd, BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelType(u8);

impl PixelType {
    pub const NONE: Self = Self(0);
    /// Outside the mask/ROI or not a number. Never searched or grown.
    pub const EXCLUDED: Self = Self(1);
    /// Representative pixel of a candidate maximum.
    pub const MAXIMUM: Self = Self(1 << 1);
    /// Queued by the current flood. Transient.
    pub const LISTED: Self = Self(1 << 2);
    /// Assigned to a region (non-zero entry in the maxima map).
    pub const MAX_AREA: Self = Self(1 << 3);
    /// Part of the plateau being flooded. Transient.
    pub const PLATEAU: Self = Self(1 << 4);
    /// Has a strictly higher neighbour; cannot be a maximum.
    pub const NOT_MAXIMUM: Self = Self(1 << 5);
    /// Touches a pixel of another region. Transient, saddle search only.
    pub const SADDLE_SEARCH: Self = Self(1 << 6);
    /// Pruned below a per-peak threshold. Transient, search pruning only.
    pub const BELOW_SADDLE: Self = Self(1 << 7);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for PixelType {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PixelType {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for PixelType {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Clear `flags` from every pixel.
pub fn clear_all(types: &mut [PixelType], flags: PixelType) {
    types.iter_mut().for_each(|t| t.remove(flags));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_distinct() {
        let all = [
            PixelType::EXCLUDED,
            PixelType::MAXIMUM,
            PixelType::LISTED,
            PixelType::MAX_AREA,
            PixelType::PLATEAU,
            PixelType::NOT_MAXIMUM,
            PixelType::SADDLE_SEARCH,
            PixelType::BELOW_SADDLE,
        ];
        let combined = all.iter().fold(0u8, |acc, f| {
            assert_eq!(acc & f.bits(), 0);
            acc | f.bits()
        });
        assert_eq!(combined, u8::MAX);
    }

    #[test]
    fn test_insert_remove() {
        let mut t = PixelType::NONE;
        t.insert(PixelType::MAX_AREA | PixelType::LISTED);
        assert!(t.contains(PixelType::MAX_AREA));
        assert!(t.intersects(PixelType::LISTED | PixelType::EXCLUDED));
        t.remove(PixelType::LISTED);
        assert!(!t.contains(PixelType::LISTED));
        assert!(t.contains(PixelType::MAX_AREA));
    }
}
