//! Pixel sizes, offsets and presentation-surface extents.

use std::fmt;

/// A size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `true` when either dimension is zero (e.g. a minimized window).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Scale a logical size by a device-pixel ratio, rounding to the nearest
    /// pixel.
    pub fn scaled(self, device_pixel_ratio: f64) -> Self {
        let scale = |v: u32| (v as f64 * device_pixel_ratio).round().max(0.0) as u32;
        Self::new(scale(self.width), scale(self.height))
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// A pixel offset relative to a parent surface's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

impl Offset {
    pub const ORIGIN: Offset = Offset { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The extents a presentation surface reports as acceptable for its images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceExtents {
    pub min: Size,
    pub max: Size,
    /// The surface's current size if the window system dictates one.
    pub current: Option<Size>,
}

impl SurfaceExtents {
    /// Extents that accept any size from 1x1 up to `max`.
    pub fn up_to(max: Size) -> Self {
        Self {
            min: Size::new(1, 1),
            max,
            current: None,
        }
    }

    /// Clamp `requested` into `[min, max]` per dimension.
    ///
    /// Out-of-range requests are not an error: they are silently brought
    /// into range.
    pub fn clamp(&self, requested: Size) -> Size {
        let clamp_dim = |v: u32, lo: u32, hi: u32| v.min(hi).max(lo);
        Size::new(
            clamp_dim(requested.width, self.min.width, self.max.width),
            clamp_dim(requested.height, self.min.height, self.max.height),
        )
    }

    pub fn contains(&self, size: Size) -> bool {
        self.clamp(size) == size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn extents() -> SurfaceExtents {
        SurfaceExtents {
            min: Size::new(16, 16),
            max: Size::new(4096, 2160),
            current: None,
        }
    }

    #[test]
    fn clamp_keeps_sizes_inside_extents() {
        assert_eq!(extents().clamp(Size::new(1920, 1080)), Size::new(1920, 1080));
        assert!(extents().contains(Size::new(16, 2160)));
    }

    #[test]
    fn clamp_limits_each_dimension_independently() {
        assert_eq!(extents().clamp(Size::new(8000, 4)), Size::new(4096, 16));
        assert_eq!(extents().clamp(Size::new(0, 3000)), Size::new(16, 2160));
    }

    #[test]
    fn scaled_applies_device_pixel_ratio() {
        assert_eq!(Size::new(1280, 720).scaled(1.5), Size::new(1920, 1080));
        assert_eq!(Size::new(101, 51).scaled(1.0), Size::new(101, 51));
    }

    #[test]
    fn empty_sizes() {
        assert!(Size::new(0, 720).is_empty());
        assert!(!Size::new(1, 1).is_empty());
        assert_eq!(Size::new(640, 480).to_string(), "640x480");
    }
    fn any_extents() -> impl Strategy<Value = SurfaceExtents> {
        (1u32..=8192, 1u32..=8192, 1u32..=8192, 1u32..=8192).prop_map(|(w1, h1, w2, h2)| {
            SurfaceExtents {
                min: Size::new(w1.min(w2), h1.min(h2)),
                max: Size::new(w1.max(w2), h1.max(h2)),
                current: None,
            }
        })
    }

    proptest! {
        #[test]
        fn clamp_lands_inside_and_is_idempotent(
            extents in any_extents(),
            width in 0u32..=20_000,
            height in 0u32..=20_000,
        ) {
            let requested = Size::new(width, height);
            let clamped = extents.clamp(requested);
            prop_assert!((extents.min.width..=extents.max.width).contains(&clamped.width));
            prop_assert!((extents.min.height..=extents.max.height).contains(&clamped.height));
            prop_assert!(extents.contains(clamped));
            prop_assert_eq!(extents.clamp(clamped), clamped);
            if extents.contains(requested) {
                prop_assert_eq!(clamped, requested);
            }
        }
    }
}
