//! Surface format, image count and HDR metadata policy.

use overlay_core::{ColorSpace, FormatPreference, PixelFormat};

/// A presentable format/color-space pair as reported by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: PixelFormat,
    pub color_space: ColorSpace,
}

impl SurfaceFormat {
    /// The format used when nothing better is available.
    pub const SDR_FALLBACK: SurfaceFormat = SurfaceFormat {
        format: PixelFormat::Bgra8Unorm,
        color_space: ColorSpace::SrgbNonLinear,
    };

    pub fn is_hdr10(&self) -> bool {
        self.color_space == ColorSpace::Hdr10St2084
    }
}

/// Pick the swapchain format.
///
/// With [`FormatPreference::Hdr10`] the first HDR10 (ST.2084) entry wins.
/// Otherwise, or when the surface offers none, B8G8R8A8 in sRGB-nonlinear is
/// used, which every desktop compositor accepts.
pub fn choose_surface_format(
    available: &[SurfaceFormat],
    preference: FormatPreference,
) -> SurfaceFormat {
    if preference == FormatPreference::Hdr10 {
        if let Some(hdr) = available.iter().find(|f| f.is_hdr10()) {
            return *hdr;
        }
    }
    SurfaceFormat::SDR_FALLBACK
}

/// One image more than the surface minimum so acquire never waits on the
/// compositor holding every image. `max == 0` means unbounded.
pub fn desired_image_count(min: u32, max: u32) -> u32 {
    let wanted = min.saturating_add(1);
    if max > 0 {
        wanted.min(max)
    } else {
        wanted
    }
}

/// Static HDR10 mastering metadata attached to an HDR10 swapchain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HdrMetadata {
    /// CIE 1931 xy chromaticities.
    pub red: (f32, f32),
    pub green: (f32, f32),
    pub blue: (f32, f32),
    pub white_point: (f32, f32),
    /// Nits.
    pub max_luminance: f32,
    pub min_luminance: f32,
    pub max_content_light_level: f32,
    pub max_frame_average_light_level: f32,
}

impl HdrMetadata {
    /// BT.2020 primaries, D65 white, 1000-nit mastering display.
    pub const BT2020_1000_NITS: HdrMetadata = HdrMetadata {
        red: (0.708, 0.292),
        green: (0.170, 0.797),
        blue: (0.131, 0.046),
        white_point: (0.3127, 0.3290),
        max_luminance: 1000.0,
        min_luminance: 0.001,
        max_content_light_level: 1000.0,
        max_frame_average_light_level: 200.0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const HDR: SurfaceFormat = SurfaceFormat {
        format: PixelFormat::A2Bgr10Unorm,
        color_space: ColorSpace::Hdr10St2084,
    };
    const RGBA: SurfaceFormat = SurfaceFormat {
        format: PixelFormat::Rgba8Unorm,
        color_space: ColorSpace::SrgbNonLinear,
    };

    #[test]
    fn hdr_is_chosen_only_when_preferred() {
        let available = [RGBA, HDR];
        assert_eq!(choose_surface_format(&available, FormatPreference::Hdr10), HDR);
        assert_eq!(
            choose_surface_format(&available, FormatPreference::Sdr),
            SurfaceFormat::SDR_FALLBACK
        );
    }

    #[test]
    fn hdr_preference_falls_back_without_hdr_formats() {
        assert_eq!(
            choose_surface_format(&[RGBA], FormatPreference::Hdr10),
            SurfaceFormat::SDR_FALLBACK
        );
        assert_eq!(
            choose_surface_format(&[], FormatPreference::Hdr10),
            SurfaceFormat::SDR_FALLBACK
        );
    }

    #[test]
    fn image_count_is_min_plus_one_capped_by_max() {
        assert_eq!(desired_image_count(2, 0), 3);
        assert_eq!(desired_image_count(2, 8), 3);
        assert_eq!(desired_image_count(3, 3), 3);
    }
}
