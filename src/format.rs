//! Format info tables for DRM formats.
//!
//! [`get_opaque`] returns the opaque alternative of a format with an alpha
//! channel, [`has_alpha`] returns whether a format carries one, and
//! [`primary_scanout_format`] narrows a composited format down to what a
//! primary plane is guaranteed to scan out.

use drm_fourcc::DrmFourcc;

/// Macro to generate table lookup functions for formats.
macro_rules! format_tables {
    (
        $($fourcc: ident {
            $(opaque: $opaque: ident,)?
            alpha: $alpha: expr $(,)?
        }),* $(,)?
    ) => {
        /// Returns the opaque alternative of the specified format.
        ///
        /// If the format has an alpha channel, this may return the corresponding opaque format.
        ///
        /// Unknown formats will always return [`None`].
        pub const fn get_opaque(fourcc: DrmFourcc) -> Option<DrmFourcc> {
            match fourcc {
                $($(
                    DrmFourcc::$fourcc => Some(DrmFourcc::$opaque),
                )?)*
                _ => None,
            }
        }

        /// Returns true if the format has an alpha channel.
        ///
        /// Unknown formats will always return `false`.
        pub const fn has_alpha(fourcc: DrmFourcc) -> bool {
            match fourcc {
                $(
                    DrmFourcc::$fourcc => $alpha,
                )*
                _ => false,
            }
        }
    };
}

format_tables! {
    Abgr1555 {
        opaque: Xbgr1555,
        alpha: true,
    },
    Abgr2101010 {
        opaque: Xbgr2101010,
        alpha: true,
    },
    Abgr8888 {
        opaque: Xbgr8888,
        alpha: true,
    },
    Argb1555 {
        opaque: Xrgb1555,
        alpha: true,
    },
    Argb2101010 {
        opaque: Xrgb2101010,
        alpha: true,
    },
    Argb8888 {
        opaque: Xrgb8888,
        alpha: true,
    },
    Bgra8888 {
        opaque: Bgrx8888,
        alpha: true,
    },
    Rgba8888 {
        opaque: Rgbx8888,
        alpha: true,
    },
    Bgr888 {
        alpha: false,
    },
    Rgb888 {
        alpha: false,
    },
    Rgb565 {
        alpha: false,
    },
    Xbgr8888 {
        alpha: false,
    },
    Xrgb8888 {
        alpha: false,
    },
    Xbgr2101010 {
        alpha: false,
    },
    Xrgb2101010 {
        alpha: false,
    },
    Yuv420 {
        alpha: false,
    },
    Nv12 {
        alpha: false,
    },
}

/// Narrows a composited format to the subset a primary plane supports.
///
/// Some hardware only scans out 24 bit color depth on the primary plane, so
/// the alpha carrying 32 bit formats are replaced by their opaque
/// equivalents there. Every other format (and every other plane type) passes
/// through unchanged.
pub const fn primary_scanout_format(fourcc: DrmFourcc) -> DrmFourcc {
    match fourcc {
        DrmFourcc::Argb8888 => DrmFourcc::Xrgb8888,
        DrmFourcc::Abgr8888 => DrmFourcc::Xbgr8888,
        _ => fourcc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_alternatives() {
        assert_eq!(Some(DrmFourcc::Xrgb8888), get_opaque(DrmFourcc::Argb8888));
        assert_eq!(Some(DrmFourcc::Xbgr8888), get_opaque(DrmFourcc::Abgr8888));
        assert_eq!(None, get_opaque(DrmFourcc::Xrgb8888));
    }

    #[test]
    fn alpha_lookup() {
        assert!(has_alpha(DrmFourcc::Argb8888));
        assert!(!has_alpha(DrmFourcc::Xrgb8888));
        assert!(!has_alpha(DrmFourcc::Rgb565));
    }

    #[test]
    fn primary_narrowing() {
        assert_eq!(DrmFourcc::Xrgb8888, primary_scanout_format(DrmFourcc::Argb8888));
        assert_eq!(DrmFourcc::Xbgr8888, primary_scanout_format(DrmFourcc::Abgr8888));
        // only the 32 bit alpha formats are narrowed
        assert_eq!(
            DrmFourcc::Argb2101010,
            primary_scanout_format(DrmFourcc::Argb2101010)
        );
        assert_eq!(DrmFourcc::Yuv420, primary_scanout_format(DrmFourcc::Yuv420));
    }
}
