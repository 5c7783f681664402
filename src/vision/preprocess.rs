//! Image normalization
//!
//! Decodes page bytes, rescales to the canonical height and produces the grayscale
//! and binary (ink = 255) planes every locator measures against.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use crate::config::{NormalizeConfig, RegionFractions};
use crate::error::ScanError;

/// A page rescaled to canonical height, with its derived planes
///
/// Only constructible through normalization, so every coordinate a locator derives
/// from it lives in the normalized space.
#[derive(Debug, Clone)]
pub struct NormalizedPage {
    color: RgbImage,
    gray: GrayImage,
    binary: GrayImage,
    source_dimensions: (u32, u32),
}

/// Search area in normalized pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PixelRegion {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl PixelRegion {
    /// Whether a point lies strictly inside the region
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.x_min < x && x < self.x_max && self.y_min < y && y < self.y_max
    }
}

/// Width of a page once rescaled to `target_height`, at least one pixel
fn normalized_width(width: u32, height: u32, target_height: u32) -> u64 {
    let scale = f64::from(target_height) / f64::from(height);
    ((f64::from(width) * scale).round() as u64).max(1)
}

impl NormalizedPage {
    /// Decode raw bytes and normalize them
    pub fn from_bytes(bytes: &[u8], config: &NormalizeConfig) -> Result<Self, ScanError> {
        let image = image::load_from_memory(bytes)?;
        Self::from_image(image, config)
    }

    /// Normalize an already decoded image
    pub fn from_image(image: DynamicImage, config: &NormalizeConfig) -> Result<Self, ScanError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ScanError::EmptyImage { width, height });
        }

        let normalized_width = normalized_width(width, height, config.target_height);
        if normalized_width > u64::from(config.max_width) {
            return Err(ScanError::UnsupportedGeometry {
                width,
                height,
                normalized_width,
                max_width: config.max_width,
            });
        }

        let resized = if height == config.target_height {
            image
        } else {
            // Bounded by max_width above
            let new_width = normalized_width as u32;
            image.resize_exact(new_width, config.target_height, FilterType::Triangle)
        };

        let color = resized.to_rgb8();
        let gray = resized.to_luma8();
        let blurred = gaussian_blur_f32(&gray, config.blur_sigma);
        let binary = binarize_inverted(&blurred);

        debug!(
            "Normalized page {}x{} -> {}x{}",
            width,
            height,
            gray.width(),
            gray.height()
        );

        Ok(Self {
            color,
            gray,
            binary,
            source_dimensions: (width, height),
        })
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    /// Dimensions of the image before rescaling
    pub fn source_dimensions(&self) -> (u32, u32) {
        self.source_dimensions
    }

    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Blurred, Otsu-thresholded page with ink as 255
    pub fn binary(&self) -> &GrayImage {
        &self.binary
    }

    /// Resolve a fractional region against this page
    pub fn region(&self, fractions: &RegionFractions) -> PixelRegion {
        let (w, h) = (self.width() as f32, self.height() as f32);
        PixelRegion {
            x_min: w * fractions.x_min,
            x_max: w * fractions.x_max,
            y_min: h * fractions.y_min,
            y_max: h * fractions.y_max,
        }
    }
}

/// Otsu threshold where pixels at or below the level (ink) become 255
pub fn binarize_inverted(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > level {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn page_with_dark_square(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (100..200).contains(&x) && (100..200).contains(&y) {
                Rgb([10, 10, 10])
            } else {
                Rgb([250, 250, 250])
            }
        })
    }

    #[test]
    fn test_rescales_to_target_height_preserving_aspect() {
        let image = DynamicImage::ImageRgb8(page_with_dark_square(600, 800));
        let page = NormalizedPage::from_image(image, &NormalizeConfig::default()).unwrap();

        assert_eq!(page.height(), 1600);
        assert_eq!(page.width(), 1200);
        assert_eq!(page.source_dimensions(), (600, 800));
        assert_eq!(page.binary().dimensions(), page.gray().dimensions());
        assert_eq!(page.color().dimensions(), page.gray().dimensions());
    }

    #[test]
    fn test_keeps_canonical_height_untouched() {
        let image = DynamicImage::ImageRgb8(page_with_dark_square(1000, 1600));
        let page = NormalizedPage::from_image(image, &NormalizeConfig::default()).unwrap();

        assert_eq!(page.width(), 1000);
        assert_eq!(page.height(), 1600);
    }

    #[test]
    fn test_binary_marks_ink_as_foreground() {
        let image = DynamicImage::ImageRgb8(page_with_dark_square(1000, 1600));
        let page = NormalizedPage::from_image(image, &NormalizeConfig::default()).unwrap();

        assert_eq!(page.binary().get_pixel(150, 150).0[0], 255);
        assert_eq!(page.binary().get_pixel(500, 500).0[0], 0);
    }

    #[test]
    fn test_decodes_png_bytes() {
        let mut bytes = Vec::new();
        page_with_dark_square(300, 400)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let page = NormalizedPage::from_bytes(&bytes, &NormalizeConfig::default()).unwrap();
        assert_eq!(page.height(), 1600);
        assert_eq!(page.width(), 1200);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = NormalizedPage::from_bytes(b"definitely not an image", &NormalizeConfig::default());
        assert!(matches!(result, Err(ScanError::Decode(_))));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let result = NormalizedPage::from_image(image, &NormalizeConfig::default());
        assert!(matches!(result, Err(ScanError::EmptyImage { .. })));
    }

    #[test]
    fn test_extreme_aspect_ratio_is_rejected_before_resizing() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(20000, 1, Luma([255])));
        let result = NormalizedPage::from_image(image, &NormalizeConfig::default());

        assert!(matches!(
            result,
            Err(ScanError::UnsupportedGeometry {
                width: 20000,
                height: 1,
                normalized_width: 32_000_000,
                max_width: 6400,
            })
        ));
    }

    #[test]
    fn test_width_limit_applies_at_canonical_height() {
        let config = NormalizeConfig {
            max_width: 900,
            ..NormalizeConfig::default()
        };
        let image = DynamicImage::ImageRgb8(page_with_dark_square(1000, 1600));

        assert!(matches!(
            NormalizedPage::from_image(image, &config),
            Err(ScanError::UnsupportedGeometry { normalized_width: 1000, .. })
        ));
    }

    #[test]
    fn test_region_resolves_fractions() {
        let image = DynamicImage::ImageRgb8(page_with_dark_square(1000, 1600));
        let page = NormalizedPage::from_image(image, &NormalizeConfig::default()).unwrap();
        let region = page.region(&RegionFractions {
            x_min: 0.1,
            x_max: 0.5,
            y_min: 0.25,
            y_max: 0.75,
        });

        assert!((region.x_min - 100.0).abs() < 1e-3);
        assert!((region.x_max - 500.0).abs() < 1e-3);
        assert!((region.y_min - 400.0).abs() < 1e-3);
        assert!((region.y_max - 1200.0).abs() < 1e-3);
        assert!(region.contains(300.0, 800.0));
        assert!(!region.contains(50.0, 800.0));
        assert!(!region.contains(300.0, 1300.0));
    }
}
