//! Calibration Profile
//!
//! Every geometric and threshold constant the locators depend on, stored in TOML
//! format. The defaults are tuned to the standard 45-question answer form; another
//! layout is supported by loading a different profile.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ProfileError;

/// Complete calibration for one physical form layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CalibrationProfile {
    /// Decode/rescale/binarize settings
    pub normalize: NormalizeConfig,
    /// Student identifier grid settings
    pub identifier: IdentifierConfig,
    /// Answer block settings
    pub answers: AnswerConfig,
}

/// Rectangular search area, as fractions of the normalized page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionFractions {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

/// Accepted bounding-box geometry for a bubble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BubbleShape {
    /// Smallest accepted side, in pixels
    pub min_size: u32,
    /// Largest accepted side, in pixels
    pub max_size: u32,
    /// Smallest accepted width / height
    pub min_aspect: f32,
    /// Largest accepted width / height
    pub max_aspect: f32,
}

/// Rectangular structuring element size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSize {
    pub width: u32,
    pub height: u32,
}

/// Image normalizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Canonical page height after rescaling
    pub target_height: u32,
    /// Gaussian blur sigma applied before Otsu binarization
    pub blur_sigma: f32,
    /// Widest page accepted after rescaling; wider pages are rejected unscanned
    pub max_width: u32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_height: 1600,
            // Equivalent of a 5x5 kernel with automatic sigma
            blur_sigma: 1.1,
            max_width: 6400,
        }
    }
}

/// Identifier grid locator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Where the digit grid is searched for
    pub region: RegionFractions,
    /// Size/shape filter that rejects boxes such as the proctor confirmation field
    pub shape: BubbleShape,
    /// Number of digit columns
    pub digits: usize,
    /// Number of rows (digits 0 through rows - 1)
    pub rows: usize,
    /// Horizontal distance from a column's first bubble that starts a new column
    pub column_gap: u32,
    /// Candidates needed before anchors are inferred instead of using the fallback
    pub min_anchor_candidates: usize,
    /// How many top/bottom centers are averaged into each anchor
    pub anchor_sample: usize,
    /// Fallback row-0 center, as a fraction of page height
    pub fallback_top: f32,
    /// Fallback last-row center, as a fraction of page height
    pub fallback_bottom: f32,
    /// Fill pixels a bubble must exceed to count as marked
    pub min_fill_pixels: u32,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            region: RegionFractions {
                x_min: 0.08,
                x_max: 0.33,
                y_min: 0.44,
                y_max: 0.845,
            },
            shape: BubbleShape {
                min_size: 15,
                max_size: 55,
                min_aspect: 0.5,
                max_aspect: 2.0,
            },
            digits: 8,
            rows: 10,
            column_gap: 20,
            min_anchor_candidates: 10,
            anchor_sample: 5,
            fallback_top: 0.465,
            fallback_bottom: 0.803,
            min_fill_pixels: 50,
        }
    }
}

/// Answer column locator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Height of the bottom band searched for column anchors, as a fraction of page height
    pub anchor_band: f32,
    /// Anchors must start at or below this fraction of page height
    pub anchor_floor: f32,
    /// Closing kernel that merges each anchor mark into one contour
    pub close_kernel: KernelSize,
    /// Anchors must be wider than this
    pub min_anchor_width: u32,
    /// Anchors must be taller than this
    pub min_anchor_height: u32,
    /// Anchor centers at or left of this fraction of page width are ignored
    pub anchor_min_x: f32,
    /// Number of answer columns
    pub columns: usize,
    /// Column centers used when too few anchors are found, as fractions of page width
    pub fallback_centers: Vec<f32>,
    /// Half width of each column's search area, in pixels
    pub column_half_width: u32,
    /// Top of the column search area, as a fraction of page height
    pub column_top: f32,
    /// Bottom of the column search area, as a fraction of page height
    pub column_bottom: f32,
    /// Dilation kernel that merges ink into bubble blobs
    pub dilate_kernel: KernelSize,
    /// Dilation passes
    pub dilate_iterations: u32,
    /// Size/shape filter for answer bubbles
    pub shape: BubbleShape,
    /// Vertical distance from a row's first bubble that starts a new row
    pub row_gap: u32,
    /// Bubbles per row (choices 1 through choices)
    pub choices: usize,
    /// Fill pixels a bubble must exceed to count as marked
    pub min_fill_pixels: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            anchor_band: 0.06,
            anchor_floor: 0.94,
            close_kernel: KernelSize { width: 60, height: 5 },
            min_anchor_width: 40,
            min_anchor_height: 10,
            anchor_min_x: 0.28,
            columns: 3,
            fallback_centers: vec![0.35, 0.58, 0.81],
            column_half_width: 115,
            column_top: 0.135,
            column_bottom: 0.94,
            dilate_kernel: KernelSize { width: 4, height: 4 },
            dilate_iterations: 2,
            shape: BubbleShape {
                min_size: 8,
                max_size: 95,
                min_aspect: 0.4,
                max_aspect: 2.5,
            },
            row_gap: 30,
            choices: 5,
            min_fill_pixels: 50,
        }
    }
}

impl CalibrationProfile {
    /// Check that every value is usable by the locators
    pub fn validate(&self) -> Result<(), ProfileError> {
        let normalize = &self.normalize;
        if normalize.target_height == 0 {
            return Err(ProfileError::NotPositive { name: "normalize.target_height" });
        }
        if !(normalize.blur_sigma > 0.0) {
            return Err(ProfileError::NotPositive { name: "normalize.blur_sigma" });
        }
        if normalize.max_width == 0 {
            return Err(ProfileError::NotPositive { name: "normalize.max_width" });
        }

        let id = &self.identifier;
        check_region("identifier.region", &id.region)?;
        check_shape("identifier.shape", &id.shape)?;
        check_fraction("identifier.fallback_top", id.fallback_top)?;
        check_fraction("identifier.fallback_bottom", id.fallback_bottom)?;
        if id.fallback_top > id.fallback_bottom {
            return Err(ProfileError::InvertedRange {
                name: "identifier.fallback_top..fallback_bottom",
                min: id.fallback_top,
                max: id.fallback_bottom,
            });
        }
        if id.digits == 0 {
            return Err(ProfileError::NotPositive { name: "identifier.digits" });
        }
        if id.rows < 2 {
            return Err(ProfileError::NotPositive { name: "identifier.rows - 1" });
        }
        if id.anchor_sample == 0 {
            return Err(ProfileError::NotPositive { name: "identifier.anchor_sample" });
        }

        let answers = &self.answers;
        check_fraction("answers.anchor_band", answers.anchor_band)?;
        check_fraction("answers.anchor_floor", answers.anchor_floor)?;
        check_fraction("answers.anchor_min_x", answers.anchor_min_x)?;
        check_fraction("answers.column_top", answers.column_top)?;
        check_fraction("answers.column_bottom", answers.column_bottom)?;
        if answers.column_top >= answers.column_bottom {
            return Err(ProfileError::InvertedRange {
                name: "answers.column_top..column_bottom",
                min: answers.column_top,
                max: answers.column_bottom,
            });
        }
        check_kernel("answers.close_kernel", answers.close_kernel)?;
        check_kernel("answers.dilate_kernel", answers.dilate_kernel)?;
        check_shape("answers.shape", &answers.shape)?;
        if answers.columns == 0 {
            return Err(ProfileError::NotPositive { name: "answers.columns" });
        }
        if answers.choices == 0 {
            return Err(ProfileError::NotPositive { name: "answers.choices" });
        }
        if answers.column_half_width == 0 {
            return Err(ProfileError::NotPositive { name: "answers.column_half_width" });
        }
        if answers.fallback_centers.len() != answers.columns {
            return Err(ProfileError::FallbackCount {
                expected: answers.columns,
                actual: answers.fallback_centers.len(),
            });
        }
        for &center in &answers.fallback_centers {
            check_fraction("answers.fallback_centers", center)?;
        }

        Ok(())
    }
}

fn check_fraction(name: &'static str, value: f32) -> Result<(), ProfileError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ProfileError::FractionOutOfRange { name, value })
    }
}

fn check_region(name: &'static str, region: &RegionFractions) -> Result<(), ProfileError> {
    let inside = [region.x_min, region.x_max, region.y_min, region.y_max]
        .iter()
        .all(|v| (0.0..=1.0).contains(v));
    if inside && region.x_min < region.x_max && region.y_min < region.y_max {
        Ok(())
    } else {
        Err(ProfileError::InvalidRegion {
            name,
            x_min: region.x_min,
            x_max: region.x_max,
            y_min: region.y_min,
            y_max: region.y_max,
        })
    }
}

fn check_shape(name: &'static str, shape: &BubbleShape) -> Result<(), ProfileError> {
    if shape.min_size > shape.max_size {
        return Err(ProfileError::InvertedRange {
            name,
            min: shape.min_size as f32,
            max: shape.max_size as f32,
        });
    }
    if !(shape.min_aspect > 0.0) || shape.min_aspect > shape.max_aspect {
        return Err(ProfileError::InvertedRange {
            name,
            min: shape.min_aspect,
            max: shape.max_aspect,
        });
    }
    Ok(())
}

fn check_kernel(name: &'static str, kernel: KernelSize) -> Result<(), ProfileError> {
    let valid = |side: u32| (1..=255).contains(&side);
    if valid(kernel.width) && valid(kernel.height) {
        Ok(())
    } else {
        Err(ProfileError::InvalidKernel {
            name,
            width: kernel.width,
            height: kernel.height,
        })
    }
}

/// Load and validate a calibration profile from file
pub fn load_profile(path: &Path) -> Result<CalibrationProfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration profile: {:?}", path))?;
    let profile: CalibrationProfile = toml::from_str(&content)
        .with_context(|| format!("Invalid calibration profile: {:?}", path))?;
    profile.validate()?;
    Ok(profile)
}

/// Save a calibration profile to file
pub fn save_profile(profile: &CalibrationProfile, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(profile)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Location of the user's default calibration profile
pub fn default_profile_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "omrscan", "OmrScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().join("profile.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_profile() {
        let profile = CalibrationProfile::default();

        assert_eq!(profile.normalize.target_height, 1600);

        assert_eq!(profile.identifier.digits, 8);
        assert_eq!(profile.identifier.rows, 10);
        assert_eq!(profile.identifier.shape.max_size, 55);
        assert!((profile.identifier.region.y_max - 0.845).abs() < 1e-6);
        assert_eq!(profile.identifier.min_fill_pixels, 50);

        assert_eq!(profile.answers.columns, 3);
        assert_eq!(profile.answers.choices, 5);
        assert_eq!(profile.answers.close_kernel, KernelSize { width: 60, height: 5 });
        assert_eq!(profile.answers.column_half_width, 115);

        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_partial_profile_overrides_only_given_keys() {
        let toml_str = r#"
            [identifier]
            digits = 6
            column_gap = 25

            [answers.shape]
            min_size = 10
            max_size = 80
            min_aspect = 0.5
            max_aspect = 2.0
        "#;

        let profile: CalibrationProfile = toml::from_str(toml_str).unwrap();

        assert_eq!(profile.identifier.digits, 6);
        assert_eq!(profile.identifier.column_gap, 25);
        assert_eq!(profile.identifier.rows, 10);
        assert_eq!(profile.answers.shape.max_size, 80);
        assert_eq!(profile.answers.row_gap, 30);
        assert_eq!(profile.normalize, NormalizeConfig::default());
    }

    #[test]
    fn test_save_and_load_profile() {
        let mut profile = CalibrationProfile::default();
        profile.answers.fallback_centers = vec![0.3, 0.55, 0.8];
        profile.identifier.min_fill_pixels = 70;

        let temp_file = NamedTempFile::new().unwrap();
        save_profile(&profile, temp_file.path()).unwrap();
        let loaded = load_profile(temp_file.path()).unwrap();

        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_load_profile_file_not_found() {
        let result = load_profile(Path::new("/nonexistent/path/profile.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_profile_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        assert!(load_profile(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_profile_rejects_invalid_values() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[answers]\ncolumns = 4").unwrap();

        let err = load_profile(temp_file.path()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProfileError>(),
            Some(&ProfileError::FallbackCount { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_validate_inverted_region() {
        let mut profile = CalibrationProfile::default();
        profile.identifier.region.x_min = 0.5;
        profile.identifier.region.x_max = 0.2;

        assert!(matches!(
            profile.validate(),
            Err(ProfileError::InvalidRegion { name: "identifier.region", .. })
        ));
    }

    #[test]
    fn test_validate_kernel_bounds() {
        let mut profile = CalibrationProfile::default();
        profile.answers.close_kernel = KernelSize { width: 300, height: 5 };

        assert_eq!(
            profile.validate(),
            Err(ProfileError::InvalidKernel {
                name: "answers.close_kernel",
                width: 300,
                height: 5
            })
        );
    }

    #[test]
    fn test_validate_blur_sigma() {
        let mut profile = CalibrationProfile::default();
        profile.normalize.blur_sigma = 0.0;

        assert_eq!(
            profile.validate(),
            Err(ProfileError::NotPositive { name: "normalize.blur_sigma" })
        );
    }

    #[test]
    fn test_validate_max_width() {
        let mut profile = CalibrationProfile::default();
        profile.normalize.max_width = 0;

        assert_eq!(
            profile.validate(),
            Err(ProfileError::NotPositive { name: "normalize.max_width" })
        );
    }
}
