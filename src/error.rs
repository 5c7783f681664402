//! Error types for the scanning engine, calibration profiles and answer keys

use thiserror::Error;

/// Failure to turn raw bytes into a normalized page
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("{width}x{height} page would normalize to {normalized_width} pixels wide, limit is {max_width}")]
    UnsupportedGeometry {
        width: u32,
        height: u32,
        normalized_width: u64,
        max_width: u32,
    },
}

/// A calibration profile value that the locators cannot work with
#[derive(Error, Debug, PartialEq)]
pub enum ProfileError {
    #[error("region '{name}' is empty or outside the page: x {x_min}..{x_max}, y {y_min}..{y_max}")]
    InvalidRegion {
        name: &'static str,
        x_min: f32,
        x_max: f32,
        y_min: f32,
        y_max: f32,
    },

    #[error("'{name}' must lie within 0.0..=1.0, got {value}")]
    FractionOutOfRange { name: &'static str, value: f32 },

    #[error("'{name}' range is inverted: {min} > {max}")]
    InvertedRange { name: &'static str, min: f32, max: f32 },

    #[error("'{name}' must be positive")]
    NotPositive { name: &'static str },

    #[error("kernel '{name}' is {width}x{height}, must be between 1x1 and 255x255")]
    InvalidKernel { name: &'static str, width: u32, height: u32 },

    #[error("{expected} answer columns need as many fallback centers, got {actual}")]
    FallbackCount { expected: usize, actual: usize },
}

/// An answer key that cannot be scored against
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("question {0} appears more than once in the answer key")]
    DuplicateQuestion(u32),

    #[error("question {number} has correct choice {choice}, expected 1-5")]
    InvalidChoice { number: u32, choice: u8 },

    #[error("standard key needs {expected} correct choices, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}
