//! omr-scan - Optical mark recognition for bubble-sheet answer forms
//!
//! Decodes the student identifier and answers from a scanned sheet, and scores the
//! answers against a key. Decoding is a pure function of the image bytes and the
//! calibration profile.

pub mod batch;
pub mod config;
pub mod error;
pub mod scoring;
pub mod vision;

pub use batch::scan_batch;
pub use config::CalibrationProfile;
pub use error::{KeyError, ProfileError, ScanError};
pub use scoring::{score, AnswerKey, ScoreResult};
pub use vision::{GeometrySource, Identifier, OmrPipeline, ScanOutput, ScanResult};
