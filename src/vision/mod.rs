//! Optical mark recognition
//!
//! Turns the bytes of one scanned answer sheet into a student identifier and an answer
//! vector. The page is normalized once; the identifier grid and the answer blocks are
//! then located independently on the normalized planes.

pub mod answers;
pub mod debug;
pub mod detection;
pub mod identifier;
pub mod preprocess;

#[cfg(test)]
pub(crate) mod testutil;

pub use answers::{AnswerDetection, AnswerRow};
pub use detection::{BoundingBox, BubbleCandidate};
pub use identifier::{GridAnchor, Identifier, IdentifierDetection};
pub use preprocess::NormalizedPage;

use image::RgbImage;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CalibrationProfile;
use crate::error::{ProfileError, ScanError};

/// Where a piece of page geometry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometrySource {
    /// Inferred from marks found on the page
    Detected,
    /// Fixed proportions from the calibration profile
    Fallback,
}

/// Outcome of one accepted answer row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowMark {
    pub column: usize,
    pub row: usize,
    pub choice: Option<u8>,
}

/// Counts and positions behind a scan result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanDiagnostics {
    /// Size of the image before normalization
    pub source_dimensions: (u32, u32),
    /// Bubbles that survived the identifier shape filter
    pub identifier_candidates: usize,
    pub identifier_anchor: GridAnchor,
    /// Answer block title marks, left to right
    pub answer_anchors: Vec<BoundingBox>,
    pub answer_source: GeometrySource,
    pub column_centers: Vec<u32>,
    /// Every accepted row, including unanswered ones
    pub answer_rows: Vec<RowMark>,
}

/// Decoded content of one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    /// One character per digit column, `?` where unreadable
    pub identifier: Identifier,
    /// Marked choices (1-5) in question order, unanswered rows omitted
    pub answers: Vec<u8>,
    pub diagnostics: ScanDiagnostics,
}

impl ScanResult {
    /// Whether any geometry came from the profile instead of the page
    pub fn used_fallback(&self) -> bool {
        self.diagnostics.identifier_anchor.source == GeometrySource::Fallback
            || self.diagnostics.answer_source == GeometrySource::Fallback
    }

    /// Accepted rows where no bubble cleared the fill threshold
    pub fn unanswered(&self) -> usize {
        self.diagnostics
            .answer_rows
            .iter()
            .filter(|row| row.choice.is_none())
            .count()
    }
}

/// A scan result with its optional annotated image
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub result: ScanResult,
    pub debug_image: Option<RgbImage>,
}

/// Stateless page scanner bound to one calibration profile
///
/// Holds no per-page state, so one pipeline can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct OmrPipeline {
    profile: CalibrationProfile,
}

impl OmrPipeline {
    /// Create a pipeline with the default profile
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipeline with a custom profile, rejecting unusable values
    pub fn with_profile(profile: CalibrationProfile) -> Result<Self, ProfileError> {
        profile.validate()?;
        Ok(Self { profile })
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    /// Scan one page, returning `None` when the bytes cannot be decoded or normalized
    pub fn scan(&self, bytes: &[u8]) -> Option<ScanResult> {
        self.scan_or_warn(bytes, false).map(|output| output.result)
    }

    /// Scan one page and render the annotated debug image
    pub fn scan_with_debug(&self, bytes: &[u8]) -> Option<ScanOutput> {
        self.scan_or_warn(bytes, true)
    }

    /// Scan one page, surfacing decode failures
    pub fn try_scan(&self, bytes: &[u8], debug: bool) -> Result<ScanOutput, ScanError> {
        let start = Instant::now();
        let page = NormalizedPage::from_bytes(bytes, &self.profile.normalize)?;
        let output = self.scan_page(&page, debug);

        info!(
            "Scanned page {}x{} in {:?}: id {}, {} answers{}",
            page.source_dimensions().0,
            page.source_dimensions().1,
            start.elapsed(),
            output.result.identifier,
            output.result.answers.len(),
            if output.result.used_fallback() { " (fallback geometry)" } else { "" }
        );
        Ok(output)
    }

    /// Run both locators on an already normalized page
    pub fn scan_page(&self, page: &NormalizedPage, debug: bool) -> ScanOutput {
        let identifier = identifier::locate_identifier(page, &self.profile.identifier);
        let answers = answers::locate_answers(page, &self.profile.answers);

        let debug_image = if debug {
            debug!("Rendering debug overlay");
            Some(debug::render_overlay(page.color(), &identifier, &answers))
        } else {
            None
        };

        let diagnostics = ScanDiagnostics {
            source_dimensions: page.source_dimensions(),
            identifier_candidates: identifier.candidate_count,
            identifier_anchor: identifier.anchor,
            answer_anchors: answers.anchors.clone(),
            answer_source: answers.source,
            column_centers: answers.centers(),
            answer_rows: answers
                .rows()
                .map(|row| RowMark {
                    column: row.column,
                    row: row.row,
                    choice: row.choice,
                })
                .collect(),
        };

        ScanOutput {
            result: ScanResult {
                identifier: identifier.identifier,
                answers: answers.answers(),
                diagnostics,
            },
            debug_image,
        }
    }

    fn scan_or_warn(&self, bytes: &[u8], debug: bool) -> Option<ScanOutput> {
        match self.try_scan(bytes, debug) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!("Skipping unreadable page ({} bytes): {}", bytes.len(), e);
                None
            }
        }
    }
}
