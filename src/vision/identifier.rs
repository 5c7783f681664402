//! Student identifier grid locator
//!
//! The identifier is printed as a grid of digit columns, each holding one bubble per
//! digit 0-9. Bubbles are detected inside the identifier region and anything too large
//! or too elongated to be a bubble is dropped; the proctor confirmation box sits just
//! below the grid and would otherwise pass for a mark on the last row. The vertical
//! extent of the grid is inferred from the surviving bubbles (the "smart anchor"), and
//! each column's heaviest mark is mapped onto that grid.

use serde::{Serialize, Serializer};
use std::fmt;
use tracing::{debug, warn};

use super::detection::{find_shapes, group_by_gap, strongest_mark, BubbleCandidate, ContourMode};
use super::preprocess::{NormalizedPage, PixelRegion};
use super::GeometrySource;
use crate::config::IdentifierConfig;

/// Character used for a digit that could not be read
pub const UNRESOLVED_DIGIT: char = '?';

/// Vertical centers of the first and last grid rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridAnchor {
    /// Center of row 0
    pub top: f32,
    /// Center of the last row
    pub bottom: f32,
    /// Whether the anchors were inferred from bubbles or taken from the profile
    pub source: GeometrySource,
}

impl GridAnchor {
    /// Distance between adjacent row centers
    pub fn row_pitch(&self, rows: usize) -> f32 {
        let span = self.bottom - self.top;
        let span = if span <= 0.0 { 1.0 } else { span };
        span / rows.saturating_sub(1).max(1) as f32
    }

    pub fn row_center(&self, row: usize, rows: usize) -> f32 {
        self.top + self.row_pitch(rows) * row as f32
    }

    /// Nearest row for a vertical position, clamped to the grid
    pub fn row_for(&self, center_y: f32, rows: usize) -> u8 {
        let raw = ((center_y - self.top) / self.row_pitch(rows)).round();
        raw.clamp(0.0, rows.saturating_sub(1) as f32) as u8
    }
}

/// Decoded identifier; unreadable digits are `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    digits: Vec<Option<u8>>,
}

impl Identifier {
    pub fn new(digits: Vec<Option<u8>>) -> Self {
        Self { digits }
    }

    pub fn digits(&self) -> &[Option<u8>] {
        &self.digits
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    /// True when every digit was read
    pub fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }

    pub fn unresolved_count(&self) -> usize {
        self.digits.iter().filter(|d| d.is_none()).count()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in &self.digits {
            let c = digit
                .and_then(|d| char::from_digit(d as u32, 10))
                .unwrap_or(UNRESOLVED_DIGIT);
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One digit column and the mark chosen in it
#[derive(Debug, Clone)]
pub struct IdentifierColumn {
    /// Bubbles assigned to this column, left to right
    pub candidates: Vec<BubbleCandidate>,
    /// Most heavily filled bubble above the fill threshold
    pub selected: Option<BubbleCandidate>,
    pub digit: Option<u8>,
}

/// Everything the identifier locator found on a page
#[derive(Debug, Clone)]
pub struct IdentifierDetection {
    /// Search region in page pixels
    pub region: PixelRegion,
    pub anchor: GridAnchor,
    /// Rows in the grid
    pub rows: usize,
    /// Bubbles that survived the size/shape filter
    pub candidate_count: usize,
    pub columns: Vec<IdentifierColumn>,
    pub identifier: Identifier,
}

/// Find and decode the identifier grid
pub fn locate_identifier(page: &NormalizedPage, config: &IdentifierConfig) -> IdentifierDetection {
    let region = page.region(&config.region);
    let binary = page.binary();

    let mut candidates: Vec<BubbleCandidate> = find_shapes(binary, ContourMode::All)
        .iter()
        .filter(|shape| config.shape.accepts(&shape.bounds))
        .filter(|shape| {
            let (cx, cy) = shape.bounds.center();
            region.contains(cx as f32, cy as f32)
        })
        .map(|shape| shape.to_candidate(binary))
        .collect();
    let candidate_count = candidates.len();

    let anchor = infer_anchor(&candidates, page.height(), config);

    candidates.sort_by_key(|c| (c.bounds.x, c.bounds.y));
    let columns: Vec<IdentifierColumn> = group_by_gap(candidates, config.column_gap, |c| c.bounds.x)
        .into_iter()
        .take(config.digits)
        .map(|column| decode_column(column, &anchor, config))
        .collect();

    let mut digits: Vec<Option<u8>> = columns.iter().map(|column| column.digit).collect();
    digits.resize(config.digits, None);
    let identifier = Identifier::new(digits);

    debug!(
        "Identifier grid: {} candidates in {} columns, rows {:.1}..{:.1} ({:?}) -> {}",
        candidate_count,
        columns.len(),
        anchor.top,
        anchor.bottom,
        anchor.source,
        identifier
    );

    IdentifierDetection {
        region,
        anchor,
        rows: config.rows,
        candidate_count,
        columns,
        identifier,
    }
}

/// Infer the first and last row centers from the detected bubbles
///
/// With enough candidates, the means of the topmost and bottommost few centers are
/// robust to a handful of outliers and to rows with no detectable bubble. Below that,
/// the profile's fixed proportions are used.
pub fn infer_anchor(candidates: &[BubbleCandidate], page_height: u32, config: &IdentifierConfig) -> GridAnchor {
    if candidates.is_empty() || candidates.len() < config.min_anchor_candidates {
        warn!(
            "Only {} identifier bubbles found (need {}), using fallback grid anchors",
            candidates.len(),
            config.min_anchor_candidates
        );
        let height = page_height as f32;
        return GridAnchor {
            top: height * config.fallback_top,
            bottom: height * config.fallback_bottom,
            source: GeometrySource::Fallback,
        };
    }

    let mut centers: Vec<f32> = candidates.iter().map(BubbleCandidate::center_y).collect();
    centers.sort_by(f32::total_cmp);

    let k = config.anchor_sample.min(centers.len() / 2).max(1);
    GridAnchor {
        top: mean(&centers[..k]),
        bottom: mean(&centers[centers.len() - k..]),
        source: GeometrySource::Detected,
    }
}

fn decode_column(candidates: Vec<BubbleCandidate>, anchor: &GridAnchor, config: &IdentifierConfig) -> IdentifierColumn {
    let selected = strongest_mark(&candidates, config.min_fill_pixels).map(|i| candidates[i]);
    let digit = selected.map(|mark| anchor.row_for(mark.center_y(), config.rows));

    IdentifierColumn {
        candidates,
        selected,
        digit,
    }
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len().max(1) as f32
}
