//! Answer column locator
//!
//! Three solid title marks along the bottom edge give the horizontal center of each
//! answer block. Each block is cut out of the grayscale page, re-thresholded on its
//! own, and its bubbles are grouped into rows of five.

use image::{imageops, GrayImage, Luma};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use serde::Serialize;
use tracing::{debug, warn};

use super::detection::{find_shapes, group_by_gap, strongest_mark, BoundingBox, BubbleCandidate, ContourMode};
use super::preprocess::{binarize_inverted, NormalizedPage};
use super::GeometrySource;
use crate::config::{AnswerConfig, KernelSize};

/// One accepted row of bubbles
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRow {
    /// Answer block the row belongs to, left to right
    pub column: usize,
    /// Index among the accepted rows of its block
    pub row: usize,
    /// Bubbles in choice order, page coordinates
    pub bubbles: Vec<BubbleCandidate>,
    /// 1-based marked choice
    pub choice: Option<u8>,
}

impl AnswerRow {
    /// The bubble that was read as the answer
    pub fn selected(&self) -> Option<&BubbleCandidate> {
        self.choice.and_then(|c| self.bubbles.get(c as usize - 1))
    }
}

/// One answer block
#[derive(Debug, Clone)]
pub struct AnswerColumn {
    pub center_x: u32,
    /// Cut-out searched for bubbles, page coordinates
    pub region: BoundingBox,
    /// Every bubble-shaped contour in the cut-out
    pub candidates: Vec<BubbleCandidate>,
    pub rows: Vec<AnswerRow>,
}

/// Everything the answer locator found on a page
#[derive(Debug, Clone)]
pub struct AnswerDetection {
    /// Title marks that passed the size check, left to right
    pub anchors: Vec<BoundingBox>,
    /// Whether block centers came from the marks or the profile
    pub source: GeometrySource,
    pub columns: Vec<AnswerColumn>,
}

impl AnswerDetection {
    /// Resolved choices in question order; unanswered rows are skipped
    pub fn answers(&self) -> Vec<u8> {
        self.rows().filter_map(|row| row.choice).collect()
    }

    pub fn centers(&self) -> Vec<u32> {
        self.columns.iter().map(|column| column.center_x).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &AnswerRow> {
        self.columns.iter().flat_map(|column| column.rows.iter())
    }
}

/// Find the answer blocks and decode every row
pub fn locate_answers(page: &NormalizedPage, config: &AnswerConfig) -> AnswerDetection {
    let anchors = find_column_anchors(page, config);
    let (centers, source) = choose_column_centers(&anchors, page.width(), config);

    let columns: Vec<AnswerColumn> = centers
        .iter()
        .enumerate()
        .filter_map(|(index, &center_x)| decode_column(page, index, center_x, config))
        .collect();

    let detection = AnswerDetection {
        anchors,
        source,
        columns,
    };
    debug!(
        "Answer blocks at {:?} ({:?}): {} rows, {} answered",
        detection.centers(),
        detection.source,
        detection.rows().count(),
        detection.answers().len()
    );
    detection
}

/// Solid marks in the bottom band, closed so broken print still forms one contour
pub fn find_column_anchors(page: &NormalizedPage, config: &AnswerConfig) -> Vec<BoundingBox> {
    let (width, height) = (page.width(), page.height());
    let band_height = ((height as f32 * config.anchor_band) as u32).min(height);
    if band_height == 0 {
        return Vec::new();
    }
    let band_top = height - band_height;

    let band = imageops::crop_imm(page.binary(), 0, band_top, width, band_height).to_image();
    let mask = rect_mask(config.close_kernel);
    let closed = grayscale_erode(&grayscale_dilate(&band, &mask), &mask);

    let floor = height as f32 * config.anchor_floor;
    let mut anchors: Vec<BoundingBox> = find_shapes(&closed, ContourMode::External)
        .into_iter()
        .map(|shape| shape.bounds.translate(0, band_top))
        .filter(|b| {
            b.y as f32 >= floor && b.width > config.min_anchor_width && b.height > config.min_anchor_height
        })
        .collect();
    anchors.sort_by_key(|b| b.center().0);
    anchors
}

/// Block centers from the rightmost qualifying anchors, or the profile's fallback
pub fn choose_column_centers(
    anchors: &[BoundingBox],
    page_width: u32,
    config: &AnswerConfig,
) -> (Vec<u32>, GeometrySource) {
    let min_x = page_width as f32 * config.anchor_min_x;
    let usable: Vec<u32> = anchors
        .iter()
        .map(|b| b.center().0)
        .filter(|&cx| cx as f32 > min_x)
        .collect();

    if config.columns > 0 && usable.len() >= config.columns {
        let centers = usable[usable.len() - config.columns..].to_vec();
        return (centers, GeometrySource::Detected);
    }

    warn!(
        "Found {} answer block anchors (need {}), using fallback centers",
        usable.len(),
        config.columns
    );
    let centers = config
        .fallback_centers
        .iter()
        .map(|fraction| (page_width as f32 * fraction).round() as u32)
        .collect();
    (centers, GeometrySource::Fallback)
}

fn decode_column(page: &NormalizedPage, index: usize, center_x: u32, config: &AnswerConfig) -> Option<AnswerColumn> {
    let (width, height) = (page.width(), page.height());
    let x1 = center_x.saturating_sub(config.column_half_width);
    let x2 = center_x.saturating_add(config.column_half_width).min(width);
    let y1 = (height as f32 * config.column_top) as u32;
    let y2 = ((height as f32 * config.column_bottom) as u32).min(height);
    if x2 <= x1 || y2 <= y1 {
        warn!("Answer block {} at x={} falls outside the page", index, center_x);
        return None;
    }
    let region = BoundingBox {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    };

    let roi = imageops::crop_imm(page.gray(), x1, y1, region.width, region.height).to_image();
    let thresh = binarize_inverted(&roi);
    let mask = rect_mask(config.dilate_kernel);
    let mut dilated = thresh.clone();
    for _ in 0..config.dilate_iterations {
        dilated = grayscale_dilate(&dilated, &mask);
    }

    // Fill is measured on the un-dilated threshold
    let mut bubbles: Vec<BubbleCandidate> = find_shapes(&dilated, ContourMode::External)
        .iter()
        .filter(|shape| config.shape.accepts(&shape.bounds))
        .map(|shape| shape.to_candidate(&thresh))
        .collect();
    for bubble in &mut bubbles {
        bubble.bounds = bubble.bounds.translate(x1, y1);
    }
    bubbles.sort_by_key(|b| (b.bounds.y, b.bounds.x));

    let rows: Vec<AnswerRow> = group_by_gap(bubbles.clone(), config.row_gap, |b| b.bounds.y)
        .into_iter()
        .filter_map(|mut row| {
            row.sort_by_key(|b| b.bounds.x);
            select_row_bubbles(row, config.choices)
        })
        .enumerate()
        .map(|(row, bubbles)| {
            let choice = strongest_mark(&bubbles, config.min_fill_pixels).map(|i| (i + 1) as u8);
            AnswerRow {
                column: index,
                row,
                bubbles,
                choice,
            }
        })
        .collect();

    debug!(
        "Answer block {} at x={}: {} bubbles, {} rows",
        index,
        center_x,
        bubbles.len(),
        rows.len()
    );

    Some(AnswerColumn {
        center_x,
        region,
        candidates: bubbles,
        rows,
    })
}

/// Keep the rightmost `choices` bubbles of a left-to-right row
///
/// Rows with fewer bubbles than choices are not answer rows. Extra bubbles on the
/// left are usually printed question numbers.
pub fn select_row_bubbles(mut row: Vec<BubbleCandidate>, choices: usize) -> Option<Vec<BubbleCandidate>> {
    if choices == 0 || row.len() < choices {
        return None;
    }
    Some(row.split_off(row.len() - choices))
}

fn rect_mask(kernel: KernelSize) -> Mask {
    let image = GrayImage::from_pixel(kernel.width, kernel.height, Luma([255]));
    Mask::from_image(&image, (kernel.width / 2) as u8, (kernel.height / 2) as u8)
}
