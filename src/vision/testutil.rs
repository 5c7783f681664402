//! Synthetic answer sheets with known content

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use std::io::Cursor;

use super::preprocess::NormalizedPage;
use crate::config::NormalizeConfig;

pub const SHEET_WIDTH: u32 = 1200;
pub const SHEET_HEIGHT: u32 = 1600;

pub const ID_FIRST_COLUMN_X: i32 = 115;
pub const ID_COLUMN_PITCH: i32 = 32;
pub const ID_FIRST_ROW_Y: i32 = 760;
pub const ID_ROW_PITCH: i32 = 60;

pub const ANSWER_CENTERS: [i32; 3] = [540, 780, 1020];
/// 0.35, 0.58 and 0.81 of the sheet width
pub const FALLBACK_ANSWER_CENTERS: [i32; 3] = [420, 696, 972];
pub const ANSWER_FIRST_ROW_Y: i32 = 260;
pub const ANSWER_ROW_PITCH: i32 = 70;
pub const CHOICE_PITCH: i32 = 42;
pub const ROWS_PER_COLUMN: usize = 15;

const BUBBLE_RADIUS: i32 = 12;
const RING_HOLE_RADIUS: i32 = 8;
const ANCHOR_WIDTH: u32 = 80;
const ANCHOR_HEIGHT: u32 = 30;
const ANCHOR_TOP: i32 = 1540;

const INK: Rgb<u8> = Rgb([0, 0, 0]);
const PAPER: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws forms on a white canvas of the canonical size
pub struct SheetBuilder {
    image: RgbImage,
}

impl SheetBuilder {
    pub fn new() -> Self {
        Self {
            image: RgbImage::from_pixel(SHEET_WIDTH, SHEET_HEIGHT, PAPER),
        }
    }

    /// An empty printed bubble
    pub fn ring(&mut self, x: i32, y: i32) -> &mut Self {
        draw_filled_circle_mut(&mut self.image, (x, y), BUBBLE_RADIUS, INK);
        draw_filled_circle_mut(&mut self.image, (x, y), RING_HOLE_RADIUS, PAPER);
        self
    }

    /// A filled-in bubble
    pub fn mark(&mut self, x: i32, y: i32) -> &mut Self {
        draw_filled_circle_mut(&mut self.image, (x, y), BUBBLE_RADIUS, INK);
        self
    }

    pub fn block(&mut self, x: i32, y: i32, width: u32, height: u32) -> &mut Self {
        draw_filled_rect_mut(&mut self.image, Rect::at(x, y).of_size(width, height), INK);
        self
    }

    /// A hollow box such as a signature or confirmation field
    pub fn outline(&mut self, x: i32, y: i32, width: u32, height: u32, thickness: u32) -> &mut Self {
        self.block(x, y, width, height);
        let inner = Rect::at(x + thickness as i32, y + thickness as i32)
            .of_size(width - 2 * thickness, height - 2 * thickness);
        draw_filled_rect_mut(&mut self.image, inner, PAPER);
        self
    }

    /// Identifier grid with one filled bubble per column at the given digit
    pub fn identifier_grid(&mut self, digits: &[u8], first_row_y: i32) -> &mut Self {
        for (column, &digit) in digits.iter().enumerate() {
            let x = ID_FIRST_COLUMN_X + column as i32 * ID_COLUMN_PITCH;
            for row in 0..10u8 {
                let y = first_row_y + row as i32 * ID_ROW_PITCH;
                if row == digit {
                    self.mark(x, y);
                } else {
                    self.ring(x, y);
                }
            }
        }
        self
    }

    /// One answer block; a choice of 0 leaves the row blank
    pub fn answer_block(&mut self, center_x: i32, choices: &[u8]) -> &mut Self {
        for (row, &choice) in choices.iter().enumerate() {
            let y = ANSWER_FIRST_ROW_Y + row as i32 * ANSWER_ROW_PITCH;
            for position in 0..5u8 {
                let x = center_x + (position as i32 - 2) * CHOICE_PITCH;
                if position + 1 == choice {
                    self.mark(x, y);
                } else {
                    self.ring(x, y);
                }
            }
        }
        self
    }

    /// Three answer blocks filled from a flat answer list
    pub fn answer_blocks(&mut self, centers: [i32; 3], choices: &[u8]) -> &mut Self {
        for (center_x, block) in centers.iter().zip(choices.chunks(ROWS_PER_COLUMN)) {
            self.answer_block(*center_x, block);
        }
        self
    }

    /// Solid title mark along the bottom edge
    pub fn column_anchor(&mut self, center_x: i32) -> &mut Self {
        self.block(center_x - ANCHOR_WIDTH as i32 / 2, ANCHOR_TOP, ANCHOR_WIDTH, ANCHOR_HEIGHT)
    }

    pub fn standard_anchors(&mut self) -> &mut Self {
        for center_x in ANSWER_CENTERS {
            self.column_anchor(center_x);
        }
        self
    }

    pub fn image(&self) -> RgbImage {
        self.image.clone()
    }

    pub fn page(&self) -> NormalizedPage {
        NormalizedPage::from_image(DynamicImage::ImageRgb8(self.image()), &NormalizeConfig::default())
            .expect("synthetic sheet normalizes")
    }

    pub fn png_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("synthetic sheet encodes");
        bytes
    }
}

/// A complete sheet: identifier grid, anchors and three answer blocks
pub fn complete_sheet(digits: &[u8], answers: &[u8]) -> SheetBuilder {
    let mut sheet = SheetBuilder::new();
    sheet
        .identifier_grid(digits, ID_FIRST_ROW_Y)
        .standard_anchors()
        .answer_blocks(ANSWER_CENTERS, answers);
    sheet
}

/// 45 answers cycling through every choice
pub fn answer_pattern() -> Vec<u8> {
    (0..45).map(|i| ((i * 3 + i / 5) % 5 + 1) as u8).collect()
}
