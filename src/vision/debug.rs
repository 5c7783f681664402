//! Annotated debug image of what the locators saw

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use super::answers::AnswerDetection;
use super::detection::BoundingBox;
use super::identifier::IdentifierDetection;

pub const REGION_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const GRID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const DIGIT_CANDIDATE_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
pub const DIGIT_SELECTED_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const ANCHOR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const ANSWER_CANDIDATE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
pub const ROW_GUIDE_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
pub const ANSWER_SELECTED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Draw both detections over a copy of the normalized page
pub fn render_overlay(page: &RgbImage, identifier: &IdentifierDetection, answers: &AnswerDetection) -> RgbImage {
    let mut canvas = page.clone();
    draw_identifier(&mut canvas, identifier);
    draw_answers(&mut canvas, answers);
    canvas
}

fn draw_identifier(canvas: &mut RgbImage, detection: &IdentifierDetection) {
    let region = detection.region;
    if let Some(rect) = rect_from_corners(region.x_min, region.y_min, region.x_max, region.y_max) {
        draw_hollow_rect_mut(canvas, rect, REGION_COLOR);
    }

    for row in 0..detection.rows {
        let y = detection.anchor.row_center(row, detection.rows);
        draw_line_segment_mut(canvas, (region.x_min, y), (region.x_max, y), GRID_COLOR);
    }

    for column in &detection.columns {
        for candidate in &column.candidates {
            outline(canvas, &candidate.bounds, DIGIT_CANDIDATE_COLOR, 1);
        }
        if let Some(selected) = &column.selected {
            outline(canvas, &selected.bounds, DIGIT_SELECTED_COLOR, 3);
        }
    }
}

fn draw_answers(canvas: &mut RgbImage, detection: &AnswerDetection) {
    for anchor in &detection.anchors {
        outline(canvas, anchor, ANCHOR_COLOR, 3);
    }

    for column in &detection.columns {
        for candidate in &column.candidates {
            outline(canvas, &candidate.bounds, ANSWER_CANDIDATE_COLOR, 1);
        }

        let x_min = column.region.x as f32;
        let x_max = (column.region.x + column.region.width) as f32;
        for row in &column.rows {
            if let Some(first) = row.bubbles.first() {
                let y = first.center_y();
                draw_line_segment_mut(canvas, (x_min, y), (x_max, y), ROW_GUIDE_COLOR);
            }
            if let Some(selected) = row.selected() {
                outline(canvas, &selected.bounds, ANSWER_SELECTED_COLOR, 2);
            }
        }
    }
}

/// Hollow box growing outward by `thickness` pixels
fn outline(canvas: &mut RgbImage, bounds: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    if bounds.width == 0 || bounds.height == 0 {
        return;
    }
    for t in 0..thickness {
        let rect = Rect::at(bounds.x as i32 - t as i32, bounds.y as i32 - t as i32)
            .of_size(bounds.width + 2 * t, bounds.height + 2 * t);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

fn rect_from_corners(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Option<Rect> {
    let width = (x_max - x_min).round();
    let height = (y_max - y_min).round();
    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some(Rect::at(x_min.round() as i32, y_min.round() as i32).of_size(width as u32, height as u32))
}
