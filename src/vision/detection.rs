//! Bubble candidate detection
//!
//! Finds closed shapes in a binary plane and measures how much ink each one holds.
//! Both locators build on these primitives; only their geometric reasoning differs.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use serde::Serialize;

use crate::config::BubbleShape;

/// Axis-aligned bounding box in normalized page pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Integer center, biased toward the top-left on even sides
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// The same box shifted by an origin offset
    pub fn translate(&self, dx: u32, dy: u32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// A closed contour that may be a bubble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BubbleCandidate {
    /// Bounding box of the contour
    pub bounds: BoundingBox,
    /// Ink pixels inside the contour
    pub fill_pixels: u32,
}

impl BubbleCandidate {
    pub fn center(&self) -> (u32, u32) {
        self.bounds.center()
    }

    pub fn center_y(&self) -> f32 {
        self.center().1 as f32
    }
}

/// Which contour borders to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourMode {
    /// Outer and hole borders at every nesting level
    All,
    /// Only top-level outer borders
    External,
}

/// A traced contour with its bounding box
#[derive(Debug, Clone)]
pub struct Shape {
    pub bounds: BoundingBox,
    points: Vec<Point<i32>>,
}

impl Shape {
    /// Count the foreground pixels of `plane` that fall inside this contour
    ///
    /// `plane` must share the coordinate space the contour was traced in.
    pub fn fill_pixels(&self, plane: &GrayImage) -> u32 {
        let b = self.bounds;
        let mut polygon: Vec<Point<i32>> = self
            .points
            .iter()
            .map(|p| Point::new(p.x - b.x as i32, p.y - b.y as i32))
            .collect();
        polygon.dedup();
        if polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }

        let mut mask = GrayImage::new(b.width, b.height);
        if polygon.len() >= 3 {
            draw_polygon_mut(&mut mask, &polygon, Luma([255]));
        }
        // Border pixels belong to the shape even for degenerate polygons
        for p in &polygon {
            mask.put_pixel(p.x as u32, p.y as u32, Luma([255]));
        }

        let mut count = 0;
        for (mx, my, m) in mask.enumerate_pixels() {
            if m.0[0] == 0 {
                continue;
            }
            let (px, py) = (b.x + mx, b.y + my);
            if px < plane.width() && py < plane.height() && plane.get_pixel(px, py).0[0] > 0 {
                count += 1;
            }
        }
        count
    }

    /// Turn the shape into a candidate, measuring fill against `plane`
    pub fn to_candidate(&self, plane: &GrayImage) -> BubbleCandidate {
        BubbleCandidate {
            bounds: self.bounds,
            fill_pixels: self.fill_pixels(plane),
        }
    }
}

/// Trace the contours of the non-zero regions of `mask`
pub fn find_shapes(mask: &GrayImage, mode: ContourMode) -> Vec<Shape> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| match mode {
            ContourMode::All => true,
            ContourMode::External => {
                contour.border_type == BorderType::Outer && contour.parent.is_none()
            }
        })
        .filter_map(|contour| {
            let bounds = bounding_box(&contour.points)?;
            Some(Shape {
                bounds,
                points: contour.points,
            })
        })
        .collect()
}

fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    if min_x < 0 || min_y < 0 {
        return None;
    }

    Some(BoundingBox {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

impl BubbleShape {
    /// Whether a bounding box has plausible bubble size and proportions
    pub fn accepts(&self, bounds: &BoundingBox) -> bool {
        let size_ok = |side: u32| self.min_size <= side && side <= self.max_size;
        let aspect = bounds.aspect_ratio();
        size_ok(bounds.width)
            && size_ok(bounds.height)
            && self.min_aspect <= aspect
            && aspect <= self.max_aspect
    }
}

/// The most heavily filled candidate whose fill exceeds `min_fill`
///
/// Returns its index within `candidates`. Ties keep the earlier candidate.
pub fn strongest_mark(candidates: &[BubbleCandidate], min_fill: u32) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.fill_pixels <= min_fill {
            continue;
        }
        if best.map_or(true, |(_, fill)| candidate.fill_pixels > fill) {
            best = Some((i, candidate.fill_pixels));
        }
    }
    best.map(|(i, _)| i)
}

/// Split items sorted along one axis into groups
///
/// A new group starts whenever an item's coordinate exceeds the current group's
/// first coordinate by more than `gap`.
pub fn group_by_gap<T>(items: Vec<T>, gap: u32, coordinate: impl Fn(&T) -> u32) -> Vec<Vec<T>> {
    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut group_start: Option<u32> = None;

    for item in items {
        let value = coordinate(&item);
        if let (Some(start), Some(group)) = (group_start, groups.last_mut()) {
            if value.abs_diff(start) <= gap {
                group.push(item);
                continue;
            }
        }
        group_start = Some(value);
        groups.push(vec![item]);
    }

    groups
}
