// src/region.rs
//
// Lane detection regions and the point-membership test used to decide
// whether a vehicle belongs to a lane.

use crate::error::{Error, Result};
use crate::types::{LaneId, Point};

/// Closed polygon in frame pixel coordinates. The last vertex connects
/// back to the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    /// Build the detection region for `lane`, rejecting anything with
    /// fewer than three vertices.
    pub fn new(lane: LaneId, points: Vec<Point>) -> Result<Self> {
        if points.len() < 3 {
            return Err(Error::InvalidPolygon {
                lane,
                points: points.len(),
            });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Edges as `(start, end)` pairs, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    pub fn contains(&self, point: Point) -> bool {
        contains(point, self)
    }
}

/// Point-in-polygon using winding number, exact on integer coordinates.
///
/// Points lying on an edge or vertex count as inside so that vehicles
/// riding the region border don't flicker in and out of the count.
pub fn contains(point: Point, polygon: &Polygon) -> bool {
    let mut winding = 0i32;

    for (a, b) in polygon.edges() {
        if on_segment(point, a, b) {
            return true;
        }

        let side = cross(a, b, point);
        if a.y <= point.y {
            if b.y > point.y && side > 0 {
                winding += 1;
            }
        } else if b.y <= point.y && side < 0 {
            winding -= 1;
        }
    }

    winding != 0
}

/// Twice the signed area of triangle (a, b, p). Positive when `p` is left
/// of the directed edge a→b.
fn cross(a: Point, b: Point, p: Point) -> i64 {
    let (ax, ay) = (a.x as i64, a.y as i64);
    let (bx, by) = (b.x as i64, b.y as i64);
    let (px, py) = (p.x as i64, p.y as i64);
    (bx - ax) * (py - ay) - (px - ax) * (by - ay)
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    cross(a, b, p) == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}
