use macroquad::prelude::*;
use rapier2d::prelude::*;

/// A collision shape in unit-tile space: coordinates in [0,1] with y growing
/// downward, matching how authoring tools (Tiled, Aseprite) measure pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum TileShape {
    Box { cx: f32, cy: f32, hw: f32, hh: f32 },
    Circle { cx: f32, cy: f32, r: f32 },
    Polygon(Vec<Vec2>),
}

impl TileShape {
    /// Scale a normalized shape up to a body-local collider for a tile/frame of
    /// `w` x `h` world units. Authoring y is top-down, physics y is up, so
    /// every vertical coordinate goes through `0.5 - v`.
    pub fn to_collider(&self, w: f32, h: f32) -> Option<ColliderBuilder> {
        match self {
            TileShape::Box { cx, cy, hw, hh } => Some(
                ColliderBuilder::cuboid(hw * w, hh * h)
                    .translation(vector![(cx - 0.5) * w, (0.5 - cy) * h]),
            ),
            TileShape::Circle { cx, cy, r } => Some(
                ColliderBuilder::ball(r * w.min(h))
                    .translation(vector![(cx - 0.5) * w, (0.5 - cy) * h]),
            ),
            TileShape::Polygon(verts) => {
                if verts.len() < 3 {
                    return None;
                }
                let points: Vec<Point<Real>> = verts
                    .iter()
                    .map(|v| point![(v.x - 0.5) * w, (0.5 - v.y) * h])
                    .collect();
                ColliderBuilder::convex_hull(&points)
            }
        }
    }

    /// Normalize a rectangle measured in pixels against a `tw` x `th` frame.
    pub fn box_from_px(x: f32, y: f32, w: f32, h: f32, tw: f32, th: f32) -> TileShape {
        TileShape::Box {
            cx: (x + w / 2.0) / tw,
            cy: (y + h / 2.0) / th,
            hw: w / 2.0 / tw,
            hh: h / 2.0 / th,
        }
    }

    /// Normalize an ellipse (as a circle of the smaller radius) against a frame.
    pub fn circle_from_px(x: f32, y: f32, w: f32, h: f32, tw: f32, th: f32) -> TileShape {
        TileShape::Circle {
            cx: (x + w / 2.0) / tw,
            cy: (y + h / 2.0) / th,
            r: (w.min(h) / 2.0) / tw.min(th),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_from_px_normalizes_to_unit_space() {
        // 8x8 hitbox in the lower half of a 16x16 tile
        let s = TileShape::box_from_px(4.0, 8.0, 8.0, 8.0, 16.0, 16.0);
        assert_eq!(
            s,
            TileShape::Box {
                cx: 0.5,
                cy: 0.75,
                hw: 0.25,
                hh: 0.25
            }
        );
    }

    #[test]
    fn to_collider_flips_authoring_y() {
        // A box centered in the top-down lower half must land below the body
        // center in y-up physics space.
        let s = TileShape::Box {
            cx: 0.5,
            cy: 0.75,
            hw: 0.25,
            hh: 0.25,
        };
        let collider = s.to_collider(2.0, 2.0).expect("box collider").build();
        let t = collider.position().translation;
        assert!((t.x - 0.0).abs() < 1e-6);
        assert!((t.y - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn degenerate_polygon_yields_no_collider() {
        let s = TileShape::Polygon(vec![vec2(0.0, 0.0), vec2(1.0, 1.0)]);
        assert!(s.to_collider(1.0, 1.0).is_none());
    }
}
