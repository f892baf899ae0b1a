use macroquad::prelude::*;

/// How the camera picks its target each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraMode {
    /// Target stays wherever it was last set.
    Locked,
    /// Target advances at a constant velocity.
    FixedScroll { velocity: Vec2 },
    /// Target snaps to the followed sprite every tick.
    Follow { sprite: usize },
    /// Target moves only when the sprite leaves a centered rectangle, and then
    /// exactly enough to keep the sprite at the rectangle's edge.
    FollowDeadzone {
        sprite: usize,
        width: f32,
        height: f32,
    },
    /// Target offsets a fixed distance ahead of the sprite along each axis
    /// whose speed exceeds the threshold.
    FollowLookahead {
        sprite: usize,
        distance: f32,
        threshold: f32,
    },
}

impl CameraMode {
    pub fn followed_sprite(&self) -> Option<usize> {
        match self {
            CameraMode::Follow { sprite }
            | CameraMode::FollowDeadzone { sprite, .. }
            | CameraMode::FollowLookahead { sprite, .. } => Some(*sprite),
            _ => None,
        }
    }

    /// Repoint a follow mode at another sprite index (after compaction).
    pub fn set_followed_sprite(&mut self, new: usize) {
        match self {
            CameraMode::Follow { sprite }
            | CameraMode::FollowDeadzone { sprite, .. }
            | CameraMode::FollowLookahead { sprite, .. } => *sprite = new,
            _ => {}
        }
    }
}

/// Position and velocity of whatever the camera follows, resolved by the
/// caller so the controller stays decoupled from the sprite registry.
#[derive(Debug, Clone, Copy)]
pub struct CameraFocus {
    pub pos: Vec2,
    pub vel: Vec2,
}

pub struct Camera {
    pub pos: Vec2,
    pub target: Vec2,
    /// <= 0 snaps to target; > 0 smooths exponentially.
    pub smooth_speed: f32,
    pub mode: CameraMode,
    pub bounds: Option<Rect>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pos: Vec2::ZERO,
            target: Vec2::ZERO,
            smooth_speed: 0.0,
            mode: CameraMode::Locked,
            bounds: None,
        }
    }
}

impl Camera {
    pub fn update(&mut self, dt: f32, focus: Option<CameraFocus>) {
        match self.mode {
            CameraMode::Locked => {}
            CameraMode::FixedScroll { velocity } => {
                self.target += velocity * dt;
            }
            CameraMode::Follow { .. } => {
                if let Some(f) = focus {
                    self.target = f.pos;
                }
            }
            CameraMode::FollowDeadzone { width, height, .. } => {
                if let Some(f) = focus {
                    let hw = width / 2.0;
                    let hh = height / 2.0;
                    let dx = f.pos.x - self.target.x;
                    let dy = f.pos.y - self.target.y;
                    if dx > hw {
                        self.target.x = f.pos.x - hw;
                    } else if dx < -hw {
                        self.target.x = f.pos.x + hw;
                    }
                    if dy > hh {
                        self.target.y = f.pos.y - hh;
                    } else if dy < -hh {
                        self.target.y = f.pos.y + hh;
                    }
                }
            }
            CameraMode::FollowLookahead {
                distance,
                threshold,
                ..
            } => {
                if let Some(f) = focus {
                    let mut t = f.pos;
                    if f.vel.x > threshold {
                        t.x += distance;
                    } else if f.vel.x < -threshold {
                        t.x -= distance;
                    }
                    if f.vel.y > threshold {
                        t.y += distance;
                    } else if f.vel.y < -threshold {
                        t.y -= distance;
                    }
                    self.target = t;
                }
            }
        }

        if let Some(b) = self.bounds {
            self.target.x = self.target.x.clamp(b.x, b.x + b.w);
            self.target.y = self.target.y.clamp(b.y, b.y + b.h);
        }

        if self.smooth_speed <= 0.0 {
            self.pos = self.target;
        } else {
            // Frame-rate-independent smoothing. A plain lerp with a fixed
            // factor would settle at different speeds under variable dt.
            let blend = 1.0 - (-self.smooth_speed * dt).exp();
            self.pos += (self.target - self.pos) * blend;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn focus(x: f32, y: f32) -> Option<CameraFocus> {
        Some(CameraFocus {
            pos: vec2(x, y),
            vel: Vec2::ZERO,
        })
    }

    #[test]
    fn smoothing_converges_monotonically_without_overshoot() {
        let mut cam = Camera {
            target: vec2(10.0, 0.0),
            smooth_speed: 4.0,
            ..Default::default()
        };
        let mut last = (cam.target.x - cam.pos.x).abs();
        for _ in 0..240 {
            cam.update(1.0 / 60.0, None);
            let err = (cam.target.x - cam.pos.x).abs();
            assert!(err <= last, "error must never grow");
            assert!(cam.pos.x <= cam.target.x, "must never overshoot");
            last = err;
        }
        assert!(last < 1e-3);
    }

    #[test]
    fn snap_when_smoothing_disabled() {
        let mut cam = Camera {
            mode: CameraMode::Follow { sprite: 0 },
            ..Default::default()
        };
        cam.update(1.0 / 60.0, focus(3.0, 4.0));
        assert_eq!(cam.pos, vec2(3.0, 4.0));
    }

    #[test]
    fn fixed_scroll_advances_target_by_velocity() {
        let mut cam = Camera {
            mode: CameraMode::FixedScroll {
                velocity: vec2(2.0, 0.0),
            },
            ..Default::default()
        };
        cam.update(0.5, None);
        assert!((cam.target.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn deadzone_is_idempotent_inside_and_tracks_edge_outside() {
        let mut cam = Camera {
            mode: CameraMode::FollowDeadzone {
                sprite: 0,
                width: 2.0,
                height: 1.5,
            },
            ..Default::default()
        };

        // inside half-width 1.0: target untouched
        cam.update(1.0 / 60.0, focus(0.5, 0.0));
        assert_eq!(cam.target.x, 0.0);
        cam.update(1.0 / 60.0, focus(0.5, 0.0));
        assert_eq!(cam.target.x, 0.0);

        // outside: target lands exactly at sprite.x - half-width
        cam.update(1.0 / 60.0, focus(2.0, 0.0));
        assert!((cam.target.x - 1.0).abs() < 1e-6);

        // and from the other side
        cam.update(1.0 / 60.0, focus(-2.0, 0.0));
        assert!((cam.target.x - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn lookahead_is_gated_by_velocity_threshold() {
        let mut cam = Camera {
            mode: CameraMode::FollowLookahead {
                sprite: 0,
                distance: 2.0,
                threshold: 1.0,
            },
            ..Default::default()
        };
        cam.update(
            1.0 / 60.0,
            Some(CameraFocus {
                pos: vec2(5.0, 0.0),
                vel: vec2(0.5, 0.0), // below threshold
            }),
        );
        assert_eq!(cam.target, vec2(5.0, 0.0));

        cam.update(
            1.0 / 60.0,
            Some(CameraFocus {
                pos: vec2(5.0, 0.0),
                vel: vec2(3.0, 0.0), // above threshold, fixed offset not scaled
            }),
        );
        assert_eq!(cam.target, vec2(7.0, 0.0));
    }

    #[test]
    fn bounds_clamp_the_target() {
        let mut cam = Camera {
            mode: CameraMode::Follow { sprite: 0 },
            bounds: Some(Rect::new(-1.0, -1.0, 2.0, 2.0)),
            ..Default::default()
        };
        cam.update(1.0 / 60.0, focus(10.0, -10.0));
        assert_eq!(cam.target, vec2(1.0, -1.0));
    }
}
