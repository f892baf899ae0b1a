use crate::loader::sheet_loader::SheetData;
use crate::physics::BodyOptions;
use crate::world::World;
use log::{debug, warn};
use macroquad::prelude::*;
use rapier2d::prelude::RigidBodyHandle;

pub const MAX_SPRITES: usize = 1024;

/// Where a sprite's image comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpriteImage {
    Atlas { gid: u32 },
    Sheet { sheet: usize, frame: usize },
}

/// Link from a sprite to its physics body. `offset` is the fixed vector from
/// the visual origin to the body origin, applied on every write-through.
#[derive(Debug, Clone, Copy)]
pub struct BodyRef {
    pub handle: RigidBodyHandle,
    pub offset: Vec2,
}

/// Animation playback over a list of sheet-frame indices.
///
/// The accumulator advances at most one frame per tick: if more than one
/// frame duration elapses in a single update the surplus carries over rather
/// than skipping frames.
#[derive(Debug, Clone)]
pub struct AnimState {
    pub frames: Vec<usize>,
    pub index: usize,
    pub fps: f32,
    pub elapsed: f32,
    pub looping: bool,
    pub playing: bool,
}

impl AnimState {
    pub fn new(frames: Vec<usize>, fps: f32, looping: bool) -> Self {
        Self {
            frames,
            index: 0,
            fps,
            elapsed: 0.0,
            looping,
            playing: true,
        }
    }

    pub fn current_frame(&self) -> Option<usize> {
        self.frames.get(self.index).copied()
    }

    /// Returns true when the visible frame changed.
    pub fn advance(&mut self, dt: f32) -> bool {
        if !self.playing || self.fps <= 0.0 || self.frames.is_empty() {
            return false;
        }
        self.elapsed += dt;
        let frame_time = 1.0 / self.fps;
        if self.elapsed < frame_time {
            return false;
        }
        self.elapsed -= frame_time;
        if self.index + 1 < self.frames.len() {
            self.index += 1;
            true
        } else if self.looping {
            self.index = 0;
            true
        } else {
            self.playing = false;
            false
        }
    }
}

/// A dynamic entity, optionally backed by a physics body. When a body exists
/// the visual transform is derived from it each tick; writes go through the
/// body-aware setters.
pub struct Sprite {
    pub name: String,
    pub(crate) name_id: u64,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub w: f32,
    pub h: f32,
    pub visible: bool,
    pub image: SpriteImage,
    pub body: Option<BodyRef>,
    pub hitbox: Option<Vec2>,
    pub anim: Option<AnimState>,
}

/// A decoded sheet plus its (optional) GPU texture.
pub struct SpriteSheet {
    pub name: String,
    pub data: SheetData,
    pub texture: Option<Texture2D>,
}

impl World {
    fn push_sprite(&mut self, sprite: Sprite) -> Result<usize, crate::error::Error> {
        if self.sprites.len() >= MAX_SPRITES {
            return Err(crate::error::Error::CapacityExceeded {
                what: "sprites",
                limit: MAX_SPRITES,
            });
        }
        self.sprites.push(sprite);
        Ok(self.sprites.len() - 1)
    }

    /// Create a sprite drawing an atlas tile. An unknown gid falls back to the
    /// full texture rather than failing.
    pub fn create_sprite(
        &mut self,
        name: &str,
        gid: u32,
        pos: Vec2,
        size: Vec2,
    ) -> Result<usize, crate::error::Error> {
        if self.atlases.lookup(gid).is_none() {
            warn!("sprite '{}': no atlas for gid {}, nothing will draw", name, gid);
        }
        let name_id = self.names.register(name);
        self.push_sprite(Sprite {
            name: name.to_owned(),
            name_id,
            x: pos.x,
            y: pos.y,
            angle: 0.0,
            w: size.x,
            h: size.y,
            visible: true,
            image: SpriteImage::Atlas { gid },
            body: None,
            hitbox: None,
            anim: None,
        })
    }

    /// Create a sprite from a loaded sheet frame. Display size comes from the
    /// frame's pixel dimensions through pixels-per-meter.
    pub fn create_sprite_from_sheet(
        &mut self,
        name: &str,
        sheet_name: &str,
        frame_name: &str,
        pos: Vec2,
    ) -> Result<usize, crate::error::Error> {
        let sheet_idx =
            self.find_sheet(sheet_name)
                .ok_or_else(|| crate::error::Error::UnknownFrame {
                    sheet: sheet_name.to_owned(),
                    frame: frame_name.to_owned(),
                })?;
        let sheet = &self.sheets[sheet_idx];
        let frame_idx =
            sheet
                .data
                .frame_index(frame_name)
                .ok_or_else(|| crate::error::Error::UnknownFrame {
                    sheet: sheet_name.to_owned(),
                    frame: frame_name.to_owned(),
                })?;
        let frame = &sheet.data.frames[frame_idx];
        let ppm = self.config.pixels_per_meter;
        let size = vec2(frame.rect_px.w / ppm, frame.rect_px.h / ppm);
        let hitbox = frame.hitbox;
        let name_id = self.names.register(name);
        self.push_sprite(Sprite {
            name: name.to_owned(),
            name_id,
            x: pos.x,
            y: pos.y,
            angle: 0.0,
            w: size.x,
            h: size.y,
            visible: true,
            image: SpriteImage::Sheet {
                sheet: sheet_idx,
                frame: frame_idx,
            },
            body: None,
            hitbox,
            anim: None,
        })
    }

    /// Attach a physics body to a sprite. Shape priority: sheet-frame shapes,
    /// then per-gid tile shapes, then the hitbox-ratio box, then a box sized
    /// to the sprite's half extents. Returns false on a bad index.
    pub fn sprite_add_body(&mut self, idx: usize, opts: BodyOptions) -> bool {
        self.sprite_add_body_with_offset(idx, opts, Vec2::ZERO)
    }

    pub fn sprite_add_body_with_offset(
        &mut self,
        idx: usize,
        opts: BodyOptions,
        offset: Vec2,
    ) -> bool {
        let Some(sprite) = self.sprites.get(idx) else {
            return false;
        };
        // Re-attaching replaces the old body instead of orphaning it.
        if let Some(old) = sprite.body {
            self.physics.remove_body(old.handle);
        }
        let sprite = &self.sprites[idx];
        let name_id = sprite.name_id;
        let pos = vec2(sprite.x, sprite.y) + offset;
        let angle = sprite.angle;
        let (w, h) = (sprite.w, sprite.h);

        // Collect shape builders before touching physics so the borrow of
        // sheets/tile_shapes ends first.
        let mut builders = Vec::new();
        match sprite.image {
            SpriteImage::Sheet { sheet, frame } => {
                let f = &self.sheets[sheet].data.frames[frame];
                let ppm = self.config.pixels_per_meter;
                let fw = f.rect_px.w / ppm;
                let fh = f.rect_px.h / ppm;
                for shape in &f.shapes {
                    if let Some(b) = shape.to_collider(fw, fh) {
                        builders.push(b);
                    }
                }
            }
            SpriteImage::Atlas { gid } => {
                if let Some(shapes) = self.tile_shapes.get(&gid) {
                    for shape in shapes {
                        if let Some(b) = shape.to_collider(w, h) {
                            builders.push(b);
                        }
                    }
                }
            }
        }
        if builders.is_empty() {
            let half = match self.sprites[idx].hitbox {
                Some(ratio) => vec2(w / 2.0 * ratio.x, h / 2.0 * ratio.y),
                None => vec2(w / 2.0, h / 2.0),
            };
            builders.push(rapier2d::prelude::ColliderBuilder::cuboid(half.x, half.y));
        }

        let handle = self.physics.add_body(pos, angle, &opts);
        let events = self.contact_events_enabled;
        for b in builders {
            self.physics
                .attach_collider(handle, b, &opts, name_id, events);
        }
        self.physics.refresh_queries();
        debug!(
            "sprite {} '{}' got a {:?} body",
            idx, self.sprites[idx].name, opts.kind
        );
        self.sprites[idx].body = Some(BodyRef { handle, offset });
        true
    }

    /// Remove a sprite immediately: body first, then array compaction.
    /// For removal during the update tick use [`World::queue_remove_sprite`].
    pub fn remove_sprite(&mut self, idx: usize) -> bool {
        if idx >= self.sprites.len() {
            return false;
        }
        let sprite = self.sprites.remove(idx);
        if let Some(body) = sprite.body {
            self.physics.remove_body(body.handle);
        }
        self.names.remove(sprite.name_id);
        // Follow modes reference sprites by index; compaction shifts them.
        if let Some(f) = self.camera.mode.followed_sprite() {
            if f == idx {
                self.camera.mode = crate::camera::CameraMode::Locked;
            } else if f > idx {
                self.camera.mode.set_followed_sprite(f - 1);
            }
        }
        true
    }

    /// Defer removal to the start of the next update tick.
    pub fn queue_remove_sprite(&mut self, idx: usize) {
        if idx < self.sprites.len() && !self.pending_removals.contains(&idx) {
            self.pending_removals.push(idx);
        }
    }

    pub(crate) fn drain_removals(&mut self) {
        if self.pending_removals.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut self.pending_removals);
        // Remove back to front so earlier indices stay valid.
        pending.sort_unstable();
        for idx in pending.into_iter().rev() {
            self.remove_sprite(idx);
        }
    }

    /// Teleport. Writes through to the body (minus offset handling) so the
    /// next sync does not undo it.
    pub fn set_sprite_position(&mut self, idx: usize, pos: Vec2) -> bool {
        let Some(sprite) = self.sprites.get_mut(idx) else {
            return false;
        };
        sprite.x = pos.x;
        sprite.y = pos.y;
        if let Some(body) = sprite.body {
            self.physics.set_translation(body.handle, pos + body.offset);
            self.physics.refresh_queries();
        }
        true
    }

    pub fn set_sprite_rotation(&mut self, idx: usize, angle: f32) -> bool {
        let Some(sprite) = self.sprites.get_mut(idx) else {
            return false;
        };
        sprite.angle = angle;
        if let Some(body) = sprite.body {
            self.physics.set_rotation(body.handle, angle);
        }
        true
    }

    pub fn set_sprite_velocity(&mut self, idx: usize, vel: Vec2) -> bool {
        match self.sprites.get(idx).and_then(|s| s.body) {
            Some(body) => {
                self.physics.set_linvel(body.handle, vel);
                true
            }
            None => false,
        }
    }

    pub fn sprite_apply_impulse(&mut self, idx: usize, impulse: Vec2) -> bool {
        match self.sprites.get(idx).and_then(|s| s.body) {
            Some(body) => {
                self.physics.apply_impulse(body.handle, impulse);
                true
            }
            None => false,
        }
    }

    pub fn sprite_apply_force(&mut self, idx: usize, force: Vec2) -> bool {
        match self.sprites.get(idx).and_then(|s| s.body) {
            Some(body) => {
                self.physics.apply_force(body.handle, force);
                true
            }
            None => false,
        }
    }

    /// Start a named sheet animation on a sheet-backed sprite.
    pub fn set_sprite_animation(&mut self, idx: usize, anim: &str, looping: bool) -> bool {
        let Some(sprite) = self.sprites.get(idx) else {
            return false;
        };
        let SpriteImage::Sheet { sheet, .. } = sprite.image else {
            return false;
        };
        let Some(a) = self.sheets[sheet].data.animations.get(anim) else {
            warn!("sprite {}: sheet has no animation '{}'", idx, anim);
            return false;
        };
        let state = AnimState::new(a.frames.clone(), a.fps, looping);
        let sprite = &mut self.sprites[idx];
        if let Some(frame) = state.current_frame() {
            sprite.image = SpriteImage::Sheet { sheet, frame };
        }
        sprite.anim = Some(state);
        true
    }

    pub fn set_sprite_playing(&mut self, idx: usize, playing: bool) -> bool {
        match self.sprites.get_mut(idx).and_then(|s| s.anim.as_mut()) {
            Some(anim) => {
                anim.playing = playing;
                true
            }
            None => false,
        }
    }

    /// Body -> sprite, one directional. Direct mutation of `x`/`y` on a
    /// bodied sprite is overwritten here every tick.
    pub(crate) fn sync_sprites_from_bodies(&mut self) {
        for sprite in &mut self.sprites {
            let Some(body) = sprite.body else { continue };
            let Some((pos, angle)) = self.physics.position(body.handle) else {
                continue;
            };
            sprite.x = pos.x - body.offset.x;
            sprite.y = pos.y - body.offset.y;
            sprite.angle = angle;
        }
    }

    pub(crate) fn advance_animations(&mut self, dt: f32) {
        for sprite in &mut self.sprites {
            let Some(anim) = sprite.anim.as_mut() else {
                continue;
            };
            if anim.advance(dt) {
                if let (SpriteImage::Sheet { sheet, .. }, Some(frame)) =
                    (sprite.image, anim.current_frame())
                {
                    sprite.image = SpriteImage::Sheet { sheet, frame };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looping_animation_returns_to_start_after_full_cycle() {
        let mut anim = AnimState::new(vec![0, 1, 2, 3], 8.0, true);
        assert_eq!(anim.index, 0);
        // n/f seconds in n ticks of 1/f each
        for _ in 0..4 {
            anim.advance(1.0 / 8.0);
        }
        assert_eq!(anim.index, 0);
        assert!(anim.playing);
    }

    #[test]
    fn non_looping_animation_clamps_to_last_frame_and_stops() {
        let mut anim = AnimState::new(vec![0, 1, 2], 10.0, false);
        for _ in 0..10 {
            anim.advance(0.1);
        }
        assert_eq!(anim.index, 2);
        assert!(!anim.playing);
    }

    #[test]
    fn accumulator_advances_at_most_one_frame_per_tick() {
        let mut anim = AnimState::new(vec![0, 1, 2, 3], 60.0, true);
        // A 100ms stall covers six frame durations but only one frame moves.
        anim.advance(0.1);
        assert_eq!(anim.index, 1);
    }

    #[test]
    fn surplus_time_carries_over() {
        let mut anim = AnimState::new(vec![0, 1], 10.0, true);
        anim.advance(0.15);
        assert_eq!(anim.index, 1);
        // 0.05s left over; 0.05s more completes the next frame duration
        anim.advance(0.05);
        assert_eq!(anim.index, 0);
    }

    #[test]
    fn animation_frame_changes_flow_into_the_sprite_image() {
        use crate::world::{World, WorldConfig};

        let sheet_json = r#"{
          "frames": [
            {"filename":"hero 0","frame":{"x":0,"y":0,"w":16,"h":16},"duration":100},
            {"filename":"hero 1","frame":{"x":16,"y":0,"w":16,"h":16},"duration":100}
          ],
          "meta": {
            "image": "hero.png",
            "size": {"w":32,"h":16},
            "frameTags": [{"name":"walk","from":0,"to":1,"direction":"forward"}]
          }
        }"#;
        let data = crate::loader::sheet_loader::decode_sheet_str(sheet_json).unwrap();
        let mut world = World::new(WorldConfig::default());
        world.add_sheet("hero", data);
        let idx = world
            .create_sprite_from_sheet("h", "hero", "hero 0", vec2(0.0, 0.0))
            .unwrap();
        world.set_sprite_animation(idx, "walk", true);

        world.advance_animations(0.1); // exactly one frame duration at 10 fps
        let sprite = world.sprite(idx).unwrap();
        assert_eq!(sprite.image, SpriteImage::Sheet { sheet: 0, frame: 1 });
    }

    #[test]
    fn stopped_animation_does_not_advance() {
        let mut anim = AnimState::new(vec![0, 1], 10.0, true);
        anim.playing = false;
        anim.advance(1.0);
        assert_eq!(anim.index, 0);
    }
}
