use std::collections::HashMap;

use crate::atlas::AtlasSet;
use crate::camera::{Camera, CameraFocus};
use crate::loader::json_loader::decode_map_file_to_ir;
use crate::loader::sheet_loader::{decode_sheet_file, SheetData};
use crate::maze3d::Maze3d;
use crate::physics::{Physics, DEFAULT_GRAVITY, DEFAULT_SUBSTEPS};
use crate::shapes::TileShape;
use crate::sprite::{Sprite, SpriteImage, SpriteSheet};
use crate::tilemap::{MapMeta, TileInstance, WorldObject};
use anyhow::Context;
use log::{info, warn};
use macroquad::models::Mesh;
use macroquad::prelude::*;
use rapier2d::prelude::{ColliderHandle, CollisionEvent, CollisionEventFlags, RigidBodyHandle};

/// Invoked on contact begin as `(name_a, name_b)`; for sensor overlaps the
/// visitor comes first and the sensor second.
pub type CollisionCallback = Box<dyn FnMut(&str, &str)>;
/// Invoked when the maze camera picks up an item, as `(item_index, name)`.
pub type PickupCallback = Box<dyn FnMut(usize, &str)>;

/// Stable integer ids for collider user data. Id 0 means unnamed.
#[derive(Default)]
pub(crate) struct NameRegistry {
    next: u64,
    names: HashMap<u64, String>,
}

impl NameRegistry {
    pub(crate) fn register(&mut self, name: &str) -> u64 {
        self.next += 1;
        self.names.insert(self.next, name.to_owned());
        self.next
    }

    pub(crate) fn resolve(&self, id: u64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.names.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub gravity: Vec2,
    pub substeps: usize,
    /// Scale between TMX/sheet pixels and world units.
    pub pixels_per_meter: f32,
    /// Tile layer whose cells become merged static bodies.
    pub collision_layer: String,
    /// Shift the map so world origin sits at its center.
    pub auto_center: bool,
    /// Visible world height for the default 2D camera, in world units.
    pub view_height: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            substeps: DEFAULT_SUBSTEPS,
            pixels_per_meter: 32.0,
            collision_layer: "Collision".to_owned(),
            auto_center: true,
            view_height: 10.0,
        }
    }
}

/// Owner of the map, sprites, physics, camera and the optional 3D maze view.
/// One `update` call per frame drives the whole simulation.
pub struct World {
    pub config: WorldConfig,
    pub meta: MapMeta,
    pub physics: Physics,
    pub camera: Camera,

    pub(crate) atlases: AtlasSet,
    pub(crate) tiles: Vec<TileInstance>,
    pub(crate) tile_meshes: Vec<Mesh>,
    pub(crate) tiles_dirty: bool,
    pub(crate) tile_bodies: Vec<(RigidBodyHandle, u64)>,
    pub(crate) tile_shapes: HashMap<u32, Vec<TileShape>>,
    pub(crate) objects: Vec<WorldObject>,

    pub(crate) sprites: Vec<Sprite>,
    pub(crate) sheets: Vec<SpriteSheet>,
    pub(crate) pending_removals: Vec<usize>,

    pub(crate) names: NameRegistry,
    pub(crate) named_bodies: HashMap<RigidBodyHandle, String>,
    pub(crate) contact_events_enabled: bool,
    collision_callback: Option<CollisionCallback>,
    pub(crate) pickup_callback: Option<PickupCallback>,

    pub(crate) maze: Option<Maze3d>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let physics = Physics::new(config.gravity);
        info!(
            "world created (gravity {:?}, {} substeps)",
            config.gravity, config.substeps
        );
        Self {
            config,
            meta: MapMeta::default(),
            physics,
            camera: Camera::default(),
            atlases: AtlasSet::new(),
            tiles: Vec::new(),
            tile_meshes: Vec::new(),
            tiles_dirty: false,
            tile_bodies: Vec::new(),
            tile_shapes: HashMap::new(),
            objects: Vec::new(),
            sprites: Vec::new(),
            sheets: Vec::new(),
            pending_removals: Vec::new(),
            names: NameRegistry::default(),
            named_bodies: HashMap::new(),
            contact_events_enabled: false,
            collision_callback: None,
            pickup_callback: None,
            maze: None,
        }
    }

    /// Soft reset: bodies stop where they are, animations rewind, the camera
    /// recenters on its target. Nothing is destroyed.
    pub fn reset(&mut self) {
        let handles: Vec<RigidBodyHandle> =
            self.physics.bodies.iter().map(|(h, _)| h).collect();
        for handle in handles {
            self.physics.zero_velocities(handle);
        }
        for sprite in &mut self.sprites {
            if let Some(anim) = sprite.anim.as_mut() {
                anim.index = 0;
                anim.elapsed = 0.0;
                anim.playing = true;
            }
        }
        self.camera.pos = self.camera.target;
        self.pending_removals.clear();
        // Anything queued before the reset is stale now.
        let _ = self.physics.drain_collision_events();
    }

    pub(crate) fn clear_map_state(&mut self) {
        for (handle, name_id) in std::mem::take(&mut self.tile_bodies) {
            self.named_bodies.remove(&handle);
            self.names.remove(name_id);
            self.physics.remove_body(handle);
        }
        self.tiles.clear();
        self.tile_meshes.clear();
        self.tile_shapes.clear();
        self.objects.clear();
        self.atlases = AtlasSet::new();
        self.meta = MapMeta::default();
        self.tiles_dirty = false;
    }

    pub fn set_gravity(&mut self, gx: f32, gy: f32) {
        self.config.gravity = vec2(gx, gy);
        self.physics.set_gravity(gx, gy);
    }

    /// Decode and ingest a map file, then load its tileset textures.
    pub async fn load_tilemap(&mut self, path: &str) -> anyhow::Result<()> {
        let (ir, dir) = decode_map_file_to_ir(path)?;
        self.load_tilemap_ir(&ir)?;
        for idx in 0..self.atlases.len() {
            let image = self
                .atlases
                .get(idx)
                .map(|a| a.name.clone())
                .context("atlas index out of range")?;
            let image_path = dir.join(&image).to_string_lossy().into_owned();
            self.atlases.load_texture_for(idx, &image_path).await?;
        }
        Ok(())
    }

    /// Register an already-decoded sheet (headless path).
    pub fn add_sheet(&mut self, name: &str, data: SheetData) -> usize {
        self.sheets.push(SpriteSheet {
            name: name.to_owned(),
            data,
            texture: None,
        });
        self.sheets.len() - 1
    }

    pub fn find_sheet(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    /// Decode an Aseprite sheet file and load its image.
    pub async fn load_sheet(&mut self, name: &str, path: &str) -> anyhow::Result<usize> {
        let (data, dir) = decode_sheet_file(path)?;
        let image_path = dir.join(&data.image).to_string_lossy().into_owned();
        let texture = load_texture(&image_path)
            .await
            .with_context(|| format!("Loading texture {}", image_path))?;
        texture.set_filter(FilterMode::Nearest);
        info!("loaded sheet '{}' ({} frames)", name, data.frames.len());
        self.sheets.push(SpriteSheet {
            name: name.to_owned(),
            data,
            texture: Some(texture),
        });
        Ok(self.sheets.len() - 1)
    }

    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }

    pub fn sprite(&self, idx: usize) -> Option<&Sprite> {
        self.sprites.get(idx)
    }

    pub fn sprite_mut(&mut self, idx: usize) -> Option<&mut Sprite> {
        self.sprites.get_mut(idx)
    }

    pub fn find_sprite(&self, name: &str) -> Option<usize> {
        self.sprites.iter().position(|s| s.name == name)
    }

    /// Attach a diagnostic name to a body the sprite registry does not own
    /// (tile bodies get theirs automatically).
    pub fn name_body(&mut self, handle: RigidBodyHandle, name: &str) {
        self.named_bodies.insert(handle, name.to_owned());
    }

    /// Install the collision callback. The first installation retroactively
    /// enables contact events on every existing collider.
    pub fn set_collision_callback(&mut self, cb: CollisionCallback) {
        if !self.contact_events_enabled {
            self.contact_events_enabled = true;
            self.physics.enable_all_contact_events();
        }
        self.collision_callback = Some(cb);
    }

    pub fn clear_collision_callback(&mut self) {
        self.collision_callback = None;
    }

    pub fn set_pickup_callback(&mut self, cb: PickupCallback) {
        self.pickup_callback = Some(cb);
    }

    /// Does anything solid occupy this point? `ignore_sprite` excludes that
    /// sprite's own body from the test.
    pub fn point_query(&self, p: Vec2, ignore_sprite: Option<usize>) -> bool {
        self.physics.point_hit(p, self.body_of(ignore_sprite))
    }

    pub fn aabb_query(&self, min: Vec2, max: Vec2, ignore_sprite: Option<usize>) -> bool {
        self.physics.aabb_hit(min, max, self.body_of(ignore_sprite))
    }

    fn body_of(&self, idx: Option<usize>) -> Option<RigidBodyHandle> {
        idx.and_then(|i| self.sprites.get(i))
            .and_then(|s| s.body)
            .map(|b| b.handle)
    }

    pub(crate) fn camera_focus(&self, idx: usize) -> Option<CameraFocus> {
        let sprite = self.sprites.get(idx)?;
        let vel = sprite
            .body
            .and_then(|b| self.physics.linvel(b.handle))
            .unwrap_or(Vec2::ZERO);
        Some(CameraFocus {
            pos: vec2(sprite.x, sprite.y),
            vel,
        })
    }

    /// Advance the whole world by one frame.
    ///
    /// Order matters: removals drain before physics so freed bodies cannot
    /// collide this frame; the camera reads last frame's sprite positions;
    /// sprites sync from bodies after the step; events dispatch last so the
    /// callback observes a fully settled frame.
    pub fn update(&mut self, dt: f32) {
        // A stall (window drag, debugger) would otherwise explode the solver.
        let dt = if dt > 0.1 { 0.016 } else { dt };
        if dt <= 0.0 {
            return;
        }

        self.drain_removals();

        let focus = self
            .camera
            .mode
            .followed_sprite()
            .and_then(|idx| self.camera_focus(idx));
        self.camera.update(dt, focus);

        self.physics.step(dt, self.config.substeps);
        self.sync_sprites_from_bodies();
        self.advance_animations(dt);

        if self.maze.is_some() {
            self.update_maze(dt);
        }

        self.dispatch_collision_events();
    }

    pub(crate) fn resolve_collider_name(&self, handle: ColliderHandle) -> String {
        if let Some(id) = self.physics.collider_user_data(handle) {
            if id != 0 {
                if let Some(name) = self.names.resolve(id) {
                    return name.to_owned();
                }
            }
        }
        if let Some(body) = self.physics.collider_body(handle) {
            if let Some(sprite) = self
                .sprites
                .iter()
                .find(|s| s.body.map(|b| b.handle) == Some(body))
            {
                return sprite.name.clone();
            }
            if let Some(name) = self.named_bodies.get(&body) {
                return name.clone();
            }
        }
        warn!("collision with unnamed collider {:?}", handle);
        "unknown".to_owned()
    }

    /// Drain this frame's events (always, to keep the channel bounded) and
    /// report contact begins to the callback. For sensor overlaps the sensor
    /// collider is passed second.
    fn dispatch_collision_events(&mut self) {
        let events = self.physics.drain_collision_events();
        if self.collision_callback.is_none() || events.is_empty() {
            return;
        }

        let mut contacts: Vec<(String, String)> = Vec::new();
        for ev in events {
            let CollisionEvent::Started(a, b, flags) = ev else {
                continue;
            };
            let (a, b) = if flags.contains(CollisionEventFlags::SENSOR)
                && self.physics.collider_is_sensor(a)
            {
                (b, a)
            } else {
                (a, b)
            };
            contacts.push((self.resolve_collider_name(a), self.resolve_collider_name(b)));
        }

        if let Some(cb) = self.collision_callback.as_mut() {
            for (a, b) in &contacts {
                cb(a, b);
            }
        }
    }

    /// Draw the frame: the maze view when enabled, otherwise the 2D camera
    /// with batched tile meshes and sprites, plus the maze minimap marker.
    pub fn draw(&mut self) {
        if self.maze.as_ref().is_some_and(|m| m.enabled) {
            self.draw_maze();
            return;
        }

        if self.tiles_dirty {
            self.rebuild_tile_meshes();
        }
        let view_h = self.config.view_height;
        let view_w = view_h * screen_width() / screen_height();
        set_camera(&Camera2D {
            target: self.camera.pos,
            zoom: vec2(2.0 / view_w, 2.0 / view_h),
            ..Default::default()
        });

        for mesh in &self.tile_meshes {
            draw_mesh(mesh);
        }
        self.draw_sprites();
        if self.maze.is_some() {
            self.draw_maze_minimap();
        }

        set_default_camera();
    }

    fn draw_sprites(&self) {
        for sprite in &self.sprites {
            if !sprite.visible {
                continue;
            }
            let (texture, source) = match sprite.image {
                SpriteImage::Atlas { gid } => match self.atlases.lookup(gid) {
                    Some((_, atlas, local)) => {
                        (atlas.texture.as_ref(), Some(atlas.src_rect(local)))
                    }
                    None => (None, None),
                },
                SpriteImage::Sheet { sheet, frame } => {
                    let s = &self.sheets[sheet];
                    (s.texture.as_ref(), Some(s.data.frames[frame].rect_px))
                }
            };
            let Some(texture) = texture else { continue };
            draw_texture_ex(
                texture,
                sprite.x - sprite.w / 2.0,
                sprite.y - sprite.h / 2.0,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(sprite.w, sprite.h)),
                    source,
                    rotation: sprite.angle,
                    // The world camera is y-up; textures are stored y-down.
                    flip_y: true,
                    ..Default::default()
                },
            );
        }
    }
}
