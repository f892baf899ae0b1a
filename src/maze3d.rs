//! First-person maze view extruded from the collision layer.
//!
//! Maze space is right-handed: X east, Y up, Z south (toward the bottom of
//! the 2D map). The affine between maze XZ and 2D world coordinates is exact
//! in both directions, so the camera body and item queries can live in the
//! shared physics world.

use crate::error::Error;
use crate::physics::{BodyKind, BodyOptions};
use crate::world::World;
use log::info;
use macroquad::models::{draw_mesh, Mesh, Vertex};
use macroquad::prelude::*;
use rapier2d::prelude::{ColliderBuilder, RigidBodyHandle};

pub const MAX_MAZE_ITEMS: usize = 64;

const PITCH_LIMIT: f32 = 1.45;
const MAX_QUADS_PER_MESH: usize = 16_000;

#[derive(Debug, Clone)]
pub struct MazeConfig {
    pub wall_height: f32,
    pub eye_height: f32,
    /// Half-extent of the camera's square footprint for grid collision.
    pub camera_radius: f32,
    pub fovy: f32,
    pub wall_gid: u32,
    pub floor_gid: Option<u32>,
    pub ceiling_gid: Option<u32>,
    /// Mirror the camera as a dynamic circle body in the 2D physics world so
    /// other bodies (and collision callbacks) perceive the player.
    pub with_body: bool,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            wall_height: 1.0,
            eye_height: 0.5,
            camera_radius: 0.2,
            fovy: 1.2,
            wall_gid: 1,
            floor_gid: None,
            ceiling_gid: None,
            with_body: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MazeCamera {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
}

/// A billboard item standing in the maze. `pos` is the base position without
/// the bob offset applied.
pub struct MazeItem {
    pub name: String,
    pub pos: Vec3,
    pub size: Vec2,
    /// Atlas gids cycled with the same one-frame-per-tick accumulator the
    /// sprite animations use.
    pub frames: Vec<u32>,
    pub frame: usize,
    pub fps: f32,
    elapsed: f32,
    pub bob_amplitude: f32,
    pub bob_speed: f32,
    bob_phase: f32,
    pub spin_speed: f32,
    spin_angle: f32,
    pub pickup_radius: f32,
    pub visible: bool,
    pub picked: bool,
}

impl MazeItem {
    fn advance(&mut self, dt: f32) {
        self.bob_phase += self.bob_speed * dt;
        self.spin_angle += self.spin_speed * dt;
        if self.fps > 0.0 && self.frames.len() > 1 {
            self.elapsed += dt;
            let frame_time = 1.0 / self.fps;
            if self.elapsed >= frame_time {
                self.elapsed -= frame_time;
                self.frame = (self.frame + 1) % self.frames.len();
            }
        }
    }

    fn bob_offset(&self) -> f32 {
        self.bob_amplitude * self.bob_phase.sin()
    }
}

/// Which side of a wall cell a quad faces. North is -Z (toward the top of
/// the 2D map).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    North,
    South,
    East,
    West,
}

pub struct Maze3d {
    pub enabled: bool,
    pub config: MazeConfig,
    pub camera: MazeCamera,
    pub(crate) body: Option<RigidBodyHandle>,

    grid: Vec<bool>,
    grid_w: usize,
    grid_h: usize,
    cell: f32,
    offset: Vec2,
    map_h_world: f32,

    items: Vec<MazeItem>,
    dirty: bool,
    meshes: Vec<Mesh>,
}

impl Maze3d {
    fn new(config: MazeConfig, grid: Vec<bool>, grid_w: usize, grid_h: usize, cell: f32, offset: Vec2) -> Self {
        let spawn = (0..grid.len())
            .find(|i| !grid[*i])
            .unwrap_or(0);
        let (sx, sz) = (spawn % grid_w.max(1), spawn / grid_w.max(1));
        let camera = MazeCamera {
            x: (sx as f32 + 0.5) * cell,
            y: config.eye_height,
            z: (sz as f32 + 0.5) * cell,
            yaw: 0.0,
            pitch: 0.0,
        };
        Self {
            enabled: true,
            config,
            camera,
            body: None,
            grid,
            grid_w,
            grid_h,
            cell,
            offset,
            map_h_world: grid_h as f32 * cell,
            items: Vec::new(),
            dirty: true,
            meshes: Vec::new(),
        }
    }

    pub fn grid_size(&self) -> (usize, usize) {
        (self.grid_w, self.grid_h)
    }

    /// Out-of-bounds counts as solid so the camera can never leave the grid.
    pub fn is_wall(&self, gx: i32, gz: i32) -> bool {
        if gx < 0 || gz < 0 || gx >= self.grid_w as i32 || gz >= self.grid_h as i32 {
            return true;
        }
        self.grid[gz as usize * self.grid_w + gx as usize]
    }

    pub fn maze_to_world(&self, mx: f32, mz: f32) -> Vec2 {
        vec2(mx + self.offset.x, self.map_h_world - mz + self.offset.y)
    }

    pub fn world_to_maze(&self, p: Vec2) -> (f32, f32) {
        (p.x - self.offset.x, self.map_h_world - (p.y - self.offset.y))
    }

    pub fn camera_world_pos(&self) -> Vec2 {
        self.maze_to_world(self.camera.x, self.camera.z)
    }

    /// Wall quads that face an open in-bounds cell. Interior faces and faces
    /// looking off the edge of the grid are culled.
    pub fn exposed_faces(&self) -> Vec<(usize, usize, Face)> {
        let mut faces = Vec::new();
        for gz in 0..self.grid_h {
            for gx in 0..self.grid_w {
                if !self.grid[gz * self.grid_w + gx] {
                    continue;
                }
                let (gx_i, gz_i) = (gx as i32, gz as i32);
                let open = |x: i32, z: i32| {
                    x >= 0
                        && z >= 0
                        && x < self.grid_w as i32
                        && z < self.grid_h as i32
                        && !self.grid[z as usize * self.grid_w + x as usize]
                };
                if open(gx_i, gz_i - 1) {
                    faces.push((gx, gz, Face::North));
                }
                if open(gx_i, gz_i + 1) {
                    faces.push((gx, gz, Face::South));
                }
                if open(gx_i + 1, gz_i) {
                    faces.push((gx, gz, Face::East));
                }
                if open(gx_i - 1, gz_i) {
                    faces.push((gx, gz, Face::West));
                }
            }
        }
        faces
    }

    /// Move in the camera's yaw frame with axis-separated grid collision:
    /// each axis is applied alone and reverted if any footprint corner lands
    /// in a wall, so sliding along walls works.
    pub fn move_camera(&mut self, forward: f32, strafe: f32, dt: f32) {
        let (sin, cos) = self.camera.yaw.sin_cos();
        let dx = (cos * forward + sin * strafe) * dt;
        let dz = (sin * forward - cos * strafe) * dt;

        let nx = self.camera.x + dx;
        if !self.footprint_blocked(nx, self.camera.z) {
            self.camera.x = nx;
        }
        let nz = self.camera.z + dz;
        if !self.footprint_blocked(self.camera.x, nz) {
            self.camera.z = nz;
        }
    }

    fn footprint_blocked(&self, x: f32, z: f32) -> bool {
        let r = self.config.camera_radius;
        [
            (x - r, z - r),
            (x + r, z - r),
            (x - r, z + r),
            (x + r, z + r),
        ]
        .iter()
        .any(|(cx, cz)| {
            self.is_wall((cx / self.cell).floor() as i32, (cz / self.cell).floor() as i32)
        })
    }

    pub fn turn_camera(&mut self, dyaw: f32, dpitch: f32) {
        self.camera.yaw += dyaw;
        self.camera.pitch = (self.camera.pitch + dpitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn set_wall_height(&mut self, h: f32) {
        self.config.wall_height = h;
        self.dirty = true;
    }

    pub fn set_wall_gid(&mut self, gid: u32) {
        self.config.wall_gid = gid;
        self.dirty = true;
    }

    pub fn set_floor_gid(&mut self, gid: Option<u32>) {
        self.config.floor_gid = gid;
        self.dirty = true;
    }

    pub fn set_ceiling_gid(&mut self, gid: Option<u32>) {
        self.config.ceiling_gid = gid;
        self.dirty = true;
    }

    pub fn items(&self) -> &[MazeItem] {
        &self.items
    }

    pub fn item_mut(&mut self, idx: usize) -> Option<&mut MazeItem> {
        self.items.get_mut(idx)
    }

    fn add_item(&mut self, item: MazeItem) -> Result<usize, Error> {
        if self.items.len() >= MAX_MAZE_ITEMS {
            return Err(Error::CapacityExceeded {
                what: "maze items",
                limit: MAX_MAZE_ITEMS,
            });
        }
        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    fn forward(&self) -> Vec3 {
        let (ys, yc) = self.camera.yaw.sin_cos();
        let (ps, pc) = self.camera.pitch.sin_cos();
        vec3(yc * pc, ps, ys * pc)
    }

    /// Bob, spin and frame-cycle every visible item, then collect the ones
    /// the camera just walked over (XZ-plane distance test).
    fn update_items(&mut self, dt: f32) -> Vec<(usize, String)> {
        let cam = vec2(self.camera.x, self.camera.z);
        let mut picked = Vec::new();
        for (idx, item) in self.items.iter_mut().enumerate() {
            if item.picked || !item.visible {
                continue;
            }
            item.advance(dt);
            let d = vec2(item.pos.x, item.pos.z) - cam;
            if d.length() <= item.pickup_radius {
                item.picked = true;
                item.visible = false;
                picked.push((idx, item.name.clone()));
            }
        }
        picked
    }
}

impl World {
    /// Build (or rebuild) the maze from the current collision grid and turn
    /// the view on. The camera spawns at the first open cell in row-major
    /// order; items and camera state survive re-enables.
    pub fn maze_enable(&mut self, config: MazeConfig) -> Result<(), Error> {
        match self.maze.as_mut() {
            None => {
                let (grid, w, h) = self.extract_maze_grid();
                info!("maze enabled ({}x{} grid, cell {})", w, h, self.meta.tile_size);
                self.maze = Some(Maze3d::new(
                    config,
                    grid,
                    w,
                    h,
                    self.meta.tile_size,
                    self.meta.offset,
                ));
            }
            Some(maze) => {
                // Re-enables apply the new config; geometry depends on it.
                maze.config = config;
                maze.dirty = true;
                maze.enabled = true;
            }
        }

        let needs_body = self.maze.as_ref().and_then(|m| {
            (m.config.with_body && m.body.is_none())
                .then(|| (m.config.camera_radius, m.camera_world_pos()))
        });
        if let Some((radius, pos)) = needs_body {
            let opts = BodyOptions {
                kind: BodyKind::Dynamic,
                fixed_rotation: true,
                gravity_scale: 0.0,
                ..Default::default()
            };
            let name_id = self.names.register("camera");
            let handle = self.physics.add_body(pos, 0.0, &opts);
            self.physics.attach_collider(
                handle,
                ColliderBuilder::ball(radius),
                &opts,
                name_id,
                self.contact_events_enabled,
            );
            self.named_bodies.insert(handle, "camera".to_owned());
            self.physics.refresh_queries();
            if let Some(maze) = self.maze.as_mut() {
                maze.body = Some(handle);
            }
        }
        Ok(())
    }

    /// Turn the view off. The camera body, movement state and items all
    /// survive for the next enable.
    pub fn maze_disable(&mut self) {
        if let Some(maze) = self.maze.as_mut() {
            maze.enabled = false;
        }
    }

    pub fn maze(&self) -> Option<&Maze3d> {
        self.maze.as_ref()
    }

    pub fn maze_mut(&mut self) -> Option<&mut Maze3d> {
        self.maze.as_mut()
    }

    /// Re-extract the occupancy grid after a map reload.
    pub fn maze_rebuild(&mut self) {
        let (grid, w, h) = self.extract_maze_grid();
        if let Some(maze) = self.maze.as_mut() {
            maze.grid = grid;
            maze.grid_w = w;
            maze.grid_h = h;
            maze.cell = self.meta.tile_size;
            maze.offset = self.meta.offset;
            maze.map_h_world = h as f32 * self.meta.tile_size;
            maze.dirty = true;
        }
    }

    /// Occupancy from the collision tiles, independent of how their bodies
    /// were merged.
    fn extract_maze_grid(&self) -> (Vec<bool>, usize, usize) {
        let (w, h) = (self.meta.width, self.meta.height);
        let mut grid = vec![false; w * h];
        for tile in self.tiles.iter().filter(|t| t.is_collision) {
            if let Some((tx, ty)) = self.meta.world_to_tile(vec2(tile.x, tile.y)) {
                grid[ty * w + tx] = true;
            }
        }
        (grid, w, h)
    }

    pub fn maze_move(&mut self, forward: f32, strafe: f32, dt: f32) {
        if let Some(maze) = self.maze.as_mut() {
            maze.move_camera(forward, strafe, dt);
        }
    }

    pub fn maze_turn(&mut self, dyaw: f32, dpitch: f32) {
        if let Some(maze) = self.maze.as_mut() {
            maze.turn_camera(dyaw, dpitch);
        }
    }

    pub fn maze_camera_world_pos(&self) -> Option<Vec2> {
        self.maze.as_ref().map(|m| m.camera_world_pos())
    }

    /// Place a billboard item at a grid cell. Bob phases stagger by index so
    /// a row of items does not bounce in lockstep.
    pub fn maze_add_item(
        &mut self,
        name: &str,
        frames: Vec<u32>,
        fps: f32,
        cell: (usize, usize),
        size: Vec2,
    ) -> Result<usize, Error> {
        let Some(maze) = self.maze.as_mut() else {
            return Err(Error::InvalidMap("maze is not enabled".into()));
        };
        let c = maze.cell;
        let idx = maze.items.len();
        maze.add_item(MazeItem {
            name: name.to_owned(),
            pos: vec3(
                (cell.0 as f32 + 0.5) * c,
                size.y / 2.0 + 0.1,
                (cell.1 as f32 + 0.5) * c,
            ),
            size,
            frames,
            frame: 0,
            fps,
            elapsed: 0.0,
            bob_amplitude: 0.05,
            bob_speed: 2.0,
            bob_phase: idx as f32 * 0.7,
            spin_speed: 0.0,
            spin_angle: 0.0,
            pickup_radius: 0.35,
            visible: true,
            picked: false,
        })
    }

    /// Per-frame maze work: item motion, pickups, and mirroring the camera
    /// into its 2D body (set-transform plus zeroed velocity, so the solver
    /// never fights the grid movement).
    pub(crate) fn update_maze(&mut self, dt: f32) {
        let Some(maze) = self.maze.as_mut() else {
            return;
        };
        if !maze.enabled {
            return;
        }
        let picked = maze.update_items(dt);
        if let Some(body) = maze.body {
            let pos = maze.camera_world_pos();
            self.physics.set_translation(body, pos);
            self.physics.zero_velocities(body);
            self.physics.refresh_queries();
        }
        for (idx, name) in picked {
            if let Some(cb) = self.pickup_callback.as_mut() {
                cb(idx, &name);
            }
        }
    }

    pub(crate) fn draw_maze(&mut self) {
        let maze_dirty = self.maze.as_ref().is_some_and(|m| m.dirty);
        if maze_dirty {
            self.rebuild_maze_meshes();
        }
        let Some(maze) = self.maze.as_ref() else {
            return;
        };

        let position = vec3(maze.camera.x, maze.camera.y, maze.camera.z);
        set_camera(&Camera3D {
            position,
            target: position + maze.forward(),
            up: vec3(0.0, 1.0, 0.0),
            fovy: maze.config.fovy,
            ..Default::default()
        });

        for mesh in &maze.meshes {
            draw_mesh(mesh);
        }
        self.draw_maze_items();

        set_default_camera();
    }

    fn draw_maze_items(&self) {
        let Some(maze) = self.maze.as_ref() else {
            return;
        };
        let forward = maze.forward();
        let up = vec3(0.0, 1.0, 0.0);
        let right = forward.cross(up).normalize_or_zero();
        let bill_up = right.cross(forward).normalize_or_zero();

        for item in &maze.items {
            if !item.visible {
                continue;
            }
            let Some((_, atlas, local)) = self
                .atlases
                .lookup(*item.frames.get(item.frame).unwrap_or(&0))
            else {
                continue;
            };
            let uv = atlas.uv_rect(local);

            // Spin rotates the billboard's right axis in the XZ plane.
            let (s, c) = item.spin_angle.sin_cos();
            let r = vec3(right.x * c - right.z * s, 0.0, right.x * s + right.z * c);

            let center = item.pos + vec3(0.0, item.bob_offset(), 0.0);
            let hw = r * (item.size.x / 2.0);
            let hh = bill_up * (item.size.y / 2.0);
            let quad = [
                center - hw + hh,
                center + hw + hh,
                center + hw - hh,
                center - hw - hh,
            ];
            let vertices = vec![
                Vertex::new(quad[0].x, quad[0].y, quad[0].z, uv.x, uv.y, WHITE),
                Vertex::new(quad[1].x, quad[1].y, quad[1].z, uv.x + uv.w, uv.y, WHITE),
                Vertex::new(quad[2].x, quad[2].y, quad[2].z, uv.x + uv.w, uv.y + uv.h, WHITE),
                Vertex::new(quad[3].x, quad[3].y, quad[3].z, uv.x, uv.y + uv.h, WHITE),
            ];
            draw_mesh(&Mesh {
                vertices,
                indices: vec![0, 1, 2, 0, 2, 3],
                texture: atlas.texture.clone(),
            });
        }
    }

    /// Directional arrow at the camera's 2D-mapped position plus icons for
    /// visible items, drawn inside the active 2D world camera.
    pub(crate) fn draw_maze_minimap(&self) {
        let Some(maze) = self.maze.as_ref() else {
            return;
        };
        let pos = maze.camera_world_pos();
        let r = maze.cell * 0.4;
        // Maze yaw 0 faces maze +X which is world +X; maze +Z maps to world -Y.
        let dir = vec2(maze.camera.yaw.cos(), -maze.camera.yaw.sin());
        let side = vec2(-dir.y, dir.x);
        draw_triangle(
            pos + dir * r,
            pos - dir * r * 0.5 + side * r * 0.5,
            pos - dir * r * 0.5 - side * r * 0.5,
            YELLOW,
        );
        for item in maze.items.iter().filter(|i| i.visible) {
            let p = maze.maze_to_world(item.pos.x, item.pos.z);
            draw_circle(p.x, p.y, maze.cell * 0.15, SKYBLUE);
        }
    }

    fn rebuild_maze_meshes(&mut self) {
        let Some(maze) = self.maze.as_mut() else {
            return;
        };
        maze.meshes.clear();
        let cell = maze.cell;
        let wall_h = maze.config.wall_height;

        let wall_uv_tex = self
            .atlases
            .lookup(maze.config.wall_gid)
            .map(|(_, a, local)| (a.uv_rect(local), a.texture.clone()));
        let (uv, texture) = match wall_uv_tex {
            Some((uv, tex)) => (uv, tex),
            None => (Rect::new(0.0, 0.0, 1.0, 1.0), None),
        };

        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u16> = Vec::new();
        let mut flush = |vertices: &mut Vec<Vertex>, indices: &mut Vec<u16>, meshes: &mut Vec<Mesh>| {
            if !vertices.is_empty() {
                meshes.push(Mesh {
                    vertices: std::mem::take(vertices),
                    indices: std::mem::take(indices),
                    texture: texture.clone(),
                });
            }
        };

        for (gx, gz, face) in maze.exposed_faces() {
            if vertices.len() / 4 >= MAX_QUADS_PER_MESH {
                flush(&mut vertices, &mut indices, &mut maze.meshes);
            }
            let x0 = gx as f32 * cell;
            let z0 = gz as f32 * cell;
            let (x1, z1) = (x0 + cell, z0 + cell);
            // Corners ordered top-left, top-right, bottom-right, bottom-left
            // as seen from the open cell.
            let corners = match face {
                Face::North => [
                    vec3(x1, wall_h, z0),
                    vec3(x0, wall_h, z0),
                    vec3(x0, 0.0, z0),
                    vec3(x1, 0.0, z0),
                ],
                Face::South => [
                    vec3(x0, wall_h, z1),
                    vec3(x1, wall_h, z1),
                    vec3(x1, 0.0, z1),
                    vec3(x0, 0.0, z1),
                ],
                Face::East => [
                    vec3(x1, wall_h, z1),
                    vec3(x1, wall_h, z0),
                    vec3(x1, 0.0, z0),
                    vec3(x1, 0.0, z1),
                ],
                Face::West => [
                    vec3(x0, wall_h, z0),
                    vec3(x0, wall_h, z1),
                    vec3(x0, 0.0, z1),
                    vec3(x0, 0.0, z0),
                ],
            };
            let base = vertices.len() as u16;
            let uvs = [
                (uv.x, uv.y),
                (uv.x + uv.w, uv.y),
                (uv.x + uv.w, uv.y + uv.h),
                (uv.x, uv.y + uv.h),
            ];
            for (p, (u, v)) in corners.iter().zip(uvs) {
                vertices.push(Vertex::new(p.x, p.y, p.z, u, v, WHITE));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        flush(&mut vertices, &mut indices, &mut maze.meshes);

        self.build_maze_plane(false);
        self.build_maze_plane(true);

        if let Some(maze) = self.maze.as_mut() {
            maze.dirty = false;
        }
    }

    /// One quad over each open cell at floor (y=0) or ceiling (y=wall_height)
    /// level, only when the corresponding gid is configured.
    fn build_maze_plane(&mut self, ceiling: bool) {
        let Some(maze) = self.maze.as_mut() else {
            return;
        };
        let gid = if ceiling {
            maze.config.ceiling_gid
        } else {
            maze.config.floor_gid
        };
        let Some(gid) = gid else { return };
        let Some((_, atlas, local)) = self.atlases.lookup(gid) else {
            return;
        };
        let uv = atlas.uv_rect(local);
        let texture = atlas.texture.clone();
        let y = if ceiling { maze.config.wall_height } else { 0.0 };
        let cell = maze.cell;

        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u16> = Vec::new();
        for gz in 0..maze.grid_h {
            for gx in 0..maze.grid_w {
                if maze.grid[gz * maze.grid_w + gx] {
                    continue;
                }
                if vertices.len() / 4 >= MAX_QUADS_PER_MESH {
                    maze.meshes.push(Mesh {
                        vertices: std::mem::take(&mut vertices),
                        indices: std::mem::take(&mut indices),
                        texture: texture.clone(),
                    });
                }
                let (x0, z0) = (gx as f32 * cell, gz as f32 * cell);
                let base = vertices.len() as u16;
                vertices.push(Vertex::new(x0, y, z0, uv.x, uv.y, WHITE));
                vertices.push(Vertex::new(x0 + cell, y, z0, uv.x + uv.w, uv.y, WHITE));
                vertices.push(Vertex::new(x0 + cell, y, z0 + cell, uv.x + uv.w, uv.y + uv.h, WHITE));
                vertices.push(Vertex::new(x0, y, z0 + cell, uv.x, uv.y + uv.h, WHITE));
                indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            }
        }
        if !vertices.is_empty() {
            maze.meshes.push(Mesh {
                vertices,
                indices,
                texture,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;

    fn bordered_world() -> World {
        let json = r#"{
          "width": 4, "height": 4,
          "tilewidth": 32, "tileheight": 32,
          "layers": [
            {"type":"tilelayer","name":"Collision","width":4,"height":4,
             "data":[1,1,1,1,
                     1,0,0,1,
                     1,0,0,1,
                     1,1,1,1]}
          ]
        }"#;
        let mut world = World::new(WorldConfig::default());
        let ir = crate::loader::json_loader::decode_map_str_to_ir(json).unwrap();
        world.load_tilemap_ir(&ir).unwrap();
        world
    }

    #[test]
    fn grid_reflects_occupancy_not_merged_bodies() {
        let mut world = bordered_world();
        // 6 merged bodies, but the grid must show all 12 occupied cells.
        assert_eq!(world.physics.bodies.len(), 6);
        world.maze_enable(MazeConfig::default()).unwrap();
        let maze = world.maze().unwrap();
        assert_eq!(maze.grid_size(), (4, 4));
        let walls = (0..4)
            .flat_map(|z| (0..4).map(move |x| (x, z)))
            .filter(|&(x, z)| maze.is_wall(x, z))
            .count();
        assert_eq!(walls, 12);
        assert!(!maze.is_wall(1, 1));
        assert!(maze.is_wall(-1, 0), "out of bounds is solid");
    }

    #[test]
    fn spawn_is_first_open_cell_in_row_major_order() {
        let mut world = bordered_world();
        world.maze_enable(MazeConfig::default()).unwrap();
        let maze = world.maze().unwrap();
        let cell = world.meta.tile_size;
        assert!((maze.camera.x - 1.5 * cell).abs() < 1e-6);
        assert!((maze.camera.z - 1.5 * cell).abs() < 1e-6);
    }

    #[test]
    fn face_culling_emits_only_open_facing_quads() {
        // 3x3 open field with one wall in the middle: all four faces show.
        let grid = vec![
            false, false, false,
            false, true, false,
            false, false, false,
        ];
        let maze = Maze3d::new(MazeConfig::default(), grid, 3, 3, 1.0, Vec2::ZERO);
        assert_eq!(maze.exposed_faces().len(), 4);

        // Two adjacent walls share a hidden face: 2*4 - 2 = 6.
        let grid = vec![
            false, false, false, false,
            false, true, true, false,
            false, false, false, false,
        ];
        let maze = Maze3d::new(MazeConfig::default(), grid, 4, 3, 1.0, Vec2::ZERO);
        assert_eq!(maze.exposed_faces().len(), 6);

        // A wall on the grid edge shows nothing toward the outside.
        let grid = vec![true, false];
        let maze = Maze3d::new(MazeConfig::default(), grid, 2, 1, 1.0, Vec2::ZERO);
        assert_eq!(maze.exposed_faces().len(), 1);
    }

    #[test]
    fn maze_world_transform_is_reversible() {
        let mut world = bordered_world();
        world.maze_enable(MazeConfig::default()).unwrap();
        let maze = world.maze().unwrap();
        for &(mx, mz) in &[(0.0, 0.0), (1.5, 2.25), (4.0, 4.0)] {
            let w = maze.maze_to_world(mx, mz);
            let (bx, bz) = maze.world_to_maze(w);
            assert!((bx - mx).abs() < 1e-6);
            assert!((bz - mz).abs() < 1e-6);
        }
        // The camera's world position must land in the spawn cell.
        let wp = maze.camera_world_pos();
        assert_eq!(world.meta.world_to_tile(wp), Some((1, 1)));
    }

    #[test]
    fn camera_slides_along_walls_instead_of_sticking() {
        let mut world = bordered_world();
        world.maze_enable(MazeConfig::default()).unwrap();
        let maze = world.maze_mut().unwrap();
        let z_before = maze.camera.z;

        // Push diagonally into the west wall: x is blocked, z still moves.
        maze.camera.yaw = 0.0;
        for _ in 0..60 {
            maze.move_camera(-2.0, 1.0, 1.0 / 60.0);
        }
        let cell = maze.cell;
        assert!(maze.camera.x >= cell, "must not enter the west wall");
        assert!(
            (maze.camera.z - z_before).abs() > 0.1,
            "the free axis keeps moving"
        );
        // And never into a wall cell at all.
        let gx = (maze.camera.x / cell).floor() as i32;
        let gz = (maze.camera.z / cell).floor() as i32;
        assert!(!maze.is_wall(gx, gz));
    }

    #[test]
    fn walking_over_an_item_fires_the_pickup_callback_once() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut world = bordered_world();
        world.maze_enable(MazeConfig::default()).unwrap();
        world.maze_add_item("coin", vec![1], 0.0, (1, 1), vec2(0.3, 0.3)).unwrap();

        let picked: Rc<RefCell<Vec<(usize, String)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = picked.clone();
        world.set_pickup_callback(Box::new(move |idx, name| {
            sink.borrow_mut().push((idx, name.to_owned()));
        }));

        // Camera spawns in (1,1), right on top of the item.
        world.update(1.0 / 60.0);
        world.update(1.0 / 60.0);

        let picked = picked.borrow();
        assert_eq!(picked.as_slice(), &[(0, "coin".to_owned())]);
        assert!(!world.maze().unwrap().items()[0].visible);
    }

    #[test]
    fn item_capacity_is_enforced() {
        let mut world = bordered_world();
        world.maze_enable(MazeConfig::default()).unwrap();
        for i in 0..MAX_MAZE_ITEMS {
            world
                .maze_add_item(&format!("item{i}"), vec![1], 0.0, (1, 1), vec2(0.2, 0.2))
                .unwrap();
        }
        let err = world
            .maze_add_item("overflow", vec![1], 0.0, (1, 1), vec2(0.2, 0.2))
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }

    #[test]
    fn disabling_keeps_the_camera_body_alive() {
        let mut world = bordered_world();
        world.maze_enable(MazeConfig::default()).unwrap();
        let body = world.maze().unwrap().body.expect("camera body");
        world.maze_disable();
        assert!(world.physics.is_valid(body));
        world.maze_enable(MazeConfig::default()).unwrap();
        assert_eq!(world.maze().unwrap().body, Some(body));
    }

    #[test]
    fn re_enabling_applies_the_new_config() {
        let mut world = bordered_world();
        world
            .maze_enable(MazeConfig {
                with_body: false,
                ..Default::default()
            })
            .unwrap();
        assert!(world.maze().unwrap().body.is_none());
        world.maze_disable();

        let taller = MazeConfig {
            wall_height: 4.5,
            ..Default::default()
        };
        world.maze_enable(taller).unwrap();
        let maze = world.maze().unwrap();
        assert!(maze.enabled);
        assert!((maze.config.wall_height - 4.5).abs() < 1e-6);
        // The body was not requested the first time around; it is now.
        assert!(maze.body.is_some());
    }
}
