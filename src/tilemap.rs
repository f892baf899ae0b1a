use crate::error::Error;
use crate::ir_map::*;
use crate::physics::{BodyKind, BodyOptions};
use crate::shapes::TileShape;
use crate::world::World;
use log::info;
use macroquad::models::{Mesh, Vertex};
use macroquad::prelude::*;
use rapier2d::prelude::ColliderBuilder;

/// Keep well inside the u16 index range (4 vertices per quad).
const MAX_QUADS_PER_MESH: usize = 16_000;

/// Map dimensions and the pixel/world/grid transforms. The tile grid is
/// TMX-style row-major top-down; world space is y-up, optionally re-centered.
#[derive(Debug, Clone, Copy)]
pub struct MapMeta {
    pub width: usize,
    pub height: usize,
    /// World units per cell (tile pixels / pixels-per-meter).
    pub tile_size: f32,
    pub pixels_per_meter: f32,
    pub offset: Vec2,
}

impl Default for MapMeta {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            tile_size: 1.0,
            pixels_per_meter: 32.0,
            offset: Vec2::ZERO,
        }
    }
}

impl MapMeta {
    /// Center of cell (tx, ty) in world units.
    pub fn tile_to_world(&self, tx: usize, ty: usize) -> Vec2 {
        vec2(
            (tx as f32 + 0.5) * self.tile_size + self.offset.x,
            (self.height as f32 - ty as f32 - 0.5) * self.tile_size + self.offset.y,
        )
    }

    /// Exact inverse of [`MapMeta::tile_to_world`] for in-bounds cells.
    pub fn world_to_tile(&self, p: Vec2) -> Option<(usize, usize)> {
        let tx = ((p.x - self.offset.x) / self.tile_size - 0.5).round();
        let ty = (self.height as f32 - 0.5 - (p.y - self.offset.y) / self.tile_size).round();
        if tx < 0.0 || ty < 0.0 || tx >= self.width as f32 || ty >= self.height as f32 {
            return None;
        }
        Some((tx as usize, ty as usize))
    }

    /// TMX pixel coordinates (top-down) to world units.
    pub fn px_to_world(&self, px: Vec2) -> Vec2 {
        vec2(
            px.x / self.pixels_per_meter + self.offset.x,
            self.height as f32 * self.tile_size - px.y / self.pixels_per_meter + self.offset.y,
        )
    }

    pub fn world_extent(&self) -> Vec2 {
        vec2(
            self.width as f32 * self.tile_size,
            self.height as f32 * self.tile_size,
        )
    }
}

/// A placed tile. Immutable after load.
///
/// `has_body` is true only on the first tile of a merged collision run (the
/// body belongs to that run); `is_collision` is true on every occupied cell
/// of the collision layer so grid consumers see full occupancy.
pub struct TileInstance {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub uv: Rect,
    pub layer: u16,
    pub atlas: u16,
    pub gid: u32,
    pub has_body: bool,
    pub is_collision: bool,
}

/// A named object from a TMX object layer, in world units.
#[derive(Debug, Clone)]
pub struct WorldObject {
    pub name: String,
    pub class_name: String,
    pub pos: Vec2,
    pub size: Vec2,
    pub shape: IrObjectShape,
    pub properties: Properties,
}

fn tile_shapes_from_metadata(meta: &IrTileMetadata, tw: f32, th: f32) -> Vec<TileShape> {
    let mut shapes = Vec::new();
    for obj in &meta.objects {
        match &obj.shape {
            IrObjectShape::Rectangle => {
                shapes.push(TileShape::box_from_px(
                    obj.x, obj.y, obj.width, obj.height, tw, th,
                ));
            }
            IrObjectShape::Ellipse => {
                shapes.push(TileShape::circle_from_px(
                    obj.x, obj.y, obj.width, obj.height, tw, th,
                ));
            }
            IrObjectShape::Polygon(points) => {
                shapes.push(TileShape::Polygon(
                    points
                        .iter()
                        .map(|p| vec2((obj.x + p.x) / tw, (obj.y + p.y) / th))
                        .collect(),
                ));
            }
            _ => {}
        }
    }
    shapes
}

impl World {
    /// Ingest a decoded map: atlases, tiles, merged collision bodies, objects.
    /// Replaces any previously loaded map.
    pub fn load_tilemap_ir(&mut self, ir: &IrMap) -> Result<(), Error> {
        if ir.width == 0 || ir.height == 0 {
            return Err(Error::InvalidMap("map has zero dimensions".into()));
        }

        self.clear_map_state();

        let ppm = self.config.pixels_per_meter;
        let tile_size = ir.tile_w as f32 / ppm;
        let extent = vec2(
            ir.width as f32 * tile_size,
            ir.height as f32 * tile_size,
        );
        let offset = if self.config.auto_center {
            -extent / 2.0
        } else {
            Vec2::ZERO
        };
        self.meta = MapMeta {
            width: ir.width,
            height: ir.height,
            tile_size,
            pixels_per_meter: ppm,
            offset,
        };

        for ts in &ir.tilesets {
            self.atlases.insert_ir(ts);
            let IrTileset::Atlas {
                first_gid,
                tile_w,
                tile_h,
                tiles,
                ..
            } = ts;
            for meta in tiles {
                let shapes = tile_shapes_from_metadata(meta, *tile_w as f32, *tile_h as f32);
                if !shapes.is_empty() {
                    self.tile_shapes.insert(first_gid + meta.id, shapes);
                }
            }
        }

        let collision_layer = self.config.collision_layer.clone();
        let mut layer_idx: u16 = 0;
        for layer in &ir.layers {
            match &layer.kind {
                IrLayerKind::Tiles { width, height, data } => {
                    // Visibility only gates drawing. Collision layers are
                    // usually hidden in the editor and still own physics.
                    let is_collision_layer = layer.name == collision_layer;
                    if !layer.visible && !is_collision_layer {
                        continue;
                    }
                    self.ingest_tile_layer(
                        layer,
                        *width,
                        *height,
                        data,
                        layer_idx,
                        is_collision_layer,
                    );
                    layer_idx += 1;
                }
                IrLayerKind::Objects { objects } => {
                    if !layer.visible {
                        continue;
                    }
                    for obj in objects {
                        let center_px = vec2(obj.x + obj.width / 2.0, obj.y + obj.height / 2.0);
                        self.objects.push(WorldObject {
                            name: obj.name.clone(),
                            class_name: obj.class_name.clone(),
                            pos: self.meta.px_to_world(center_px),
                            size: vec2(obj.width / ppm, obj.height / ppm),
                            shape: obj.shape.clone(),
                            properties: obj.properties.clone(),
                        });
                    }
                }
                IrLayerKind::Unsupported => {}
            }
        }

        self.tiles_dirty = true;
        info!(
            "loaded map {}x{} ({} tiles, {} collision bodies, {} objects)",
            ir.width,
            ir.height,
            self.tiles.len(),
            self.tile_bodies.len(),
            self.objects.len()
        );
        Ok(())
    }

    fn ingest_tile_layer(
        &mut self,
        layer: &IrLayer,
        width: usize,
        height: usize,
        data: &[u32],
        layer_idx: u16,
        is_collision_layer: bool,
    ) {
        let ts = self.meta.tile_size;
        for (idx, raw_gid) in data.iter().enumerate() {
            let gid = raw_gid & GID_MASK;
            if gid == 0 {
                continue;
            }
            let tx = idx % width;
            let ty = idx / width;
            let pos = self.meta.tile_to_world(tx, ty);
            let (atlas, uv) = match self.atlases.lookup(gid) {
                Some((a, atlas, local)) => (a as u16, atlas.uv_rect(local)),
                None => (0, Rect::new(0.0, 0.0, 1.0, 1.0)),
            };
            self.tiles.push(TileInstance {
                name: layer.name.clone(),
                x: pos.x,
                y: pos.y,
                w: ts,
                h: ts,
                uv,
                layer: layer_idx,
                atlas,
                gid,
                has_body: false,
                is_collision: is_collision_layer,
            });
        }

        if is_collision_layer {
            self.merge_collision_runs(&layer.name, width, height, data);
        }
    }

    /// Merge contiguous occupied cells of a collision row into one static
    /// cuboid. Only the run's first tile gets `has_body`.
    fn merge_collision_runs(&mut self, layer_name: &str, width: usize, height: usize, data: &[u32]) {
        let meta = self.meta;
        let ts = meta.tile_size;
        let opts = BodyOptions {
            kind: BodyKind::Static,
            ..Default::default()
        };
        for ty in 0..height {
            let mut tx = 0;
            while tx < width {
                if data[ty * width + tx] & GID_MASK == 0 {
                    tx += 1;
                    continue;
                }
                let start = tx;
                while tx < width && (data[ty * width + tx] & GID_MASK) != 0 {
                    tx += 1;
                }
                let run = tx - start;

                let first = meta.tile_to_world(start, ty);
                let center = vec2(first.x - ts / 2.0 + run as f32 * ts / 2.0, first.y);
                let name_id = self.names.register(layer_name);
                let handle = self.physics.add_body(center, 0.0, &opts);
                self.physics.attach_collider(
                    handle,
                    ColliderBuilder::cuboid(run as f32 * ts / 2.0, ts / 2.0),
                    &opts,
                    name_id,
                    self.contact_events_enabled,
                );
                self.named_bodies.insert(handle, layer_name.to_owned());
                self.tile_bodies.push((handle, name_id));

                if let Some(tile) = self.tiles.iter_mut().find(|t| {
                    t.is_collision && meta.world_to_tile(vec2(t.x, t.y)) == Some((start, ty))
                }) {
                    tile.has_body = true;
                }
            }
        }
        self.physics.refresh_queries();
    }

    /// Register a collision shape for a gid, as if the tileset had authored
    /// it. Sprites created from that gid pick it up on body attach.
    pub fn register_tile_shape(&mut self, gid: u32, shape: TileShape) {
        self.tile_shapes.entry(gid).or_default().push(shape);
    }

    pub fn tiles(&self) -> &[TileInstance] {
        &self.tiles
    }

    pub fn objects(&self) -> &[WorldObject] {
        &self.objects
    }

    pub fn find_object(&self, name: &str) -> Option<&WorldObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Rebuild the batched tile meshes. Collision-layer tiles are physics
    /// geometry, not visuals, and stay out of the batch.
    pub(crate) fn rebuild_tile_meshes(&mut self) {
        self.tile_meshes.clear();

        let mut groups: Vec<(u16, u16)> = self
            .tiles
            .iter()
            .filter(|t| !t.is_collision)
            .map(|t| (t.layer, t.atlas))
            .collect();
        groups.sort_unstable();
        groups.dedup();

        for (layer, atlas) in groups {
            let texture = self
                .atlases
                .get(atlas as usize)
                .and_then(|a| a.texture.clone());
            let mut vertices: Vec<Vertex> = Vec::new();
            let mut indices: Vec<u16> = Vec::new();
            for tile in self
                .tiles
                .iter()
                .filter(|t| !t.is_collision && t.layer == layer && t.atlas == atlas)
            {
                if vertices.len() / 4 >= MAX_QUADS_PER_MESH {
                    self.tile_meshes.push(Mesh {
                        vertices: std::mem::take(&mut vertices),
                        indices: std::mem::take(&mut indices),
                        texture: texture.clone(),
                    });
                }
                let base = vertices.len() as u16;
                let (hw, hh) = (tile.w / 2.0, tile.h / 2.0);
                let uv = tile.uv;
                // World y-up: the tile's top edge samples the top of the tile
                // image (smallest v).
                vertices.push(Vertex::new(
                    tile.x - hw,
                    tile.y + hh,
                    0.0,
                    uv.x,
                    uv.y,
                    WHITE,
                ));
                vertices.push(Vertex::new(
                    tile.x + hw,
                    tile.y + hh,
                    0.0,
                    uv.x + uv.w,
                    uv.y,
                    WHITE,
                ));
                vertices.push(Vertex::new(
                    tile.x + hw,
                    tile.y - hh,
                    0.0,
                    uv.x + uv.w,
                    uv.y + uv.h,
                    WHITE,
                ));
                vertices.push(Vertex::new(
                    tile.x - hw,
                    tile.y - hh,
                    0.0,
                    uv.x,
                    uv.y + uv.h,
                    WHITE,
                ));
                indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            }
            if !vertices.is_empty() {
                self.tile_meshes.push(Mesh {
                    vertices,
                    indices,
                    texture,
                });
            }
        }
        self.tiles_dirty = false;
    }
}
