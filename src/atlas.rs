use crate::ir_map::{IrTileset, GID_MASK};
use anyhow::Context;
use macroquad::prelude::*;

/// One tileset image with a regular grid. `texture` is `None` in headless
/// contexts (tests); UV math works either way.
pub struct Atlas {
    pub name: String,
    pub first_gid: u32,
    pub tilecount: u32,
    pub cols: u32,
    pub tile_w: u32,
    pub tile_h: u32,
    pub spacing: u32,
    pub margin: u32,
    pub image_w: u32,
    pub image_h: u32,
    pub texture: Option<Texture2D>,
}

impl Atlas {
    /// Pixel source rect of a local tile id, for `draw_texture_ex`.
    pub fn src_rect(&self, local: u32) -> Rect {
        let col = local % self.cols;
        let row = local / self.cols;
        let sx = self.margin + col * (self.tile_w + self.spacing);
        let sy = self.margin + row * (self.tile_h + self.spacing);
        Rect::new(sx as f32, sy as f32, self.tile_w as f32, self.tile_h as f32)
    }

    /// Normalized UV rect of a local tile id.
    pub fn uv_rect(&self, local: u32) -> Rect {
        let src = self.src_rect(local);
        let iw = self.image_w.max(1) as f32;
        let ih = self.image_h.max(1) as f32;
        Rect::new(src.x / iw, src.y / ih, src.w / iw, src.h / ih)
    }
}

/// Owns the atlases plus the gid -> atlas lookup table.
#[derive(Default)]
pub struct AtlasSet {
    atlases: Vec<Atlas>,
    gid_lut: Vec<u16>, // u16::MAX marks an unmapped gid
}

impl AtlasSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.atlases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atlases.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Atlas> {
        self.atlases.get(idx)
    }

    pub fn insert(&mut self, atlas: Atlas) -> usize {
        let idx = self.atlases.len();
        let start = atlas.first_gid as usize;
        let end = start + atlas.tilecount as usize;
        if self.gid_lut.len() < end {
            self.gid_lut.resize(end, u16::MAX);
        }
        for slot in &mut self.gid_lut[start..end] {
            *slot = idx as u16;
        }
        self.atlases.push(atlas);
        idx
    }

    /// Resolve a (possibly flip-flagged) gid to its atlas and local tile id.
    /// Missing gids are not an error; callers fall back to defaults.
    pub fn lookup(&self, gid: u32) -> Option<(usize, &Atlas, u32)> {
        let clean = (gid & GID_MASK) as usize;
        if clean >= self.gid_lut.len() {
            return None;
        }
        let idx = self.gid_lut[clean];
        if idx == u16::MAX {
            return None;
        }
        let atlas = &self.atlases[idx as usize];
        Some((idx as usize, atlas, clean as u32 - atlas.first_gid))
    }

    pub fn uv_for_gid(&self, gid: u32) -> Option<Rect> {
        self.lookup(gid).map(|(_, a, local)| a.uv_rect(local))
    }

    /// Build a texture-less atlas from an IR tileset (headless/tests).
    pub fn insert_ir(&mut self, ts: &IrTileset) -> usize {
        let IrTileset::Atlas {
            first_gid,
            image,
            tile_w,
            tile_h,
            tilecount,
            columns,
            spacing,
            margin,
            ..
        } = ts;
        let cols = (*columns).max(1);
        let rows = tilecount.div_ceil(cols);
        self.insert(Atlas {
            name: image.clone(),
            first_gid: *first_gid,
            tilecount: *tilecount,
            cols,
            tile_w: *tile_w,
            tile_h: *tile_h,
            spacing: *spacing,
            margin: *margin,
            image_w: margin * 2 + cols * (tile_w + spacing),
            image_h: margin * 2 + rows * (tile_h + spacing),
            texture: None,
        })
    }

    /// Load the tileset image and attach it to the atlas at `idx`.
    pub async fn load_texture_for(&mut self, idx: usize, path: &str) -> anyhow::Result<()> {
        let tex: Texture2D = load_texture(path)
            .await
            .with_context(|| format!("Loading texture {}", path))?;
        tex.set_filter(FilterMode::Nearest);
        let atlas = self
            .atlases
            .get_mut(idx)
            .context("atlas index out of range")?;
        atlas.image_w = tex.width() as u32;
        atlas.image_h = tex.height() as u32;
        atlas.texture = Some(tex);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_atlas(first_gid: u32, count: u32, cols: u32) -> Atlas {
        Atlas {
            name: "t".into(),
            first_gid,
            tilecount: count,
            cols,
            tile_w: 16,
            tile_h: 16,
            spacing: 0,
            margin: 0,
            image_w: cols * 16,
            image_h: count.div_ceil(cols) * 16,
            texture: None,
        }
    }

    #[test]
    fn lookup_resolves_across_multiple_atlases() {
        let mut set = AtlasSet::new();
        set.insert(grid_atlas(1, 4, 2));
        set.insert(grid_atlas(5, 4, 2));

        let (idx, _, local) = set.lookup(6).expect("gid 6");
        assert_eq!((idx, local), (1, 1));
        assert!(set.lookup(0).is_none());
        assert!(set.lookup(99).is_none());
    }

    #[test]
    fn lookup_ignores_flip_flags() {
        let mut set = AtlasSet::new();
        set.insert(grid_atlas(1, 4, 2));
        let flipped = 3 | crate::ir_map::FLIP_H;
        let (_, _, local) = set.lookup(flipped).expect("flipped gid");
        assert_eq!(local, 2);
    }

    #[test]
    fn uv_rect_honors_spacing_and_margin() {
        let atlas = Atlas {
            name: "t".into(),
            first_gid: 1,
            tilecount: 4,
            cols: 2,
            tile_w: 16,
            tile_h: 16,
            spacing: 2,
            margin: 1,
            image_w: 36,
            image_h: 36,
            texture: None,
        };
        let uv = atlas.uv_rect(3); // col 1, row 1
        assert!((uv.x - 19.0 / 36.0).abs() < 1e-6);
        assert!((uv.y - 19.0 / 36.0).abs() < 1e-6);
        assert!((uv.w - 16.0 / 36.0).abs() < 1e-6);
    }
}
