use crate::error::Error;
use crate::shapes::TileShape;
use macroquad::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct JsonSheet {
    frames: Vec<JsonFrameEntry>,
    meta: JsonMeta,
}

#[derive(Deserialize)]
struct JsonFrameEntry {
    #[serde(default)]
    filename: String,
    frame: JsonRect,
    #[serde(default = "default_duration")]
    duration: u32, // milliseconds
}

fn default_duration() -> u32 {
    100
}

#[derive(Deserialize, Clone, Copy)]
struct JsonRect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

#[derive(Deserialize)]
struct JsonMeta {
    #[serde(default)]
    image: String,
    size: JsonSize,
    #[serde(default, rename = "frameTags")]
    frame_tags: Vec<JsonTag>,
    #[serde(default)]
    slices: Vec<JsonSlice>,
}

#[derive(Deserialize)]
struct JsonSize {
    w: f32,
    h: f32,
}

#[derive(Deserialize)]
struct JsonTag {
    name: String,
    from: usize,
    to: usize,
    #[serde(default)]
    direction: String,
}

#[derive(Deserialize)]
struct JsonSlice {
    name: String,
    #[serde(default)]
    keys: Vec<JsonSliceKey>,
}

#[derive(Deserialize)]
struct JsonSliceKey {
    frame: usize,
    bounds: JsonRect,
}

/// One rectangular sub-image of a sheet.
#[derive(Debug, Clone)]
pub struct SheetFrame {
    pub name: String,
    /// Pixel rect within the sheet image.
    pub rect_px: Rect,
    /// Normalized UV rect within the sheet image.
    pub uv: Rect,
    pub duration_ms: u32,
    /// Collision shapes in unit-frame space (from non-hitbox slices).
    pub shapes: Vec<TileShape>,
    /// Hitbox width/height as a fraction of the frame, from the `hitbox` slice.
    pub hitbox: Option<Vec2>,
}

#[derive(Debug, Clone)]
pub struct SheetAnim {
    pub frames: Vec<usize>,
    pub fps: f32,
}

/// Decoded Aseprite sheet: frames, named animations, per-frame shapes.
/// Immutable after load.
#[derive(Debug)]
pub struct SheetData {
    pub image: String,
    pub size_px: Vec2,
    pub frames: Vec<SheetFrame>,
    pub animations: HashMap<String, SheetAnim>,
    frame_lookup: HashMap<String, usize>,
}

impl SheetData {
    pub fn frame_index(&self, name: &str) -> Option<usize> {
        self.frame_lookup.get(name).copied()
    }
}

fn tag_to_anim(tag: &JsonTag, frames: &[SheetFrame]) -> SheetAnim {
    let mut order: Vec<usize> = (tag.from..=tag.to.min(frames.len().saturating_sub(1))).collect();
    match tag.direction.as_str() {
        "reverse" => order.reverse(),
        "pingpong" => {
            // [0,1,2,3] -> [0,1,2,3,2,1]: walk back without repeating endpoints
            let take = order.len().saturating_sub(2);
            let back: Vec<usize> = order.iter().rev().skip(1).copied().collect();
            order.extend(back.into_iter().take(take));
        }
        _ => {}
    }
    let duration = frames
        .get(tag.from)
        .map(|f| f.duration_ms.max(1))
        .unwrap_or(100);
    SheetAnim {
        frames: order,
        fps: 1000.0 / duration as f32,
    }
}

/// Decode an Aseprite JSON export (array-form `frames`).
pub fn decode_sheet_str(json: &str) -> Result<SheetData, Error> {
    let j: JsonSheet = serde_json::from_str(json).map_err(|source| Error::Json {
        path: PathBuf::from("<inline>"),
        source,
    })?;

    let sheet_w = j.meta.size.w.max(1.0);
    let sheet_h = j.meta.size.h.max(1.0);

    let mut frames: Vec<SheetFrame> = j
        .frames
        .iter()
        .map(|f| SheetFrame {
            name: f.filename.clone(),
            rect_px: Rect::new(f.frame.x, f.frame.y, f.frame.w, f.frame.h),
            uv: Rect::new(
                f.frame.x / sheet_w,
                f.frame.y / sheet_h,
                f.frame.w / sheet_w,
                f.frame.h / sheet_h,
            ),
            duration_ms: f.duration,
            shapes: Vec::new(),
            hitbox: None,
        })
        .collect();

    // A slice key applies from its frame onward until the next key, per
    // Aseprite semantics. The slice named "hitbox" carries size ratios
    // instead of a collision shape.
    for slice in &j.meta.slices {
        let mut keys: Vec<&JsonSliceKey> = slice.keys.iter().collect();
        keys.sort_by_key(|k| k.frame);
        for (i, frame) in frames.iter_mut().enumerate() {
            let Some(key) = keys.iter().rev().find(|k| k.frame <= i) else {
                continue;
            };
            let b = key.bounds;
            let fw = frame.rect_px.w.max(1.0);
            let fh = frame.rect_px.h.max(1.0);
            if slice.name == "hitbox" {
                frame.hitbox = Some(vec2(b.w / fw, b.h / fh));
            } else {
                frame
                    .shapes
                    .push(TileShape::box_from_px(b.x, b.y, b.w, b.h, fw, fh));
            }
        }
    }

    let mut animations = HashMap::new();
    for tag in &j.meta.frame_tags {
        if tag.from >= frames.len() {
            continue;
        }
        animations.insert(tag.name.clone(), tag_to_anim(tag, &frames));
    }

    let frame_lookup = frames
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.name.is_empty())
        .map(|(i, f)| (f.name.clone(), i))
        .collect();

    Ok(SheetData {
        image: j.meta.image,
        size_px: vec2(sheet_w, sheet_h),
        frames,
        animations,
        frame_lookup,
    })
}

pub fn decode_sheet_file(path: &str) -> Result<(SheetData, PathBuf), Error> {
    let p = Path::new(path);
    let txt = std::fs::read_to_string(p).map_err(|source| Error::Io {
        path: p.to_path_buf(),
        source,
    })?;
    let data = decode_sheet_str(&txt).map_err(|e| match e {
        Error::Json { source, .. } => Error::Json {
            path: p.to_path_buf(),
            source,
        },
        other => other,
    })?;
    let dir = p
        .parent()
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./"));
    Ok((data, dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"{
      "frames": [
        {"filename":"hero 0","frame":{"x":0,"y":0,"w":16,"h":16},"duration":125},
        {"filename":"hero 1","frame":{"x":16,"y":0,"w":16,"h":16},"duration":125},
        {"filename":"hero 2","frame":{"x":32,"y":0,"w":16,"h":16},"duration":125},
        {"filename":"hero 3","frame":{"x":48,"y":0,"w":16,"h":16},"duration":125}
      ],
      "meta": {
        "image": "hero.png",
        "size": {"w":64,"h":16},
        "frameTags": [
          {"name":"walk","from":0,"to":3,"direction":"forward"},
          {"name":"moonwalk","from":0,"to":3,"direction":"reverse"}
        ],
        "slices": [
          {"name":"hitbox","keys":[{"frame":0,"bounds":{"x":4,"y":2,"w":8,"h":12}}]},
          {"name":"blade","keys":[{"frame":2,"bounds":{"x":0,"y":0,"w":8,"h":8}}]}
        ]
      }
    }"#;

    #[test]
    fn frames_get_normalized_uvs() {
        let data = decode_sheet_str(SHEET).expect("decode");
        assert_eq!(data.frames.len(), 4);
        let uv = data.frames[1].uv;
        assert!((uv.x - 0.25).abs() < 1e-6);
        assert!((uv.w - 0.25).abs() < 1e-6);
        assert_eq!(data.frame_index("hero 2"), Some(2));
    }

    #[test]
    fn tags_become_animations_with_fps_from_duration() {
        let data = decode_sheet_str(SHEET).expect("decode");
        let walk = &data.animations["walk"];
        assert_eq!(walk.frames, vec![0, 1, 2, 3]);
        assert!((walk.fps - 8.0).abs() < 1e-6);
        let moonwalk = &data.animations["moonwalk"];
        assert_eq!(moonwalk.frames, vec![3, 2, 1, 0]);
    }

    #[test]
    fn hitbox_slice_yields_ratios_other_slices_yield_shapes() {
        let data = decode_sheet_str(SHEET).expect("decode");
        let hb = data.frames[0].hitbox.expect("hitbox");
        assert!((hb.x - 0.5).abs() < 1e-6);
        assert!((hb.y - 0.75).abs() < 1e-6);
        // "blade" slice starts at frame 2 and carries forward
        assert!(data.frames[0].shapes.is_empty());
        assert!(data.frames[1].shapes.is_empty());
        assert_eq!(data.frames[2].shapes.len(), 1);
        assert_eq!(data.frames[3].shapes.len(), 1);
    }

    #[test]
    fn decoded_sheet_is_debug_printable() {
        let data = decode_sheet_str(SHEET).expect("decode");
        let dump = format!("{:?}", data);
        assert!(dump.contains("hero.png"));
    }

    #[test]
    fn malformed_sheet_is_a_typed_error() {
        let err = decode_sheet_str("[]").unwrap_err();
        assert!(matches!(err, Error::Json { .. }));
    }
}
