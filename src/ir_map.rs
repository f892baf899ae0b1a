use macroquad::prelude::*;
use std::collections::HashMap;

pub const FLIP_H: u32 = 0x8000_0000; // bit 31
pub const FLIP_V: u32 = 0x4000_0000; // bit 30
pub const FLIP_D: u32 = 0x2000_0000; // bit 29
pub const GID_MASK: u32 = 0x1FFF_FFFF; // keep lower 29 bits (bit 28 is free)

/// Canonical, format-agnostic map.
#[derive(Debug)]
pub struct IrMap {
    pub width: usize,
    pub height: usize,
    pub tile_w: u32,
    pub tile_h: u32,
    pub properties: Properties,
    pub tilesets: Vec<IrTileset>, // must be sorted by first_gid
    pub layers: Vec<IrLayer>,     // draw order: array order
}

#[derive(Debug)]
pub enum IrTileset {
    /// One image atlas with a regular grid.
    Atlas {
        first_gid: u32,
        image: String,
        tile_w: u32,
        tile_h: u32,
        tilecount: u32,
        columns: u32,
        spacing: u32, // 0 if not used
        margin: u32,  // 0 if not used
        properties: Properties,
        tiles: Vec<IrTileMetadata>,
    },
}

/// Per-tile metadata inside a tileset. The embedded object group is where
/// collision shapes for a gid come from.
#[derive(Debug)]
pub struct IrTileMetadata {
    pub id: u32, // local id, gid = first_gid + id
    pub properties: Properties,
    pub objects: Vec<IrObject>,
}

#[derive(Debug)]
pub enum IrLayerKind {
    Tiles {
        width: usize,
        height: usize,
        data: Vec<u32>, // raw GIDs (including flip flags ok)
    },
    Objects {
        objects: Vec<IrObject>,
    },
    Unsupported,
}

#[derive(Debug)]
pub struct IrLayer {
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub offset: Vec2, // pixel offset for this layer
    pub properties: Properties,
    pub kind: IrLayerKind,
}

#[derive(Debug, Clone)]
pub struct IrObject {
    pub id: u32,
    pub name: String,
    pub class_name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    pub visible: bool,
    pub shape: IrObjectShape,
    pub properties: Properties,
}

#[derive(Debug, Clone)]
pub enum IrObjectShape {
    Rectangle,
    Ellipse,
    Point,
    Polygon(Vec<Vec2>),
    Polyline(Vec<Vec2>),
    Tile { gid: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    I64(i64),
    F32(f32),
    String(String),
}

/// Typed custom properties keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, PropertyValue>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, value: PropertyValue) {
        self.values.insert(name, value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(PropertyValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(PropertyValue::I64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i32(&self, name: &str) -> Option<i32> {
        self.get_i64(name).and_then(|v| i32::try_from(v).ok())
    }

    pub fn get_f32(&self, name: &str) -> Option<f32> {
        match self.values.get(name) {
            Some(PropertyValue::F32(v)) => Some(*v),
            Some(PropertyValue::I64(v)) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(PropertyValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}
