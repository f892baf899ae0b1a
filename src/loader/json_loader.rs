use crate::error::Error;
use crate::ir_map::*;
use macroquad::prelude::*;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct JsonLayer {
    #[serde(default)]
    data: Vec<u32>,
    #[serde(default)]
    width: usize,
    #[serde(default)]
    height: usize,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default = "one")]
    opacity: f32,
    #[serde(default)]
    offsetx: f32,
    #[serde(default)]
    offsety: f32,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>, // "tilelayer" expected here
    #[serde(default)]
    properties: Vec<JsonProperty>,
    #[serde(default)]
    objects: Vec<JsonObject>,
}

fn default_true() -> bool {
    true
}
fn one() -> f32 {
    1.0
}

#[derive(Deserialize)]
struct JsonTilesetRef {
    firstgid: u32,
    source: String,
}

#[derive(Deserialize)]
struct JsonMap {
    #[serde(default)]
    width: usize,
    #[serde(default)]
    height: usize,
    tilewidth: u32,
    tileheight: u32,
    layers: Vec<JsonLayer>,
    #[serde(default)]
    tilesets: Vec<JsonTilesetRef>,
    #[serde(default)]
    properties: Vec<JsonProperty>,
}

#[derive(Deserialize)]
struct ExternalTileset {
    tilewidth: u32,
    tileheight: u32,
    tilecount: u32,
    columns: u32,
    image: String,
    #[serde(default)]
    spacing: u32,
    #[serde(default)]
    margin: u32,
    #[serde(default)]
    properties: Vec<JsonProperty>,
    #[serde(default)]
    tiles: Vec<JsonTile>,
}

#[derive(Deserialize)]
struct JsonProperty {
    name: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    value: JsonValue,
}

#[derive(Deserialize)]
struct JsonObject {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default)]
    point: bool,
    #[serde(default)]
    ellipse: bool,
    #[serde(default)]
    polygon: Vec<JsonObjectPoint>,
    #[serde(default)]
    polyline: Vec<JsonObjectPoint>,
    #[serde(default)]
    gid: Option<u32>,
    #[serde(default)]
    properties: Vec<JsonProperty>,
}

#[derive(Deserialize)]
struct JsonObjectPoint {
    x: f32,
    y: f32,
}

#[derive(Deserialize, Default)]
struct JsonObjectGroup {
    #[serde(default)]
    objects: Vec<JsonObject>,
}

#[derive(Deserialize)]
struct JsonTile {
    id: u32,
    #[serde(default)]
    properties: Vec<JsonProperty>,
    #[serde(default)]
    objectgroup: JsonObjectGroup,
}

fn json_property_to_ir(prop: JsonProperty) -> Result<Option<(String, PropertyValue)>, Error> {
    let JsonProperty { name, kind, value } = prop;

    let parsed = match kind.as_deref() {
        Some("bool") => value.as_bool().map(PropertyValue::Bool),
        Some("int") | Some("object") => value.as_i64().map(PropertyValue::I64),
        Some("float") => value.as_f64().map(|n| PropertyValue::F32(n as f32)),
        Some("string") | Some("file") | Some("color") | Some("class") => {
            value.as_str().map(|s| PropertyValue::String(s.to_owned()))
        }
        Some(other) => {
            return Err(Error::UnsupportedPropertyType {
                name,
                kind: other.to_owned(),
            });
        }
        None => {
            if let Some(v) = value.as_bool() {
                Some(PropertyValue::Bool(v))
            } else if let Some(v) = value.as_i64() {
                Some(PropertyValue::I64(v))
            } else if let Some(v) = value.as_f64() {
                Some(PropertyValue::F32(v as f32))
            } else {
                value.as_str().map(|s| PropertyValue::String(s.to_owned()))
            }
        }
    };

    Ok(parsed.map(|value| (name, value)))
}

fn properties_from_json(props: Vec<JsonProperty>) -> Result<Properties, Error> {
    let mut out = Properties::new();
    for p in props {
        if let Some((name, value)) = json_property_to_ir(p)? {
            out.insert(name, value);
        }
    }
    Ok(out)
}

fn object_to_ir(obj: JsonObject) -> Result<IrObject, Error> {
    let shape = if let Some(gid) = obj.gid {
        IrObjectShape::Tile { gid }
    } else if obj.point {
        IrObjectShape::Point
    } else if obj.ellipse {
        IrObjectShape::Ellipse
    } else if !obj.polygon.is_empty() {
        IrObjectShape::Polygon(obj.polygon.into_iter().map(|p| vec2(p.x, p.y)).collect())
    } else if !obj.polyline.is_empty() {
        IrObjectShape::Polyline(obj.polyline.into_iter().map(|p| vec2(p.x, p.y)).collect())
    } else {
        IrObjectShape::Rectangle
    };

    let class_name = if !obj.class.is_empty() {
        obj.class
    } else {
        obj.kind
    };

    Ok(IrObject {
        id: obj.id,
        name: obj.name,
        class_name,
        x: obj.x,
        y: obj.y,
        width: obj.width,
        height: obj.height,
        rotation: obj.rotation,
        visible: obj.visible,
        shape,
        properties: properties_from_json(obj.properties)?,
    })
}

fn external_tileset_to_ir(first_gid: u32, ext: ExternalTileset) -> Result<IrTileset, Error> {
    Ok(IrTileset::Atlas {
        first_gid,
        image: ext.image,
        tile_w: ext.tilewidth,
        tile_h: ext.tileheight,
        tilecount: ext.tilecount,
        columns: ext.columns,
        spacing: ext.spacing,
        margin: ext.margin,
        properties: properties_from_json(ext.properties)?,
        tiles: ext
            .tiles
            .into_iter()
            .map(|tile| -> Result<IrTileMetadata, Error> {
                Ok(IrTileMetadata {
                    id: tile.id,
                    properties: properties_from_json(tile.properties)?,
                    objects: tile
                        .objectgroup
                        .objects
                        .into_iter()
                        .map(object_to_ir)
                        .collect::<Result<Vec<_>, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    })
}

fn json_map_to_ir(j: JsonMap, ir_tilesets: Vec<IrTileset>) -> Result<IrMap, Error> {
    let mut ir_tilesets = ir_tilesets;

    // Sort by first_gid to make LUT building trivial
    ir_tilesets.sort_by_key(|t| match t {
        IrTileset::Atlas { first_gid, .. } => *first_gid,
    });

    let max_gid = ir_tilesets
        .iter()
        .map(|t| match t {
            IrTileset::Atlas {
                first_gid,
                tilecount,
                ..
            } => first_gid + tilecount - 1,
        })
        .max()
        .unwrap_or(0);
    // Inline decodes carry no tilesets; gids cannot be validated then.
    let validate_gids = !ir_tilesets.is_empty();

    let mut ir_layers = Vec::with_capacity(j.layers.len());
    for l in j.layers {
        let layer_name = l.name.clone();
        let properties = properties_from_json(l.properties)?;
        let layer_kind = match l.kind.as_deref().unwrap_or("tilelayer") {
            "tilelayer" => {
                if l.data.len() != l.width * l.height {
                    return Err(Error::InvalidLayerSize(layer_name));
                }
                for &raw_gid in &l.data {
                    let gid = raw_gid & GID_MASK;
                    if validate_gids && gid != 0 && gid > max_gid {
                        return Err(Error::InvalidTileGid {
                            layer: layer_name.clone(),
                            gid,
                            max_gid,
                        });
                    }
                }
                IrLayerKind::Tiles {
                    width: l.width,
                    height: l.height,
                    data: l.data,
                }
            }
            "objectgroup" => IrLayerKind::Objects {
                objects: l
                    .objects
                    .into_iter()
                    .map(|obj| {
                        if let Some(raw_gid) = obj.gid {
                            let gid = raw_gid & GID_MASK;
                            if validate_gids && (gid == 0 || gid > max_gid) {
                                return Err(Error::InvalidObjectGid {
                                    layer: layer_name.clone(),
                                    object_id: obj.id,
                                    gid,
                                    max_gid,
                                });
                            }
                        }
                        object_to_ir(obj)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            },
            _ => IrLayerKind::Unsupported,
        };
        ir_layers.push(IrLayer {
            name: l.name,
            visible: l.visible,
            opacity: l.opacity,
            offset: vec2(l.offsetx, l.offsety),
            properties,
            kind: layer_kind,
        });
    }

    // Maps without explicit dimensions inherit them from the first tile layer.
    let (mut width, mut height) = (j.width, j.height);
    if width == 0 || height == 0 {
        for l in &ir_layers {
            if let IrLayerKind::Tiles { width: w, height: h, .. } = &l.kind {
                width = *w;
                height = *h;
                break;
            }
        }
    }

    Ok(IrMap {
        width,
        height,
        tile_w: j.tilewidth,
        tile_h: j.tileheight,
        properties: properties_from_json(j.properties)?,
        tilesets: ir_tilesets,
        layers: ir_layers,
    })
}

/// Decode an inline JSON map without external tileset references. Tileset
/// entries are ignored; handy for headless tests.
pub fn decode_map_str_to_ir(json: &str) -> Result<IrMap, Error> {
    let j: JsonMap = serde_json::from_str(json).map_err(|source| Error::Json {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    json_map_to_ir(j, Vec::new())
}

pub fn decode_map_file_to_ir(path: &str) -> Result<(IrMap, PathBuf), Error> {
    let p = Path::new(path);
    if p.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(Error::InvalidMap(format!(
            "Map file must be a JSON file: {path}"
        )));
    }

    let txt = std::fs::read_to_string(p).map_err(|source| Error::Io {
        path: p.to_path_buf(),
        source,
    })?;
    let j: JsonMap = serde_json::from_str(&txt).map_err(|source| Error::Json {
        path: p.to_path_buf(),
        source,
    })?;

    let map_dir = p
        .parent()
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./"));

    // Build IR tilesets
    let mut ir_tilesets = Vec::with_capacity(j.tilesets.len());
    for ts in &j.tilesets {
        if !ts.source.ends_with(".json") {
            return Err(Error::InvalidMap(format!(
                "External tileset must be JSON: {}",
                ts.source
            )));
        }
        let ts_path = map_dir.join(&ts.source);
        let ext_txt = std::fs::read_to_string(&ts_path).map_err(|source| Error::Io {
            path: ts_path.clone(),
            source,
        })?;
        let ext: ExternalTileset =
            serde_json::from_str(&ext_txt).map_err(|source| Error::Json {
                path: ts_path,
                source,
            })?;

        // (We keep image path relative; texture loading joins with map_dir)
        ir_tilesets.push(external_tileset_to_ir(ts.firstgid, ext)?);
    }

    Ok((json_map_to_ir(j, ir_tilesets)?, map_dir))
}
