use std::fmt;
use std::io;
use std::path::PathBuf;

/// Error type for map/sheet decoding and world mutation.
#[derive(Debug)]
pub enum Error {
    /// File I/O error with the offending path
    Io { path: PathBuf, source: io::Error },
    /// JSON parse error with the offending path
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Map structure is unusable (wrong extension, bad tileset refs, ...)
    InvalidMap(String),
    /// A layer's data length does not match width * height
    InvalidLayerSize(String),
    /// A tile layer references a gid outside every tileset
    InvalidTileGid { layer: String, gid: u32, max_gid: u32 },
    /// An object references a gid outside every tileset
    InvalidObjectGid {
        layer: String,
        object_id: u32,
        gid: u32,
        max_gid: u32,
    },
    /// A custom property uses a type the loader does not understand
    UnsupportedPropertyType { name: String, kind: String },
    /// A sheet frame lookup by name failed
    UnknownFrame { sheet: String, frame: String },
    /// A bounded registry refused a new entry
    CapacityExceeded { what: &'static str, limit: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            Error::Json { path, source } => {
                write!(f, "JSON parse error in {}: {}", path.display(), source)
            }
            Error::InvalidMap(msg) => write!(f, "Invalid map: {}", msg),
            Error::InvalidLayerSize(name) => write!(
                f,
                "Invalid layer size for layer '{}': data length does not match map dimensions",
                name
            ),
            Error::InvalidTileGid { layer, gid, max_gid } => write!(
                f,
                "Layer '{}' references gid {} outside the tileset range (max {})",
                layer, gid, max_gid
            ),
            Error::InvalidObjectGid {
                layer,
                object_id,
                gid,
                max_gid,
            } => write!(
                f,
                "Object {} in layer '{}' references gid {} outside the tileset range (max {})",
                object_id, layer, gid, max_gid
            ),
            Error::UnsupportedPropertyType { name, kind } => {
                write!(f, "Property '{}' has unsupported type '{}'", name, kind)
            }
            Error::UnknownFrame { sheet, frame } => {
                write!(f, "Sheet '{}' has no frame named '{}'", sheet, frame)
            }
            Error::CapacityExceeded { what, limit } => {
                write!(f, "Too many {} (limit {})", what, limit)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            Error::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}
