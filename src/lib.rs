//! 2D tile-world simulation for Macroquad: Tiled JSON maps with batched
//! rendering and merged static collision, Aseprite sprite sheets, rapier2d
//! physics with named collision callbacks, a multi-mode 2D camera, and an
//! optional first-person maze view extruded from the collision grid.

mod atlas;
mod camera;
mod error;
#[allow(dead_code)]
mod ir_map;
mod loader {
    pub mod json_loader;
    pub mod sheet_loader;
}
mod maze3d;
mod physics;
mod shapes;
mod sprite;
mod tilemap;
mod world;

pub use atlas::{Atlas, AtlasSet};
pub use camera::{Camera, CameraFocus, CameraMode};
pub use error::Error;
pub use ir_map::{IrMap, IrObject, IrObjectShape, Properties, PropertyValue};
pub use loader::json_loader::{decode_map_file_to_ir, decode_map_str_to_ir};
pub use loader::sheet_loader::{decode_sheet_file, decode_sheet_str, SheetData};
pub use maze3d::{Face, Maze3d, MazeCamera, MazeConfig, MazeItem, MAX_MAZE_ITEMS};
pub use physics::{BodyKind, BodyOptions, Physics, DEFAULT_GRAVITY, DEFAULT_SUBSTEPS};
pub use shapes::TileShape;
pub use sprite::{AnimState, BodyRef, Sprite, SpriteImage, MAX_SPRITES};
pub use tilemap::{MapMeta, TileInstance, WorldObject};
pub use world::{CollisionCallback, PickupCallback, World, WorldConfig};
