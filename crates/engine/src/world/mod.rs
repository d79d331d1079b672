mod collision;
mod loader;
mod map;

pub use collision::is_blocked;
pub use loader::{parse_tiled_map, FileMapLoader, MapLoadError, MapLoader, PendingMap, StaticMapLoader};
pub use map::{
    MapError, MapObject, MapObjectKind, PropertyBag, TileLayer, TileMap, TilesetInfo, Warp,
    WarpDestination, COLLISION_LAYER_NAME,
};
