use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::task::Poll;
use std::thread;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::json::{decode_json, JsonDecodeError};

use super::{MapError, MapObject, MapObjectKind, PropertyBag, TileLayer, TileMap, TilesetInfo};

/// Tiled stores flip/rotation flags in the top bits of each gid.
const TILED_GID_MASK: u32 = 0x1FFF_FFFF;
const WARPS_LAYER_NAME: &str = "Warps";

#[derive(Debug, Error)]
pub enum MapLoadError {
    #[error("map {id} not found")]
    NotFound { id: String },
    #[error("failed to read map file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse map {id}: {source}")]
    Parse {
        id: String,
        #[source]
        source: JsonDecodeError,
    },
    #[error("invalid map {id}: {source}")]
    InvalidLayer {
        id: String,
        #[source]
        source: MapError,
    },
    #[error("failed to spawn map loader worker for {id}: {source}")]
    Spawn {
        id: String,
        #[source]
        source: io::Error,
    },
    #[error("map loader worker for {id} exited without a result")]
    WorkerDisconnected { id: String },
    #[error("map load result for {id} was already taken")]
    AlreadyTaken { id: String },
}

#[derive(Debug, Deserialize)]
struct TiledMapJson {
    width: u32,
    height: u32,
    tilewidth: u32,
    tileheight: u32,
    #[serde(default)]
    layers: Vec<TiledLayerJson>,
    #[serde(default)]
    tilesets: Vec<TiledTilesetJson>,
    #[serde(default)]
    properties: Vec<TiledPropertyJson>,
}

#[derive(Debug, Deserialize)]
struct TiledLayerJson {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    layer_type: String,
    #[serde(default)]
    data: Vec<u32>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default)]
    objects: Vec<TiledObjectJson>,
}

#[derive(Debug, Deserialize)]
struct TiledObjectJson {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    object_type: String,
    #[serde(default)]
    class: String,
    x: f32,
    y: f32,
    #[serde(default)]
    properties: Vec<TiledPropertyJson>,
}

#[derive(Debug, Deserialize)]
struct TiledTilesetJson {
    #[serde(default = "default_first_gid")]
    firstgid: u32,
    #[serde(default)]
    tilewidth: u32,
    #[serde(default)]
    tileheight: u32,
    #[serde(default)]
    columns: u32,
    #[serde(default)]
    image: String,
}

#[derive(Debug, Deserialize)]
struct TiledPropertyJson {
    name: String,
    #[serde(default)]
    value: Value,
}

fn default_visible() -> bool {
    true
}

fn default_first_gid() -> u32 {
    1
}

fn property_bag(properties: Vec<TiledPropertyJson>) -> PropertyBag {
    properties
        .into_iter()
        .map(|property| (property.name, property.value))
        .collect()
}

/// Parses a Tiled JSON export into a [`TileMap`] identified by `id`.
pub fn parse_tiled_map(id: &str, raw: &str) -> Result<TileMap, MapLoadError> {
    let tiled: TiledMapJson = decode_json(raw).map_err(|source| MapLoadError::Parse {
        id: id.to_string(),
        source,
    })?;

    let mut map = TileMap::new(id, tiled.width, tiled.height, tiled.tilewidth, tiled.tileheight);
    for (key, value) in property_bag(tiled.properties) {
        map = map.with_property(key, value);
    }
    if let Some(tileset) = tiled.tilesets.into_iter().next() {
        map = map.with_tileset(TilesetInfo {
            first_gid: tileset.firstgid,
            tile_width: if tileset.tilewidth == 0 { tiled.tilewidth } else { tileset.tilewidth },
            tile_height: if tileset.tileheight == 0 { tiled.tileheight } else { tileset.tileheight },
            columns: tileset.columns,
            image: tileset.image,
        });
    }

    for layer in tiled.layers {
        match layer.layer_type.as_str() {
            "tilelayer" => {
                let width = if layer.width == 0 { tiled.width } else { layer.width };
                let height = if layer.height == 0 { tiled.height } else { layer.height };
                let tiles = layer.data.iter().map(|gid| gid & TILED_GID_MASK).collect();
                let tile_layer = TileLayer::new(layer.name, width, height, tiles)
                    .map_err(|source| MapLoadError::InvalidLayer {
                        id: id.to_string(),
                        source,
                    })?
                    .with_visible(layer.visible);
                map = map.with_layer(tile_layer);
            }
            "objectgroup" => {
                let in_warps_layer = layer.name == WARPS_LAYER_NAME;
                for object in layer.objects {
                    let type_name = if object.object_type.is_empty() {
                        object.class.as_str()
                    } else {
                        object.object_type.as_str()
                    };
                    let kind = match MapObjectKind::parse(type_name) {
                        Some(kind) => kind,
                        None if in_warps_layer => MapObjectKind::Warp,
                        None => {
                            debug!(map = id, object_id = object.id, object_type = type_name, "map_object_type_ignored");
                            continue;
                        }
                    };
                    map = map.with_object(MapObject {
                        id: object.id,
                        name: object.name,
                        kind,
                        x: object.x,
                        y: object.y,
                        properties: property_bag(object.properties),
                    });
                }
            }
            other => {
                debug!(map = id, layer = %layer.name, layer_type = other, "map_layer_type_ignored");
            }
        }
    }

    Ok(map)
}

/// Result of a map request; poll it each frame until it is ready.
pub struct PendingMap {
    id: String,
    state: PendingState,
}

enum PendingState {
    Ready(Result<Rc<TileMap>, MapLoadError>),
    Waiting {
        receiver: Receiver<Result<TileMap, MapLoadError>>,
        cache: MapCache,
    },
    Taken,
}

impl PendingMap {
    pub fn ready(id: impl Into<String>, result: Result<Rc<TileMap>, MapLoadError>) -> Self {
        Self {
            id: id.into(),
            state: PendingState::Ready(result),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Yields the result once; later polls report [`MapLoadError::AlreadyTaken`].
    pub fn poll(&mut self) -> Poll<Result<Rc<TileMap>, MapLoadError>> {
        let state = std::mem::replace(&mut self.state, PendingState::Taken);
        match state {
            PendingState::Ready(result) => Poll::Ready(result),
            PendingState::Waiting { receiver, cache } => match receiver.try_recv() {
                Ok(Ok(map)) => {
                    let map = Rc::new(map);
                    cache.borrow_mut().insert(self.id.clone(), Rc::clone(&map));
                    info!(map = %self.id, "map_loaded");
                    Poll::Ready(Ok(map))
                }
                Ok(Err(load_error)) => {
                    error!(map = %self.id, error = %load_error, "map_load_failed");
                    Poll::Ready(Err(load_error))
                }
                Err(TryRecvError::Empty) => {
                    self.state = PendingState::Waiting { receiver, cache };
                    Poll::Pending
                }
                Err(TryRecvError::Disconnected) => {
                    error!(map = %self.id, "map_loader_worker_disconnected");
                    Poll::Ready(Err(MapLoadError::WorkerDisconnected {
                        id: self.id.clone(),
                    }))
                }
            },
            PendingState::Taken => Poll::Ready(Err(MapLoadError::AlreadyTaken {
                id: self.id.clone(),
            })),
        }
    }
}

/// Supplies parsed maps by id.
pub trait MapLoader {
    fn request(&self, map_id: &str) -> PendingMap;
}

type MapCache = Rc<RefCell<HashMap<String, Rc<TileMap>>>>;

/// Reads Tiled JSON maps relative to `root`, parsing on a worker thread.
///
/// Parsed maps are handed back through a channel and cached per id on the
/// main thread when the pending result is polled.
pub struct FileMapLoader {
    root: PathBuf,
    cache: MapCache,
}

impl FileMapLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: MapCache::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cached_count(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl MapLoader for FileMapLoader {
    fn request(&self, map_id: &str) -> PendingMap {
        if let Some(map) = self.cache.borrow().get(map_id) {
            debug!(map = map_id, "map_cache_hit");
            return PendingMap::ready(map_id, Ok(Rc::clone(map)));
        }

        let (sender, receiver) = mpsc::channel();
        let path = self.root.join(map_id);
        let id = map_id.to_string();
        let spawned = thread::Builder::new()
            .name("map-loader".to_string())
            .spawn(move || {
                let result = fs::read_to_string(&path)
                    .map_err(|source| MapLoadError::Read {
                        path: path.clone(),
                        source,
                    })
                    .and_then(|raw| parse_tiled_map(&id, &raw));
                let _ = sender.send(result);
            });

        match spawned {
            Ok(_) => PendingMap {
                id: map_id.to_string(),
                state: PendingState::Waiting {
                    receiver,
                    cache: Rc::clone(&self.cache),
                },
            },
            Err(source) => PendingMap::ready(
                map_id,
                Err(MapLoadError::Spawn {
                    id: map_id.to_string(),
                    source,
                }),
            ),
        }
    }
}

/// Serves prebuilt maps; used by tests and embedded content.
#[derive(Default)]
pub struct StaticMapLoader {
    maps: HashMap<String, Rc<TileMap>>,
}

impl StaticMapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(mut self, map: TileMap) -> Self {
        self.insert(map);
        self
    }

    pub fn insert(&mut self, map: TileMap) {
        self.maps.insert(map.id().to_string(), Rc::new(map));
    }
}

impl MapLoader for StaticMapLoader {
    fn request(&self, map_id: &str) -> PendingMap {
        let result = self
            .maps
            .get(map_id)
            .map(Rc::clone)
            .ok_or_else(|| MapLoadError::NotFound {
                id: map_id.to_string(),
            });
        PendingMap::ready(map_id, result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::grid::GridPos;
    use crate::world::is_blocked;

    const SAMPLE: &str = r#"{
        "width": 3, "height": 2, "tilewidth": 16, "tileheight": 16,
        "properties": [{"name": "name", "type": "string", "value": "Village"}],
        "tilesets": [{"firstgid": 1, "columns": 8, "image": "tiles.png", "tilewidth": 16, "tileheight": 16}],
        "layers": [
            {"name": "Ground", "type": "tilelayer", "width": 3, "height": 2, "data": [1, 1, 1, 1, 2147483649, 1]},
            {"name": "Collision", "type": "tilelayer", "width": 3, "height": 2, "visible": false, "data": [0, 5, 0, 0, 0, 0]},
            {"name": "Objects", "type": "objectgroup", "objects": [
                {"id": 1, "name": "Miren", "type": "npc", "x": 32, "y": 16,
                 "properties": [{"name": "dialogue", "type": "string", "value": "miren_intro"}]},
                {"id": 2, "name": "barrel", "type": "prop", "x": 0, "y": 0}
            ]},
            {"name": "Warps", "type": "objectgroup", "objects": [
                {"id": 3, "name": "", "x": 0, "y": 16,
                 "properties": [{"name": "map", "type": "string", "value": "maps/house.json"}]}
            ]}
        ]
    }"#;

    fn wait_for(pending: &mut PendingMap) -> Result<Rc<TileMap>, MapLoadError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Poll::Ready(result) = pending.poll() {
                return result;
            }
            assert!(Instant::now() < deadline, "map load timed out");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn parses_layers_objects_and_tileset() {
        let map = parse_tiled_map("maps/village.json", SAMPLE).expect("parse");

        assert_eq!(map.area_name(), "Village");
        assert_eq!(map.tile("Ground", 1, 1), Some(1));
        assert!(is_blocked(&map, 1, 0));
        assert!(!is_blocked(&map, 0, 0));
        assert_eq!(map.objects_of(MapObjectKind::Npc).count(), 1);
        assert_eq!(map.objects().len(), 2);
        assert_eq!(map.warps()[0].trigger, GridPos::new(0, 1));
        assert_eq!(map.tileset().map(|tileset| tileset.columns), Some(8));
        assert!(!map.collision_layer().expect("collision").is_visible());
    }

    #[test]
    fn parse_error_reports_json_path() {
        let raw = r#"{"width": 1, "height": 1, "tilewidth": 16, "tileheight": "big"}"#;
        match parse_tiled_map("broken", raw) {
            Err(MapLoadError::Parse { source, .. }) => assert_eq!(source.path, "tileheight"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn short_layer_data_is_rejected() {
        let raw = r#"{"width": 2, "height": 2, "tilewidth": 16, "tileheight": 16,
            "layers": [{"name": "Ground", "type": "tilelayer", "data": [1, 1, 1]}]}"#;
        assert!(matches!(
            parse_tiled_map("short", raw),
            Err(MapLoadError::InvalidLayer { .. })
        ));
    }

    #[test]
    fn file_loader_parses_off_thread_and_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("maps")).expect("maps dir");
        fs::write(dir.path().join("maps/village.json"), SAMPLE).expect("write map");
        let loader = FileMapLoader::new(dir.path());

        let mut pending = loader.request("maps/village.json");
        let first = wait_for(&mut pending).expect("load");
        assert_eq!(first.id(), "maps/village.json");
        assert_eq!(loader.cached_count(), 1);

        let mut again = loader.request("maps/village.json");
        let second = match again.poll() {
            Poll::Ready(result) => result.expect("cached"),
            Poll::Pending => panic!("cached map should be ready immediately"),
        };
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn file_loader_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = FileMapLoader::new(dir.path());
        let mut pending = loader.request("maps/nowhere.json");
        assert!(matches!(
            wait_for(&mut pending),
            Err(MapLoadError::Read { .. })
        ));
        assert_eq!(loader.cached_count(), 0);
    }

    #[test]
    fn result_is_taken_only_once() {
        let loader = StaticMapLoader::new().with_map(TileMap::new("a", 1, 1, 16, 16));
        let mut pending = loader.request("a");
        assert!(matches!(pending.poll(), Poll::Ready(Ok(_))));
        assert!(matches!(
            pending.poll(),
            Poll::Ready(Err(MapLoadError::AlreadyTaken { .. }))
        ));
    }

    #[test]
    fn static_loader_reports_unknown_map() {
        let mut pending = StaticMapLoader::new().request("missing");
        assert!(matches!(
            pending.poll(),
            Poll::Ready(Err(MapLoadError::NotFound { .. }))
        ));
    }
}
