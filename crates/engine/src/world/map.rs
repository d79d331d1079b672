use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::grid::{Direction, GridPos};

/// Layer consulted by the collision resolver.
pub const COLLISION_LAYER_NAME: &str = "Collision";

pub type PropertyBag = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("layer {layer}: tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
}

/// A width x height grid of tile ids; id 0 is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    name: String,
    width: u32,
    height: u32,
    tiles: Vec<u32>,
    visible: bool,
}

impl TileLayer {
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        tiles: Vec<u32>,
    ) -> Result<Self, MapError> {
        let name = name.into();
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(MapError::TileCountMismatch {
                layer: name,
                expected,
                actual,
            });
        }
        Ok(Self {
            name,
            width,
            height,
            tiles,
            visible: true,
        })
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn index_of(&self, col: i32, row: i32) -> Option<usize> {
        if col < 0 || row < 0 || col as u32 >= self.width || row as u32 >= self.height {
            return None;
        }
        Some(row as usize * self.width as usize + col as usize)
    }

    pub fn tile_at(&self, col: i32, row: i32) -> Option<u32> {
        self.index_of(col, row)
            .and_then(|index| self.tiles.get(index).copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapObjectKind {
    Npc,
    Warp,
    Label,
    Interactable,
}

impl MapObjectKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "npc" => Some(MapObjectKind::Npc),
            "warp" | "door" => Some(MapObjectKind::Warp),
            "label" | "sign" => Some(MapObjectKind::Label),
            "interactable" => Some(MapObjectKind::Interactable),
            _ => None,
        }
    }
}

/// A typed placement from an object layer, positioned in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct MapObject {
    pub id: u32,
    pub name: String,
    pub kind: MapObjectKind,
    pub x: f32,
    pub y: f32,
    pub properties: PropertyBag,
}

impl MapObject {
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn property_i64(&self, key: &str) -> Option<i64> {
        let value = self.properties.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|float| float as i64))
            .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilesetInfo {
    pub first_gid: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub columns: u32,
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpDestination {
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub position: Option<GridPos>,
    #[serde(default)]
    pub facing: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warp {
    pub target_map: String,
    pub destination: WarpDestination,
    pub trigger: GridPos,
}

impl Warp {
    fn from_object(object: &MapObject, tile_width: u32, tile_height: u32) -> Option<Self> {
        let target_map = object
            .property_str("map")
            .or_else(|| object.property_str("target"))
            .map(ToString::to_string);
        let scene = object.property_str("scene").map(ToString::to_string);
        let position = match (object.property_i64("dest_col"), object.property_i64("dest_row")) {
            (Some(col), Some(row)) => Some(GridPos::new(col as i32, row as i32)),
            _ => None,
        };
        let facing = object.property_str("facing").and_then(Direction::parse);

        let target_map = match (target_map, &scene) {
            (Some(map), _) => map,
            (None, Some(_)) => String::new(),
            (None, None) => {
                warn!(object_id = object.id, name = %object.name, "warp_without_target_skipped");
                return None;
            }
        };

        Some(Self {
            target_map,
            destination: WarpDestination {
                scene,
                position,
                facing,
            },
            trigger: GridPos::from_pixel(object.x, object.y, tile_width, tile_height),
        })
    }
}

/// A loaded map. Immutable once built; shared as `Rc<TileMap>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMap {
    id: String,
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    layers: Vec<TileLayer>,
    objects: Vec<MapObject>,
    warps: Vec<Warp>,
    tileset: Option<TilesetInfo>,
    properties: PropertyBag,
}

impl TileMap {
    pub fn new(id: impl Into<String>, width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            tile_width: tile_width.max(1),
            tile_height: tile_height.max(1),
            layers: Vec::new(),
            objects: Vec::new(),
            warps: Vec::new(),
            tileset: None,
            properties: PropertyBag::new(),
        }
    }

    pub fn with_layer(mut self, layer: TileLayer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Adds an object; warp objects are parsed into [`Warp`]s here, once.
    pub fn with_object(mut self, object: MapObject) -> Self {
        if object.kind == MapObjectKind::Warp {
            if let Some(warp) = Warp::from_object(&object, self.tile_width, self.tile_height) {
                self.warps.push(warp);
            }
        }
        self.objects.push(object);
        self
    }

    pub fn with_tileset(mut self, tileset: TilesetInfo) -> Self {
        self.tileset = Some(tileset);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.col >= 0 && pos.row >= 0 && (pos.col as u32) < self.width && (pos.row as u32) < self.height
    }

    pub fn layers(&self) -> &[TileLayer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&TileLayer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn collision_layer(&self) -> Option<&TileLayer> {
        self.layer(COLLISION_LAYER_NAME)
    }

    pub fn tile(&self, layer: &str, col: i32, row: i32) -> Option<u32> {
        self.layer(layer)?.tile_at(col, row)
    }

    pub fn objects(&self) -> &[MapObject] {
        &self.objects
    }

    pub fn objects_of(&self, kind: MapObjectKind) -> impl Iterator<Item = &MapObject> {
        self.objects.iter().filter(move |object| object.kind == kind)
    }

    pub fn warps(&self) -> &[Warp] {
        &self.warps
    }

    pub fn warp_at(&self, pos: GridPos) -> Option<&Warp> {
        self.warps.iter().find(|warp| warp.trigger == pos)
    }

    pub fn tileset(&self) -> Option<&TilesetInfo> {
        self.tileset.as_ref()
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Display name for the area, falling back to the map id.
    pub fn area_name(&self) -> &str {
        self.property_str("name").unwrap_or(&self.id)
    }

    pub fn grid_of(&self, object: &MapObject) -> GridPos {
        GridPos::from_pixel(object.x, object.y, self.tile_width, self.tile_height)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn warp_object(x: f32, y: f32, properties: PropertyBag) -> MapObject {
        MapObject {
            id: 7,
            name: "door".to_string(),
            kind: MapObjectKind::Warp,
            x,
            y,
            properties,
        }
    }

    #[test]
    fn layer_rejects_wrong_tile_count() {
        let error = TileLayer::new("Ground", 2, 2, vec![0; 3]).expect_err("mismatch");
        assert_eq!(
            error,
            MapError::TileCountMismatch {
                layer: "Ground".to_string(),
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn tile_lookup_by_layer_name() {
        let map = TileMap::new("town", 2, 2, 16, 16)
            .with_layer(TileLayer::new("Ground", 2, 2, vec![1, 2, 3, 4]).expect("layer"));

        assert_eq!(map.tile("Ground", 1, 1), Some(4));
        assert_eq!(map.tile("Ground", 2, 0), None);
        assert_eq!(map.tile("Ground", -1, 0), None);
        assert_eq!(map.tile("Roof", 0, 0), None);
    }

    #[test]
    fn warp_objects_are_parsed_once_at_build() {
        let mut properties = PropertyBag::new();
        properties.insert("map".to_string(), json!("maps/house.json"));
        properties.insert("dest_col".to_string(), json!(2));
        properties.insert("dest_row".to_string(), json!("9"));
        properties.insert("facing".to_string(), json!("up"));
        let map = TileMap::new("town", 10, 10, 16, 16).with_object(warp_object(48.0, 64.0, properties));

        let warp = map.warp_at(GridPos::new(3, 4)).expect("warp at trigger");
        assert_eq!(warp.target_map, "maps/house.json");
        assert_eq!(warp.destination.position, Some(GridPos::new(2, 9)));
        assert_eq!(warp.destination.facing, Some(Direction::Up));
        assert!(map.warp_at(GridPos::new(3, 5)).is_none());
    }

    #[test]
    fn warp_without_target_or_scene_is_skipped() {
        let map = TileMap::new("town", 10, 10, 16, 16)
            .with_object(warp_object(0.0, 0.0, PropertyBag::new()));
        assert!(map.warps().is_empty());
        assert_eq!(map.objects().len(), 1);
    }

    #[test]
    fn scene_warp_needs_no_map() {
        let mut properties = PropertyBag::new();
        properties.insert("scene".to_string(), json!("Title"));
        let map = TileMap::new("town", 10, 10, 16, 16).with_object(warp_object(16.0, 16.0, properties));
        assert_eq!(
            map.warps()[0].destination.scene.as_deref(),
            Some("Title")
        );
    }

    #[test]
    fn object_kind_accepts_door_alias() {
        assert_eq!(MapObjectKind::parse("Door"), Some(MapObjectKind::Warp));
        assert_eq!(MapObjectKind::parse("chest"), None);
    }
}
