use crate::grid::GridPos;

use super::TileMap;

/// Whether the player may not enter `(col, row)`.
///
/// Out-of-bounds cells are blocked. A map without a collision layer blocks
/// nothing; otherwise any collision tile id above zero blocks.
pub fn is_blocked(map: &TileMap, col: i32, row: i32) -> bool {
    if !map.contains(GridPos::new(col, row)) {
        return true;
    }
    match map.collision_layer() {
        Some(layer) => layer.tile_at(col, row).map_or(true, |id| id > 0),
        None => false,
    }
}
