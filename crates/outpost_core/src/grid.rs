//! Placement grid.
//!
//! Tracks which rectangular footprints are free, occupied or permanently
//! forbidden. Buildings only remember their origin and footprint; the grid
//! exclusively owns the cell table.

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::{fixed_decimal, Fixed, Vec2Fixed};

// ============================================================================
// Cells and Footprints
// ============================================================================

/// State of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GridCell {
    /// Available for building.
    #[default]
    Empty,
    /// Covered by the footprint of a building.
    Occupied(EntityId),
    /// Never placeable (map border, decorations).
    Forbidden,
}

/// Size of a building in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    /// Width in cells.
    pub width: u32,
    /// Height in cells.
    pub height: u32,
}

impl Footprint {
    /// Create a new footprint.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Create a square footprint.
    #[must_use]
    pub const fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }

    /// The shorter side, in cells.
    #[must_use]
    pub const fn min_side(&self) -> u32 {
        if self.width < self.height {
            self.width
        } else {
            self.height
        }
    }
}

impl Default for Footprint {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Grid dimensions and border setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Width in cells.
    pub width: u32,
    /// Height in cells.
    pub height: u32,
    /// World units per cell side.
    #[serde(with = "fixed_decimal")]
    pub cell_size: Fixed,
    /// Rings of forbidden cells around the map edge.
    #[serde(default)]
    pub border: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 44,
            height: 44,
            cell_size: Fixed::from_num(10),
            border: 1,
        }
    }
}

/// Result of a placement check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementResult {
    /// Every covered cell is empty and in bounds.
    Valid,
    /// The footprint leaves the map.
    OutOfBounds,
    /// Some covered cells are occupied or forbidden.
    Blocked {
        /// Coordinates of the offending cells.
        cells: Vec<(i32, i32)>,
    },
}

impl PlacementResult {
    /// Check if placement is valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

// ============================================================================
// Grid Occupancy
// ============================================================================

/// Cell table for one base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridOccupancy {
    width: u32,
    height: u32,
    cell_size: Fixed,
    /// Row-major.
    cells: Vec<GridCell>,
}

impl GridOccupancy {
    /// Create a grid from its config, forbidding the configured border.
    ///
    /// Zero dimensions are raised to one cell and a non-positive cell size
    /// falls back to one world unit.
    #[must_use]
    pub fn new(config: &GridConfig) -> Self {
        let width = config.width.max(1);
        let height = config.height.max(1);
        let cell_size = if config.cell_size > Fixed::ZERO {
            config.cell_size
        } else {
            Fixed::ONE
        };

        let mut grid = Self {
            width,
            height,
            cell_size,
            cells: vec![GridCell::Empty; (width as usize) * (height as usize)],
        };
        grid.forbid_border(config.border);
        grid
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Cell size in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let (x, y) = (u32::try_from(x).ok()?, u32::try_from(y).ok()?);
        (x < self.width && y < self.height)
            .then(|| (y as usize) * (self.width as usize) + (x as usize))
    }

    fn rect_in_bounds(&self, x: i32, y: i32, footprint: Footprint) -> bool {
        if x < 0 || y < 0 || footprint.width == 0 || footprint.height == 0 {
            return false;
        }
        let right = i64::from(x) + i64::from(footprint.width);
        let bottom = i64::from(y) + i64::from(footprint.height);
        right <= i64::from(self.width) && bottom <= i64::from(self.height)
    }

    fn rect_cells(x: i32, y: i32, footprint: Footprint) -> impl Iterator<Item = (i32, i32)> {
        let (w, h) = (footprint.width as i32, footprint.height as i32);
        (0..h).flat_map(move |dy| (0..w).map(move |dx| (x + dx, y + dy)))
    }

    /// State of the cell at `(x, y)`, or `None` outside the map.
    #[must_use]
    pub fn cell(&self, x: i32, y: i32) -> Option<GridCell> {
        self.index(x, y).map(|i| self.cells[i])
    }

    /// Owning entity of the cell at `(x, y)`.
    #[must_use]
    pub fn owner_at(&self, x: i32, y: i32) -> Option<EntityId> {
        match self.cell(x, y)? {
            GridCell::Occupied(id) => Some(id),
            GridCell::Empty | GridCell::Forbidden => None,
        }
    }

    /// Check a footprint and report why it cannot be placed.
    #[must_use]
    pub fn check_placement(&self, x: i32, y: i32, footprint: Footprint) -> PlacementResult {
        if !self.rect_in_bounds(x, y, footprint) {
            return PlacementResult::OutOfBounds;
        }

        let blocked: Vec<(i32, i32)> = Self::rect_cells(x, y, footprint)
            .filter(|&(cx, cy)| self.cell(cx, cy) != Some(GridCell::Empty))
            .collect();

        if blocked.is_empty() {
            PlacementResult::Valid
        } else {
            PlacementResult::Blocked { cells: blocked }
        }
    }

    /// Whether the whole footprint is in bounds and every cell is empty.
    #[must_use]
    pub fn can_place(&self, x: i32, y: i32, footprint: Footprint) -> bool {
        self.check_placement(x, y, footprint).is_valid()
    }

    /// Mark every cell of the footprint as occupied by `owner`.
    ///
    /// Does not check for overlap; call [`can_place`](Self::can_place) first.
    /// Forbidden cells stay forbidden. Returns `false`, changing nothing, if
    /// the footprint leaves the map.
    pub fn occupy(&mut self, x: i32, y: i32, footprint: Footprint, owner: EntityId) -> bool {
        if !self.rect_in_bounds(x, y, footprint) {
            return false;
        }
        for (cx, cy) in Self::rect_cells(x, y, footprint) {
            if let Some(i) = self.index(cx, cy) {
                if self.cells[i] != GridCell::Forbidden {
                    self.cells[i] = GridCell::Occupied(owner);
                }
            }
        }
        true
    }

    /// Return every occupied cell of the footprint to empty.
    ///
    /// Cells outside the map are skipped and forbidden cells stay forbidden.
    pub fn free(&mut self, x: i32, y: i32, footprint: Footprint) {
        for (cx, cy) in Self::rect_cells(x, y, footprint) {
            if let Some(i) = self.index(cx, cy) {
                if matches!(self.cells[i], GridCell::Occupied(_)) {
                    self.cells[i] = GridCell::Empty;
                }
            }
        }
    }

    /// Permanently block every in-bounds cell of the footprint.
    pub fn forbid(&mut self, x: i32, y: i32, footprint: Footprint) {
        for (cx, cy) in Self::rect_cells(x, y, footprint) {
            if let Some(i) = self.index(cx, cy) {
                self.cells[i] = GridCell::Forbidden;
            }
        }
    }

    /// Forbid `thickness` rings of cells around the map edge.
    pub fn forbid_border(&mut self, thickness: u32) {
        for y in 0..self.height {
            for x in 0..self.width {
                let edge = x.min(y).min(self.width - 1 - x).min(self.height - 1 - y);
                if edge < thickness {
                    let i = (y as usize) * (self.width as usize) + (x as usize);
                    self.cells[i] = GridCell::Forbidden;
                }
            }
        }
    }

    /// World position of the top-left corner of cell `(x, y)`.
    #[must_use]
    pub fn grid_to_world(&self, x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(
            Fixed::from_num(x) * self.cell_size,
            Fixed::from_num(y) * self.cell_size,
        )
    }

    /// Cell containing a world position, or `None` outside the map.
    #[must_use]
    pub fn world_to_grid(&self, pos: Vec2Fixed) -> Option<(i32, i32)> {
        let x = (pos.x / self.cell_size).floor().to_num::<i64>();
        let y = (pos.y / self.cell_size).floor().to_num::<i64>();
        let (x, y) = (i32::try_from(x).ok()?, i32::try_from(y).ok()?);
        self.index(x, y).map(|_| (x, y))
    }

    /// World position of the centre of a footprint placed at `(x, y)`.
    #[must_use]
    pub fn footprint_center(&self, x: i32, y: i32, footprint: Footprint) -> Vec2Fixed {
        let corner = self.grid_to_world(x, y);
        let half = self.cell_size / 2;
        Vec2Fixed::new(
            corner.x + Fixed::from_num(footprint.width) * half,
            corner.y + Fixed::from_num(footprint.height) * half,
        )
    }

    /// Number of cells currently occupied by buildings.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c, GridCell::Occupied(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(size: u32) -> GridOccupancy {
        GridOccupancy::new(&GridConfig {
            width: size,
            height: size,
            cell_size: Fixed::from_num(10),
            border: 0,
        })
    }

    #[test]
    fn test_default_grid_has_forbidden_border() {
        let grid = GridOccupancy::new(&GridConfig::default());
        assert_eq!(grid.width(), 44);
        assert_eq!(grid.cell(0, 0), Some(GridCell::Forbidden));
        assert_eq!(grid.cell(43, 20), Some(GridCell::Forbidden));
        assert_eq!(grid.cell(1, 1), Some(GridCell::Empty));
        assert!(!grid.can_place(0, 5, Footprint::square(2)));
        assert!(grid.can_place(1, 1, Footprint::square(2)));
    }

    #[test]
    fn test_can_place_bounds() {
        let grid = open_grid(10);
        assert!(grid.can_place(0, 0, Footprint::square(10)));
        assert!(!grid.can_place(8, 8, Footprint::square(3)));
        assert!(!grid.can_place(-1, 0, Footprint::square(1)));
        assert!(!grid.can_place(0, 0, Footprint::new(0, 2)));
    }

    #[test]
    fn test_occupy_free_roundtrip() {
        let mut grid = open_grid(10);
        let fp = Footprint::new(3, 2);

        assert!(grid.occupy(2, 3, fp, 7));
        assert_eq!(grid.occupied_count(), 6);
        assert_eq!(grid.owner_at(4, 4), Some(7));
        assert!(!grid.can_place(3, 3, Footprint::square(2)));

        grid.free(2, 3, fp);
        assert_eq!(grid.occupied_count(), 0);
        assert!(grid.can_place(2, 3, fp));
        assert!(grid.occupy(2, 3, fp, 8));
    }

    #[test]
    fn test_occupy_out_of_bounds_changes_nothing() {
        let mut grid = open_grid(5);
        assert!(!grid.occupy(4, 4, Footprint::square(2), 1));
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn test_free_keeps_forbidden_cells() {
        let mut grid = open_grid(6);
        grid.forbid(2, 2, Footprint::square(1));
        grid.free(0, 0, Footprint::square(6));
        assert_eq!(grid.cell(2, 2), Some(GridCell::Forbidden));
    }

    #[test]
    fn test_check_placement_reports_blocked_cells() {
        let mut grid = open_grid(10);
        grid.occupy(4, 4, Footprint::square(1), 3);
        let result = grid.check_placement(3, 3, Footprint::square(2));
        assert_eq!(result, PlacementResult::Blocked { cells: vec![(4, 4)] });
    }

    #[test]
    fn test_world_grid_conversion() {
        let grid = open_grid(10);
        assert_eq!(grid.grid_to_world(3, 4), Vec2Fixed::from_ints(30, 40));
        assert_eq!(grid.world_to_grid(Vec2Fixed::from_ints(35, 49)), Some((3, 4)));
        assert_eq!(grid.world_to_grid(Vec2Fixed::from_ints(-1, 0)), None);
        assert_eq!(grid.world_to_grid(Vec2Fixed::from_ints(100, 0)), None);
    }

    #[test]
    fn test_footprint_center() {
        let grid = open_grid(20);
        let center = grid.footprint_center(5, 5, Footprint::square(3));
        assert_eq!(center, Vec2Fixed::from_ints(65, 65));
    }
}
