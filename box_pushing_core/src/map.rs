use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{Position, entity::Entity};

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Provides methods for accessing and modifying elements via [`Position`] coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

/// The cell array the simulation runs on: every cell is empty or owns one entity.
pub type EntityGrid = Grid<Option<Entity>>;

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![T::default(); size],
        }
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    fn index_of(&self, pos: Position) -> Option<usize> {
        if self.is_valid(pos) {
            Some(pos.y * self.width + pos.x)
        } else {
            None
        }
    }

    fn out_of_bounds(&self, pos: Position) -> GridError {
        GridError::OutOfBounds {
            x: pos.x,
            y: pos.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn is_valid(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Gets an immutable reference to the cell at the given position.
    pub fn get(&self, pos: Position) -> Result<&T, GridError> {
        let index = self.index_of(pos).ok_or_else(|| self.out_of_bounds(pos))?;
        Ok(&self.cells[index])
    }

    /// Gets a mutable reference to the cell at the given position.
    pub fn get_mut(&mut self, pos: Position) -> Result<&mut T, GridError> {
        let index = self.index_of(pos).ok_or_else(|| self.out_of_bounds(pos))?;
        Ok(&mut self.cells[index])
    }

    /// Overwrites the value of the cell at the given position.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the position is invalid.
    pub fn set(&mut self, pos: Position, value: T) -> Result<(), GridError> {
        *self.get_mut(pos)? = value;
        Ok(())
    }

    /// Returns an iterator over the cells of the grid in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index % width, index / width), cell))
    }
}

impl Grid<Option<Entity>> {
    /// Returns a copy of the entity at `pos`, or `None` for an empty cell.
    pub fn entity_at(&self, pos: Position) -> Result<Option<Entity>, GridError> {
        self.get(pos).copied()
    }

    /// Stamps a rectangle of walls with its top-left corner at `(x, y)`.
    pub fn wall_rect(&mut self, x: usize, y: usize, w: usize, h: usize) -> Result<(), GridError> {
        if w == 0 || h == 0 {
            return Ok(());
        }
        let (right, bottom) = (x + w - 1, y + h - 1);
        for cx in x..=right {
            self.set(Position::new(cx, y), Some(Entity::Wall))?;
            self.set(Position::new(cx, bottom), Some(Entity::Wall))?;
        }
        for cy in y..=bottom {
            self.set(Position::new(x, cy), Some(Entity::Wall))?;
            self.set(Position::new(right, cy), Some(Entity::Wall))?;
        }
        Ok(())
    }

    /// Checks that every cell of the outer ring holds a wall.
    pub fn has_wall_border(&self) -> bool {
        let (w, h) = (self.width, self.height);
        self.enumerate()
            .filter(|(p, _)| p.x == 0 || p.y == 0 || p.x + 1 == w || p.y + 1 == h)
            .all(|(_, cell)| matches!(cell, Some(Entity::Wall)))
    }

    /// Encodes the grid as `(kind, color, state)` triples in row-major order.
    pub fn encode(&self) -> Vec<[u8; 3]> {
        self.iter().map(Entity::encode_cell).collect()
    }

    /// Positions of all cells whose entity satisfies `predicate`.
    pub fn positions_where<F>(&self, mut predicate: F) -> Vec<Position>
    where
        F: FnMut(&Entity) -> bool,
    {
        self.enumerate()
            .filter_map(|(pos, cell)| match cell {
                Some(entity) if predicate(entity) => Some(pos),
                _ => None,
            })
            .collect()
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Position) -> &Self::Output {
        match self.index_of(index) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                index.x, index.y, self.width, self.height
            ),
        }
    }
}

/// Indexing using Position coordinates for mutable access
impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: Position) -> &mut Self::Output {
        let width = self.width;
        let height = self.height;
        match self.index_of(index) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                index.x, index.y, width, height
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    #[test]
    fn get_outside_grid_is_out_of_bounds() {
        let grid: EntityGrid = Grid::new(4, 3);
        assert_eq!(
            grid.get(Position::new(4, 0)),
            Err(GridError::OutOfBounds {
                x: 4,
                y: 0,
                width: 4,
                height: 3
            })
        );
        assert!(grid.get(Position::new(3, 2)).is_ok());
    }

    #[test]
    fn set_only_touches_target_cell() {
        let mut grid: EntityGrid = Grid::new(3, 3);
        let target = Position::new(1, 2);
        grid.set(target, Some(Entity::goal(Color::Blue))).unwrap();
        for (pos, cell) in grid.enumerate() {
            if pos == target {
                assert_eq!(*cell, Some(Entity::goal(Color::Blue)));
            } else {
                assert_eq!(*cell, None);
            }
        }
        assert!(grid.set(Position::new(3, 0), None).is_err());
    }

    #[test]
    fn wall_rect_covers_only_the_border() {
        let mut grid: EntityGrid = Grid::new(5, 4);
        grid.wall_rect(0, 0, 5, 4).unwrap();
        assert!(grid.has_wall_border());
        assert_eq!(grid.positions_where(|e| *e == Entity::Wall).len(), 14);
        assert_eq!(grid.entity_at(Position::new(2, 2)).unwrap(), None);
    }

    #[test]
    fn encode_is_row_major() {
        let mut grid: EntityGrid = Grid::new(3, 2);
        grid.set(Position::new(2, 0), Some(Entity::Wall)).unwrap();
        grid.set(Position::new(0, 1), Some(Entity::new_box(Color::Red)))
            .unwrap();
        let encoded = grid.encode();
        assert_eq!(encoded.len(), 6);
        assert_eq!(encoded[0], [1, 0, 0]);
        assert_eq!(encoded[2], [2, 5, 0]);
        assert_eq!(encoded[3], [7, 0, 0]);
    }
}
