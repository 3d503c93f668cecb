//! Grid geometry: cell coordinates, headings, and neighbourhoods.
//!
//! The world is a rectangular grid of integer cells. `x` grows to the east and
//! `y` grows to the south, so [`Heading::East`] is `(+1, 0)` and
//! [`Heading::South`] is `(0, +1)`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An integer grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell.
    pub fn manhattan(self, other: Location) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Chebyshev distance (square sensor window).
    pub fn chebyshev(self, other: Location) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// The neighbouring cell one step in `heading`.
    pub fn step(self, heading: Heading) -> Location {
        let (dx, dy) = heading.delta();
        Location::new(self.x + dx, self.y + dy)
    }

    /// Whether `other` is one orthogonal step away.
    pub fn is_adjacent(self, other: Location) -> bool {
        self.manhattan(other) == 1
    }

    /// The four orthogonal neighbours in a fixed order (E, S, W, N).
    pub fn neighbours(self) -> [Location; 4] {
        Heading::ALL.map(|h| self.step(h))
    }

    /// Planning-encoding name, e.g. `loc_3_7`.
    pub fn pddl_name(self) -> String {
        format!("loc_{}_{}", self.x, self.y)
    }

    /// Parse a planning-encoding name back into a location.
    pub fn from_pddl_name(name: &str) -> Option<Location> {
        let rest = name.trim().to_ascii_lowercase();
        let rest = rest.strip_prefix("loc_")?;
        let (x, y) = rest.split_once('_')?;
        Some(Location::new(x.parse().ok()?, y.parse().ok()?))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Location {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Which way the agent faces. The world's movement primitive is relative to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heading {
    #[default]
    East,
    South,
    West,
    North,
}

impl Heading {
    /// Clockwise order starting at east.
    pub const ALL: [Heading; 4] = [Heading::East, Heading::South, Heading::West, Heading::North];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::East => (1, 0),
            Self::South => (0, 1),
            Self::West => (-1, 0),
            Self::North => (0, -1),
        }
    }

    /// Heading needed to move from `from` to the adjacent cell `to`.
    pub fn between(from: Location, to: Location) -> Option<Heading> {
        Self::ALL.into_iter().find(|h| from.step(*h) == to)
    }

    pub fn right(self) -> Heading {
        Self::ALL[(self.index() + 1) % 4]
    }

    pub fn left(self) -> Heading {
        Self::ALL[(self.index() + 3) % 4]
    }

    /// Number of clockwise quarter turns from `self` to `target` (0..=3).
    pub fn quarter_turns_to(self, target: Heading) -> usize {
        (target.index() + 4 - self.index()) % 4
    }

    fn index(self) -> usize {
        match self {
            Self::East => 0,
            Self::South => 1,
            Self::West => 2,
            Self::North => 3,
        }
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
            Self::North => "north",
        };
        f.write_str(s)
    }
}

/// Rectangular grid extent; valid cells are `0..width` × `0..height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, loc: Location) -> bool {
        loc.x >= 0 && loc.y >= 0 && loc.x < self.width && loc.y < self.height
    }

    /// Every cell, ordered by `(x, y)`.
    pub fn cells(self) -> impl Iterator<Item = Location> {
        let height = self.height;
        (0..self.width).flat_map(move |x| (0..height).map(move |y| Location::new(x, y)))
    }

    /// Whether `loc` lies on the outer ring of the grid.
    pub fn is_perimeter(&self, loc: Location) -> bool {
        self.contains(loc)
            && (loc.x == 0 || loc.y == 0 || loc.x == self.width - 1 || loc.y == self.height - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pddl_names_roundtrip_and_reject_garbage() {
        let loc = Location::new(12, 3);
        assert_eq!(loc.pddl_name(), "loc_12_3");
        assert_eq!(Location::from_pddl_name("LOC_12_3"), Some(loc));
        assert_eq!(Location::from_pddl_name("victory"), None);
        assert_eq!(Location::from_pddl_name("loc_a_3"), None);
    }

    #[test]
    fn turning_cycles_clockwise() {
        assert_eq!(Heading::East.right(), Heading::South);
        assert_eq!(Heading::East.left(), Heading::North);
        assert_eq!(Heading::North.right(), Heading::East);
        assert_eq!(Heading::East.quarter_turns_to(Heading::West), 2);
        assert_eq!(Heading::East.quarter_turns_to(Heading::North), 3);
        assert_eq!(Heading::South.quarter_turns_to(Heading::South), 0);
    }

    #[test]
    fn heading_between_adjacent_cells() {
        let a = Location::new(4, 4);
        assert_eq!(Heading::between(a, Location::new(4, 5)), Some(Heading::South));
        assert_eq!(Heading::between(a, Location::new(3, 4)), Some(Heading::West));
        assert_eq!(Heading::between(a, Location::new(5, 5)), None);
    }

    #[test]
    fn perimeter_detection() {
        let b = Bounds::new(5, 4);
        assert!(b.is_perimeter(Location::new(0, 2)));
        assert!(b.is_perimeter(Location::new(4, 3)));
        assert!(!b.is_perimeter(Location::new(2, 2)));
        assert!(!b.is_perimeter(Location::new(5, 2)));
        assert_eq!(b.cells().count(), 20);
    }
}
