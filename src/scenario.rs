//! Scenario definitions: grid size, start pose, goal store, and the entities
//! waiting to be discovered.
//!
//! The built-in catalog covers the classic comparison cases. Scenarios can
//! also be loaded from TOML:
//!
//! ```toml
//! id = "corner-shop"
//! name = "Corner Shop"
//! width = 12
//! height = 12
//! start = { x = 1, y = 1 }
//!
//! [goal]
//! name = "victory"
//! location = { x = 10, y = 10 }
//! price = 4.0
//!
//! [[entities]]
//! name = "rami_levy"
//! location = { x = 4, y = 2 }
//! kind = "store"
//! price = 2.0
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ScenarioError, ScenarioResult};
use crate::grid::{Bounds, Heading, Location};
use crate::planner::grid::CellGraph;

/// Wall layouts tried before giving up on reachability.
const MAX_LAYOUT_ATTEMPTS: u32 = 32;

/// Densities above this make most layouts unreachable.
const MAX_WALL_DENSITY: f64 = 0.9;

fn default_true() -> bool {
    true
}

fn default_item() -> String {
    "milk".into()
}

fn default_size() -> i32 {
    20
}

fn default_start() -> Location {
    Location::new(1, 1)
}

/// What an entity really is, as only the world knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityKind {
    Store {
        #[serde(default = "default_true")]
        sells_target: bool,
        #[serde(default)]
        price: Option<f64>,
    },
    /// Solid: the agent cannot move onto it.
    Obstacle,
    /// Walkable scenery.
    Landmark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEntity {
    pub name: String,
    pub location: Location,
    #[serde(flatten)]
    pub kind: EntityKind,
}

/// The store the agent knows about from the start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalStore {
    pub name: String,
    pub location: Location,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_size")]
    pub width: i32,
    #[serde(default = "default_size")]
    pub height: i32,
    #[serde(default = "default_start")]
    pub start: Location,
    #[serde(default)]
    pub heading: Heading,
    #[serde(default = "default_item")]
    pub item: String,
    pub goal: GoalStore,
    #[serde(default)]
    pub entities: Vec<ScenarioEntity>,
    /// Fixed interior walls.
    #[serde(default)]
    pub walls: Vec<Location>,
    /// Probability of each free interior cell becoming a wall.
    #[serde(default)]
    pub wall_density: f64,
}

/// Concrete wall placement for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub bounds: Bounds,
    /// Perimeter, fixed and random walls.
    pub walls: BTreeSet<Location>,
}

impl Scenario {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.width, self.height)
    }

    /// Look up a built-in scenario by id.
    pub fn by_id(id: &str) -> ScenarioResult<Scenario> {
        Self::catalog()
            .into_iter()
            .find(|s| s.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| ScenarioError::NotFound { id: id.to_string() })
    }

    /// Resolve `id_or_path` as a built-in id, or as a path to a TOML file.
    pub fn resolve(id_or_path: &str) -> ScenarioResult<Scenario> {
        let path = Path::new(id_or_path);
        if id_or_path.ends_with(".toml") || path.is_file() {
            return Self::load(path);
        }
        Self::by_id(id_or_path)
    }

    /// Load and validate a scenario file.
    pub fn load(path: &Path) -> ScenarioResult<Scenario> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario: Scenario = toml::from_str(&text).map_err(|e| ScenarioError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check geometry: everything inside the perimeter, one entity per cell,
    /// no fixed wall on a protected cell.
    pub fn validate(&self) -> ScenarioResult<()> {
        if self.width < 3 || self.height < 3 {
            return Err(ScenarioError::TooSmall {
                width: self.width,
                height: self.height,
            });
        }
        if !(0.0..=MAX_WALL_DENSITY).contains(&self.wall_density) {
            return Err(ScenarioError::InvalidDensity {
                density: self.wall_density,
                max: MAX_WALL_DENSITY,
            });
        }

        let bounds = self.bounds();
        let interior = |loc: Location| bounds.contains(loc) && !bounds.is_perimeter(loc);

        let mut placed: Vec<(&str, Location)> = vec![("start", self.start)];
        placed.push((self.goal.name.as_str(), self.goal.location));
        placed.extend(self.entities.iter().map(|e| (e.name.as_str(), e.location)));
        for (name, location) in &placed {
            if !interior(*location) {
                return Err(ScenarioError::InvalidPlacement {
                    name: name.to_string(),
                    location: *location,
                });
            }
        }
        // The start cell may coincide with a walkable entity, never with another one.
        for (i, (name, location)) in placed.iter().enumerate().skip(1) {
            if let Some((other, _)) = placed[i + 1..].iter().find(|(_, l)| l == location) {
                return Err(ScenarioError::Overlap {
                    name: name.to_string(),
                    other: other.to_string(),
                    location: *location,
                });
            }
        }
        if let Some(solid) = self
            .entities
            .iter()
            .find(|e| e.location == self.start && e.kind == EntityKind::Obstacle)
        {
            return Err(ScenarioError::Overlap {
                name: solid.name.clone(),
                other: "start".into(),
                location: self.start,
            });
        }
        let protected = self.protected_cells();
        if let Some(wall) = self.walls.iter().find(|w| protected.contains(w)) {
            return Err(ScenarioError::InvalidPlacement {
                name: "wall".into(),
                location: *wall,
            });
        }
        Ok(())
    }

    /// Cells that never receive a wall.
    pub fn protected_cells(&self) -> BTreeSet<Location> {
        let mut cells: BTreeSet<Location> = self.entities.iter().map(|e| e.location).collect();
        cells.insert(self.start);
        cells.insert(self.goal.location);
        cells
    }

    /// Place walls for one run. Random walls are drawn from `seed`; layouts
    /// that cut the start off from the goal are redrawn.
    pub fn layout(&self, seed: u64) -> ScenarioResult<Layout> {
        self.validate()?;
        let bounds = self.bounds();
        let mut base: BTreeSet<Location> =
            bounds.cells().filter(|l| bounds.is_perimeter(*l)).collect();
        base.extend(self.walls.iter().copied());

        if self.wall_density <= 0.0 {
            let layout = Layout {
                bounds,
                walls: base,
            };
            if !self.goal_reachable(&layout) {
                return Err(ScenarioError::Unreachable { attempts: 1 });
            }
            return Ok(layout);
        }

        let protected = self.protected_cells();
        let mut rng = StdRng::seed_from_u64(seed);
        for attempt in 1..=MAX_LAYOUT_ATTEMPTS {
            let mut walls = base.clone();
            for loc in bounds.cells() {
                if walls.contains(&loc) || protected.contains(&loc) {
                    continue;
                }
                if rng.gen_bool(self.wall_density) {
                    walls.insert(loc);
                }
            }
            let layout = Layout { bounds, walls };
            if self.goal_reachable(&layout) {
                tracing::debug!(scenario = %self.id, seed, attempt, walls = layout.walls.len(), "wall layout");
                return Ok(layout);
            }
        }
        Err(ScenarioError::Unreachable {
            attempts: MAX_LAYOUT_ATTEMPTS,
        })
    }

    fn goal_reachable(&self, layout: &Layout) -> bool {
        let solid: BTreeSet<Location> = self
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Obstacle)
            .map(|e| e.location)
            .collect();
        CellGraph::new(layout.bounds, |l| !layout.walls.contains(&l) && !solid.contains(&l))
            .distance(self.start, self.goal.location)
            .is_some()
    }

    /// The built-in scenarios.
    pub fn catalog() -> Vec<Scenario> {
        vec![
            classic(
                "golden-opportunity",
                "Golden Opportunity",
                "Close and cheap store near the start.",
                vec![store("rami_levy_express", (5, 5), 2.0)],
            ),
            classic(
                "honey-pot",
                "Honey Pot",
                "Close but expensive convenience store.",
                vec![store("am_pm_tlv", (3, 3), 8.0)],
            ),
            classic(
                "strategic-dilemma",
                "Strategic Dilemma",
                "Very cheap outlet, but a long way off the route.",
                vec![store("osher_ad_outlet", (1, 14), 1.0)],
            ),
            classic(
                "noise-storm",
                "Noise Storm",
                "Irrelevant landmarks along the diagonal.",
                vec![
                    landmark("old_oak_tree", (4, 4)),
                    landmark("bronze_statue", (6, 6)),
                    landmark("stray_signpost", (8, 8)),
                ],
            ),
            classic(
                "irrelevant-object",
                "Irrelevant Object",
                "A tree right next to the start.",
                vec![landmark("old_tree_jerusalem_forest", (3, 2))],
            ),
            classic(
                "butcher-shop",
                "Butcher Shop",
                "A store nearby that does not sell the item.",
                vec![ScenarioEntity {
                    name: "moshe_butcher_rehovot".into(),
                    location: Location::new(2, 4),
                    kind: EntityKind::Store {
                        sells_target: false,
                        price: None,
                    },
                }],
            ),
            classic(
                "sweet-spot",
                "Sweet Spot",
                "Slightly cheaper store very close by.",
                vec![store("mega_bulldog_tlv", (3, 3), 3.5)],
            ),
            Scenario {
                goal: GoalStore {
                    name: "victory".into(),
                    location: Location::new(10, 10),
                    price: 4.0,
                },
                ..classic(
                    "expensive-trap",
                    "Expensive Trap",
                    "An overpriced store sits between the agent and the goal.",
                    vec![store("am_pm_express", (6, 4), 12.0)],
                )
            },
        ]
    }
}

fn classic(id: &str, name: &str, description: &str, entities: Vec<ScenarioEntity>) -> Scenario {
    Scenario {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        width: default_size(),
        height: default_size(),
        start: default_start(),
        heading: Heading::East,
        item: default_item(),
        goal: GoalStore {
            name: "victory".into(),
            location: Location::new(18, 18),
            price: 4.0,
        },
        entities,
        walls: Vec::new(),
        wall_density: 0.0,
    }
}

fn store(name: &str, (x, y): (i32, i32), price: f64) -> ScenarioEntity {
    ScenarioEntity {
        name: name.into(),
        location: Location::new(x, y),
        kind: EntityKind::Store {
            sells_target: true,
            price: Some(price),
        },
    }
}

fn landmark(name: &str, (x, y): (i32, i32)) -> ScenarioEntity {
    ScenarioEntity {
        name: name.into(),
        location: Location::new(x, y),
        kind: EntityKind::Landmark,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_scenarios_are_valid_and_unique() {
        let catalog = Scenario::catalog();
        assert_eq!(catalog.len(), 8);
        let ids: BTreeSet<&str> = catalog.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
        for s in &catalog {
            s.validate().unwrap();
            let layout = s.layout(0).unwrap();
            assert_eq!(layout.walls.len(), 4 * 19);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(Scenario::by_id("Golden-Opportunity").unwrap().entities.len(), 1);
        assert!(matches!(Scenario::by_id("nope"), Err(ScenarioError::NotFound { .. })));
    }

    #[test]
    fn random_walls_are_seeded_and_spare_protected_cells() {
        let mut s = Scenario::by_id("noise-storm").unwrap();
        s.wall_density = 0.2;
        let a = s.layout(42).unwrap();
        let b = s.layout(42).unwrap();
        assert_eq!(a, b);
        assert!(a.walls.len() > 4 * 19);
        for cell in s.protected_cells() {
            assert!(!a.walls.contains(&cell));
        }
    }

    #[test]
    fn bad_geometry_is_rejected() {
        let mut s = Scenario::by_id("golden-opportunity").unwrap();
        s.entities[0].location = Location::new(0, 5);
        assert!(matches!(s.validate(), Err(ScenarioError::InvalidPlacement { .. })));

        let mut s = Scenario::by_id("golden-opportunity").unwrap();
        s.entities[0].location = s.goal.location;
        assert!(matches!(s.validate(), Err(ScenarioError::Overlap { .. })));

        let mut s = Scenario::by_id("golden-opportunity").unwrap();
        s.walls = (0..20).map(|y| Location::new(10, y)).collect();
        assert!(matches!(s.layout(0), Err(ScenarioError::Unreachable { .. })));
    }

    #[test]
    fn wall_density_out_of_range_is_rejected() {
        for density in [-0.1, 0.95, f64::NAN] {
            let mut s = Scenario::by_id("noise-storm").unwrap();
            s.wall_density = density;
            let err = s.validate().unwrap_err();
            assert!(
                matches!(err, ScenarioError::InvalidDensity { max, .. } if max == 0.9),
                "{err}"
            );
            let code = miette::Diagnostic::code(&err).unwrap().to_string();
            assert_eq!(code, "replan::scenario::invalid_density");
        }

        let mut s = Scenario::by_id("noise-storm").unwrap();
        s.wall_density = 0.9;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn parses_toml() {
        let text = r#"
            id = "corner-shop"
            width = 12
            height = 12

            [goal]
            name = "victory"
            location = { x = 10, y = 10 }
            price = 4.0

            [[entities]]
            name = "rami_levy"
            location = { x = 4, y = 2 }
            kind = "store"
            price = 2.0

            [[entities]]
            name = "roadblock"
            location = { x = 5, y = 5 }
            kind = "obstacle"
        "#;
        let s: Scenario = toml::from_str(text).unwrap();
        s.validate().unwrap();
        assert_eq!(s.start, Location::new(1, 1));
        assert_eq!(s.item, "milk");
        assert_eq!(
            s.entities[0].kind,
            EntityKind::Store {
                sells_target: true,
                price: Some(2.0)
            }
        );
        assert_eq!(s.entities[1].kind, EntityKind::Obstacle);
    }
}
