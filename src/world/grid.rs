//! Simulated grid world.
//!
//! Walls and solid obstacles stop forward movement; stores and landmarks are
//! walkable. Sensing is a square window of `radius` cells around the agent.
//! Purchases happen at the true price, which the agent never sees in advance.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ScenarioResult;
use crate::grid::{Bounds, Heading, Location};
use crate::scenario::{EntityKind, Layout, Scenario};

use super::{Primitive, Sighting, StepOutcome, World};

#[derive(Debug, Clone)]
struct Placed {
    name: String,
    kind: EntityKind,
}

/// The ground-truth world for one run.
#[derive(Debug, Clone)]
pub struct GridWorld {
    bounds: Bounds,
    walls: BTreeSet<Location>,
    entities: BTreeMap<Location, Placed>,
    agent: Location,
    heading: Heading,
}

impl GridWorld {
    /// Build the world for `scenario` with walls drawn from `seed`.
    pub fn from_scenario(scenario: &Scenario, seed: u64) -> ScenarioResult<Self> {
        let layout = scenario.layout(seed)?;
        Ok(Self::with_layout(scenario, layout))
    }

    /// Build the world for `scenario` on a precomputed layout.
    pub fn with_layout(scenario: &Scenario, layout: Layout) -> Self {
        let mut entities = BTreeMap::new();
        entities.insert(
            scenario.goal.location,
            Placed {
                name: scenario.goal.name.clone(),
                kind: EntityKind::Store {
                    sells_target: true,
                    price: Some(scenario.goal.price),
                },
            },
        );
        for e in &scenario.entities {
            entities.insert(
                e.location,
                Placed {
                    name: e.name.clone(),
                    kind: e.kind.clone(),
                },
            );
        }
        Self {
            bounds: layout.bounds,
            walls: layout.walls,
            entities,
            agent: scenario.start,
            heading: scenario.heading,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn is_wall(&self, loc: Location) -> bool {
        self.walls.contains(&loc)
    }

    /// Whether the agent can stand on `loc`.
    pub fn is_passable(&self, loc: Location) -> bool {
        self.bounds.contains(loc)
            && !self.walls.contains(&loc)
            && !matches!(
                self.entities.get(&loc),
                Some(Placed {
                    kind: EntityKind::Obstacle,
                    ..
                })
            )
    }
}

impl World for GridWorld {
    fn agent_position(&self) -> Location {
        self.agent
    }

    fn agent_heading(&self) -> Heading {
        self.heading
    }

    fn observable_entities(&self, radius: u32) -> Vec<Sighting> {
        let mut seen: Vec<Sighting> = self
            .entities
            .iter()
            .filter(|(loc, _)| self.agent.chebyshev(**loc) <= radius)
            .map(|(loc, e)| Sighting {
                name: e.name.clone(),
                location: *loc,
            })
            .collect();
        seen.sort_by(|a, b| a.name.cmp(&b.name));
        seen
    }

    fn step(&mut self, primitive: Primitive) -> StepOutcome {
        match primitive {
            Primitive::TurnLeft => {
                self.heading = self.heading.left();
                StepOutcome::Turned {
                    heading: self.heading,
                }
            }
            Primitive::TurnRight => {
                self.heading = self.heading.right();
                StepOutcome::Turned {
                    heading: self.heading,
                }
            }
            Primitive::Forward => {
                let ahead = self.agent.step(self.heading);
                if self.is_passable(ahead) {
                    self.agent = ahead;
                    StepOutcome::Moved { to: ahead }
                } else {
                    StepOutcome::Blocked { at: ahead }
                }
            }
            Primitive::Interact => match self.entities.get(&self.agent) {
                Some(Placed {
                    name,
                    kind:
                        EntityKind::Store {
                            sells_target: true,
                            price: Some(price),
                        },
                }) => StepOutcome::Purchased {
                    store: name.clone(),
                    price: *price,
                },
                _ => StepOutcome::NoSale,
            },
        }
    }
}
