//! The environment the agent acts in.
//!
//! The harness only sees the world through [`World`]: where the agent is,
//! which way it faces, what is within sensor range, and the outcome of one
//! primitive at a time. [`GridWorld`] is the built-in simulation.

pub mod grid;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::{Heading, Location};

pub use grid::GridWorld;

/// Low-level world action. Each costs one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    TurnLeft,
    TurnRight,
    Forward,
    Interact,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TurnLeft => "turn_left",
            Self::TurnRight => "turn_right",
            Self::Forward => "forward",
            Self::Interact => "interact",
        })
    }
}

/// A named entity inside the sensor window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sighting {
    pub name: String,
    pub location: Location,
}

/// What happened when a primitive was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Turned { heading: Heading },
    Moved { to: Location },
    /// The cell ahead is impassable; the agent did not move.
    Blocked { at: Location },
    Purchased { store: String, price: f64 },
    /// Nothing to buy here.
    NoSale,
}

/// Interface to the environment.
pub trait World {
    fn agent_position(&self) -> Location;

    fn agent_heading(&self) -> Heading;

    /// Entities within `radius`, sorted by name.
    fn observable_entities(&self, radius: u32) -> Vec<Sighting>;

    fn step(&mut self, primitive: Primitive) -> StepOutcome;
}
