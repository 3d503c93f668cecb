//! Agent bookkeeping for one run.

use serde::Serialize;

use crate::grid::{Heading, Location};

/// A completed purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Purchase {
    pub store: String,
    pub price: f64,
}

/// Pose, counters and goal status.
///
/// The terminal flag is private and only [`AgentState::mark_goal_reached`]
/// sets it, so "terminal" and "goal reached" can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    location: Location,
    heading: Heading,
    steps: u32,
    replans: u32,
    goal: Option<Purchase>,
    terminal: bool,
}

impl AgentState {
    pub fn new(location: Location, heading: Heading) -> Self {
        Self {
            location,
            heading,
            steps: 0,
            replans: 0,
            goal: None,
            terminal: false,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn replans(&self) -> u32 {
        self.replans
    }

    pub fn goal(&self) -> Option<&Purchase> {
        self.goal.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub(crate) fn set_pose(&mut self, location: Location, heading: Heading) {
        self.location = location;
        self.heading = heading;
    }

    pub(crate) fn count_step(&mut self) {
        self.steps += 1;
    }

    pub(crate) fn count_replan(&mut self) {
        self.replans += 1;
    }

    /// Record the purchase and end the run. The first purchase wins.
    pub(crate) fn mark_goal_reached(&mut self, purchase: Purchase) {
        if self.terminal {
            return;
        }
        tracing::info!(store = %purchase.store, price = purchase.price, steps = self.steps, "goal reached");
        self.goal = Some(purchase);
        self.terminal = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_only_through_goal() {
        let mut s = AgentState::new(Location::new(1, 1), Heading::East);
        s.count_step();
        s.count_replan();
        s.set_pose(Location::new(2, 1), Heading::South);
        assert!(!s.is_terminal());
        assert!(s.goal().is_none());

        s.mark_goal_reached(Purchase {
            store: "victory".into(),
            price: 4.0,
        });
        assert!(s.is_terminal());
        s.mark_goal_reached(Purchase {
            store: "other".into(),
            price: 1.0,
        });
        assert_eq!(s.goal().map(|p| p.store.as_str()), Some("victory"));
    }
}
