//! Plans: ordered sequences of drive/buy actions toward the goal.
//!
//! A [`Plan`] remembers the fact-store revision it was computed against (its
//! *basis*). When facts change after that, the plan is re-checked against the
//! live store: if any cell it still intends to visit is now blocked, it is
//! stale and the path-invalidated rule applies.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::facts::FactStore;
use crate::grid::Location;

// ---------------------------------------------------------------------------
// Plan actions
// ---------------------------------------------------------------------------

/// A single high-level step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PlanAction {
    /// Move to an adjacent cell.
    Drive { from: Location, to: Location },
    /// Buy `item` at `store`, which stands on `location`.
    Buy {
        item: String,
        store: String,
        location: Location,
        /// Believed price at planning time.
        price: Option<f64>,
    },
}

impl PlanAction {
    /// The cell this action ends on.
    pub fn destination(&self) -> Location {
        match self {
            Self::Drive { to, .. } => *to,
            Self::Buy { location, .. } => *location,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Self::Buy { .. })
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drive { from, to } => write!(f, "drive {from} -> {to}"),
            Self::Buy {
                item,
                store,
                location,
                price,
            } => {
                write!(f, "buy {item} at {store} {location}")?;
                if let Some(p) = price {
                    write!(f, " for {p:.2}")?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// The remaining actions of the current plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    actions: VecDeque<PlanAction>,
    basis: u64,
}

impl Plan {
    pub fn new(actions: impl IntoIterator<Item = PlanAction>, basis: u64) -> Self {
        Self {
            actions: actions.into_iter().collect(),
            basis,
        }
    }

    /// The next action to execute.
    pub fn next(&self) -> Option<&PlanAction> {
        self.actions.front()
    }

    /// Drop the next action (executed or abandoned).
    pub fn advance(&mut self) -> Option<PlanAction> {
        self.actions.pop_front()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &PlanAction> {
        self.actions.iter()
    }

    /// Fact-store revision the plan is known to be consistent with.
    pub fn basis(&self) -> u64 {
        self.basis
    }

    /// Accept the plan as-is against a newer revision.
    pub fn rebase(&mut self, revision: u64) {
        self.basis = revision;
    }

    /// The purchase this plan ends in: `(store, believed price)`.
    pub fn purchase(&self) -> Option<(&str, Option<f64>)> {
        self.actions.iter().rev().find_map(|a| match a {
            PlanAction::Buy { store, price, .. } => Some((store.as_str(), *price)),
            PlanAction::Drive { .. } => None,
        })
    }

    pub fn drive_count(&self) -> usize {
        self.actions.iter().filter(|a| !a.is_buy()).count()
    }

    /// Whether facts changed since the basis in a way that breaks the plan:
    /// a cell still ahead is blocked, or the purchase store is gone.
    pub fn is_stale(&self, facts: &FactStore) -> bool {
        if facts.revision() == self.basis {
            return false;
        }
        self.actions.iter().any(|action| match action {
            PlanAction::Drive { to, .. } => facts.is_blocked(*to),
            PlanAction::Buy { store, location, .. } => {
                facts.is_blocked(*location)
                    || facts
                        .entity(store)
                        .and_then(|e| e.classification.as_ref())
                        .is_some_and(|c| !c.is_selling_store())
            }
        })
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.purchase() {
            Some((store, Some(price))) => write!(
                f,
                "{} drives, then buy at {store} for {price:.2}",
                self.drive_count()
            ),
            Some((store, None)) => write!(f, "{} drives, then buy at {store}", self.drive_count()),
            None => write!(f, "{} actions, no purchase", self.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Bounds;

    fn plan_to(store: &str, path: &[(i32, i32)], basis: u64) -> Plan {
        let mut actions: Vec<PlanAction> = path
            .windows(2)
            .map(|w| PlanAction::Drive {
                from: w[0].into(),
                to: w[1].into(),
            })
            .collect();
        let last = path[path.len() - 1];
        actions.push(PlanAction::Buy {
            item: "milk".into(),
            store: store.into(),
            location: last.into(),
            price: Some(4.0),
        });
        Plan::new(actions, basis)
    }

    #[test]
    fn advancing_consumes_actions_in_order() {
        let mut plan = plan_to("victory", &[(1, 1), (2, 1), (3, 1)], 0);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.drive_count(), 2);
        assert_eq!(plan.purchase(), Some(("victory", Some(4.0))));
        assert_eq!(plan.next().map(|a| a.destination()), Some(Location::new(2, 1)));

        plan.advance();
        plan.advance();
        assert!(plan.next().is_some_and(|a| a.is_buy()));
        plan.advance();
        assert!(plan.is_empty());
        assert_eq!(plan.purchase(), None);
    }

    #[test]
    fn plan_goes_stale_only_when_its_cells_are_blocked() {
        let mut facts = FactStore::new(Bounds::new(6, 6), Location::new(1, 1), "milk");
        facts.mark_store("victory", Location::new(3, 1), true, Some(4.0));
        let plan = plan_to("victory", &[(1, 1), (2, 1), (3, 1)], facts.revision());
        assert!(!plan.is_stale(&facts));

        facts.mark_obstacle(Location::new(4, 4));
        assert!(!plan.is_stale(&facts));

        facts.mark_obstacle(Location::new(2, 1));
        assert!(plan.is_stale(&facts));
    }

    #[test]
    fn blocking_the_store_cell_invalidates_the_purchase() {
        let mut facts = FactStore::new(Bounds::new(6, 6), Location::new(1, 1), "milk");
        facts.mark_store("victory", Location::new(2, 1), true, Some(4.0));
        let mut plan = plan_to("victory", &[(1, 1), (2, 1)], facts.revision());
        facts.mark_obstacle(Location::new(2, 1));
        assert!(plan.is_stale(&facts));

        plan.rebase(facts.revision());
        assert!(!plan.is_stale(&facts));
    }
}
