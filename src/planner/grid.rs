//! Built-in grid planner backed by petgraph.
//!
//! The planner is price-blind: it walks to the nearest store that sells the
//! item (unit cost per drive, ties broken by store name). Which stores it may
//! use is decided entirely by the facts, so policies steer it by marking
//! stores open or blocked.

use std::collections::BTreeMap;

use petgraph::graph::{NodeIndex, UnGraph};

use crate::facts::{ProblemSnapshot, StoreFact};
use crate::grid::{Bounds, Location};
use crate::plan::PlanAction;

use super::{Planner, PlannerError, PlannerResult};

// ---------------------------------------------------------------------------
// Cell graph
// ---------------------------------------------------------------------------

/// Undirected 4-connected graph over the passable cells of a grid.
pub struct CellGraph {
    graph: UnGraph<Location, ()>,
    nodes: BTreeMap<Location, NodeIndex>,
}

impl CellGraph {
    /// Build the graph over every in-bounds cell for which `passable` holds.
    pub fn new(bounds: Bounds, passable: impl Fn(Location) -> bool) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut nodes = BTreeMap::new();
        for loc in bounds.cells().filter(|l| passable(*l)) {
            nodes.insert(loc, graph.add_node(loc));
        }
        for (&loc, &idx) in &nodes {
            for next in [Location::new(loc.x + 1, loc.y), Location::new(loc.x, loc.y + 1)] {
                if let Some(&other) = nodes.get(&next) {
                    graph.add_edge(idx, other, ());
                }
            }
        }
        Self { graph, nodes }
    }

    pub fn contains(&self, loc: Location) -> bool {
        self.nodes.contains_key(&loc)
    }

    /// Step counts from `from` to every reachable cell.
    pub fn distances_from(&self, from: Location) -> BTreeMap<Location, u32> {
        let Some(&start) = self.nodes.get(&from) else {
            return BTreeMap::new();
        };
        petgraph::algo::dijkstra(&self.graph, start, None, |_| 1u32)
            .into_iter()
            .map(|(n, d)| (self.graph[n], d))
            .collect()
    }

    /// Shortest step count between two cells.
    pub fn distance(&self, from: Location, to: Location) -> Option<u32> {
        self.shortest_path(from, to).map(|(d, _)| d)
    }

    /// Shortest path (inclusive of both ends) using A* with a Manhattan
    /// estimate.
    pub fn shortest_path(&self, from: Location, to: Location) -> Option<(u32, Vec<Location>)> {
        let start = *self.nodes.get(&from)?;
        let goal = *self.nodes.get(&to)?;
        let (cost, path) = petgraph::algo::astar(
            &self.graph,
            start,
            |n| n == goal,
            |_| 1u32,
            |n| self.graph[n].manhattan(to),
        )?;
        Some((cost, path.into_iter().map(|n| self.graph[n]).collect()))
    }
}

// ---------------------------------------------------------------------------
// GridPlanner
// ---------------------------------------------------------------------------

/// Nearest-selling-store planner.
#[derive(Debug, Default, Clone, Copy)]
pub struct GridPlanner;

impl GridPlanner {
    pub fn new() -> Self {
        Self
    }

    fn nearest<'a>(
        snapshot: &'a ProblemSnapshot,
        distances: &BTreeMap<Location, u32>,
    ) -> Option<&'a StoreFact> {
        snapshot
            .selling_stores()
            .filter_map(|s| distances.get(&s.location).map(|d| (*d, s)))
            .min_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.name.cmp(&b.name)))
            .map(|(_, s)| s)
    }
}

impl Planner for GridPlanner {
    fn name(&self) -> &str {
        "grid"
    }

    fn plan(&mut self, snapshot: &ProblemSnapshot) -> PlannerResult<Vec<PlanAction>> {
        if snapshot.selling_stores().next().is_none() {
            return Err(PlannerError::NoSellingStore {
                item: snapshot.item.clone(),
            });
        }

        let agent = snapshot.agent;
        let graph = CellGraph::new(snapshot.bounds, |loc| loc == agent || snapshot.is_clear(loc));
        let distances = graph.distances_from(agent);
        let store = Self::nearest(snapshot, &distances).ok_or(PlannerError::NoPath { from: agent })?;
        let (_, path) = graph
            .shortest_path(agent, store.location)
            .ok_or(PlannerError::NoPath { from: agent })?;

        let mut actions: Vec<PlanAction> = path
            .windows(2)
            .map(|w| PlanAction::Drive {
                from: w[0],
                to: w[1],
            })
            .collect();
        actions.push(PlanAction::Buy {
            item: snapshot.item.clone(),
            store: store.name.clone(),
            location: store.location,
            price: store.price,
        });
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::FactStore;
    use crate::planner::validate;

    fn facts() -> FactStore {
        let mut facts = FactStore::new(Bounds::new(10, 10), Location::new(1, 1), "milk");
        for loc in Bounds::new(10, 10).cells() {
            if Bounds::new(10, 10).is_perimeter(loc) {
                facts.mark_obstacle(loc);
            }
        }
        facts.mark_store("victory", Location::new(8, 8), true, Some(4.0));
        facts
    }

    #[test]
    fn plans_a_shortest_valid_route() {
        let snap = facts().snapshot_for_planner();
        let actions = GridPlanner::new().plan(&snap).unwrap();
        validate(&actions, &snap).unwrap();
        assert_eq!(actions.len(), 14 + 1);
        assert!(matches!(actions.last(), Some(PlanAction::Buy { store, .. }) if store == "victory"));
    }

    #[test]
    fn nearest_selling_store_wins_regardless_of_price() {
        let mut facts = facts();
        facts.mark_store("am_pm", Location::new(3, 1), true, Some(12.0));
        facts.mark_store("nike", Location::new(2, 1), false, None);
        let actions = GridPlanner::new().plan(&facts.snapshot_for_planner()).unwrap();
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions.last(), Some(PlanAction::Buy { store, price, .. })
            if store == "am_pm" && *price == Some(12.0)));
    }

    #[test]
    fn blocked_store_is_ignored() {
        let mut facts = facts();
        facts.mark_store("am_pm", Location::new(3, 1), true, Some(12.0));
        facts.mark_obstacle(Location::new(3, 1));
        let actions = GridPlanner::new().plan(&facts.snapshot_for_planner()).unwrap();
        assert!(matches!(actions.last(), Some(PlanAction::Buy { store, .. }) if store == "victory"));
    }

    #[test]
    fn starts_from_a_blocked_cell() {
        let mut facts = facts();
        facts.mark_obstacle(Location::new(1, 1));
        let snap = facts.snapshot_for_planner();
        let actions = GridPlanner::new().plan(&snap).unwrap();
        validate(&actions, &snap).unwrap();
    }

    #[test]
    fn walled_off_goal_has_no_path() {
        let mut facts = facts();
        for y in 0..10 {
            facts.mark_obstacle(Location::new(5, y));
        }
        let err = GridPlanner::new().plan(&facts.snapshot_for_planner()).unwrap_err();
        assert!(matches!(err, PlannerError::NoPath { .. }));
    }

    #[test]
    fn no_selling_store() {
        let mut facts = FactStore::new(Bounds::new(4, 4), Location::new(1, 1), "milk");
        facts.mark_store("nike", Location::new(2, 2), false, None);
        let err = GridPlanner::new().plan(&facts.snapshot_for_planner()).unwrap_err();
        assert!(matches!(err, PlannerError::NoSellingStore { .. }));
    }

    #[test]
    fn agent_on_store_cell_buys_immediately() {
        let mut facts = FactStore::new(Bounds::new(4, 4), Location::new(2, 2), "milk");
        facts.mark_store("kiosk", Location::new(2, 2), true, Some(3.0));
        let actions = GridPlanner::new().plan(&facts.snapshot_for_planner()).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions[0].is_buy());
    }
}
