//! The fact store: the agent's belief about the world, and the only input the
//! planner ever sees.
//!
//! Every in-bounds cell has exactly one [`CellStatus`]. Blocked and clear are
//! kept in a single map, so marking a cell blocked retracts "clear" for it and
//! vice versa; no caller can forget to reconcile the two.
//!
//! Entities are recorded the first time they are observed and never removed.
//! Their classification is write-once: once resolved, a different
//! classification for the same name is rejected.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::{Bounds, Location};
use crate::planner::grid::CellGraph;

// ---------------------------------------------------------------------------
// Entity types
// ---------------------------------------------------------------------------

/// What kind of thing a discovered entity turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    Store,
    Obstacle,
    Irrelevant,
}

impl EntityCategory {
    /// Parse a category label. Accepts a few common synonyms an oracle may use.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "store" | "shop" | "supermarket" | "retail" => Some(Self::Store),
            "obstacle" | "barrier" | "wall" => Some(Self::Obstacle),
            "irrelevant" | "other" | "none" | "landmark" => Some(Self::Irrelevant),
            _ => None,
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Store => "store",
            Self::Obstacle => "obstacle",
            Self::Irrelevant => "irrelevant",
        };
        f.write_str(s)
    }
}

/// The resolved classification of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: EntityCategory,
    /// Whether the entity sells the target item. Only meaningful for stores.
    pub sells_target: bool,
    /// Price of the target item, when known.
    pub price: Option<f64>,
    /// Free-form description (oracle's words or lookup text).
    pub description: String,
}

impl Classification {
    pub fn store(sells_target: bool, price: Option<f64>, description: impl Into<String>) -> Self {
        Self {
            category: EntityCategory::Store,
            sells_target,
            price,
            description: description.into(),
        }
    }

    pub fn obstacle(description: impl Into<String>) -> Self {
        Self {
            category: EntityCategory::Obstacle,
            sells_target: false,
            price: None,
            description: description.into(),
        }
    }

    /// The degraded classification used whenever the oracle cannot be trusted.
    pub fn irrelevant(description: impl Into<String>) -> Self {
        Self {
            category: EntityCategory::Irrelevant,
            sells_target: false,
            price: None,
            description: description.into(),
        }
    }

    pub fn is_store(&self) -> bool {
        self.category == EntityCategory::Store
    }

    /// A store that sells the target item.
    pub fn is_selling_store(&self) -> bool {
        self.is_store() && self.sells_target
    }

    /// Two classifications agree on everything that reaches the planner.
    fn same_facts(&self, other: &Classification) -> bool {
        self.category == other.category
            && self.sells_target == other.sells_target
            && self.price == other.price
    }
}

/// A discovered (or seeded) object in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub location: Location,
    /// `None` while the entity has only been sighted, never classified.
    pub classification: Option<Classification>,
}

/// Traversability of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Clear,
    Blocked,
}

// ---------------------------------------------------------------------------
// Planner snapshot
// ---------------------------------------------------------------------------

/// Store facts as the planner sees them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreFact {
    pub name: String,
    /// Identifier used in planning encodings.
    pub ident: String,
    pub location: Location,
    pub sells_target: bool,
    pub price: Option<f64>,
}

/// Deterministic, self-contained copy of every fact the planner needs.
///
/// Cells are ordered by location and stores by name, so two stores holding
/// the same facts always produce identical snapshots regardless of the order
/// in which the facts were written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemSnapshot {
    /// Fact-store revision this snapshot was taken at.
    pub revision: u64,
    pub bounds: Bounds,
    pub agent: Location,
    pub item: String,
    pub cells: Vec<(Location, CellStatus)>,
    /// Stores standing on clear cells. Stores on blocked cells are closed to
    /// the planner.
    pub stores: Vec<StoreFact>,
    /// Planning identifier of the item.
    pub item_ident: String,
    /// Store planning identifier → store name. Identifiers are unique.
    pub idents: BTreeMap<String, String>,
}

impl ProblemSnapshot {
    pub fn status(&self, loc: Location) -> Option<CellStatus> {
        self.cells
            .binary_search_by(|(l, _)| l.cmp(&loc))
            .ok()
            .map(|i| self.cells[i].1)
    }

    pub fn is_clear(&self, loc: Location) -> bool {
        self.status(loc) == Some(CellStatus::Clear)
    }

    /// Static 4-connectivity: every ordered pair of adjacent in-bounds cells.
    pub fn connections(&self) -> impl Iterator<Item = (Location, Location)> + '_ {
        self.cells.iter().flat_map(move |(from, _)| {
            from.neighbours()
                .into_iter()
                .filter(move |to| self.bounds.contains(*to))
                .map(move |to| (*from, to))
        })
    }

    /// Stores that sell the target item.
    pub fn selling_stores(&self) -> impl Iterator<Item = &StoreFact> {
        self.stores.iter().filter(|s| s.sells_target)
    }

    /// Look a store up by its planning identifier (case-insensitive).
    pub fn store_by_ident(&self, ident: &str) -> Option<&StoreFact> {
        let name = self.idents.get(&ident.to_ascii_lowercase())?;
        self.stores.iter().find(|s| &s.name == name)
    }
}

/// Planning identifiers for stores and items.
///
/// Store identifiers start with `s_` and the item identifier with `i_`, so
/// neither can clash with `agent` or a `loc_<x>_<y>` cell. Stores whose
/// names sanitise alike get a numeric suffix in name order.
#[derive(Debug, Default)]
struct IdentAllocator {
    taken: BTreeMap<String, String>,
}

impl IdentAllocator {
    fn store(&mut self, name: &str) -> String {
        let base = format!("s_{}", planning_ident(name));
        let mut ident = base.clone();
        let mut n = 2;
        while self.taken.contains_key(&ident) {
            ident = format!("{base}_{n}");
            n += 1;
        }
        self.taken.insert(ident.clone(), name.to_string());
        ident
    }
}

/// Map an arbitrary entity name to a planning identifier: lowercase ASCII
/// letters, digits, `_` and `-`, starting with a letter.
pub fn planning_ident(name: &str) -> String {
    let mut ident: String = name
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !ident.starts_with(|c: char| c.is_ascii_alphabetic()) {
        ident.insert_str(0, "e_");
    }
    ident
}

// ---------------------------------------------------------------------------
// FactStore
// ---------------------------------------------------------------------------

/// The agent's belief state.
#[derive(Debug, Clone)]
pub struct FactStore {
    bounds: Bounds,
    agent: Location,
    item: String,
    cells: BTreeMap<Location, CellStatus>,
    entities: BTreeMap<String, Entity>,
    revision: u64,
}

impl FactStore {
    /// Create a store where every in-bounds cell is clear.
    pub fn new(bounds: Bounds, agent: Location, item: impl Into<String>) -> Self {
        let cells = bounds.cells().map(|loc| (loc, CellStatus::Clear)).collect();
        Self {
            bounds,
            agent,
            item: item.into(),
            cells,
            entities: BTreeMap::new(),
            revision: 0,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn item(&self) -> &str {
        &self.item
    }

    pub fn agent(&self) -> Location {
        self.agent
    }

    /// Update the agent's believed location. Does not bump the revision:
    /// moving never invalidates a plan.
    pub fn set_agent(&mut self, loc: Location) {
        self.agent = loc;
    }

    /// Revision counter, bumped on every effective fact change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn status(&self, loc: Location) -> Option<CellStatus> {
        self.cells.get(&loc).copied()
    }

    pub fn is_blocked(&self, loc: Location) -> bool {
        self.status(loc) == Some(CellStatus::Blocked)
    }

    pub fn is_clear(&self, loc: Location) -> bool {
        self.status(loc) == Some(CellStatus::Clear)
    }

    pub fn blocked_cells(&self) -> impl Iterator<Item = Location> + '_ {
        self.cells
            .iter()
            .filter(|(_, s)| **s == CellStatus::Blocked)
            .map(|(l, _)| *l)
    }

    /// Mark a cell blocked, retracting any clear fact for it.
    ///
    /// Returns `true` if the status actually changed. Out-of-bounds cells are
    /// ignored.
    pub fn mark_obstacle(&mut self, loc: Location) -> bool {
        self.set_status(loc, CellStatus::Blocked)
    }

    /// Record a store and mark its cell clear, retracting any blocked fact.
    ///
    /// Write-once per name: returns `false` (and changes nothing) if the
    /// entity is already resolved with different facts or a different
    /// location.
    pub fn mark_store(
        &mut self,
        name: &str,
        loc: Location,
        sells_target: bool,
        price: Option<f64>,
    ) -> bool {
        let description = self
            .entities
            .get(name)
            .and_then(|e| e.classification.as_ref())
            .map(|c| c.description.clone())
            .unwrap_or_default();
        self.record_classification(
            name,
            loc,
            Classification::store(sells_target, price, description),
        )
    }

    /// Record an entity that was seen but will not be classified.
    ///
    /// Returns `false` if the name is already known.
    pub fn note_sighting(&mut self, name: &str, loc: Location) -> bool {
        if self.entities.contains_key(name) {
            return false;
        }
        self.entities.insert(
            name.to_string(),
            Entity {
                name: name.to_string(),
                location: loc,
                classification: None,
            },
        );
        true
    }

    /// Store a classification and write the cell fact it implies: stores
    /// clear their cell, obstacles block it, and irrelevant entities leave
    /// it untouched.
    ///
    /// Returns `false` when the write-once rule rejects the update.
    pub fn record_classification(
        &mut self,
        name: &str,
        loc: Location,
        classification: Classification,
    ) -> bool {
        if let Some(existing) = self.entities.get(name) {
            if existing.location != loc {
                tracing::debug!(name, at = %existing.location, requested = %loc, "entity location is fixed, update rejected");
                return false;
            }
            if let Some(resolved) = &existing.classification {
                if !resolved.same_facts(&classification) {
                    tracing::debug!(name, "classification is write-once, update rejected");
                    return false;
                }
            }
        }

        let category = classification.category;
        let entry = self.entities.entry(name.to_string()).or_insert_with(|| Entity {
            name: name.to_string(),
            location: loc,
            classification: None,
        });
        if entry.classification.is_none() {
            entry.classification = Some(classification);
            self.revision += 1;
        }

        match category {
            EntityCategory::Store => {
                self.set_status(loc, CellStatus::Clear);
            }
            EntityCategory::Obstacle => {
                self.set_status(loc, CellStatus::Blocked);
            }
            EntityCategory::Irrelevant => {}
        }
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// The classified store standing on `loc`, if any.
    pub fn store_at(&self, loc: Location) -> Option<&Entity> {
        self.entities.values().find(|e| {
            e.location == loc && e.classification.as_ref().is_some_and(|c| c.is_store())
        })
    }

    /// Shortest known walking distance over clear cells, `None` if
    /// unreachable. The origin may itself be blocked (the agent stands on it).
    pub fn walking_distance(&self, from: Location, to: Location) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        let graph = CellGraph::new(self.bounds, |loc| {
            loc == from || loc == to || self.is_clear(loc)
        });
        graph.distance(from, to)
    }

    /// Deterministic snapshot of every planning fact.
    pub fn snapshot_for_planner(&self) -> ProblemSnapshot {
        let cells = self.cells.iter().map(|(l, s)| (*l, *s)).collect();
        let mut idents = IdentAllocator::default();
        let stores = self
            .entities
            .values()
            .filter_map(|e| {
                let c = e.classification.as_ref()?;
                if !c.is_store() || !self.is_clear(e.location) {
                    return None;
                }
                Some(StoreFact {
                    name: e.name.clone(),
                    ident: idents.store(&e.name),
                    location: e.location,
                    sells_target: c.sells_target,
                    price: c.price,
                })
            })
            .collect();
        ProblemSnapshot {
            revision: self.revision,
            bounds: self.bounds,
            agent: self.agent,
            item: self.item.clone(),
            cells,
            stores,
            item_ident: format!("i_{}", planning_ident(&self.item)),
            idents: idents.taken,
        }
    }

    fn set_status(&mut self, loc: Location, status: CellStatus) -> bool {
        match self.cells.get_mut(&loc) {
            Some(current) if *current != status => {
                *current = status;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }
}
