//! Translate plan actions into world primitives.
//!
//! A drive becomes zero to two turns plus one `Forward`; a purchase becomes a
//! single `Interact`. The translator checks every precondition against the
//! live agent pose and the fact store first, so a stale action fails here
//! instead of wandering the agent somewhere unintended.

use miette::Diagnostic;
use thiserror::Error;

use crate::facts::FactStore;
use crate::grid::{Heading, Location};
use crate::plan::PlanAction;
use crate::world::Primitive;

/// Why a plan action could not be carried out.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum TranslationFailure {
    #[error("drive starts at {expected} but the agent is at {actual}")]
    #[diagnostic(code(replan::translate::wrong_origin))]
    WrongOrigin { expected: Location, actual: Location },

    #[error("{from} and {to} are not adjacent")]
    #[diagnostic(code(replan::translate::not_adjacent))]
    NotAdjacent { from: Location, to: Location },

    #[error("target {target} is blocked")]
    #[diagnostic(
        code(replan::translate::target_blocked),
        help("The plan predates a fact that closed this cell.")
    )]
    TargetBlocked { target: Location },

    #[error("cannot enter store cell {cell}: the current target is elsewhere")]
    #[diagnostic(code(replan::translate::store_entry))]
    StoreEntry { cell: Location },

    #[error("agent at {agent} is not at {store} ({store_location})")]
    #[diagnostic(code(replan::translate::not_at_store))]
    NotAtStore {
        store: String,
        store_location: Location,
        agent: Location,
    },

    #[error("the world refused the move into {target}")]
    #[diagnostic(code(replan::translate::world_refused))]
    WorldRefused { target: Location },

    #[error("{store} did not sell the item")]
    #[diagnostic(code(replan::translate::no_sale))]
    NoSale { store: String },

    #[error("action ended at {actual}, expected {expected}")]
    #[diagnostic(code(replan::translate::diverged))]
    Diverged { expected: Location, actual: Location },
}

/// Primitives for one plan action and the cell they lead to.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub primitives: Vec<Primitive>,
    pub target: Location,
}

/// Stateful translator: remembers the cell the action in flight leads to.
#[derive(Debug, Default, Clone)]
pub struct ActionTranslator {
    current_target: Option<Location>,
}

impl ActionTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destination of the action most recently translated.
    pub fn current_target(&self) -> Option<Location> {
        self.current_target
    }

    /// Whether the agent may step onto `cell`. Store cells are only entered
    /// as the destination of the action in flight.
    pub fn permits_entry(&self, cell: Location, facts: &FactStore) -> bool {
        facts.store_at(cell).is_none() || self.current_target == Some(cell)
    }

    pub fn translate(
        &mut self,
        action: &PlanAction,
        location: Location,
        heading: Heading,
        facts: &FactStore,
    ) -> Result<Translation, TranslationFailure> {
        self.current_target = None;
        match action {
            PlanAction::Drive { from, to } => {
                if *from != location {
                    return Err(TranslationFailure::WrongOrigin {
                        expected: *from,
                        actual: location,
                    });
                }
                let Some(required) = Heading::between(location, *to) else {
                    return Err(TranslationFailure::NotAdjacent {
                        from: location,
                        to: *to,
                    });
                };
                if facts.is_blocked(*to) {
                    return Err(TranslationFailure::TargetBlocked { target: *to });
                }
                self.current_target = Some(*to);

                let mut primitives = turns(heading, required);
                primitives.push(Primitive::Forward);
                Ok(Translation {
                    primitives,
                    target: *to,
                })
            }
            PlanAction::Buy {
                store,
                location: store_location,
                ..
            } => {
                if *store_location != location {
                    return Err(TranslationFailure::NotAtStore {
                        store: store.clone(),
                        store_location: *store_location,
                        agent: location,
                    });
                }
                self.current_target = Some(location);
                Ok(Translation {
                    primitives: vec![Primitive::Interact],
                    target: location,
                })
            }
        }
    }
}

/// Shortest rotation from `from` to `to`; a U-turn is two right turns.
fn turns(from: Heading, to: Heading) -> Vec<Primitive> {
    match from.quarter_turns_to(to) {
        0 => vec![],
        1 => vec![Primitive::TurnRight],
        2 => vec![Primitive::TurnRight, Primitive::TurnRight],
        _ => vec![Primitive::TurnLeft],
    }
}
