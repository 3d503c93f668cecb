//! Planning: turn a [`ProblemSnapshot`] into a validated [`Plan`].
//!
//! Planners implement [`Planner`] and return raw action sequences. The
//! [`PlannerAdapter`] is the only thing the execution loop talks to: it runs
//! the planner, validates the output against the snapshot it was given, and
//! folds every failure mode into a single [`Infeasible`] outcome.

pub mod external;
pub mod grid;
pub mod pddl;

use miette::Diagnostic;
use thiserror::Error;

use crate::facts::ProblemSnapshot;
use crate::grid::Location;
use crate::plan::{Plan, PlanAction};

pub use external::{FastDownwardConfig, FastDownwardPlanner};
pub use grid::GridPlanner;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from planner invocations.
#[derive(Debug, Error, Diagnostic)]
pub enum PlannerError {
    #[error("no known store sells {item}")]
    #[diagnostic(
        code(replan::planner::no_selling_store),
        help("Every selling store is unknown, declined or blocked.")
    )]
    NoSellingStore { item: String },

    #[error("no path from {from} to any selling store")]
    #[diagnostic(
        code(replan::planner::no_path),
        help("Known obstacles cut the agent off from every selling store.")
    )]
    NoPath { from: Location },

    #[error("planner proved the problem unsolvable (exit code {code})")]
    #[diagnostic(
        code(replan::planner::unsolvable),
        help("The problem has no solution under the current facts.")
    )]
    Unsolvable { code: i32 },

    #[error("planner exited with {status}: {stderr}")]
    #[diagnostic(
        code(replan::planner::failed),
        help("Run the planner by hand on the problem printed by `replan problem` to see the full output.")
    )]
    Failed { status: String, stderr: String },

    #[error("planner timed out after {timeout_secs}s")]
    #[diagnostic(
        code(replan::planner::timeout),
        help("Increase `planner.timeout_secs` or use a cheaper search configuration.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("failed to launch planner {path}: {message}")]
    #[diagnostic(
        code(replan::planner::spawn),
        help("Check `planner.path` points at an executable Fast Downward driver.")
    )]
    Spawn { path: String, message: String },

    #[error("planner scratch directory error: {message}")]
    #[diagnostic(code(replan::planner::io), help("Check the temporary directory is writable."))]
    Io { message: String },

    #[error("planner produced no plan file")]
    #[diagnostic(
        code(replan::planner::no_plan_file),
        help("The planner exited cleanly but did not write `sas_plan`.")
    )]
    NoPlanFile,

    #[error("planner returned an empty plan")]
    #[diagnostic(code(replan::planner::empty_plan))]
    EmptyPlan,

    #[error("cannot parse plan line {line:?}: {message}")]
    #[diagnostic(
        code(replan::planner::parse),
        help("Plan lines must look like `(drive agent loc_1_1 loc_2_1)` or `(buy agent i_milk s_victory loc_2_1)`.")
    )]
    Parse { line: String, message: String },

    #[error("plan rejected: {reason}")]
    #[diagnostic(
        code(replan::planner::invalid_plan),
        help("The planner's output does not execute against the facts it was given.")
    )]
    InvalidPlan { reason: String },
}

pub type PlannerResult<T> = std::result::Result<T, PlannerError>;

/// The single failure outcome the execution loop sees from planning.
#[derive(Debug, Error, Diagnostic)]
#[error("no feasible plan: {cause}")]
#[diagnostic(
    code(replan::planner::infeasible),
    help("The previous feasible plan is kept and a planner warning is recorded.")
)]
pub struct Infeasible {
    #[source]
    #[diagnostic_source]
    pub cause: PlannerError,
}

impl From<PlannerError> for Infeasible {
    fn from(cause: PlannerError) -> Self {
        Self { cause }
    }
}

// ---------------------------------------------------------------------------
// Planner trait
// ---------------------------------------------------------------------------

/// Something that can solve a shopping problem.
pub trait Planner {
    /// Short name for logs and results.
    fn name(&self) -> &str;

    /// Compute an action sequence from the agent's location to a purchase.
    fn plan(&mut self, snapshot: &ProblemSnapshot) -> PlannerResult<Vec<PlanAction>>;
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Runs a [`Planner`] and validates what it returns.
pub struct PlannerAdapter {
    planner: Box<dyn Planner>,
    invocations: u32,
}

impl PlannerAdapter {
    pub fn new(planner: Box<dyn Planner>) -> Self {
        Self {
            planner,
            invocations: 0,
        }
    }

    pub fn planner_name(&self) -> &str {
        self.planner.name()
    }

    /// Number of planner invocations so far.
    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    /// Plan against `snapshot`. Every error, including output that does not
    /// validate, becomes [`Infeasible`].
    pub fn plan(&mut self, snapshot: &ProblemSnapshot) -> Result<Plan, Infeasible> {
        self.invocations += 1;
        let actions = self.planner.plan(snapshot)?;
        validate(&actions, snapshot)?;
        tracing::debug!(
            planner = self.planner.name(),
            actions = actions.len(),
            revision = snapshot.revision,
            "plan accepted"
        );
        Ok(Plan::new(actions, snapshot.revision))
    }
}

/// Check that `actions` executes from the snapshot's agent location: a chain
/// of adjacent drives over clear cells followed by exactly one purchase at a
/// selling store on the final cell.
pub fn validate(actions: &[PlanAction], snapshot: &ProblemSnapshot) -> PlannerResult<()> {
    let invalid = |reason: String| PlannerError::InvalidPlan { reason };

    let Some((last, drives)) = actions.split_last() else {
        return Err(PlannerError::EmptyPlan);
    };

    let mut at = snapshot.agent;
    for action in drives {
        match action {
            PlanAction::Drive { from, to } => {
                if *from != at {
                    return Err(invalid(format!("drive starts at {from}, agent is at {at}")));
                }
                if !from.is_adjacent(*to) {
                    return Err(invalid(format!("{from} and {to} are not adjacent")));
                }
                if !snapshot.is_clear(*to) {
                    return Err(invalid(format!("drive enters {to}, which is not clear")));
                }
                at = *to;
            }
            PlanAction::Buy { .. } => {
                return Err(invalid("purchase before the end of the plan".into()));
            }
        }
    }

    match last {
        PlanAction::Buy {
            store, location, ..
        } => {
            let Some(fact) = snapshot.stores.iter().find(|s| &s.name == store) else {
                return Err(invalid(format!("unknown store {store}")));
            };
            if !fact.sells_target {
                return Err(invalid(format!("{store} does not sell {}", snapshot.item)));
            }
            if fact.location != *location || *location != at {
                return Err(invalid(format!(
                    "purchase at {location}, agent ends at {at}, {store} is at {}",
                    fact.location
                )));
            }
            Ok(())
        }
        PlanAction::Drive { .. } => Err(invalid("plan does not end in a purchase".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::FactStore;
    use crate::grid::Bounds;

    struct Canned(Option<Vec<PlanAction>>);

    impl Planner for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn plan(&mut self, _snapshot: &ProblemSnapshot) -> PlannerResult<Vec<PlanAction>> {
            self.0.clone().ok_or(PlannerError::Unsolvable { code: 12 })
        }
    }

    fn snapshot() -> ProblemSnapshot {
        let mut facts = FactStore::new(Bounds::new(5, 5), Location::new(1, 1), "milk");
        facts.mark_store("victory", Location::new(2, 1), true, Some(4.0));
        facts.mark_store("nike", Location::new(1, 2), false, None);
        facts.snapshot_for_planner()
    }

    fn drive(a: (i32, i32), b: (i32, i32)) -> PlanAction {
        PlanAction::Drive {
            from: a.into(),
            to: b.into(),
        }
    }

    fn buy(store: &str, at: (i32, i32)) -> PlanAction {
        PlanAction::Buy {
            item: "milk".into(),
            store: store.into(),
            location: at.into(),
            price: None,
        }
    }

    #[test]
    fn valid_plan_is_accepted_with_snapshot_basis() {
        let snap = snapshot();
        let mut adapter = PlannerAdapter::new(Box::new(Canned(Some(vec![
            drive((1, 1), (2, 1)),
            buy("victory", (2, 1)),
        ]))));
        let plan = adapter.plan(&snap).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.basis(), snap.revision);
        assert_eq!(adapter.invocations(), 1);
    }

    #[test]
    fn planner_failure_becomes_infeasible() {
        let mut adapter = PlannerAdapter::new(Box::new(Canned(None)));
        let err = adapter.plan(&snapshot()).unwrap_err();
        assert!(matches!(err.cause, PlannerError::Unsolvable { code: 12 }));
    }

    #[test]
    fn malformed_plans_are_rejected() {
        let snap = snapshot();
        let cases = vec![
            vec![],
            vec![drive((2, 2), (2, 1)), buy("victory", (2, 1))],
            vec![drive((1, 1), (3, 1)), buy("victory", (3, 1))],
            vec![drive((1, 1), (2, 1))],
            vec![drive((1, 1), (1, 2)), buy("nike", (1, 2))],
            vec![buy("victory", (2, 1))],
            vec![buy("victory", (1, 1)), drive((1, 1), (2, 1))],
        ];
        for actions in cases {
            assert!(validate(&actions, &snap).is_err(), "accepted {actions:?}");
        }
    }
}
