//! End-to-end tests for the replanning harness.
//!
//! Each test runs a full experiment: seeded facts, initial plan, the
//! execution loop over the simulated grid world, and the final result.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use replan_bench::agent::{Experiment, ExperimentResult, TerminationReason};
use replan_bench::config::RunConfig;
use replan_bench::facts::{CellStatus, ProblemSnapshot};
use replan_bench::grid::Location;
use replan_bench::oracle::{
    AdviceQuery, AnalysisQuery, CatalogOracle, Oracle, OracleError, OracleResult, ReplanAdvice,
    StoreAnalysis,
};
use replan_bench::plan::PlanAction;
use replan_bench::planner::{GridPlanner, Planner, PlannerError, PlannerResult};
use replan_bench::policy::ReplanMode;
use replan_bench::scenario::{EntityKind, GoalStore, Scenario, ScenarioEntity};

fn config(mode: ReplanMode) -> RunConfig {
    RunConfig {
        mode,
        ..RunConfig::default()
    }
}

fn run(id: &str, mode: ReplanMode) -> ExperimentResult {
    let scenario = Scenario::by_id(id).unwrap();
    Experiment::new(config(mode), scenario).run().unwrap()
}

fn assert_cost_consistent(r: &ExperimentResult) {
    let expected = r.final_price.unwrap_or(0.0) + f64::from(r.steps) * 0.1;
    assert!((r.total_cost - expected).abs() < 1e-9, "{r}");
}

/// Catalog oracle that records how often each name is analysed.
struct Counting {
    inner: CatalogOracle,
    analysed: Rc<RefCell<BTreeMap<String, u32>>>,
}

impl Oracle for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn analyze(&mut self, query: &AnalysisQuery) -> OracleResult<StoreAnalysis> {
        *self.analysed.borrow_mut().entry(query.name.clone()).or_default() += 1;
        self.inner.analyze(query)
    }

    fn advise(&mut self, query: &AdviceQuery) -> OracleResult<ReplanAdvice> {
        self.inner.advise(query)
    }
}

/// Oracle whose every answer is garbage.
struct Garbage;

impl Oracle for Garbage {
    fn name(&self) -> &str {
        "garbage"
    }

    fn analyze(&mut self, _query: &AnalysisQuery) -> OracleResult<StoreAnalysis> {
        Err(OracleError::Malformed {
            message: "expected value at line 1 column 1".into(),
        })
    }

    fn advise(&mut self, _query: &AdviceQuery) -> OracleResult<ReplanAdvice> {
        Err(OracleError::RequestFailed {
            message: "connection reset".into(),
        })
    }
}

struct Refusing;

impl Planner for Refusing {
    fn name(&self) -> &str {
        "refusing"
    }

    fn plan(&mut self, _snapshot: &ProblemSnapshot) -> PlannerResult<Vec<PlanAction>> {
        Err(PlannerError::Unsolvable { code: 11 })
    }
}

/// Grid planner that keeps a copy of every snapshot it is asked to solve.
struct Recording {
    inner: GridPlanner,
    seen: Rc<RefCell<Vec<ProblemSnapshot>>>,
}

impl Planner for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    fn plan(&mut self, snapshot: &ProblemSnapshot) -> PlannerResult<Vec<PlanAction>> {
        self.seen.borrow_mut().push(snapshot.clone());
        self.inner.plan(snapshot)
    }
}

/// Open `width` x `height` grid with the goal on row 1, straight east of the
/// start at (1, 1).
fn street(width: i32, height: i32, goal_x: i32, entities: Vec<ScenarioEntity>) -> Scenario {
    Scenario {
        id: "street".into(),
        name: "Street".into(),
        description: String::new(),
        width,
        height,
        start: Location::new(1, 1),
        heading: Default::default(),
        item: "milk".into(),
        goal: GoalStore {
            name: "victory".into(),
            location: Location::new(goal_x, 1),
            price: 4.0,
        },
        entities,
        walls: Vec::new(),
        wall_density: 0.0,
    }
}

fn entity(name: &str, (x, y): (i32, i32), kind: EntityKind) -> ScenarioEntity {
    ScenarioEntity {
        name: name.into(),
        location: Location::new(x, y),
        kind,
    }
}

/// 7x4 grid: a barrier on the straight route from (1, 1) to the goal at (5, 1).
fn barrier_scenario() -> Scenario {
    Scenario {
        id: "barrier".into(),
        name: "Barrier".into(),
        description: String::new(),
        width: 7,
        height: 4,
        start: Location::new(1, 1),
        heading: Default::default(),
        item: "milk".into(),
        goal: GoalStore {
            name: "victory".into(),
            location: Location::new(5, 1),
            price: 4.0,
        },
        entities: vec![ScenarioEntity {
            name: "construction_barrier".into(),
            location: Location::new(3, 1),
            kind: EntityKind::Obstacle,
        }],
        walls: Vec::new(),
        wall_density: 0.0,
    }
}

// ---------------------------------------------------------------------------
// Scenario outcomes
// ---------------------------------------------------------------------------

#[test]
fn golden_opportunity_blind_mode_pays_full_price() {
    let r = run("golden-opportunity", ReplanMode::Blind);
    assert_eq!(r.termination_reason, TerminationReason::Success);
    assert!(r.success);
    assert_eq!(r.replans, 0);
    assert_eq!(r.oracle_calls, 0);
    assert_eq!(r.final_price, Some(4.0));
    assert_eq!(r.store.as_deref(), Some("victory"));
    assert!(r.discoveries >= 1);
    assert_cost_consistent(&r);
}

#[test]
fn golden_opportunity_replanning_modes_buy_cheap() {
    for mode in [ReplanMode::AlwaysReplan, ReplanMode::OracleGuided, ReplanMode::Heuristic] {
        let r = run("golden-opportunity", mode);
        assert!(r.success, "{r}");
        assert_eq!(r.store.as_deref(), Some("rami_levy_express"), "{r}");
        assert_eq!(r.final_price, Some(2.0), "{r}");
        assert!(r.replans >= 1, "{r}");
        assert_eq!(r.planner_warnings, 0, "{r}");
        assert_cost_consistent(&r);
    }
}

#[test]
fn oracle_guided_mode_asks_twice_per_selling_store() {
    let r = run("golden-opportunity", ReplanMode::OracleGuided);
    assert_eq!(r.oracle_calls, 2);
    let d = run("golden-opportunity", ReplanMode::Heuristic);
    assert_eq!(d.oracle_calls, 1);
}

#[test]
fn expensive_trap_catches_always_replan_only() {
    let b = run("expensive-trap", ReplanMode::AlwaysReplan);
    assert!(b.success, "{b}");
    assert_eq!(b.store.as_deref(), Some("am_pm_express"));
    assert_eq!(b.final_price, Some(12.0));

    for mode in [ReplanMode::OracleGuided, ReplanMode::Heuristic] {
        let r = run("expensive-trap", mode);
        assert!(r.success, "{r}");
        assert_eq!(r.store.as_deref(), Some("victory"), "{r}");
        assert_eq!(r.final_price, Some(4.0), "{r}");
    }
}

#[test]
fn declined_store_is_closed_in_the_facts() {
    let scenario = Scenario::by_id("expensive-trap").unwrap();
    let mut prepared = Experiment::new(config(ReplanMode::Heuristic), scenario)
        .prepare()
        .unwrap();
    let r = prepared.run();
    assert!(r.success);

    let facts = prepared.execution().facts();
    let trap = Location::new(6, 4);
    assert!(facts.is_blocked(trap));
    assert!(!facts.is_clear(trap));
    let entity = facts.entity("am_pm_express").unwrap();
    assert!(entity.classification.as_ref().unwrap().is_selling_store());
}

#[test]
fn non_selling_store_does_not_divert_the_agent() {
    for mode in [ReplanMode::OracleGuided, ReplanMode::Heuristic] {
        let r = run("butcher-shop", mode);
        assert!(r.success, "{r}");
        assert_eq!(r.store.as_deref(), Some("victory"), "{r}");
        assert_eq!(r.final_price, Some(4.0));
        assert_eq!(r.replans, 0, "{r}");
    }
}

#[test]
fn every_catalog_scenario_terminates_in_every_mode() {
    for scenario in Scenario::catalog() {
        for mode in ReplanMode::ALL {
            let r = Experiment::new(config(mode), scenario.clone()).run().unwrap();
            assert!(r.steps <= 500, "{r}");
            assert_eq!(r.success, r.termination_reason == TerminationReason::Success, "{r}");
            if mode == ReplanMode::Blind {
                assert_eq!(r.replans, 0, "{r}");
                assert_eq!(r.oracle_calls, 0, "{r}");
            }
        }
    }
}

#[test]
fn far_cheap_store_splits_heuristic_from_always_replan() {
    let scenario = Scenario {
        id: "far-outlet".into(),
        goal: GoalStore {
            name: "victory".into(),
            location: Location::new(18, 1),
            price: 4.0,
        },
        entities: vec![ScenarioEntity {
            name: "osher_ad_far".into(),
            location: Location::new(6, 6),
            kind: EntityKind::Store {
                sells_target: true,
                price: Some(1.0),
            },
        }],
        ..Scenario::by_id("golden-opportunity").unwrap()
    };

    let d = Experiment::new(config(ReplanMode::Heuristic), scenario.clone())
        .run()
        .unwrap();
    assert!(d.success, "{d}");
    assert_eq!(d.store.as_deref(), Some("victory"));
    assert_eq!(d.replans, 0);

    let b = Experiment::new(config(ReplanMode::AlwaysReplan), scenario)
        .run()
        .unwrap();
    assert!(b.success, "{b}");
    assert_eq!(b.store.as_deref(), Some("osher_ad_far"));
    assert_eq!(b.final_price, Some(1.0));
}

#[test]
fn landmark_on_the_route_is_walked_past() {
    let scenario = street(
        14,
        5,
        12,
        vec![entity("old_oak_tree", (6, 1), EntityKind::Landmark)],
    );
    for mode in [ReplanMode::OracleGuided, ReplanMode::Heuristic] {
        let mut prepared = Experiment::new(config(mode), scenario.clone())
            .prepare()
            .unwrap();
        let r = prepared.run();
        assert!(r.success, "{r}");
        assert_eq!(r.store.as_deref(), Some("victory"), "{r}");
        assert_eq!(r.replans, 0, "{r}");

        let facts = prepared.execution().facts();
        let tree = Location::new(6, 1);
        assert!(!facts.is_blocked(tree));
        assert!(facts.is_clear(tree));
        assert!(facts.entity("old_oak_tree").unwrap().classification.is_some());
    }
}

#[test]
fn later_replan_sees_earlier_non_selling_store_and_obstacle() {
    let scenario = street(
        20,
        20,
        18,
        vec![
            entity(
                "moshe_butcher",
                (3, 3),
                EntityKind::Store {
                    sells_target: false,
                    price: None,
                },
            ),
            entity("traffic_cone", (4, 2), EntityKind::Obstacle),
            entity(
                "rami_levy_far",
                (12, 3),
                EntityKind::Store {
                    sells_target: true,
                    price: Some(2.0),
                },
            ),
        ],
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let planner = Recording {
        inner: GridPlanner::new(),
        seen: Rc::clone(&seen),
    };
    let r = Experiment::new(config(ReplanMode::Heuristic), scenario)
        .with_planner(Box::new(planner))
        .run()
        .unwrap();
    assert!(r.success, "{r}");
    assert_eq!(r.store.as_deref(), Some("rami_levy_far"));
    assert_eq!(r.replans, 1, "{r}");

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    let (initial, replan) = (&seen[0], &seen[1]);
    assert!(initial.stores.iter().all(|s| s.name == "victory"));
    assert_eq!(initial.status(Location::new(4, 2)), Some(CellStatus::Clear));

    let butcher = replan
        .stores
        .iter()
        .find(|s| s.name == "moshe_butcher")
        .unwrap();
    assert!(!butcher.sells_target);
    assert_eq!(replan.status(Location::new(3, 3)), Some(CellStatus::Clear));
    assert_eq!(replan.status(Location::new(4, 2)), Some(CellStatus::Blocked));
    assert!(replan.selling_stores().all(|s| s.name != "moshe_butcher"));
    assert_eq!(replan.agent, Location::new(7, 1));
}

// ---------------------------------------------------------------------------
// Loop invariants
// ---------------------------------------------------------------------------

#[test]
fn terminal_flag_matches_goal_reached() {
    for mode in ReplanMode::ALL {
        let scenario = Scenario::by_id("honey-pot").unwrap();
        let mut prepared = Experiment::new(config(mode), scenario).prepare().unwrap();
        let r = prepared.run();
        let state = prepared.execution().state();
        assert_eq!(state.is_terminal(), state.goal().is_some());
        assert_eq!(state.is_terminal(), r.success);
        assert_eq!(state.steps(), r.steps);
    }
}

#[test]
fn step_budget_is_never_exceeded() {
    for budget in [1, 5, 9] {
        let cfg = RunConfig {
            step_budget: budget,
            ..config(ReplanMode::Heuristic)
        };
        let scenario = Scenario::by_id("strategic-dilemma").unwrap();
        let mut prepared = Experiment::new(cfg, scenario).prepare().unwrap();
        let r = prepared.run();
        assert_eq!(r.termination_reason, TerminationReason::StepBudgetExceeded);
        assert_eq!(r.steps, budget);
        assert!(!r.success);
        assert!(!prepared.execution().state().is_terminal());
        assert_eq!(r.final_price, None);
    }
}

#[test]
fn each_name_is_classified_once() {
    let analysed = Rc::new(RefCell::new(BTreeMap::new()));
    let oracle = Counting {
        inner: CatalogOracle::default(),
        analysed: Rc::clone(&analysed),
    };
    let scenario = Scenario::by_id("noise-storm").unwrap();
    let r = Experiment::new(config(ReplanMode::AlwaysReplan), scenario)
        .with_oracle(Box::new(oracle))
        .run()
        .unwrap();
    assert!(r.success, "{r}");

    let analysed = analysed.borrow();
    assert!(!analysed.is_empty());
    assert!(analysed.values().all(|n| *n == 1), "{analysed:?}");
    assert_eq!(r.oracle_calls as usize, analysed.len());
    assert_eq!(r.discoveries as usize, analysed.len());
}

#[test]
fn heuristic_runs_are_deterministic() {
    let first = run("golden-opportunity", ReplanMode::Heuristic);
    for _ in 0..3 {
        assert_eq!(run("golden-opportunity", ReplanMode::Heuristic), first);
    }
}

#[test]
fn seeded_walls_are_reproducible() {
    let mut scenario = Scenario::by_id("golden-opportunity").unwrap();
    scenario.wall_density = 0.15;
    let cfg = RunConfig {
        seed: 9,
        ..config(ReplanMode::Heuristic)
    };
    let a = Experiment::new(cfg.clone(), scenario.clone()).run().unwrap();
    let b = Experiment::new(cfg, scenario).run().unwrap();
    assert_eq!(a, b);
}

#[test]
fn unsolvable_start_reports_no_initial_plan() {
    let scenario = Scenario::by_id("golden-opportunity").unwrap();
    let r = Experiment::new(config(ReplanMode::Heuristic), scenario)
        .with_planner(Box::new(Refusing))
        .run()
        .unwrap();
    assert_eq!(r.termination_reason, TerminationReason::NoInitialPlan);
    assert_eq!(r.steps, 0);
    assert_eq!(r.replans, 0);
    assert!(!r.success);
}

#[test]
fn garbage_oracle_degrades_to_the_known_store() {
    let scenario = Scenario::by_id("golden-opportunity").unwrap();
    let r = Experiment::new(config(ReplanMode::OracleGuided), scenario)
        .with_oracle(Box::new(Garbage))
        .run()
        .unwrap();
    assert!(r.success, "{r}");
    assert_eq!(r.store.as_deref(), Some("victory"));
    assert!(r.oracle_calls >= 1);
}

// ---------------------------------------------------------------------------
// Path invalidation
// ---------------------------------------------------------------------------

#[test]
fn classified_obstacle_triggers_a_detour() {
    let r = Experiment::new(config(ReplanMode::AlwaysReplan), barrier_scenario())
        .run()
        .unwrap();
    assert!(r.success, "{r}");
    assert_eq!(r.replans, 1);
    assert_eq!(r.final_price, Some(4.0));
}

#[test]
fn blind_agent_walks_into_the_obstacle_and_gives_up() {
    let scenario = barrier_scenario();
    let mut prepared = Experiment::new(config(ReplanMode::Blind), scenario)
        .prepare()
        .unwrap();
    let r = prepared.run();
    assert_eq!(r.termination_reason, TerminationReason::PlanExhausted);
    assert!(!r.success);
    assert_eq!(r.replans, 0);
    assert!(prepared.execution().facts().is_blocked(Location::new(3, 1)));
}

#[test]
fn scenario_files_load_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("corner.toml");
    std::fs::write(
        &path,
        r#"
            id = "corner"
            width = 10
            height = 10

            [goal]
            name = "victory"
            location = { x = 8, y = 8 }
            price = 4.0

            [[entities]]
            name = "rami_levy_corner"
            location = { x = 3, y = 1 }
            kind = "store"
            price = 2.0
        "#,
    )
    .unwrap();

    let cfg = RunConfig {
        scenario: path.display().to_string(),
        ..config(ReplanMode::Heuristic)
    };
    let r = Experiment::from_config(cfg).unwrap().run().unwrap();
    assert!(r.success, "{r}");
    assert_eq!(r.scenario, "corner");
    assert_eq!(r.store.as_deref(), Some("rami_levy_corner"));
    assert_eq!(r.final_price, Some(2.0));
}
