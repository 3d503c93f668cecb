// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # replan-bench
//!
//! A harness for comparing when an agent should abandon its plan after
//! discovering something new.
//!
//! An agent walks a grid toward a known store to buy an item. On the way it
//! sees stores and objects it did not know about. Four policies decide what
//! to do about them:
//!
//! - **A, blind**: ignore every discovery.
//! - **B, always-replan**: replan on every store.
//! - **C, oracle-guided**: ask an oracle whether the detour is worth it.
//! - **D, heuristic**: replan when savings and detour clear fixed thresholds.
//!
//! ## Architecture
//!
//! - **World** (`world`): the environment trait and a simulated grid world
//! - **Facts** (`facts`): the agent's beliefs, the only input to planning
//! - **Planning** (`planner`): built-in grid planner, Fast Downward via PDDL
//! - **Oracles** (`oracle`, `classify`): discovery classification and advice
//! - **Policy** (`policy`): the four decision modes
//! - **Agent** (`agent`): the execution loop and experiment wiring
//!
//! ## Library usage
//!
//! ```no_run
//! use replan_bench::agent::Experiment;
//! use replan_bench::config::RunConfig;
//! use replan_bench::policy::ReplanMode;
//!
//! let config = RunConfig {
//!     mode: ReplanMode::Heuristic,
//!     scenario: "golden-opportunity".into(),
//!     ..RunConfig::default()
//! };
//! let result = Experiment::from_config(config).unwrap().run().unwrap();
//! println!("{result}");
//! ```

pub mod agent;
pub mod classify;
pub mod config;
pub mod error;
pub mod facts;
pub mod grid;
pub mod oracle;
pub mod plan;
pub mod planner;
pub mod policy;
pub mod scenario;
pub mod translate;
pub mod world;
