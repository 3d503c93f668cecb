//! Agent layer: the execution loop and the experiment that wires it up.
//!
//! - **State** (pose, counters, the single goal-reached authority)
//! - **Execution loop** (observe → classify → decide → replan → act)
//! - **Experiment** (config + scenario → loop → result)

pub mod execution;
pub mod experiment;
pub mod result;
pub mod state;

pub use execution::{ExecutionLoop, LoopLimits, STALL_LIMIT};
pub use experiment::{Experiment, PreparedRun};
pub use result::{ExperimentResult, TerminationReason};
pub use state::{AgentState, Purchase};
