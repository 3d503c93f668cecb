//! Experiment results.

use std::fmt;

use serde::Serialize;

use crate::policy::ReplanMode;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Success,
    StepBudgetExceeded,
    NoInitialPlan,
    PlanExhausted,
    Stalled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::StepBudgetExceeded => "step_budget_exceeded",
            Self::NoInitialPlan => "no_initial_plan",
            Self::PlanExhausted => "plan_exhausted",
            Self::Stalled => "stalled",
        })
    }
}

/// Outcome of one run. Built once at termination and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentResult {
    pub scenario: String,
    pub mode: ReplanMode,
    pub steps: u32,
    /// Purchase price plus `steps * step_cost`.
    pub total_cost: f64,
    /// Planner invocations after the initial plan.
    pub replans: u32,
    pub oracle_calls: u32,
    /// Entities seen for the first time.
    pub discoveries: u32,
    /// Replans that came back infeasible.
    pub planner_warnings: u32,
    pub termination_reason: TerminationReason,
    pub success: bool,
    pub final_price: Option<f64>,
    pub store: Option<String>,
}

impl fmt::Display for ExperimentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} after {} steps, {} replans, {} oracle calls, total cost {:.2}",
            self.mode, self.scenario, self.termination_reason, self.steps, self.replans,
            self.oracle_calls, self.total_cost
        )?;
        if let (Some(store), Some(price)) = (&self.store, self.final_price) {
            write!(f, " (bought at {store} for {price:.2})")?;
        }
        Ok(())
    }
}
