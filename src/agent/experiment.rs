//! Experiment wiring: turn a [`RunConfig`] and a [`Scenario`] into a ready
//! [`ExecutionLoop`], run it, and collect the result.

use crate::classify::DiscoveryClassifier;
use crate::config::RunConfig;
use crate::error::HarnessResult;
use crate::facts::FactStore;
use crate::oracle::Oracle;
use crate::plan::Plan;
use crate::planner::{Planner, PlannerAdapter};
use crate::policy::ReplanPolicy;
use crate::scenario::{Layout, Scenario};
use crate::world::{GridWorld, World};

use super::execution::{ExecutionLoop, LoopLimits};
use super::result::ExperimentResult;

/// One configured run. Planner, oracle and world default to what the config
/// describes and can be overridden.
pub struct Experiment {
    config: RunConfig,
    scenario: Scenario,
    planner: Option<Box<dyn Planner>>,
    oracle: Option<Box<dyn Oracle>>,
    world: Option<Box<dyn World>>,
}

impl Experiment {
    pub fn new(config: RunConfig, scenario: Scenario) -> Self {
        Self {
            config,
            scenario,
            planner: None,
            oracle: None,
            world: None,
        }
    }

    /// Resolve the scenario named in the config.
    pub fn from_config(config: RunConfig) -> HarnessResult<Self> {
        config.validate()?;
        let scenario = Scenario::resolve(&config.scenario)?;
        Ok(Self::new(config, scenario))
    }

    pub fn with_planner(mut self, planner: Box<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_oracle(mut self, oracle: Box<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Replace the simulated world. The scenario still seeds the agent's
    /// initial knowledge: bounds, perimeter and fixed walls, and the goal
    /// store.
    pub fn with_world(mut self, world: Box<dyn World>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// The agent's knowledge before it takes a step.
    pub fn initial_facts(&self, layout: &Layout) -> FactStore {
        let mut facts = FactStore::new(layout.bounds, self.scenario.start, &self.scenario.item);
        for wall in &layout.walls {
            facts.mark_obstacle(*wall);
        }
        let goal = &self.scenario.goal;
        facts.mark_store(&goal.name, goal.location, true, Some(goal.price));
        facts
    }

    /// Build the loop and compute the initial plan.
    pub fn prepare(self) -> HarnessResult<PreparedRun> {
        let layout = self.scenario.layout(self.config.seed)?;
        let facts = self.initial_facts(&layout);

        let world = match self.world {
            Some(world) => world,
            None => Box::new(GridWorld::with_layout(&self.scenario, layout)),
        };
        let planner = self.planner.unwrap_or_else(|| self.config.planner.build());
        let oracle = self.oracle.unwrap_or_else(|| self.config.oracle.build());

        let mut execution = ExecutionLoop::new(
            self.scenario.id.clone(),
            facts,
            world,
            ReplanPolicy::new(self.config.mode, self.config.thresholds),
            DiscoveryClassifier::new(oracle),
            PlannerAdapter::new(planner),
            LoopLimits {
                step_budget: self.config.step_budget,
                sensor_radius: self.config.sensor_radius,
                step_cost: self.config.step_cost,
                baseline_price: self.config.baseline_price,
            },
        );
        let initial_plan = execution.plan_initial();
        Ok(PreparedRun {
            execution,
            initial_plan,
        })
    }

    /// Prepare and run to termination.
    pub fn run(self) -> HarnessResult<ExperimentResult> {
        Ok(self.prepare()?.run())
    }
}

/// A loop with its initial plan, ready to run.
pub struct PreparedRun {
    execution: ExecutionLoop,
    initial_plan: Option<Plan>,
}

impl PreparedRun {
    pub fn initial_plan(&self) -> Option<&Plan> {
        self.initial_plan.as_ref()
    }

    pub fn execution(&self) -> &ExecutionLoop {
        &self.execution
    }

    pub fn run(&mut self) -> ExperimentResult {
        let plan = self.initial_plan.take();
        self.execution.run(plan)
    }
}
