//! The discovery-driven execution loop.
//!
//! Each iteration runs the same fixed sequence:
//!
//! 1. stop if the goal was reached, or if the step budget is spent;
//! 2. observe, and classify every entity seen for the first time, writing
//!    the classification into the fact store;
//! 3. evaluate the policy for each new discovery (in name order), applying the
//!    fact update each decision carries; then check whether the current plan
//!    still executes (stale facts, a failed action, nothing left);
//! 4. call the planner at most once if anything asked for a replan;
//! 5. translate and execute exactly one plan action.
//!
//! The loop never returns an error. Every run ends with an
//! [`ExperimentResult`] and a definite [`TerminationReason`].

use crate::classify::{ClassificationContext, DiscoveryClassifier};
use crate::facts::FactStore;
use crate::oracle::AdviceQuery;
use crate::plan::{Plan, PlanAction};
use crate::planner::PlannerAdapter;
use crate::policy::{DecisionInput, Discovery, FactUpdate, ReplanPolicy, Verdict};
use crate::translate::{ActionTranslator, TranslationFailure};
use crate::world::{Primitive, StepOutcome, World};

use super::result::{ExperimentResult, TerminationReason};
use super::state::{AgentState, Purchase};

/// Consecutive iterations without a world step or a shorter plan before the
/// run is declared stalled.
pub const STALL_LIMIT: u32 = 16;

/// Numeric limits of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopLimits {
    pub step_budget: u32,
    pub sensor_radius: u32,
    pub step_cost: f64,
    /// Expected price while the plan carries none.
    pub baseline_price: f64,
}

/// Why the current plan is no longer trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invalidation {
    ActionFailed,
    Exhausted,
    Stale,
}

impl Invalidation {
    fn as_str(self) -> &'static str {
        match self {
            Self::ActionFailed => "action failed",
            Self::Exhausted => "plan exhausted",
            Self::Stale => "plan stale",
        }
    }
}

/// Owns every collaborator of a run and drives it to termination.
pub struct ExecutionLoop {
    scenario: String,
    facts: FactStore,
    world: Box<dyn World>,
    policy: ReplanPolicy,
    classifier: DiscoveryClassifier,
    adapter: PlannerAdapter,
    translator: ActionTranslator,
    limits: LoopLimits,
    state: AgentState,
    plan: Plan,
    pending_failure: Option<TranslationFailure>,
    discoveries: u32,
    planner_warnings: u32,
}

impl ExecutionLoop {
    pub fn new(
        scenario: impl Into<String>,
        facts: FactStore,
        world: Box<dyn World>,
        policy: ReplanPolicy,
        classifier: DiscoveryClassifier,
        adapter: PlannerAdapter,
        limits: LoopLimits,
    ) -> Self {
        let state = AgentState::new(world.agent_position(), world.agent_heading());
        Self {
            scenario: scenario.into(),
            facts,
            world,
            policy,
            classifier,
            adapter,
            translator: ActionTranslator::new(),
            limits,
            state,
            plan: Plan::default(),
            pending_failure: None,
            discoveries: 0,
            planner_warnings: 0,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn policy(&self) -> &ReplanPolicy {
        &self.policy
    }

    /// Plan from the seeded facts. Not counted as a replan.
    pub fn plan_initial(&mut self) -> Option<Plan> {
        self.facts.set_agent(self.state.location());
        match self.adapter.plan(&self.facts.snapshot_for_planner()) {
            Ok(plan) => Some(plan),
            Err(e) => {
                tracing::warn!(error = %e, "initial planning failed");
                None
            }
        }
    }

    /// Run to termination.
    pub fn run(&mut self, initial_plan: Option<Plan>) -> ExperimentResult {
        let span = tracing::info_span!(
            "run",
            scenario = %self.scenario,
            mode = %self.policy.mode(),
            planner = self.adapter.planner_name(),
            oracle = self.classifier.oracle_name(),
        );
        let _guard = span.enter();

        let Some(plan) = initial_plan else {
            return self.finish(TerminationReason::NoInitialPlan);
        };
        tracing::info!(plan = %plan, "initial plan");
        self.plan = plan;

        let mut idle = 0;
        loop {
            if self.state.is_terminal() {
                return self.finish(TerminationReason::Success);
            }
            if self.state.steps() >= self.limits.step_budget {
                return self.finish(TerminationReason::StepBudgetExceeded);
            }
            let before = (self.state.steps(), self.plan.len());

            let fresh = self.observe();
            let mut replan = self.decide(&fresh);
            if let Some(cause) = self.invalidation() {
                let verdict = self.policy.on_path_invalidated();
                tracing::debug!(cause = cause.as_str(), verdict = %verdict, "path invalidated");
                match verdict {
                    Verdict::Replan => replan = true,
                    Verdict::Continue => self.carry_on(),
                }
            }
            if replan && !self.replan() {
                self.carry_on();
            }
            self.pending_failure = None;

            if self.plan.is_empty() {
                return self.finish(TerminationReason::PlanExhausted);
            }
            self.execute_next();

            if (self.state.steps(), self.plan.len()) == before && !self.state.is_terminal() {
                idle += 1;
                if idle > STALL_LIMIT {
                    tracing::warn!(iterations = idle, "no progress");
                    return self.finish(TerminationReason::Stalled);
                }
            } else {
                idle = 0;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    /// Sync the pose, then record every entity seen for the first time.
    /// Returns the classified ones, sorted by name.
    fn observe(&mut self) -> Vec<Discovery> {
        let here = self.world.agent_position();
        self.state.set_pose(here, self.world.agent_heading());
        self.facts.set_agent(here);

        let context = ClassificationContext {
            item: self.facts.item().to_string(),
            baseline_price: self.baseline_price(),
        };
        let mut fresh = Vec::new();
        for sighting in self.world.observable_entities(self.limits.sensor_radius) {
            if self.facts.contains(&sighting.name) {
                continue;
            }
            self.discoveries += 1;

            if !self.policy.classifies() {
                self.facts.note_sighting(&sighting.name, sighting.location);
                tracing::info!(name = %sighting.name, at = %sighting.location, "sighted");
                continue;
            }

            let classification = self.classifier.classify(&sighting.name, &context);
            tracing::info!(
                name = %sighting.name,
                at = %sighting.location,
                category = %classification.category,
                sells = classification.sells_target,
                price = ?classification.price,
                "discovered"
            );
            self.facts.record_classification(
                &sighting.name,
                sighting.location,
                classification.clone(),
            );
            fresh.push(Discovery {
                name: sighting.name,
                location: sighting.location,
                classification,
            });
        }
        fresh.sort_by(|a, b| a.name.cmp(&b.name));
        fresh
    }

    /// Evaluate the policy for each discovery. Returns whether any asked to
    /// replan.
    fn decide(&mut self, fresh: &[Discovery]) -> bool {
        let mut replan = false;
        for discovery in fresh {
            let detour = self
                .facts
                .walking_distance(self.state.location(), discovery.location);
            let baseline_price = self.baseline_price();
            let input = DecisionInput {
                discovery,
                detour_distance: detour,
                baseline_price,
                plan_cost: self.plan.len(),
            };

            let advice = if self.policy.wants_advice(discovery) {
                let query = AdviceQuery {
                    name: discovery.name.clone(),
                    item: self.facts.item().to_string(),
                    description: discovery.classification.description.clone(),
                    estimated_price: discovery.classification.price.unwrap_or(baseline_price),
                    baseline_price,
                    detour_distance: detour,
                    plan_cost: self.plan.len(),
                };
                Some(self.classifier.advise(&query))
            } else {
                None
            };

            let decision = self.policy.decide(&input, advice.as_ref());
            tracing::info!(
                name = %discovery.name,
                verdict = %decision.verdict,
                reason = %decision.reason,
                detour = ?detour,
                "decision"
            );
            self.apply(discovery, decision.update);
            replan |= decision.verdict == Verdict::Replan;
        }
        replan
    }

    fn apply(&mut self, discovery: &Discovery, update: FactUpdate) {
        match update {
            FactUpdate::None => {}
            FactUpdate::MarkStore => {
                let c = &discovery.classification;
                self.facts
                    .mark_store(&discovery.name, discovery.location, c.sells_target, c.price);
            }
            FactUpdate::MarkObstacle => {
                self.facts.mark_obstacle(discovery.location);
            }
        }
    }

    fn invalidation(&self) -> Option<Invalidation> {
        if self.pending_failure.is_some() {
            Some(Invalidation::ActionFailed)
        } else if self.plan.is_empty() {
            Some(Invalidation::Exhausted)
        } else if self.plan.is_stale(&self.facts) {
            Some(Invalidation::Stale)
        } else {
            None
        }
    }

    /// Keep the current plan: drop the action that just failed, and accept the
    /// rest against the current facts.
    fn carry_on(&mut self) {
        if let Some(failure) = self.pending_failure.take() {
            if let Some(dropped) = self.plan.advance() {
                tracing::debug!(action = %dropped, error = %failure, "dropped failed action");
            }
        }
        self.plan.rebase(self.facts.revision());
    }

    /// One planner invocation from the live location. Returns `false` when
    /// the planner came back infeasible; the previous plan stays in place.
    fn replan(&mut self) -> bool {
        self.state.count_replan();
        self.facts.set_agent(self.state.location());
        let snapshot = self.facts.snapshot_for_planner();
        match self.adapter.plan(&snapshot) {
            Ok(plan) => {
                tracing::info!(replans = self.state.replans(), plan = %plan, "replanned");
                self.plan = plan;
                self.pending_failure = None;
                true
            }
            Err(e) => {
                self.planner_warnings += 1;
                tracing::warn!(error = %e, "replan infeasible, keeping previous plan");
                false
            }
        }
    }

    /// Translate and execute the next plan action.
    fn execute_next(&mut self) {
        let Some(action) = self.plan.next().cloned() else {
            return;
        };
        let translation = match self.translator.translate(
            &action,
            self.state.location(),
            self.state.heading(),
            &self.facts,
        ) {
            Ok(t) => t,
            Err(failure) => {
                self.record_failure(failure);
                return;
            }
        };

        for primitive in translation.primitives {
            if self.state.steps() >= self.limits.step_budget {
                tracing::debug!(action = %action, "step budget reached mid-action");
                return;
            }
            if primitive == Primitive::Forward {
                let ahead = self.state.location().step(self.state.heading());
                if !self.translator.permits_entry(ahead, &self.facts) {
                    self.record_failure(TranslationFailure::StoreEntry { cell: ahead });
                    return;
                }
            }

            let outcome = self.world.step(primitive);
            self.state.count_step();
            match outcome {
                StepOutcome::Turned { heading } => {
                    self.state.set_pose(self.state.location(), heading);
                }
                StepOutcome::Moved { to } => {
                    self.state.set_pose(to, self.state.heading());
                    self.facts.set_agent(to);
                }
                StepOutcome::Blocked { at } => {
                    self.facts.mark_obstacle(at);
                    self.record_failure(TranslationFailure::WorldRefused { target: at });
                    return;
                }
                StepOutcome::Purchased { store, price } => {
                    self.plan.advance();
                    self.state.mark_goal_reached(Purchase { store, price });
                    return;
                }
                StepOutcome::NoSale => {
                    let store = match &action {
                        PlanAction::Buy { store, .. } => store.clone(),
                        PlanAction::Drive { .. } => String::new(),
                    };
                    self.facts.mark_obstacle(self.state.location());
                    self.record_failure(TranslationFailure::NoSale { store });
                    return;
                }
            }
        }

        if self.state.location() != translation.target {
            self.record_failure(TranslationFailure::Diverged {
                expected: translation.target,
                actual: self.state.location(),
            });
            return;
        }
        self.plan.advance();
    }

    fn record_failure(&mut self, failure: TranslationFailure) {
        tracing::warn!(error = %failure, "action failed");
        self.pending_failure = Some(failure);
    }

    /// Price the current plan expects to pay.
    fn baseline_price(&self) -> f64 {
        self.plan
            .purchase()
            .and_then(|(_, price)| price)
            .unwrap_or(self.limits.baseline_price)
    }

    fn finish(&self, reason: TerminationReason) -> ExperimentResult {
        let purchase = self.state.goal();
        let final_price = purchase.map(|p| p.price);
        let total_cost =
            final_price.unwrap_or(0.0) + f64::from(self.state.steps()) * self.limits.step_cost;
        let result = ExperimentResult {
            scenario: self.scenario.clone(),
            mode: self.policy.mode(),
            steps: self.state.steps(),
            total_cost,
            replans: self.state.replans(),
            oracle_calls: self.classifier.oracle_calls(),
            discoveries: self.discoveries,
            planner_warnings: self.planner_warnings,
            termination_reason: reason,
            success: reason == TerminationReason::Success && purchase.is_some(),
            final_price,
            store: purchase.map(|p| p.store.clone()),
        };
        tracing::info!(result = %result, "run finished");
        result
    }
}
