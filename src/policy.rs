//! Replanning policies: when does a discovery justify a new plan?
//!
//! | Mode | Name           | Classifies | Replans on a discovery when          |
//! |------|----------------|------------|--------------------------------------|
//! | A    | blind          | no         | never                                |
//! | B    | always-replan  | yes        | it is a store (selling or not)       |
//! | C    | oracle-guided  | yes        | it sells the item and the oracle says so |
//! | D    | heuristic      | yes        | savings and detour clear thresholds  |
//!
//! [`ReplanPolicy::decide`] is a pure function of its inputs. Any oracle
//! advice (mode C) is fetched by the caller and passed in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::facts::Classification;
use crate::grid::Location;
use crate::oracle::ReplanAdvice;

// ---------------------------------------------------------------------------
// Modes and thresholds
// ---------------------------------------------------------------------------

/// The four decision strategies under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReplanMode {
    #[serde(rename = "A", alias = "a", alias = "blind")]
    Blind,
    #[serde(rename = "B", alias = "b", alias = "always-replan")]
    AlwaysReplan,
    #[serde(rename = "C", alias = "c", alias = "oracle-guided")]
    OracleGuided,
    #[serde(rename = "D", alias = "d", alias = "heuristic")]
    Heuristic,
}

impl ReplanMode {
    pub const ALL: [ReplanMode; 4] = [
        ReplanMode::Blind,
        ReplanMode::AlwaysReplan,
        ReplanMode::OracleGuided,
        ReplanMode::Heuristic,
    ];

    /// Single-letter label used in results.
    pub fn letter(self) -> &'static str {
        match self {
            Self::Blind => "A",
            Self::AlwaysReplan => "B",
            Self::OracleGuided => "C",
            Self::Heuristic => "D",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Blind => "blind",
            Self::AlwaysReplan => "always-replan",
            Self::OracleGuided => "oracle-guided",
            Self::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for ReplanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

impl FromStr for ReplanMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.letter().eq_ignore_ascii_case(s) || m.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownMode {
                value: s.to_string(),
            })
    }
}

fn default_min_savings() -> f64 {
    1.0
}

fn default_max_detour() -> u32 {
    10
}

/// Mode D thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyThresholds {
    /// Savings must strictly exceed this.
    #[serde(default = "default_min_savings")]
    pub min_savings: f64,
    /// Detour must be strictly below this.
    #[serde(default = "default_max_detour")]
    pub max_detour: u32,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            min_savings: default_min_savings(),
            max_detour: default_max_detour(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// A newly observed, classified entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub name: String,
    pub location: Location,
    pub classification: Classification,
}

/// Everything a decision may look at.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub discovery: &'a Discovery,
    /// Known walking distance to the discovery, `None` if unreachable.
    pub detour_distance: Option<u32>,
    /// Price the current plan expects to pay.
    pub baseline_price: f64,
    /// Remaining actions in the current plan.
    pub plan_cost: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Continue,
    Replan,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continue => "CONTINUE",
            Self::Replan => "REPLAN",
        })
    }
}

/// Fact-store write that accompanies a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactUpdate {
    None,
    /// Reaffirm the store as open.
    MarkStore,
    /// Close the discovery's cell.
    MarkObstacle,
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionReason {
    Blind,
    NotAStore,
    DoesNotSell,
    AlwaysReplan,
    OracleAdvice { replan: bool, reasoning: String },
    Worthwhile { savings: f64, detour: u32 },
    SavingsTooSmall { savings: f64 },
    DetourTooLong { detour: Option<u32> },
    PathInvalidated,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blind => write!(f, "blind mode ignores discoveries"),
            Self::NotAStore => write!(f, "not a store"),
            Self::DoesNotSell => write!(f, "store does not sell the item"),
            Self::AlwaysReplan => write!(f, "every store triggers a replan"),
            Self::OracleAdvice { replan, reasoning } => {
                let verb = if *replan { "switch" } else { "stay" };
                write!(f, "oracle says {verb}: {reasoning}")
            }
            Self::Worthwhile { savings, detour } => {
                write!(f, "saves {savings:.2} for a {detour}-step detour")
            }
            Self::SavingsTooSmall { savings } => write!(f, "savings {savings:.2} too small"),
            Self::DetourTooLong { detour: Some(d) } => write!(f, "detour of {d} steps too long"),
            Self::DetourTooLong { detour: None } => write!(f, "store unreachable"),
            Self::PathInvalidated => write!(f, "current path invalidated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: DecisionReason,
    pub update: FactUpdate,
}

impl Decision {
    fn new(verdict: Verdict, reason: DecisionReason, update: FactUpdate) -> Self {
        Self {
            verdict,
            reason,
            update,
        }
    }

    fn keep(reason: DecisionReason) -> Self {
        Self::new(Verdict::Continue, reason, FactUpdate::None)
    }

    fn switch(reason: DecisionReason) -> Self {
        Self::new(Verdict::Replan, reason, FactUpdate::MarkStore)
    }

    fn decline(reason: DecisionReason) -> Self {
        Self::new(Verdict::Continue, reason, FactUpdate::MarkObstacle)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// A mode plus its thresholds. Holds no mutable state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplanPolicy {
    mode: ReplanMode,
    thresholds: PolicyThresholds,
}

impl ReplanPolicy {
    pub fn new(mode: ReplanMode, thresholds: PolicyThresholds) -> Self {
        Self { mode, thresholds }
    }

    pub fn mode(&self) -> ReplanMode {
        self.mode
    }

    pub fn thresholds(&self) -> PolicyThresholds {
        self.thresholds
    }

    /// Whether discoveries are classified at all.
    pub fn classifies(&self) -> bool {
        self.mode != ReplanMode::Blind
    }

    /// Whether `decide` needs oracle advice for this discovery.
    pub fn wants_advice(&self, discovery: &Discovery) -> bool {
        self.mode == ReplanMode::OracleGuided && discovery.classification.is_selling_store()
    }

    /// Verdict when the current plan no longer executes.
    pub fn on_path_invalidated(&self) -> Verdict {
        match self.mode {
            ReplanMode::Blind => Verdict::Continue,
            _ => Verdict::Replan,
        }
    }

    /// Decide what to do about one discovery.
    ///
    /// Declined selling stores are closed in the fact store so that no later
    /// replan routes to them.
    pub fn decide(&self, input: &DecisionInput<'_>, advice: Option<&ReplanAdvice>) -> Decision {
        let c = &input.discovery.classification;
        match self.mode {
            ReplanMode::Blind => Decision::keep(DecisionReason::Blind),
            ReplanMode::AlwaysReplan if c.is_store() => Decision::switch(DecisionReason::AlwaysReplan),
            _ if !c.is_store() => Decision::keep(DecisionReason::NotAStore),
            _ if !c.sells_target => Decision::keep(DecisionReason::DoesNotSell),
            ReplanMode::AlwaysReplan => Decision::switch(DecisionReason::AlwaysReplan),
            ReplanMode::OracleGuided => {
                let (replan, reasoning) = advice
                    .map(|a| (a.replan_needed, a.reasoning.clone()))
                    .unwrap_or((false, "no advice".into()));
                let reason = DecisionReason::OracleAdvice { replan, reasoning };
                if replan {
                    Decision::switch(reason)
                } else {
                    Decision::decline(reason)
                }
            }
            ReplanMode::Heuristic => self.heuristic(input, c),
        }
    }

    fn heuristic(&self, input: &DecisionInput<'_>, c: &Classification) -> Decision {
        let price = c.price.unwrap_or(input.baseline_price);
        let savings = input.baseline_price - price;
        if savings <= self.thresholds.min_savings {
            return Decision::decline(DecisionReason::SavingsTooSmall { savings });
        }
        match input.detour_distance {
            Some(detour) if detour < self.thresholds.max_detour => {
                Decision::switch(DecisionReason::Worthwhile { savings, detour })
            }
            detour => Decision::decline(DecisionReason::DetourTooLong { detour }),
        }
    }
}
