//! Fixed-lookup oracle: a small brand-keyword knowledge table.
//!
//! Names are matched case-insensitively. An entry matches when *all* of its
//! keywords occur in the name; the first matching entry wins. Unknown names
//! are irrelevant.

use serde::{Deserialize, Serialize};

use crate::facts::EntityCategory;

use super::{AdviceQuery, AnalysisQuery, Oracle, OracleResult, ReplanAdvice, StoreAnalysis};

/// Utility cost of one detour step in the advice formula.
const STEP_PENALTY: f64 = 0.1;

/// Net benefit above which a detour is recommended.
const BENEFIT_THRESHOLD: f64 = 0.5;

struct Entry {
    keywords: &'static [&'static str],
    category: EntityCategory,
    price: Option<f64>,
    description: &'static str,
}

const fn store(keywords: &'static [&'static str], price: f64, description: &'static str) -> Entry {
    Entry {
        keywords,
        category: EntityCategory::Store,
        price: Some(price),
        description,
    }
}

const fn shop(keywords: &'static [&'static str], description: &'static str) -> Entry {
    Entry {
        keywords,
        category: EntityCategory::Store,
        price: None,
        description,
    }
}

const fn thing(
    keywords: &'static [&'static str],
    category: EntityCategory,
    description: &'static str,
) -> Entry {
    Entry {
        keywords,
        category,
        price: None,
        description,
    }
}

const CATALOG: &[Entry] = &[
    store(&["rami"], 2.5, "Discount supermarket chain"),
    store(&["levy"], 2.5, "Discount supermarket chain"),
    store(&["osher"], 2.5, "Discount supermarket chain"),
    store(&["victory"], 4.0, "Standard supermarket"),
    store(&["am:pm"], 12.0, "Convenience store"),
    store(&["am_pm"], 12.0, "Convenience store"),
    store(&["yellow"], 12.0, "Convenience store"),
    store(&["mega", "bulldog"], 3.0, "Supermarket"),
    shop(&["american"], "Clothing store"),
    shop(&["eagle"], "Clothing store"),
    shop(&["mcdonald"], "Fast food restaurant"),
    shop(&["mc donald"], "Fast food restaurant"),
    shop(&["starbuck"], "Coffee shop"),
    shop(&["nike"], "Sportswear store"),
    shop(&["super", "pharm"], "Pharmacy and cosmetics store"),
    shop(&["louis", "vuitton"], "Luxury fashion store"),
    shop(&["butcher"], "Butcher shop"),
    shop(&["moshe"], "Butcher shop"),
    thing(&["tree"], EntityCategory::Irrelevant, "Tree (natural object)"),
    thing(&["statue"], EntityCategory::Irrelevant, "Statue (landmark)"),
    thing(&["signpost"], EntityCategory::Irrelevant, "Signpost (landmark)"),
    thing(&["barrier"], EntityCategory::Obstacle, "Road barrier"),
    thing(&["cone"], EntityCategory::Obstacle, "Traffic cone"),
    thing(&["construction"], EntityCategory::Obstacle, "Construction site"),
];

fn default_price_weight() -> f64 {
    0.6
}

fn default_distance_weight() -> f64 {
    0.4
}

/// Relative importance of price savings versus walking distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionWeights {
    #[serde(default = "default_price_weight")]
    pub price_weight: f64,
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f64,
}

impl Default for DecisionWeights {
    fn default() -> Self {
        Self {
            price_weight: default_price_weight(),
            distance_weight: default_distance_weight(),
        }
    }
}

/// Deterministic oracle backed by the built-in catalog.
#[derive(Debug, Default, Clone)]
pub struct CatalogOracle {
    weights: DecisionWeights,
}

impl CatalogOracle {
    pub fn new(weights: DecisionWeights) -> Self {
        Self { weights }
    }

    fn lookup(name: &str) -> Option<&'static Entry> {
        let name = name.to_lowercase();
        CATALOG
            .iter()
            .find(|e| e.keywords.iter().all(|k| name.contains(k)))
    }
}

impl Oracle for CatalogOracle {
    fn name(&self) -> &str {
        "catalog"
    }

    fn analyze(&mut self, query: &AnalysisQuery) -> OracleResult<StoreAnalysis> {
        let analysis = match Self::lookup(&query.name) {
            Some(entry) => StoreAnalysis {
                category: entry.category,
                sells_target: entry.price.is_some(),
                estimated_price: entry.price,
                description: entry.description.to_string(),
            },
            None => StoreAnalysis {
                category: EntityCategory::Irrelevant,
                sells_target: false,
                estimated_price: None,
                description: "Unknown establishment".into(),
            },
        };
        Ok(analysis)
    }

    fn advise(&mut self, query: &AdviceQuery) -> OracleResult<ReplanAdvice> {
        let Some(detour) = query.detour_distance else {
            return Ok(ReplanAdvice::keep_going(format!(
                "{} is not reachable over known cells",
                query.name
            )));
        };
        let savings = query.baseline_price - query.estimated_price;
        let penalty = f64::from(detour) * STEP_PENALTY;
        let benefit = savings * self.weights.price_weight - penalty * self.weights.distance_weight;
        Ok(ReplanAdvice {
            replan_needed: benefit > BENEFIT_THRESHOLD,
            reasoning: format!(
                "price savings {savings:.2}, distance cost {penalty:.2}, net benefit {benefit:.2}"
            ),
        })
    }
}
