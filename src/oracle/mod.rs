//! Oracles: knowledge sources that classify discoveries and give replanning
//! advice.
//!
//! Two queries exist. *Analysis* asks what a discovered name is and whether it
//! sells the item (and for how much). *Advice* asks whether detouring to a
//! selling store is worth abandoning the current plan.
//!
//! Backends:
//! - [`CatalogOracle`]: fixed keyword lookup, deterministic, no I/O.
//! - [`OllamaOracle`]: a local LLM queried over HTTP in JSON mode.
//!
//! Answers from language models are untrusted text. [`parse_analysis`] and
//! [`parse_advice`] extract the JSON object and sanity-check it; anything that
//! fails becomes an [`OracleError`] and the caller degrades gracefully.

pub mod catalog;
pub mod ollama;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::facts::{Classification, EntityCategory};

pub use catalog::{CatalogOracle, DecisionWeights};
pub use ollama::{OllamaConfig, OllamaOracle};

/// Prices above this are treated as hallucinated.
const MAX_PLAUSIBLE_PRICE: f64 = 1000.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from oracle queries.
#[derive(Debug, Error, Diagnostic)]
pub enum OracleError {
    /// Raised before any request is sent.
    #[error("oracle backend is not available at {url}")]
    #[diagnostic(
        code(replan::oracle::unavailable),
        help("Start Ollama with `ollama serve`, or use the catalog oracle.")
    )]
    Unavailable { url: String },

    #[error("oracle request failed: {message}")]
    #[diagnostic(
        code(replan::oracle::request_failed),
        help("Check that the backend is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("oracle request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(replan::oracle::timeout),
        help("Increase `oracle.timeout_secs` or use a smaller model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("malformed oracle answer: {message}")]
    #[diagnostic(
        code(replan::oracle::malformed),
        help("The model did not return the requested JSON object.")
    )]
    Malformed { message: String },

    #[error("oracle answer is missing `{field}`")]
    #[diagnostic(code(replan::oracle::missing_field))]
    MissingField { field: String },

    #[error("implausible oracle answer: {message}")]
    #[diagnostic(
        code(replan::oracle::implausible),
        help("The answer parsed but contradicts itself; it is treated as unknown.")
    )]
    Implausible { message: String },
}

impl OracleError {
    /// Whether the query reached the backend before failing.
    pub fn was_sent(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;

// ---------------------------------------------------------------------------
// Queries and answers
// ---------------------------------------------------------------------------

/// "What is this?"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisQuery {
    pub name: String,
    pub item: String,
    /// Price the agent currently expects to pay, for reference.
    pub baseline_price: f64,
}

/// Answer to an [`AnalysisQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreAnalysis {
    pub category: EntityCategory,
    pub sells_target: bool,
    pub estimated_price: Option<f64>,
    pub description: String,
}

impl StoreAnalysis {
    pub fn into_classification(self) -> Classification {
        Classification {
            category: self.category,
            sells_target: self.sells_target,
            price: self.estimated_price,
            description: self.description,
        }
    }
}

/// "Should I switch to this store?"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdviceQuery {
    pub name: String,
    pub item: String,
    pub description: String,
    pub estimated_price: f64,
    pub baseline_price: f64,
    /// Known walking distance to the store, if reachable.
    pub detour_distance: Option<u32>,
    /// Remaining actions in the current plan.
    pub plan_cost: usize,
}

/// Answer to an [`AdviceQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplanAdvice {
    pub replan_needed: bool,
    pub reasoning: String,
}

impl ReplanAdvice {
    /// The degraded answer used when advice cannot be obtained.
    pub fn keep_going(reasoning: impl Into<String>) -> Self {
        Self {
            replan_needed: false,
            reasoning: reasoning.into(),
        }
    }
}

/// A knowledge source for discoveries.
pub trait Oracle {
    fn name(&self) -> &str;

    fn analyze(&mut self, query: &AnalysisQuery) -> OracleResult<StoreAnalysis>;

    fn advise(&mut self, query: &AdviceQuery) -> OracleResult<ReplanAdvice>;
}

// ---------------------------------------------------------------------------
// Parsing untrusted answers
// ---------------------------------------------------------------------------

/// Extract and validate a [`StoreAnalysis`] from free-form model output.
///
/// Accepts `category` or `type`, `sells_target` or `sells_<item>`-style keys,
/// and prices given as numbers or numeric strings.
pub fn parse_analysis(text: &str) -> OracleResult<StoreAnalysis> {
    let value = extract_json_object(text)?;
    let obj = value.as_object().ok_or_else(|| OracleError::Malformed {
        message: "expected a JSON object".into(),
    })?;

    let description = obj
        .get("description")
        .or_else(|| obj.get("type"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    let sells_target = obj
        .iter()
        .find(|(k, _)| k.starts_with("sells_"))
        .map(|(_, v)| v)
        .ok_or_else(|| OracleError::MissingField {
            field: "sells_target".into(),
        })
        .and_then(as_bool)?;

    let category = match obj.get("category").and_then(|v| v.as_str()) {
        Some(label) => {
            EntityCategory::from_label(label).ok_or_else(|| OracleError::Malformed {
                message: format!("unknown category {label:?}"),
            })?
        }
        // Older prompt format: no category, selling implies store.
        None if sells_target => EntityCategory::Store,
        None => EntityCategory::Irrelevant,
    };

    let estimated_price = match obj.get("estimated_price").or_else(|| obj.get("price")) {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => Some(as_price(v)?),
    };

    if sells_target && category != EntityCategory::Store {
        return Err(OracleError::Implausible {
            message: format!("a {category} cannot sell anything"),
        });
    }
    let estimated_price = if sells_target {
        match estimated_price {
            Some(p) if p > 0.0 && p <= MAX_PLAUSIBLE_PRICE => Some(p),
            Some(p) => {
                return Err(OracleError::Implausible {
                    message: format!("price {p} is out of range"),
                });
            }
            None => {
                return Err(OracleError::MissingField {
                    field: "estimated_price".into(),
                });
            }
        }
    } else {
        None
    };

    Ok(StoreAnalysis {
        category,
        sells_target,
        estimated_price,
        description,
    })
}

/// Extract and validate a [`ReplanAdvice`] from free-form model output.
pub fn parse_advice(text: &str) -> OracleResult<ReplanAdvice> {
    let value = extract_json_object(text)?;
    let replan_needed = value
        .get("replan_needed")
        .or_else(|| value.get("replan"))
        .ok_or_else(|| OracleError::MissingField {
            field: "replan_needed".into(),
        })
        .and_then(as_bool)?;
    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(ReplanAdvice {
        replan_needed,
        reasoning,
    })
}

/// Find the outermost `{...}` in `text` and parse it.
fn extract_json_object(text: &str) -> OracleResult<serde_json::Value> {
    let start = text.find('{');
    let end = text.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(OracleError::Malformed {
            message: "no JSON object in answer".into(),
        });
    };
    if end < start {
        return Err(OracleError::Malformed {
            message: "no JSON object in answer".into(),
        });
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| OracleError::Malformed {
        message: e.to_string(),
    })
}

fn as_bool(v: &serde_json::Value) -> OracleResult<bool> {
    match v {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" => Ok(false),
            other => Err(OracleError::Malformed {
                message: format!("expected a boolean, got {other:?}"),
            }),
        },
        other => Err(OracleError::Malformed {
            message: format!("expected a boolean, got {other}"),
        }),
    }
}

fn as_price(v: &serde_json::Value) -> OracleResult<f64> {
    let price = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s
            .trim()
            .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
            .parse()
            .ok(),
        _ => None,
    };
    price
        .filter(|p: &f64| p.is_finite())
        .ok_or_else(|| OracleError::Malformed {
            message: format!("expected a price, got {v}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_wrapped_in_prose() {
        let text = "Sure! Here is the answer:\n```json\n{\"category\": \"store\", \
                    \"description\": \"Discount supermarket\", \"sells_target\": true, \
                    \"estimated_price\": 2.5}\n```";
        let a = parse_analysis(text).unwrap();
        assert_eq!(a.category, EntityCategory::Store);
        assert!(a.sells_target);
        assert_eq!(a.estimated_price, Some(2.5));
        assert_eq!(a.description, "Discount supermarket");
    }

    #[test]
    fn accepts_legacy_keys() {
        let a = parse_analysis(r#"{"type": "Coffee shop", "sells_milk": false, "estimated_price": 0.0}"#)
            .unwrap();
        assert_eq!(a.category, EntityCategory::Irrelevant);
        assert!(!a.sells_target);
        assert_eq!(a.estimated_price, None);

        let b = parse_analysis(r#"{"type": "Supermarket", "sells_milk": "yes", "price": "3.5 NIS"}"#)
            .unwrap();
        assert_eq!(b.category, EntityCategory::Store);
        assert_eq!(b.estimated_price, Some(3.5));
    }

    #[test]
    fn rejects_inconsistent_answers() {
        assert!(matches!(
            parse_analysis(r#"{"category": "obstacle", "sells_target": true, "estimated_price": 2}"#),
            Err(OracleError::Implausible { .. })
        ));
        assert!(matches!(
            parse_analysis(r#"{"category": "store", "sells_target": true}"#),
            Err(OracleError::MissingField { .. })
        ));
        assert!(matches!(
            parse_analysis(r#"{"category": "store", "sells_target": true, "estimated_price": -1}"#),
            Err(OracleError::Implausible { .. })
        ));
        assert!(matches!(
            parse_analysis(r#"{"category": "spaceship", "sells_target": false}"#),
            Err(OracleError::Malformed { .. })
        ));
        assert!(matches!(parse_analysis("I think it is a shop."), Err(OracleError::Malformed { .. })));
    }

    #[test]
    fn parses_advice() {
        let a = parse_advice(r#"{"replan_needed": true, "reasoning": "cheaper and close"}"#).unwrap();
        assert!(a.replan_needed);
        assert_eq!(a.reasoning, "cheaper and close");
        assert!(parse_advice(r#"{"reasoning": "hmm"}"#).is_err());
        assert!(parse_advice(r#"{"replan_needed": 3}"#).is_err());
    }
}
