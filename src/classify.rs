//! Discovery classification with per-name caching and call accounting.

use std::collections::BTreeMap;

use crate::facts::Classification;
use crate::oracle::{AdviceQuery, AnalysisQuery, Oracle, OracleResult, ReplanAdvice};

/// Context shared by every classification of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationContext {
    pub item: String,
    pub baseline_price: f64,
}

/// Wraps an [`Oracle`], caching classifications by entity name.
///
/// A cached name never reaches the oracle again. Oracle failures never
/// escape: analysis degrades to an irrelevant classification and advice
/// degrades to "keep going", with a warning either way.
pub struct DiscoveryClassifier {
    oracle: Box<dyn Oracle>,
    cache: BTreeMap<String, Classification>,
    oracle_calls: u32,
    degraded: u32,
}

impl DiscoveryClassifier {
    pub fn new(oracle: Box<dyn Oracle>) -> Self {
        Self {
            oracle,
            cache: BTreeMap::new(),
            oracle_calls: 0,
            degraded: 0,
        }
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Classify `name`, consulting the oracle only on a cache miss.
    pub fn classify(&mut self, name: &str, context: &ClassificationContext) -> Classification {
        if let Some(hit) = self.cache.get(name) {
            return hit.clone();
        }

        let query = AnalysisQuery {
            name: name.to_string(),
            item: context.item.clone(),
            baseline_price: context.baseline_price,
        };
        let result = self.oracle.analyze(&query);
        self.count(&result);
        let classification = match result {
            Ok(analysis) => analysis.into_classification(),
            Err(e) => {
                self.degraded += 1;
                tracing::warn!(error = %e, name, "classification degraded to irrelevant");
                Classification::irrelevant(format!("unclassified: {e}"))
            }
        };
        tracing::debug!(
            name,
            category = %classification.category,
            sells = classification.sells_target,
            price = ?classification.price,
            "classified"
        );
        self.cache.insert(name.to_string(), classification.clone());
        classification
    }

    /// Ask the oracle whether a detour is worth it. Never cached: the answer
    /// depends on where the agent stands.
    pub fn advise(&mut self, query: &AdviceQuery) -> ReplanAdvice {
        let result = self.oracle.advise(query);
        self.count(&result);
        match result {
            Ok(advice) => advice,
            Err(e) => {
                self.degraded += 1;
                tracing::warn!(error = %e, name = %query.name, "advice degraded to continue");
                ReplanAdvice::keep_going(format!("no advice: {e}"))
            }
        }
    }

    fn count<T>(&mut self, result: &OracleResult<T>) {
        if result.as_ref().err().is_none_or(|e| e.was_sent()) {
            self.oracle_calls += 1;
        }
    }

    pub fn cached(&self, name: &str) -> Option<&Classification> {
        self.cache.get(name)
    }

    /// Queries the oracle backend accepted, answered or not. Queries refused
    /// because the backend is unavailable are not counted.
    pub fn oracle_calls(&self) -> u32 {
        self.oracle_calls
    }

    /// Queries whose answers were replaced by a degraded default.
    pub fn degraded(&self) -> u32 {
        self.degraded
    }
}
