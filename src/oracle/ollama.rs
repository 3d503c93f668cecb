//! Ollama-backed oracle.
//!
//! Prompts ask for a single JSON object and set Ollama's `format: "json"`
//! mode; the reply still goes through the tolerant parsers in the parent
//! module, since models do not always honour either.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{
    AdviceQuery, AnalysisQuery, Oracle, OracleError, OracleResult, ReplanAdvice, StoreAnalysis,
    parse_advice, parse_analysis,
};

const SYSTEM_PROMPT: &str = "You are the perception module of a shopping robot. \
You know local retail chains and their typical prices. \
Answer with a single JSON object and nothing else.";

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "llama3.2".into()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Configuration for the Ollama backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name to use.
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Oracle that asks a local language model.
pub struct OllamaOracle {
    config: OllamaConfig,
    available: bool,
}

impl OllamaOracle {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            available: false,
        }
    }

    /// Check that the server answers on `/api/tags`.
    pub fn check_connection(&mut self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        self.available = matches!(agent.get(&url).call(), Ok(resp) if resp.status() == 200);
        if !self.available {
            tracing::warn!(url = %self.config.base_url, "ollama not reachable");
        }
        self.available
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    fn generate(&self, prompt: &str) -> OracleResult<String> {
        if !self.available {
            return Err(OracleError::Unavailable {
                url: self.config.base_url.clone(),
            });
        }

        let url = format!("{}/api/generate", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build();

        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "system": SYSTEM_PROMPT,
            "format": "json",
            "stream": false,
            "options": { "temperature": 0.0 },
        });

        let resp = agent.post(&url).send_json(body).map_err(|e| match e {
            ureq::Error::Transport(t) if is_timeout(&t) => OracleError::Timeout {
                timeout_secs: self.config.timeout_secs,
            },
            other => OracleError::RequestFailed {
                message: other.to_string(),
            },
        })?;

        let json: serde_json::Value = resp.into_json().map_err(|e| OracleError::Malformed {
            message: e.to_string(),
        })?;
        json["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleError::MissingField {
                field: "response".into(),
            })
    }
}

/// Only a read or connect deadline counts as a timeout; resets, refusals and
/// other I/O failures are plain request failures.
fn is_timeout(transport: &ureq::Transport) -> bool {
    if transport.kind() != ureq::ErrorKind::Io {
        return false;
    }
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
}

impl Oracle for OllamaOracle {
    fn name(&self) -> &str {
        "ollama"
    }

    fn analyze(&mut self, query: &AnalysisQuery) -> OracleResult<StoreAnalysis> {
        let prompt = format!(
            "You pass by a place labeled \"{name}\".\n\
             1. What is it? Classify it as \"store\", \"obstacle\" (blocks the road) or \
             \"irrelevant\" (anything else).\n\
             2. Does it sell {item}?\n\
             3. If it sells {item}, estimate the price. The usual price is {baseline:.2}.\n\
             Respond as JSON: {{\"category\": \"store|obstacle|irrelevant\", \
             \"description\": \"short description\", \"sells_target\": true|false, \
             \"estimated_price\": number or null}}",
            name = query.name,
            item = query.item,
            baseline = query.baseline_price,
        );
        let reply = self.generate(&prompt)?;
        tracing::debug!(name = %query.name, reply = %reply, "ollama analysis");
        parse_analysis(&reply)
    }

    fn advise(&mut self, query: &AdviceQuery) -> OracleResult<ReplanAdvice> {
        let detour = query
            .detour_distance
            .map_or_else(|| "unknown (no known path)".to_string(), |d| format!("{d} steps"));
        let prompt = format!(
            "You are heading to buy {item} for {baseline:.2}; {remaining} actions remain.\n\
             New option: {name} ({description}), estimated price {price:.2}.\n\
             Detour distance: {detour}.\n\
             Should you abandon the current plan and go to the new store?\n\
             Respond as JSON: {{\"replan_needed\": true|false, \"reasoning\": \"one sentence\"}}",
            item = query.item,
            baseline = query.baseline_price,
            remaining = query.plan_cost,
            name = query.name,
            description = query.description,
            price = query.estimated_price,
        );
        let reply = self.generate(&prompt)?;
        tracing::debug!(name = %query.name, reply = %reply, "ollama advice");
        parse_advice(&reply)
    }
}
