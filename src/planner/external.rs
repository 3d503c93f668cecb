//! Process-backed planner: Fast Downward (or anything with its command line).
//!
//! Each invocation gets a fresh temporary directory holding `domain.pddl` and
//! `problem.pddl`. The planner runs with that directory as its working
//! directory, so its `sas_plan` lands there too. Output goes to files rather
//! than pipes, so a chatty planner can never block on a full pipe buffer.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::facts::ProblemSnapshot;
use crate::plan::PlanAction;

use super::pddl;
use super::{Planner, PlannerError, PlannerResult};

/// Exit codes Fast Downward uses to report a proven or assumed unsolvable task.
const UNSOLVABLE_EXIT_CODES: std::ops::RangeInclusive<i32> = 10..=12;

/// How much of the planner's stderr to keep in error messages.
const STDERR_TAIL: usize = 2048;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn default_path() -> PathBuf {
    PathBuf::from("fast-downward.py")
}

fn default_search() -> String {
    "astar(lmcut())".into()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Configuration for [`FastDownwardPlanner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastDownwardConfig {
    /// Planner driver executable.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Value passed to `--search`.
    #[serde(default = "default_search")]
    pub search: String,
    /// Hard wall-clock limit per invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FastDownwardConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            search: default_search(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Runs an external classical planner on rendered PDDL.
pub struct FastDownwardPlanner {
    config: FastDownwardConfig,
}

impl FastDownwardPlanner {
    pub fn new(config: FastDownwardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FastDownwardConfig {
        &self.config
    }

    fn run_in(&self, dir: &Path, snapshot: &ProblemSnapshot) -> PlannerResult<Vec<PlanAction>> {
        let io = |e: std::io::Error| PlannerError::Io {
            message: e.to_string(),
        };

        let domain = dir.join("domain.pddl");
        let problem = dir.join("problem.pddl");
        std::fs::write(&domain, pddl::DOMAIN).map_err(io)?;
        std::fs::write(&problem, pddl::render_problem(snapshot)).map_err(io)?;

        let stdout = File::create(dir.join("planner.out")).map_err(io)?;
        let stderr_path = dir.join("planner.err");
        let stderr = File::create(&stderr_path).map_err(io)?;

        let mut child = Command::new(&self.config.path)
            .current_dir(dir)
            .arg(&domain)
            .arg(&problem)
            .arg("--search")
            .arg(&self.config.search)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| PlannerError::Spawn {
                path: self.config.path.display().to_string(),
                message: e.to_string(),
            })?;

        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PlannerError::Timeout {
                            timeout_secs: self.config.timeout_secs,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(io(e)),
            }
        };

        match status.code() {
            Some(0) => {}
            Some(code) if UNSOLVABLE_EXIT_CODES.contains(&code) => {
                return Err(PlannerError::Unsolvable { code });
            }
            _ => {
                return Err(PlannerError::Failed {
                    status: status.to_string(),
                    stderr: stderr_tail(&stderr_path),
                });
            }
        }

        let plan_text = match std::fs::read_to_string(dir.join("sas_plan")) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlannerError::NoPlanFile);
            }
            Err(e) => return Err(io(e)),
        };
        pddl::parse_plan(&plan_text, snapshot)
    }
}

impl Planner for FastDownwardPlanner {
    fn name(&self) -> &str {
        "fast-downward"
    }

    fn plan(&mut self, snapshot: &ProblemSnapshot) -> PlannerResult<Vec<PlanAction>> {
        let dir = tempfile::Builder::new()
            .prefix("replan-")
            .tempdir()
            .map_err(|e| PlannerError::Io {
                message: e.to_string(),
            })?;
        tracing::debug!(
            dir = %dir.path().display(),
            revision = snapshot.revision,
            "invoking external planner"
        );
        self.run_in(dir.path(), snapshot)
    }
}

fn stderr_tail(path: &Path) -> String {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
