//! Diagnostic error types for the replanning harness.
//!
//! Subsystems with their own runtime failures (planner, oracle, translator)
//! define their errors next to the code. Setup failures that only occur while
//! building an experiment (configuration and scenario geometry) live here.
//! [`HarnessError`] wraps all of them so the binary can render any failure
//! through miette with its code and help text intact.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::grid::Location;
use crate::oracle::OracleError;
use crate::planner::PlannerError;

/// Top-level error type for the harness.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    #[diagnostic(
        code(replan::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    #[diagnostic(
        code(replan::config::parse),
        help("The config file must be valid TOML. See `replan run --help` for the recognised keys.")
    )]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for `{field}`: {message}")]
    #[diagnostic(
        code(replan::config::invalid_value),
        help("Fix the value in the config file or override it on the command line.")
    )]
    InvalidValue { field: String, message: String },

    #[error("unknown replanning mode \"{value}\"")]
    #[diagnostic(
        code(replan::config::unknown_mode),
        help("Use one of A, B, C, D (or blind, always-replan, oracle-guided, heuristic).")
    )]
    UnknownMode { value: String },
}

// ---------------------------------------------------------------------------
// Scenario errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ScenarioError {
    #[error("unknown scenario \"{id}\"")]
    #[diagnostic(
        code(replan::scenario::not_found),
        help("Run `replan scenarios` to list the built-in scenarios, or pass a TOML file.")
    )]
    NotFound { id: String },

    #[error("failed to read scenario file {path}")]
    #[diagnostic(
        code(replan::scenario::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario file {path}: {message}")]
    #[diagnostic(code(replan::scenario::parse), help("Scenario files must be valid TOML."))]
    Parse { path: PathBuf, message: String },

    #[error("\"{name}\" is placed at {location}, outside the walkable interior")]
    #[diagnostic(
        code(replan::scenario::invalid_placement),
        help("Entities, the start cell and the goal store must lie inside the perimeter walls.")
    )]
    InvalidPlacement { name: String, location: Location },

    #[error("\"{name}\" and \"{other}\" share the cell {location}")]
    #[diagnostic(
        code(replan::scenario::overlap),
        help("Every entity needs a cell of its own.")
    )]
    Overlap {
        name: String,
        other: String,
        location: Location,
    },

    #[error("grid {width}x{height} is too small")]
    #[diagnostic(
        code(replan::scenario::too_small),
        help("Grids need at least a 3x3 extent so the interior is non-empty.")
    )]
    TooSmall { width: i32, height: i32 },

    #[error("wall_density {density} is outside 0.0..={max}")]
    #[diagnostic(
        code(replan::scenario::invalid_density),
        help("`wall_density` is the chance of each free interior cell becoming a wall; keep it at or below {max}.")
    )]
    InvalidDensity { density: f64, max: f64 },

    #[error("goal unreachable after {attempts} wall layouts")]
    #[diagnostic(
        code(replan::scenario::unreachable),
        help("Lower `wall_density` or try another seed.")
    )]
    Unreachable { attempts: u32 },
}

/// Convenience alias for harness results.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub type ScenarioResult<T> = std::result::Result<T, ScenarioError>;
