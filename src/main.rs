//! replan CLI: run discovery-driven replanning experiments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use replan_bench::agent::Experiment;
use replan_bench::config::{OracleConfig, PlannerConfig, RunConfig};
use replan_bench::oracle::{DecisionWeights, OllamaConfig};
use replan_bench::planner::FastDownwardConfig;
use replan_bench::planner::pddl;
use replan_bench::policy::ReplanMode;
use replan_bench::scenario::Scenario;

#[derive(Parser)]
#[command(name = "replan", version, about = "Discovery-driven replanning experiments")]
struct Cli {
    /// Run configuration file (TOML). Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one experiment and print its result as JSON.
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Replanning mode: A, B, C, D (or blind, always-replan, oracle-guided, heuristic).
        #[arg(long)]
        mode: Option<ReplanMode>,

        /// Built-in scenario id or scenario TOML file.
        #[arg(long)]
        scenario: Option<String>,
    },

    /// Run every mode on every listed scenario, one JSON line per run.
    Sweep {
        #[command(flatten)]
        overrides: Overrides,

        /// Scenarios to sweep (comma-separated). Defaults to the whole catalog.
        #[arg(long, value_delimiter = ',')]
        scenarios: Vec<String>,

        /// Modes to sweep (comma-separated). Defaults to A,B,C,D.
        #[arg(long, value_delimiter = ',')]
        modes: Vec<ReplanMode>,

        /// Runs per combination, with seeds `seed..seed+repeat`.
        #[arg(long, default_value = "1")]
        repeat: u64,
    },

    /// List the built-in scenarios.
    Scenarios,

    /// Print the PDDL domain and initial problem for a scenario.
    Problem {
        /// Built-in scenario id or scenario TOML file.
        #[arg(long, default_value = "golden-opportunity")]
        scenario: String,

        /// Seed for random wall placement.
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Print only the problem file.
        #[arg(long)]
        problem_only: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PlannerKind {
    Grid,
    FastDownward,
}

#[derive(Clone, Copy, ValueEnum)]
enum OracleKind {
    Catalog,
    Ollama,
}

#[derive(clap::Args)]
struct Overrides {
    /// Seed for random wall placement.
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum world steps per run.
    #[arg(long)]
    budget: Option<u32>,

    /// Fraction of interior cells turned into walls.
    #[arg(long)]
    wall_density: Option<f64>,

    #[arg(long, value_enum)]
    planner: Option<PlannerKind>,

    /// Planner executable (implies --planner fast-downward).
    #[arg(long)]
    planner_path: Option<PathBuf>,

    #[arg(long, value_enum)]
    oracle: Option<OracleKind>,

    /// Ollama model (implies --oracle ollama).
    #[arg(long)]
    model: Option<String>,
}

impl Overrides {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(budget) = self.budget {
            config.step_budget = budget;
        }

        match (self.planner, &self.planner_path) {
            (Some(PlannerKind::Grid), _) => config.planner = PlannerConfig::Grid,
            (_, Some(path)) => {
                let mut fd = match &config.planner {
                    PlannerConfig::FastDownward(fd) => fd.clone(),
                    PlannerConfig::Grid => FastDownwardConfig::default(),
                };
                fd.path = path.clone();
                config.planner = PlannerConfig::FastDownward(fd);
            }
            (Some(PlannerKind::FastDownward), None) => {
                if !matches!(config.planner, PlannerConfig::FastDownward(_)) {
                    config.planner = PlannerConfig::FastDownward(FastDownwardConfig::default());
                }
            }
            (None, None) => {}
        }

        match (self.oracle, &self.model) {
            (Some(OracleKind::Catalog), _) => {
                config.oracle = OracleConfig::Catalog(DecisionWeights::default());
            }
            (_, Some(model)) => {
                let mut ollama = match &config.oracle {
                    OracleConfig::Ollama(o) => o.clone(),
                    OracleConfig::Catalog(_) => OllamaConfig::default(),
                };
                ollama.model = model.clone();
                config.oracle = OracleConfig::Ollama(ollama);
            }
            (Some(OracleKind::Ollama), None) => {
                if !matches!(config.oracle, OracleConfig::Ollama(_)) {
                    config.oracle = OracleConfig::Ollama(OllamaConfig::default());
                }
            }
            (None, None) => {}
        }
    }

    fn scenario(&self, id_or_path: &str) -> Result<Scenario> {
        let mut scenario = Scenario::resolve(id_or_path)?;
        if let Some(density) = self.wall_density {
            scenario.wall_density = density;
        }
        Ok(scenario)
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let base = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    match cli.command {
        Commands::Run {
            overrides,
            mode,
            scenario,
        } => {
            let mut config = base;
            overrides.apply(&mut config);
            if let Some(mode) = mode {
                config.mode = mode;
            }
            if let Some(scenario) = scenario {
                config.scenario = scenario;
            }
            config.validate()?;

            let scenario = overrides.scenario(&config.scenario)?;
            let result = Experiment::new(config, scenario).run()?;
            println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
        }

        Commands::Sweep {
            overrides,
            scenarios,
            modes,
            repeat,
        } => {
            let mut config = base;
            overrides.apply(&mut config);
            config.validate()?;

            let scenarios = if scenarios.is_empty() {
                Scenario::catalog().into_iter().map(|s| s.id).collect()
            } else {
                scenarios
            };
            let modes = if modes.is_empty() {
                ReplanMode::ALL.to_vec()
            } else {
                modes
            };

            for id in &scenarios {
                let scenario = overrides.scenario(id)?;
                for &mode in &modes {
                    for offset in 0..repeat.max(1) {
                        let run_config = RunConfig {
                            mode,
                            scenario: id.clone(),
                            seed: config.seed + offset,
                            ..config.clone()
                        };
                        let result = Experiment::new(run_config, scenario.clone()).run()?;
                        println!("{}", serde_json::to_string(&result).into_diagnostic()?);
                    }
                }
            }
        }

        Commands::Scenarios => {
            for s in Scenario::catalog() {
                println!(
                    "{:<20} {}x{}  goal {} at {}  {}",
                    s.id, s.width, s.height, s.goal.name, s.goal.location, s.description
                );
            }
        }

        Commands::Problem {
            scenario,
            seed,
            problem_only,
        } => {
            let config = RunConfig {
                scenario: scenario.clone(),
                seed,
                ..base
            };
            let experiment = Experiment::from_config(config)?;
            let layout = experiment.scenario().layout(seed)?;
            let snapshot = experiment.initial_facts(&layout).snapshot_for_planner();
            if !problem_only {
                println!("{}", pddl::DOMAIN);
            }
            print!("{}", pddl::render_problem(&snapshot));
        }
    }

    Ok(())
}
