use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use drill_training::{
    builtin_catalogue, AgentPerformanceLedger, ScenarioCatalogue, ScenarioRunResult,
    ScenarioRunner, TaskResult, TrainingConfig, TrainingEvent, TrainingObserver,
};
use tokio::runtime::Runtime;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "trn", version, about = "Scenario-driven agent training simulator")]
struct Cli {
    /// Engine configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Scenario catalogue (TOML); the built-in catalogue when omitted.
    #[arg(long, global = true)]
    catalogue: Option<PathBuf>,
    /// JSON-lines archive of finished runs.
    #[arg(long, global = true, default_value = "DRILL--M/training/logs/history.jsonl")]
    history: PathBuf,
    /// Overrides the configured seed.
    #[arg(long, global = true)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lists available scenarios.
    List,
    /// Runs one scenario.
    Run {
        /// Scenario id.
        scenario: String,
    },
    /// Runs every scenario in catalogue order.
    RunAll,
    /// Shows archived runs, newest first.
    History {
        /// Number of entries to display.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Only runs of this scenario.
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Shows per-agent performance rebuilt from the archive.
    Agents,
}

fn main() -> Result<()> {
    init_tracing(Level::WARN);
    let cli = Cli::parse();
    match &cli.command {
        Commands::List => handle_list(&cli),
        Commands::Run { scenario } => Runtime::new()?.block_on(handle_run(&cli, scenario)),
        Commands::RunAll => Runtime::new()?.block_on(handle_run_all(&cli)),
        Commands::History { limit, scenario } => {
            let runs = read_archive(&cli.history)?;
            let runs = runs
                .iter()
                .rev()
                .filter(|run| scenario.as_ref().map_or(true, |id| &run.scenario_id == id))
                .take(*limit);
            for run in runs {
                println!(
                    "{} | {} | {} | {} tasks | {} failed | {}",
                    run.run_id,
                    run.scenario_id,
                    run_status(run),
                    run.tasks.len(),
                    run.failed_count(),
                    run.ended_at.to_rfc3339()
                );
            }
            Ok(())
        }
        Commands::Agents => {
            let runs = read_archive(&cli.history)?;
            let ledger = AgentPerformanceLedger::replay(&runs);
            if ledger.is_empty() {
                println!("no agent activity recorded in {}", cli.history.display());
            }
            for record in ledger.list() {
                println!(
                    "{} | {} tasks | {:.2}% success | {:.1}s avg | {}",
                    record.agent_id,
                    record.tasks_completed,
                    record.success_rate,
                    record.average_duration_seconds(),
                    record
                        .capabilities
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            Ok(())
        }
    }
}

fn init_tracing(level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

fn load_catalogue(cli: &Cli) -> Result<ScenarioCatalogue> {
    match &cli.catalogue {
        Some(path) => ScenarioCatalogue::load(path),
        None => Ok(builtin_catalogue()),
    }
}

fn load_config(cli: &Cli) -> Result<TrainingConfig> {
    let mut config = match &cli.config {
        Some(path) => TrainingConfig::load(path)?,
        None => TrainingConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.executor.seed = Some(seed);
    }
    Ok(config)
}

fn handle_list(cli: &Cli) -> Result<()> {
    for line in scenario_listing(load_catalogue(cli)?)? {
        println!("{line}");
    }
    Ok(())
}

/// Registers the catalogue first so `list` rejects what `run` would reject.
fn scenario_listing(catalogue: ScenarioCatalogue) -> Result<Vec<String>> {
    let registry = catalogue
        .into_registry()
        .context("registering scenarios")?;
    let mut lines = Vec::new();
    for scenario in registry.list() {
        lines.push(format!(
            "{} | {} | {} | {} tasks | ~{} min",
            scenario.id,
            scenario.name,
            scenario.complexity.label(),
            scenario.tasks.len(),
            scenario.expected_duration_minutes
        ));
        for task in &scenario.tasks {
            lines.push(format!(
                "    {} -> {} ({})",
                task.name,
                task.assigned_agent,
                task.priority.label()
            ));
        }
    }
    Ok(lines)
}

fn build_runner(cli: &Cli) -> Result<ScenarioRunner> {
    let registry = load_catalogue(cli)?
        .into_registry()
        .context("registering scenarios")?;
    let runner = load_config(cli)?
        .runner_builder()?
        .registry(registry)
        .observer(Arc::new(ConsoleObserver))
        .build();
    let token = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling after the current task...");
            token.cancel();
        }
    });
    Ok(runner)
}

async fn handle_run(cli: &Cli, scenario_id: &str) -> Result<()> {
    let runner = build_runner(cli)?;
    let run = runner.run(scenario_id).await?;
    append_archive(&cli.history, &run)?;
    print_summary(&run);
    if !run.success {
        bail!(
            "scenario {} did not finish: {}",
            run.scenario_id,
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn handle_run_all(cli: &Cli) -> Result<()> {
    let runner = build_runner(cli)?;
    let runs = runner.run_all().await;
    for run in &runs {
        append_archive(&cli.history, run)?;
        print_summary(run);
    }
    let finished = runs.iter().filter(|run| run.success).count();
    println!("{finished}/{} scenarios finished", runner.list_scenarios().len());
    if runner.cancellation_token().is_cancelled() {
        bail!("run-all cancelled");
    }
    Ok(())
}

/// Prints task progress as the runner reports it.
struct ConsoleObserver;

impl TrainingObserver for ConsoleObserver {
    fn notify(&self, event: &TrainingEvent) {
        match event {
            TrainingEvent::TaskStarted {
                task_name,
                assigned_agent,
                priority,
                position,
                total,
                ..
            } => println!(
                "[{position}/{total}] {task_name} -> {assigned_agent} ({})",
                priority.label()
            ),
            TrainingEvent::TaskCompleted { result, .. } => print_task(result),
            TrainingEvent::ScenarioCompleted { .. } | TrainingEvent::ScenarioFailed { .. } => {}
        }
    }
}

fn print_task(result: &TaskResult) {
    println!(
        "    {} in {:.1}s: {}",
        result.status.label(),
        result.duration_seconds,
        result.output
    );
    for check in &result.criteria {
        println!("      [{}] {}", if check.passed { "x" } else { " " }, check.criterion);
    }
}

fn print_summary(run: &ScenarioRunResult) {
    println!(
        "{} ({}) {} in {:.2}s: {} completed, {} need additional training",
        run.scenario_name,
        run.run_id,
        run_status(run),
        run.total_duration_seconds,
        run.completed_count(),
        run.failed_count()
    );
    if let Some(error) = &run.error {
        println!("    stopped after {} task(s): {error}", run.tasks.len());
    }
}

const fn run_status(run: &ScenarioRunResult) -> &'static str {
    if run.success {
        "completed"
    } else if run.cancelled {
        "cancelled"
    } else {
        "aborted"
    }
}

fn append_archive(path: &Path, run: &ScenarioRunResult) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening run archive {}", path.display()))?;
    serde_json::to_writer(&mut file, run)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn read_archive(path: &Path) -> Result<Vec<ScenarioRunResult>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut runs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run = serde_json::from_str(&line)
            .with_context(|| format!("{} line {}", path.display(), index + 1))?;
        runs.push(run);
    }
    Ok(runs)
}
