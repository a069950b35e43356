mod config;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use config::{CliOverrides, ConfigMerger, split_command};
use reforge_core::adapters::{
    CommandTestRunner, CommandTransformExecutor, FsCandidateSource, FsWritePort,
};
use reforge_core::pipeline::{
    run_orchestration, run_plan, write_plan_artifacts, write_run_artifacts,
};
use reforge_core::settings::{PlanSettings, RunSettings};
use reforge_core::supervisor::{Supervisor, SupervisorConfig};
use reforge_domain::{ContradictionRules, Scheduler};
use reforge_types::ToolInfo;
use reforge_types::policy::RiskTolerance;
use reforge_workspace::load_dir;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "reforge",
    version,
    about = "Schedules, applies and verifies detector-proposed refactorings."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a deterministic execution plan from detector candidates.
    Plan(PlanArgs),
    /// Plan, apply and verify refactorings (default: dry-run).
    Run(RunArgs),
    /// List the logical contradiction rules used by conflict detection.
    ListRules(ListRulesArgs),
}

#[derive(Debug, Parser)]
struct PlanArgs {
    /// Repository root (default: current directory).
    #[arg(long, default_value = ".")]
    repo_root: Utf8PathBuf,

    /// Artifacts directory containing `<detector>/candidates.json` (default: <repo_root>/artifacts).
    #[arg(long)]
    artifacts_dir: Option<Utf8PathBuf>,

    /// Output directory for reforge artifacts (default: <artifacts_dir>/reforge).
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,

    /// Time budget in minutes.
    #[arg(long)]
    budget_minutes: Option<u64>,

    /// Highest risk admitted.
    #[arg(long, value_enum)]
    risk_tolerance: Option<RiskArg>,

    /// Maximum number of refactorings admitted.
    #[arg(long)]
    max_refactorings: Option<u64>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Write the verified result back to the repository. If omitted, runs a
    /// dry-run and only emits artifacts.
    #[arg(long, default_value_t = false)]
    apply: bool,

    /// Transform command line, split on whitespace (overrides [executor] command).
    #[arg(long)]
    executor: Option<String>,

    /// Test runner command line, split on whitespace (overrides [verification] command).
    #[arg(long)]
    runner: Option<String>,

    /// Workers per stage.
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Minimum pass rate for generated tests.
    #[arg(long)]
    pass_rate_floor: Option<f64>,

    #[arg(long)]
    executor_timeout_secs: Option<u64>,

    #[arg(long)]
    runner_timeout_secs: Option<u64>,

    /// Do not back up files before writing them back.
    #[arg(long, default_value_t = false)]
    no_backups: bool,
}

#[derive(Debug, Parser)]
struct ListRulesArgs {
    /// Output format (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum RiskArg {
    Low,
    Medium,
    High,
}

impl From<RiskArg> for RiskTolerance {
    fn from(r: RiskArg) -> Self {
        match r {
            RiskArg::Low => RiskTolerance::Low,
            RiskArg::Medium => RiskTolerance::Medium,
            RiskArg::High => RiskTolerance::High,
        }
    }
}

/// Exit code for a run that finished with failed refactorings.
const EXIT_FAILURES: u8 = 2;

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(e) => {
            error!("{:?}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Plan(args) => cmd_plan(args),
        Command::Run(args) => cmd_run(args),
        Command::ListRules(args) => cmd_list_rules(args),
    }
}

struct Paths {
    repo_root: Utf8PathBuf,
    artifacts_dir: Utf8PathBuf,
    out_dir: Utf8PathBuf,
}

impl PlanArgs {
    /// Resolves every path against the current directory.
    fn paths(&self) -> anyhow::Result<Paths> {
        let cwd = std::env::current_dir().context("read current directory")?;
        let cwd = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|p| anyhow::anyhow!("non-utf8 current directory: {}", p.display()))?;
        let absolute = |p: &Utf8PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else if p == "." {
                cwd.clone()
            } else {
                cwd.join(p)
            }
        };

        let repo_root = absolute(&self.repo_root);
        let artifacts_dir = self
            .artifacts_dir
            .as_ref()
            .map(absolute)
            .unwrap_or_else(|| repo_root.join("artifacts"));
        let out_dir = self
            .out_dir
            .as_ref()
            .map(absolute)
            .unwrap_or_else(|| artifacts_dir.join("reforge"));
        Ok(Paths {
            repo_root,
            artifacts_dir,
            out_dir,
        })
    }

    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            time_budget_minutes: self.budget_minutes,
            risk_tolerance: self.risk_tolerance.map(Into::into),
            max_refactorings: self.max_refactorings,
            ..CliOverrides::default()
        }
    }
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<ExitCode> {
    let Paths {
        repo_root,
        artifacts_dir,
        out_dir,
    } = args.paths()?;

    let file_config = config::load_or_default(&repo_root).context("load reforge.toml config")?;
    let merged = ConfigMerger::new(file_config).merge(&args.overrides());
    debug!(
        budget = merged.run.time_budget_minutes,
        risk = merged.run.risk_tolerance.as_str(),
        max_refactorings = ?merged.run.max_refactorings,
        "merged config"
    );

    let settings = PlanSettings {
        repo_root,
        artifacts_dir: artifacts_dir.clone(),
        out_dir: out_dir.clone(),
        run: merged.run,
    };
    let source = FsCandidateSource::new(artifacts_dir);
    let outcome = run_plan(&settings, &source, &Scheduler::default(), tool_info())?;
    for e in &outcome.input_errors {
        warn!(error = %e, "input skipped");
    }

    write_plan_artifacts(&outcome, &out_dir, &FsWritePort)?;
    info!(
        admitted = outcome.plan.summary.admitted,
        excluded = outcome.plan.summary.excluded,
        "wrote plan to {}",
        out_dir
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let Paths {
        repo_root,
        artifacts_dir,
        out_dir,
    } = args.plan.paths()?;

    let overrides = CliOverrides {
        max_parallel: args.max_parallel,
        pass_rate_floor: args.pass_rate_floor,
        executor_timeout_secs: args.executor_timeout_secs,
        runner_timeout_secs: args.runner_timeout_secs,
        executor: split_command(args.executor.as_deref()),
        runner: split_command(args.runner.as_deref()),
        no_backups: args.no_backups,
        ..args.plan.overrides()
    };
    let file_config = config::load_or_default(&repo_root).context("load reforge.toml config")?;
    let merged = ConfigMerger::new(file_config).merge(&overrides);

    if merged.executor.argv.is_empty() {
        anyhow::bail!(
            "no transform executor configured; set [executor] command in reforge.toml or pass --executor"
        );
    }
    if merged.runner.argv.is_empty() {
        anyhow::bail!(
            "no test runner configured; set [verification] command in reforge.toml or pass --runner"
        );
    }

    let settings = RunSettings {
        repo_root: repo_root.clone(),
        artifacts_dir: artifacts_dir.clone(),
        out_dir: out_dir.clone(),
        run: merged.run,
        apply: args.apply,
        backup_enabled: merged.backups.enabled,
        backup_suffix: merged.backups.suffix,
        ..RunSettings::default()
    };
    let initial = load_dir(&repo_root, &settings.load_options())
        .with_context(|| format!("load repository {}", repo_root))?;

    let supervisor = Supervisor::new(
        Arc::new(CommandTransformExecutor::new(merged.executor)),
        Arc::new(CommandTestRunner::new(merged.runner)),
        SupervisorConfig::from(&settings.run),
    );
    let cancel = supervisor.cancellation_token();
    let source = FsCandidateSource::new(artifacts_dir);
    let scheduler = Scheduler::default();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    let outcome = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling run");
                cancel.cancel();
            }
        });
        run_orchestration(
            &settings,
            &source,
            &scheduler,
            &supervisor,
            initial,
            tool_info(),
        )
        .await
    })?;

    write_run_artifacts(&outcome, &out_dir, &FsWritePort)?;
    info!(
        verdict = outcome.record.verdict.as_str(),
        written = outcome.written.len(),
        "wrote run artifacts to {}",
        out_dir
    );

    if outcome.has_failures {
        return Ok(ExitCode::from(EXIT_FAILURES));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_list_rules(args: ListRulesArgs) -> anyhow::Result<ExitCode> {
    let rules = ContradictionRules::default();

    match args.format {
        OutputFormat::Text => {
            println!("Contradiction rules:\n");
            println!("  {:<22} {:<22} RELATION", "KIND", "CONTRADICTS");
            println!("  {:<22} {:<22} --------", "----", "-----------");
            for rule in rules.rules() {
                println!(
                    "  {:<22} {:<22} {}",
                    rule.first.as_str(),
                    rule.second.label(),
                    rule.relation.as_str()
                );
            }
            println!();
            println!("Overlapping regions in the same file always conflict.");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(rules.rules())?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "reforge".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        commit: None,
    }
}
