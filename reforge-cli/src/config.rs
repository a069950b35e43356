//! Configuration file loading for reforge.
//!
//! Discovers and loads `reforge.toml` from the repository root.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use reforge_core::adapters::CommandSpec;
use reforge_core::settings::DEFAULT_BACKUP_SUFFIX;
use reforge_types::policy::{RiskTolerance, RunConfig, ScoreWeights};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "reforge.toml";

/// Top-level configuration from reforge.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReforgeConfig {
    pub run: RunSection,

    /// Scorer weights; `[scorer.per_kind.<kind>]` overrides per refactoring kind.
    pub scorer: ScoreWeights,

    pub verification: VerificationSection,
    pub executor: ExecutorSection,
    pub backups: BackupsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub time_budget_minutes: Option<u64>,
    pub risk_tolerance: Option<RiskTolerance>,
    pub max_refactorings: Option<u64>,
    pub max_parallel: Option<usize>,
}

/// Test runner settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerificationSection {
    /// argv of the test runner command.
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub pass_rate_floor: Option<f64>,
    pub timeout_secs: Option<u64>,
}

/// Transform executor settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// argv of the transform command.
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
}

/// Backups section of the config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackupsConfig {
    /// Whether to back up files before writing them back.
    pub enabled: bool,

    /// Suffix for backup files.
    pub suffix: String,
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
        }
    }
}

/// Discover the reforge.toml config file in the repository root.
pub fn discover_config(repo_root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = repo_root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!(path = %config_path, "found config file");
        Some(config_path)
    } else {
        debug!(path = %config_path, "no config file");
        None
    }
}

pub fn load_config(path: &Utf8Path) -> anyhow::Result<ReforgeConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<ReforgeConfig> {
    let config: ReforgeConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from repo root, or return default if not found.
pub fn load_or_default(repo_root: &Utf8Path) -> anyhow::Result<ReforgeConfig> {
    match discover_config(repo_root) {
        Some(path) => load_config(&path),
        None => Ok(ReforgeConfig::default()),
    }
}

/// Values given on the command line. `None` and empty mean "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub time_budget_minutes: Option<u64>,
    pub risk_tolerance: Option<RiskTolerance>,
    pub max_refactorings: Option<u64>,
    pub max_parallel: Option<usize>,
    pub pass_rate_floor: Option<f64>,
    pub executor_timeout_secs: Option<u64>,
    pub runner_timeout_secs: Option<u64>,
    pub executor: Vec<String>,
    pub runner: Vec<String>,
    pub no_backups: bool,
}

/// Configuration combining config file and CLI arguments.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub run: RunConfig,
    pub executor: CommandSpec,
    pub runner: CommandSpec,
    pub backups: BackupsConfig,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: ReforgeConfig,
}

impl ConfigMerger {
    pub fn new(config: ReforgeConfig) -> Self {
        Self { config }
    }

    /// CLI values win; anything neither side sets keeps the `RunConfig`
    /// default.
    pub fn merge(self, cli: &CliOverrides) -> MergedConfig {
        let defaults = RunConfig::default();
        let ReforgeConfig {
            run,
            scorer,
            verification,
            executor,
            mut backups,
        } = self.config;

        let config = RunConfig {
            time_budget_minutes: cli
                .time_budget_minutes
                .or(run.time_budget_minutes)
                .unwrap_or(defaults.time_budget_minutes),
            risk_tolerance: cli
                .risk_tolerance
                .or(run.risk_tolerance)
                .unwrap_or(defaults.risk_tolerance),
            max_refactorings: cli.max_refactorings.or(run.max_refactorings),
            scorer_weights: scorer,
            pass_rate_floor: cli
                .pass_rate_floor
                .or(verification.pass_rate_floor)
                .unwrap_or(defaults.pass_rate_floor),
            executor_timeout_secs: cli
                .executor_timeout_secs
                .or(executor.timeout_secs)
                .unwrap_or(defaults.executor_timeout_secs),
            runner_timeout_secs: cli
                .runner_timeout_secs
                .or(verification.timeout_secs)
                .unwrap_or(defaults.runner_timeout_secs),
            max_parallel: cli
                .max_parallel
                .or(run.max_parallel)
                .unwrap_or(defaults.max_parallel),
        };

        let executor = command_spec(&cli.executor, executor.command, executor.env);
        let runner = command_spec(&cli.runner, verification.command, verification.env);

        if cli.no_backups {
            backups.enabled = false;
        }

        MergedConfig {
            run: config,
            executor,
            runner,
            backups,
        }
    }
}

fn command_spec(
    cli_argv: &[String],
    file_argv: Vec<String>,
    env: BTreeMap<String, String>,
) -> CommandSpec {
    let argv = if cli_argv.is_empty() {
        file_argv
    } else {
        cli_argv.to_vec()
    };
    CommandSpec { argv, env }
}

/// Splits a command line given as one flag value on whitespace.
pub fn split_command(command: Option<&str>) -> Vec<String> {
    command
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reforge_types::refactoring::RefactoringKind;
    use tempfile::TempDir;

    const EXAMPLE: &str = r#"
[run]
time_budget_minutes = 90
risk_tolerance = "low"
max_parallel = 4

[scorer]
impact = 2.0
effort = 1

[scorer.per_kind.remove_dead_code]
risk = 0.0

[verification]
command = ["pytest", "--json-report"]
pass_rate_floor = 0.9

[executor]
command = ["python", "tools/transform.py"]
timeout_secs = 120

[executor.env]
TRANSFORM_MODE = "strict"

[backups]
enabled = false
"#;

    #[test]
    fn parses_every_section() {
        let config = parse_config(EXAMPLE).unwrap();
        assert_eq!(config.run.time_budget_minutes, Some(90));
        assert_eq!(config.run.risk_tolerance, Some(RiskTolerance::Low));
        assert_eq!(config.scorer.base.impact, 2.0);
        assert_eq!(config.scorer.base.effort, 1.0);
        assert_eq!(
            config
                .scorer
                .for_kind(RefactoringKind::RemoveDeadCode)
                .risk,
            0.0
        );
        assert_eq!(config.verification.command, vec!["pytest", "--json-report"]);
        assert_eq!(config.executor.timeout_secs, Some(120));
        assert_eq!(config.executor.env["TRANSFORM_MODE"], "strict");
        assert!(!config.backups.enabled);
        assert_eq!(config.backups.suffix, ".reforge.bak");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let merged = ConfigMerger::new(parse_config("").unwrap()).merge(&CliOverrides::default());
        assert_eq!(merged.run, RunConfig::default());
        assert!(merged.executor.argv.is_empty());
        assert!(merged.backups.enabled);
    }

    #[test]
    fn cli_values_win_over_file() {
        let cli = CliOverrides {
            time_budget_minutes: Some(15),
            max_parallel: Some(1),
            runner: vec!["cargo".to_string(), "test".to_string()],
            no_backups: false,
            ..CliOverrides::default()
        };
        let merged = ConfigMerger::new(parse_config(EXAMPLE).unwrap()).merge(&cli);
        assert_eq!(merged.run.time_budget_minutes, 15);
        assert_eq!(merged.run.max_parallel, 1);
        assert_eq!(merged.run.risk_tolerance, RiskTolerance::Low);
        assert_eq!(merged.run.pass_rate_floor, 0.9);
        assert_eq!(merged.run.executor_timeout_secs, 120);
        assert_eq!(merged.runner.argv, vec!["cargo", "test"]);
        assert_eq!(merged.executor.argv, vec!["python", "tools/transform.py"]);
        assert_eq!(merged.executor.env["TRANSFORM_MODE"], "strict");
    }

    #[test]
    fn no_backups_flag_disables_backups() {
        let cli = CliOverrides {
            no_backups: true,
            ..CliOverrides::default()
        };
        let merged = ConfigMerger::new(ReforgeConfig::default()).merge(&cli);
        assert!(!merged.backups.enabled);
    }

    #[test]
    fn rejects_unknown_risk_tolerance() {
        assert!(parse_config("[run]\nrisk_tolerance = \"reckless\"\n").is_err());
    }

    #[test]
    fn discovers_config_in_repo_root() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        assert!(discover_config(&root).is_none());

        fs::write(root.join(CONFIG_FILE_NAME), "[run]\ntime_budget_minutes = 5\n").unwrap();
        let loaded = load_or_default(&root).unwrap();
        assert_eq!(loaded.run.time_budget_minutes, Some(5));
    }

    #[test]
    fn split_command_ignores_extra_whitespace() {
        assert_eq!(
            split_command(Some("  python  tools/t.py ")),
            vec!["python", "tools/t.py"]
        );
        assert!(split_command(None).is_empty());
    }
}
