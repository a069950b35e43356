//! Clap-free settings for the plan and run pipelines.

use camino::Utf8PathBuf;
use reforge_types::policy::RunConfig;
use reforge_workspace::LoadOptions;

pub const DEFAULT_BACKUP_SUFFIX: &str = ".reforge.bak";

/// Settings for the plan pipeline.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub repo_root: Utf8PathBuf,
    pub artifacts_dir: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,
    pub run: RunConfig,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            repo_root: Utf8PathBuf::from("."),
            artifacts_dir: Utf8PathBuf::from("artifacts"),
            out_dir: Utf8PathBuf::from("artifacts/reforge"),
            run: RunConfig::default(),
        }
    }
}

/// Settings for the run pipeline.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub repo_root: Utf8PathBuf,
    pub artifacts_dir: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,
    pub run: RunConfig,

    /// Write the final tree back to `repo_root`. Off means dry run.
    pub apply: bool,

    // Backups
    pub backup_enabled: bool,
    pub backup_suffix: String,

    /// Path components never loaded into the initial snapshot.
    pub exclude: Vec<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        let plan = PlanSettings::default();
        Self {
            repo_root: plan.repo_root,
            artifacts_dir: plan.artifacts_dir,
            out_dir: plan.out_dir,
            run: plan.run,
            apply: false,
            backup_enabled: true,
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            exclude: LoadOptions::default().exclude,
        }
    }
}

impl RunSettings {
    pub fn plan_settings(&self) -> PlanSettings {
        PlanSettings {
            repo_root: self.repo_root.clone(),
            artifacts_dir: self.artifacts_dir.clone(),
            out_dir: self.out_dir.clone(),
            run: self.run.clone(),
        }
    }

    /// Load options for the repository snapshot. The artifacts directory is
    /// excluded when it lives inside the repository.
    pub fn load_options(&self) -> LoadOptions {
        let mut exclude = self.exclude.clone();
        let rel = if self.repo_root == "." && self.artifacts_dir.is_relative() {
            Some(self.artifacts_dir.as_path())
        } else {
            self.artifacts_dir.strip_prefix(&self.repo_root).ok()
        };
        if let Some(first) = rel.and_then(|r| r.components().next())
        {
            let first = first.as_str().to_string();
            if !first.is_empty() && first != "." && !exclude.contains(&first) {
                exclude.push(first);
            }
        }
        LoadOptions { exclude }
    }
}
