use reforge_types::policy::{RunConfig, Weights};
use thiserror::Error;

/// Run-fatal configuration problems, detected before scheduling.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("time budget must be greater than zero minutes")]
    ZeroBudget,

    /// `scope` is `base` or the refactoring kind whose override is invalid.
    #[error("scorer weight `{name}` for {scope} must be finite and non-negative, got {value}")]
    InvalidWeight {
        name: &'static str,
        scope: String,
        value: f64,
    },

    #[error("pass rate floor must be within [0, 1], got {value}")]
    PassRateFloor { value: f64 },

    #[error("max_parallel must be at least 1")]
    ZeroParallel,

    #[error("{which} timeout must be greater than zero seconds")]
    ZeroTimeout { which: &'static str },
}

pub fn validate_run_config(config: &RunConfig) -> Result<(), ConfigurationError> {
    if config.time_budget_minutes == 0 {
        return Err(ConfigurationError::ZeroBudget);
    }

    check_weights(&config.scorer_weights.base, "base")?;
    for (kind, w) in &config.scorer_weights.per_kind {
        check_weights(w, kind.as_str())?;
    }

    let floor = config.pass_rate_floor;
    if !(floor.is_finite() && (0.0..=1.0).contains(&floor)) {
        return Err(ConfigurationError::PassRateFloor { value: floor });
    }

    if config.max_parallel == 0 {
        return Err(ConfigurationError::ZeroParallel);
    }

    if config.executor_timeout_secs == 0 {
        return Err(ConfigurationError::ZeroTimeout { which: "executor" });
    }
    if config.runner_timeout_secs == 0 {
        return Err(ConfigurationError::ZeroTimeout { which: "runner" });
    }

    Ok(())
}

fn check_weights(w: &Weights, scope: &str) -> Result<(), ConfigurationError> {
    for (name, value) in w.iter() {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigurationError::InvalidWeight {
                name,
                scope: scope.to_string(),
                value,
            });
        }
    }
    Ok(())
}
