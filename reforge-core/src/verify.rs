//! Verification rules applied to a test runner result.

use reforge_types::verification::{FailingTest, TestOrigin, VerificationResult};
use std::collections::BTreeSet;
use thiserror::Error;

/// Failures and compiler errors present on the tree a refactoring starts
/// from. Starts as the untouched tree and moves with the head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    pub failing_tests: BTreeSet<String>,
    pub compiler_errors: BTreeSet<String>,
}

impl Baseline {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_result(result: &VerificationResult) -> Self {
        Self {
            failing_tests: result
                .failing_pre_existing()
                .map(|t| t.name.clone())
                .collect(),
            compiler_errors: result.compiler_errors.iter().cloned().collect(),
        }
    }

    /// Failures present in both baselines.
    pub fn intersection(&self, other: &Baseline) -> Baseline {
        Baseline {
            failing_tests: self
                .failing_tests
                .intersection(&other.failing_tests)
                .cloned()
                .collect(),
            compiler_errors: self
                .compiler_errors
                .intersection(&other.compiler_errors)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{reason}")]
pub struct VerificationFailure {
    pub reason: String,
    pub failing_tests: Vec<FailingTest>,
}

/// Accepts a result iff no pre-existing test regressed, no new compiler
/// error appeared, and generated tests (when they ran) meet `floor`.
pub fn evaluate(
    baseline: &Baseline,
    result: &VerificationResult,
    floor: f64,
) -> Result<(), VerificationFailure> {
    let regressed: Vec<FailingTest> = result
        .failing_pre_existing()
        .filter(|t| !baseline.failing_tests.contains(&t.name))
        .cloned()
        .collect();
    if !regressed.is_empty() {
        let names: Vec<&str> = regressed.iter().map(|t| t.name.as_str()).collect();
        return Err(VerificationFailure {
            reason: format!(
                "{} pre-existing test(s) regressed: {}",
                regressed.len(),
                names.join(", ")
            ),
            failing_tests: regressed,
        });
    }

    let new_errors: Vec<&str> = result
        .compiler_errors
        .iter()
        .filter(|e| !baseline.compiler_errors.contains(*e))
        .map(String::as_str)
        .collect();
    if !new_errors.is_empty() {
        return Err(VerificationFailure {
            reason: format!(
                "{} new compiler error(s): {}",
                new_errors.len(),
                new_errors.join("; ")
            ),
            failing_tests: vec![],
        });
    }

    let generated_failures: Vec<FailingTest> = result
        .failing_tests
        .iter()
        .filter(|t| t.origin == TestOrigin::Generated)
        .cloned()
        .collect();
    match result.generated_test_pass_rate {
        Some(rate) if !rate.is_finite() || rate < floor => {
            return Err(VerificationFailure {
                reason: format!("generated test pass rate {rate:.3} below floor {floor:.3}"),
                failing_tests: generated_failures,
            });
        }
        None if !generated_failures.is_empty() => {
            return Err(VerificationFailure {
                reason: format!(
                    "{} generated test(s) failed and no pass rate was reported",
                    generated_failures.len()
                ),
                failing_tests: generated_failures,
            });
        }
        _ => {}
    }

    if !result.passed && result.failing_tests.is_empty() && result.compiler_errors.is_empty() {
        return Err(VerificationFailure {
            reason: "runner reported failure without any failing test or compiler error"
                .to_string(),
            failing_tests: vec![],
        });
    }

    Ok(())
}
