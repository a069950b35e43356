use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOrigin {
    PreExisting,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailingTest {
    pub name: String,
    pub origin: TestOrigin,
}

impl FailingTest {
    pub fn pre_existing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: TestOrigin::PreExisting,
        }
    }

    pub fn generated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: TestOrigin::Generated,
        }
    }
}

/// Outcome reported by a test runner for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,

    #[serde(default)]
    pub failing_tests: Vec<FailingTest>,

    /// Present only when generated tests ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_test_pass_rate: Option<f64>,

    #[serde(default)]
    pub compiler_errors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_run: Option<u64>,
}

impl VerificationResult {
    pub fn passing() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    pub fn failing_pre_existing(&self) -> impl Iterator<Item = &FailingTest> {
        self.failing_tests
            .iter()
            .filter(|t| t.origin == TestOrigin::PreExisting)
    }
}
