use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    OverlappingRegion,
    DependencyCycle,
    LogicalContradiction,
}

impl ConflictKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictKind::OverlappingRegion => "overlapping_region",
            ConflictKind::DependencyCycle => "dependency_cycle",
            ConflictKind::LogicalContradiction => "logical_contradiction",
        }
    }
}

/// An unordered pair of mutually incompatible refactorings.
///
/// Stored with `a < b` so equal pairs compare equal regardless of input order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Conflict {
    pub a: String,
    pub b: String,
    pub kind: ConflictKind,
}

impl Conflict {
    pub fn new(x: impl Into<String>, y: impl Into<String>, kind: ConflictKind) -> Self {
        let (x, y) = (x.into(), y.into());
        if x <= y {
            Self { a: x, b: y, kind }
        } else {
            Self { a: y, b: x, kind }
        }
    }

    pub fn involves(&self, id: &str) -> bool {
        self.a == id || self.b == id
    }

    pub fn other(&self, id: &str) -> Option<&str> {
        if self.a == id {
            Some(&self.b)
        } else if self.b == id {
            Some(&self.a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_normalized() {
        let c1 = Conflict::new("b", "a", ConflictKind::OverlappingRegion);
        let c2 = Conflict::new("a", "b", ConflictKind::OverlappingRegion);
        assert_eq!(c1, c2);
        assert_eq!(c1.a, "a");
        assert_eq!(c1.other("a"), Some("b"));
        assert_eq!(c1.other("z"), None);
        assert!(c1.involves("b"));
    }
}
