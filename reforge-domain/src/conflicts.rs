use reforge_types::conflict::{Conflict, ConflictKind};
use reforge_types::refactoring::{Refactoring, RefactoringKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// How two refactorings must relate for a contradiction rule to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Both name the same target symbol.
    SameSymbol,
    /// One target location lies within the other.
    Containment,
    SameSymbolOrContainment,
}

impl Relation {
    fn holds(self, x: &Refactoring, y: &Refactoring) -> bool {
        match self {
            Relation::SameSymbol => same_symbol(x, y),
            Relation::Containment => contained(x, y),
            Relation::SameSymbolOrContainment => same_symbol(x, y) || contained(x, y),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Relation::SameSymbol => "same symbol",
            Relation::Containment => "containment",
            Relation::SameSymbolOrContainment => "same symbol or containment",
        }
    }
}

fn same_symbol(x: &Refactoring, y: &Refactoring) -> bool {
    match (&x.target_location.symbol, &y.target_location.symbol) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn contained(x: &Refactoring, y: &Refactoring) -> bool {
    x.target_location.contains(&y.target_location) || y.target_location.contains(&x.target_location)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "match", content = "kind")]
pub enum KindMatch {
    Kind(RefactoringKind),
    Any,
}

impl KindMatch {
    fn matches(self, kind: RefactoringKind) -> bool {
        match self {
            KindMatch::Kind(k) => k == kind,
            KindMatch::Any => true,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            KindMatch::Kind(k) => k.as_str(),
            KindMatch::Any => "any",
        }
    }
}

/// Unordered kind pair plus the relation that makes them contradict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContradictionRule {
    pub first: RefactoringKind,
    pub second: KindMatch,
    pub relation: Relation,
}

impl ContradictionRule {
    pub fn new(first: RefactoringKind, second: KindMatch, relation: Relation) -> Self {
        Self {
            first,
            second,
            relation,
        }
    }

    fn applies(&self, x: &Refactoring, y: &Refactoring) -> bool {
        let kinds = (x.kind == self.first && self.second.matches(y.kind))
            || (y.kind == self.first && self.second.matches(x.kind));
        kinds && self.relation.holds(x, y)
    }
}

#[derive(Debug, Clone)]
pub struct ContradictionRules {
    rules: Vec<ContradictionRule>,
}

impl Default for ContradictionRules {
    fn default() -> Self {
        use KindMatch::{Any, Kind};
        use RefactoringKind::*;
        use Relation::*;

        let rules = vec![
            ContradictionRule::new(ExtractMethod, Kind(MoveMethod), SameSymbolOrContainment),
            ContradictionRule::new(ExtractMethod, Kind(InlineMethod), SameSymbolOrContainment),
            ContradictionRule::new(InlineMethod, Kind(RenameMethod), SameSymbol),
            ContradictionRule::new(InlineMethod, Kind(MoveMethod), SameSymbol),
            ContradictionRule::new(InlineMethod, Kind(ChangeSignature), SameSymbol),
            ContradictionRule::new(MoveClass, Kind(ExtractClass), SameSymbol),
            ContradictionRule::new(RenameClass, Kind(MoveClass), SameSymbol),
            ContradictionRule::new(PullUpMethod, Kind(PushDownMethod), SameSymbol),
            ContradictionRule::new(ExtractVariable, Kind(InlineVariable), SameSymbolOrContainment),
            ContradictionRule::new(RemoveDeadCode, Any, Containment),
        ];
        Self { rules }
    }
}

impl ContradictionRules {
    pub fn empty() -> Self {
        Self { rules: vec![] }
    }

    pub fn with_rule(mut self, rule: ContradictionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[ContradictionRule] {
        &self.rules
    }

    pub fn contradicts(&self, x: &Refactoring, y: &Refactoring) -> bool {
        self.rules.iter().any(|r| r.applies(x, y))
    }
}

/// Undirected conflict graph over candidate ids.
#[derive(Debug, Clone, Default)]
pub struct ConflictGraph {
    adjacency: BTreeMap<String, BTreeMap<String, ConflictKind>>,
    conflicts: Vec<Conflict>,
}

impl ConflictGraph {
    fn add(&mut self, conflict: Conflict) {
        self.adjacency
            .entry(conflict.a.clone())
            .or_default()
            .insert(conflict.b.clone(), conflict.kind);
        self.adjacency
            .entry(conflict.b.clone())
            .or_default()
            .insert(conflict.a.clone(), conflict.kind);
        self.conflicts.push(conflict);
    }

    pub fn conflicts_with(&self, a: &str, b: &str) -> bool {
        self.adjacency.get(a).is_some_and(|n| n.contains_key(b))
    }

    pub fn kind_between(&self, a: &str, b: &str) -> Option<ConflictKind> {
        self.adjacency.get(a).and_then(|n| n.get(b)).copied()
    }

    pub fn neighbors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(id)
            .into_iter()
            .flat_map(|n| n.keys().map(String::as_str))
    }

    /// Conflicts sorted by `(a, b)`.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    rules: ContradictionRules,
}

impl ConflictDetector {
    pub fn new(rules: ContradictionRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ContradictionRules {
        &self.rules
    }

    /// Pairwise classification. Overlap wins when both overlap and a
    /// contradiction rule hold.
    pub fn classify(&self, x: &Refactoring, y: &Refactoring) -> Option<ConflictKind> {
        if x.target_location.overlaps(&y.target_location) {
            Some(ConflictKind::OverlappingRegion)
        } else if self.rules.contradicts(x, y) {
            Some(ConflictKind::LogicalContradiction)
        } else {
            None
        }
    }

    /// Builds the conflict graph. Callers exclude dependency-cycle members first.
    pub fn detect(&self, candidates: &[&Refactoring]) -> ConflictGraph {
        let mut sorted: Vec<&Refactoring> = candidates.to_vec();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let mut graph = ConflictGraph::default();
        for (i, x) in sorted.iter().enumerate() {
            for y in &sorted[i + 1..] {
                if let Some(kind) = self.classify(x, y) {
                    graph.add(Conflict::new(x.id.clone(), y.id.clone(), kind));
                }
            }
        }
        graph
    }
}

/// A set of refactorings whose dependencies loop back on themselves.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("dependency cycle among: {}", .members.join(", "))]
pub struct DependencyCycleError {
    /// Sorted ids of the strongly connected component.
    pub members: Vec<String>,
}

/// Finds every dependency cycle among `candidates` (Tarjan's SCC).
///
/// Dependencies pointing outside the candidate set are ignored here.
pub fn find_cycles(candidates: &[&Refactoring]) -> Vec<DependencyCycleError> {
    let graph: BTreeMap<&str, Vec<&str>> = candidates
        .iter()
        .map(|r| (r.id.as_str(), r.dependencies.iter().map(String::as_str).collect()))
        .collect();

    let mut state = Tarjan {
        graph: &graph,
        index: 0,
        indices: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        out: Vec::new(),
    };
    for node in graph.keys() {
        if !state.indices.contains_key(node) {
            state.visit(*node);
        }
    }

    let mut cycles: Vec<DependencyCycleError> = state
        .out
        .into_iter()
        .filter(|scc| {
            scc.len() > 1
                || graph
                    .get(scc[0].as_str())
                    .is_some_and(|deps| deps.contains(&scc[0].as_str()))
        })
        .map(|mut members| {
            members.sort();
            DependencyCycleError { members }
        })
        .collect();
    cycles.sort_by(|a, b| a.members.cmp(&b.members));
    cycles
}

struct Tarjan<'g> {
    graph: &'g BTreeMap<&'g str, Vec<&'g str>>,
    index: usize,
    indices: BTreeMap<&'g str, usize>,
    lowlink: BTreeMap<&'g str, usize>,
    stack: Vec<&'g str>,
    on_stack: BTreeSet<&'g str>,
    out: Vec<Vec<String>>,
}

impl<'g> Tarjan<'g> {
    fn visit(&mut self, v: &'g str) {
        self.indices.insert(v, self.index);
        self.lowlink.insert(v, self.index);
        self.index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        let graph = self.graph;
        for &w in graph.get(v).map(Vec::as_slice).unwrap_or(&[]) {
            if !graph.contains_key(w) {
                continue;
            }
            if !self.indices.contains_key(w) {
                self.visit(w);
                let low = self.lowlink[v].min(self.lowlink[w]);
                self.lowlink.insert(v, low);
            } else if self.on_stack.contains(w) {
                let low = self.lowlink[v].min(self.indices[w]);
                self.lowlink.insert(v, low);
            }
        }

        if self.lowlink[v] == self.indices[v] {
            let mut scc = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(w);
                scc.push(w.to_string());
                if w == v {
                    break;
                }
            }
            self.out.push(scc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_types::location::Location;

    fn make(id: &str, kind: RefactoringKind, loc: Location) -> Refactoring {
        Refactoring::new(id, kind, "i1", loc).with_scores(0.5, 1, 0.1)
    }

    #[test]
    fn overlapping_regions_conflict_regardless_of_kind() {
        let a = make(
            "a",
            RefactoringKind::RenameVariable,
            Location::lines("x.py", 10, 19),
        );
        let b = make(
            "b",
            RefactoringKind::SimplifyConditional,
            Location::lines("x.py", 15, 24),
        );
        let graph = ConflictDetector::default().detect(&[&a, &b]);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.conflicts()[0].kind, ConflictKind::OverlappingRegion);
        assert!(graph.conflicts_with("b", "a"));
    }

    #[test]
    fn same_symbol_in_different_files_is_a_contradiction() {
        let a = make(
            "a",
            RefactoringKind::InlineMethod,
            Location::lines("x.py", 10, 19).with_symbol("Foo.bar"),
        );
        let b = make(
            "b",
            RefactoringKind::RenameMethod,
            Location::lines("y.py", 40, 41).with_symbol("Foo.bar"),
        );
        let detector = ConflictDetector::default();
        assert_eq!(
            detector.classify(&a, &b),
            Some(ConflictKind::LogicalContradiction)
        );
        assert_eq!(
            detector.classify(&b, &a),
            Some(ConflictKind::LogicalContradiction)
        );
    }

    #[test]
    fn unrelated_kinds_with_same_symbol_do_not_conflict() {
        let a = make(
            "a",
            RefactoringKind::RenameVariable,
            Location::lines("x.py", 10, 19).with_symbol("n"),
        );
        let b = make(
            "b",
            RefactoringKind::ReplaceMagicNumber,
            Location::lines("y.py", 40, 41).with_symbol("n"),
        );
        assert_eq!(ConflictDetector::default().classify(&a, &b), None);
    }

    #[test]
    fn custom_rule_extends_table() {
        let a = make(
            "a",
            RefactoringKind::Rename,
            Location::lines("x.py", 1, 2).with_symbol("s"),
        );
        let b = make(
            "b",
            RefactoringKind::ExtractInterface,
            Location::lines("y.py", 1, 2).with_symbol("s"),
        );
        assert_eq!(ConflictDetector::default().classify(&a, &b), None);

        let rules = ContradictionRules::default().with_rule(ContradictionRule::new(
            RefactoringKind::ExtractInterface,
            KindMatch::Kind(RefactoringKind::Rename),
            Relation::SameSymbol,
        ));
        assert_eq!(
            ConflictDetector::new(rules).classify(&a, &b),
            Some(ConflictKind::LogicalContradiction)
        );
    }

    #[test]
    fn finds_cycle_members_only() {
        let a = make("a", RefactoringKind::Rename, Location::lines("a.py", 1, 1)).depends_on("b");
        let b = make("b", RefactoringKind::Rename, Location::lines("b.py", 1, 1)).depends_on("c");
        let c = make("c", RefactoringKind::Rename, Location::lines("c.py", 1, 1)).depends_on("a");
        let d = make("d", RefactoringKind::Rename, Location::lines("d.py", 1, 1)).depends_on("a");
        let e = make("e", RefactoringKind::Rename, Location::lines("e.py", 1, 1));

        let cycles = find_cycles(&[&d, &c, &b, &a, &e]);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].members, vec!["a", "b", "c"]);
        assert_eq!(cycles[0].to_string(), "dependency cycle among: a, b, c");
    }

    #[test]
    fn dangling_dependencies_are_not_cycles() {
        let a = make("a", RefactoringKind::Rename, Location::lines("a.py", 1, 1))
            .depends_on("missing");
        assert!(find_cycles(&[&a]).is_empty());
    }
}
