//! Dependency graph validation and execution planning.
//!
//! Turns the declared dimensions plus their dependency map into an
//! [`ExecutionPlan`]: a topological order partitioned into parallel *groups*
//! (levels). A group contains every dimension whose unmet dependency count
//! reaches zero in the same Kahn round; dimensions inside a group may execute
//! concurrently.

use std::collections::{HashMap, HashSet};

use facet_kernel::{DimensionScope, DimensionSpec, EngineError, EngineResult};
use tracing::debug;

/// The validated execution plan for one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// All dimensions in a valid topological order.
    pub order: Vec<String>,
    /// Topological levels; every dimension appears in exactly one group.
    pub groups: Vec<Vec<String>>,
    /// dimension -> dependency names (normalised: every dimension has a key).
    pub dependencies: HashMap<String, Vec<String>>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Dependencies of one dimension (empty slice when it has none).
    pub fn dependencies_of(&self, dimension: &str) -> &[String] {
        self.dependencies
            .get(dimension)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Render the dependency graph in Graphviz DOT, for debugging.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph dimensions {\n  rankdir=BT;\n  node [shape=box];\n");
        for dimension in &self.order {
            dot.push_str(&format!("  \"{dimension}\";\n"));
        }
        for (dimension, deps) in &self.dependencies {
            for dep in deps {
                dot.push_str(&format!("  \"{dimension}\" -> \"{dep}\";\n"));
            }
        }
        dot.push_str("}\n");
        dot
    }
}

/// Validates dependency declarations and computes execution plans.
pub struct DependencyGraphManager;

impl DependencyGraphManager {
    /// Build the execution plan for `declared` dimensions with the given
    /// dependency map.
    ///
    /// Fails with [`EngineError::DependencyNotFound`] when a name in the map
    /// is not a declared dimension, and [`EngineError::CircularDependency`]
    /// (reporting the cycle path) when the graph has a cycle. Empty input is
    /// a valid empty plan.
    pub fn plan(
        declared: &[DimensionSpec],
        dependencies: &HashMap<String, Vec<String>>,
    ) -> EngineResult<ExecutionPlan> {
        let mut names: Vec<String> = Vec::with_capacity(declared.len());
        let mut seen: HashSet<&str> = HashSet::with_capacity(declared.len());
        for spec in declared {
            if !seen.insert(spec.name.as_str()) {
                return Err(EngineError::validation(format!(
                    "dimension '{}' is declared more than once",
                    spec.name
                )));
            }
            names.push(spec.name.clone());
        }

        // Normalise: every declared dimension gets a dependency entry.
        let mut graph: HashMap<String, Vec<String>> = names
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for (dimension, deps) in dependencies {
            if !seen.contains(dimension.as_str()) {
                return Err(EngineError::DependencyNotFound {
                    dimension: dimension.clone(),
                    missing: dimension.clone(),
                });
            }
            for dep in deps {
                if !seen.contains(dep.as_str()) {
                    return Err(EngineError::DependencyNotFound {
                        dimension: dimension.clone(),
                        missing: dep.clone(),
                    });
                }
            }
            let entry = graph.entry(dimension.clone()).or_default();
            for dep in deps {
                if !entry.contains(dep) {
                    entry.push(dep.clone());
                }
            }
        }

        if let Some(cycle) = find_cycle(&names, &graph) {
            return Err(EngineError::CircularDependency { cycle });
        }

        let groups = parallel_groups(&names, &graph);
        let order: Vec<String> = groups.iter().flatten().cloned().collect();
        debug!(
            groups = groups.len(),
            dimensions = order.len(),
            "computed execution plan"
        );

        Ok(ExecutionPlan {
            order,
            groups,
            dependencies: graph,
        })
    }
}

/// Kahn-style BFS; each round of zero-in-degree dimensions is one group.
fn parallel_groups(
    names: &[String],
    graph: &HashMap<String, Vec<String>>,
) -> Vec<Vec<String>> {
    let mut unmet: HashMap<&str, usize> = names
        .iter()
        .map(|name| (name.as_str(), graph[name].len()))
        .collect();
    // dependency -> dependents, for O(1) decrement on completion
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (dimension, deps) in graph {
        for dep in deps {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(dimension.as_str());
        }
    }

    let mut remaining: HashSet<&str> = names.iter().map(String::as_str).collect();
    let mut groups: Vec<Vec<String>> = Vec::new();

    while !remaining.is_empty() {
        let mut ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|name| unmet[name] == 0)
            .collect();
        if ready.is_empty() {
            // Unreachable after cycle validation.
            break;
        }
        // Stable enumeration order for logs; consumers must not rely on it.
        ready.sort_unstable();

        for name in &ready {
            remaining.remove(name);
            if let Some(deps) = dependents.get(name) {
                for dependent in deps {
                    if let Some(count) = unmet.get_mut(dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
        groups.push(ready.into_iter().map(String::from).collect());
    }

    groups
}

/// DFS cycle detection returning the cycle path (closed: first == last).
fn find_cycle(names: &[String], graph: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Gray,
        Black,
    }

    fn visit<'a>(
        node: &'a str,
        graph: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(node, Mark::Gray);
        stack.push(node);

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                match marks.get(dep.as_str()).copied().unwrap_or(Mark::White) {
                    Mark::Gray => {
                        let start = stack.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dep.clone());
                        return Some(cycle);
                    }
                    Mark::White => {
                        if let Some(cycle) = visit(dep, graph, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Black => {}
                }
            }
        }

        stack.pop();
        marks.insert(node, Mark::Black);
        None
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    for name in names {
        if marks.get(name.as_str()).copied().unwrap_or(Mark::White) == Mark::White {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(name, graph, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Split one group into (global, section) dimension names, preserving order.
pub fn split_group_by_scope<'a>(
    group: &'a [String],
    specs: &HashMap<String, DimensionSpec>,
) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut globals = Vec::new();
    let mut sections = Vec::new();
    for name in group {
        match specs.get(name).map(|s| s.scope) {
            Some(DimensionScope::Global) => globals.push(name.as_str()),
            _ => sections.push(name.as_str()),
        }
    }
    (globals, sections)
}
