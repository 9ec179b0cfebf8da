// src/watch/dag_filter.rs

//! DAG-aware filtering logic for watch events.

use std::collections::HashSet;

use crate::dag::DagGraph;

/// Return true if `task` has any transitive upstream task in
/// `matching_names`.
///
/// Such a task is re-run anyway as a dependent of that ancestor, so the
/// watcher only triggers the ancestor.
pub fn has_ancestor_in_matching(task: &str, matching_names: &HashSet<&str>, graph: &DagGraph) -> bool {
    let mut stack: Vec<&str> = graph.dependencies_of(task).iter().map(String::as_str).collect();
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        if matching_names.contains(current) {
            return true;
        }
        stack.extend(graph.dependencies_of(current).iter().map(String::as_str));
    }

    false
}
