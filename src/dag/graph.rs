// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::engine::TaskName;
use crate::errors::{PipelineError, Result};
use crate::paths::AssetCategory;

/// Declaration of one task and the tasks that must finish before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: TaskName,
    pub after: Vec<TaskName>,
}

impl TaskSpec {
    pub fn new(name: impl Into<TaskName>, after: &[&str]) -> Self {
        Self {
            name: name.into(),
            after: after.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The build stages: templates wait for styles and scripts so that the
/// references they inject point at files that exist.
pub fn stage_specs() -> Vec<TaskSpec> {
    AssetCategory::ALL
        .into_iter()
        .map(|category| match category {
            AssetCategory::Templates => TaskSpec::new(
                category.name(),
                &[AssetCategory::Styles.name(), AssetCategory::Scripts.name()],
            ),
            other => TaskSpec::new(other.name(), &[]),
        })
        .collect()
}

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    deps: Vec<TaskName>,
    dependents: Vec<TaskName>,
}

/// Task graph keyed by task name.
///
/// Construction validates that every dependency names a known task and that
/// the graph is acyclic, so the scheduler can rely on both.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: BTreeMap<TaskName, DagNode>,
}

impl DagGraph {
    pub fn from_specs(specs: &[TaskSpec]) -> Result<Self> {
        let mut nodes: BTreeMap<TaskName, DagNode> = specs
            .iter()
            .map(|spec| {
                let node = DagNode {
                    deps: spec.after.clone(),
                    dependents: Vec::new(),
                };
                (spec.name.clone(), node)
            })
            .collect();

        for spec in specs {
            for dep in &spec.after {
                if dep == &spec.name {
                    return Err(PipelineError::ConfigError(format!(
                        "task '{}' cannot depend on itself",
                        spec.name
                    )));
                }
                match nodes.get_mut(dep) {
                    Some(node) => node.dependents.push(spec.name.clone()),
                    None => {
                        return Err(PipelineError::ConfigError(format!(
                            "task '{}' depends on unknown task '{dep}'",
                            spec.name
                        )));
                    }
                }
            }
        }

        let graph = Self { nodes };
        graph.topological_order()?;
        Ok(graph)
    }

    /// The fixed stage graph.
    pub fn stages() -> Result<Self> {
        Self::from_specs(&stage_specs())
    }

    /// A copy holding only `keep` and the edges between them.
    ///
    /// Running a named stage on its own uses this, so upstream stages are
    /// neither pulled in nor waited for.
    pub fn restricted_to<S: AsRef<str>>(&self, keep: &[S]) -> Result<Self> {
        let keep: BTreeSet<&str> = keep.iter().map(|s| s.as_ref()).collect();
        for name in &keep {
            if !self.nodes.contains_key(*name) {
                return Err(PipelineError::TaskNotFound(name.to_string()));
            }
        }

        let specs: Vec<TaskSpec> = self
            .nodes
            .iter()
            .filter(|(name, _)| keep.contains(name.as_str()))
            .map(|(name, node)| TaskSpec {
                name: name.clone(),
                after: node
                    .deps
                    .iter()
                    .filter(|d| keep.contains(d.as_str()))
                    .cloned()
                    .collect(),
            })
            .collect();
        Self::from_specs(&specs)
    }

    /// Tasks in dependency order.
    pub fn topological_order(&self) -> Result<Vec<TaskName>> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        toposort(&graph, None)
            .map(|order| order.into_iter().map(str::to_string).collect())
            .map_err(|cycle| {
                PipelineError::DagCycle(format!(
                    "cycle detected in task graph involving task '{}'",
                    cycle.node_id()
                ))
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// All task names, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Tasks without dependencies, sorted.
    pub fn roots(&self) -> Vec<TaskName> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}
