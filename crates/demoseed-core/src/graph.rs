use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A seed target and the targets it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub name: String,
    pub depends_on: Vec<String>,
}

impl DependencyNode {
    pub fn new<I, S>(name: impl Into<String>, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            depends_on: depends_on.into_iter().map(Into::into).collect(),
        }
    }
}

/// Seeding order for a set of targets, or the nodes stuck in a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub nodes: usize,
    pub edges: usize,
    pub topo_order: Option<Vec<String>>,
    pub cycle: Option<Vec<String>>,
}

/// Deterministic dependency order: prerequisites first, ties broken by name.
///
/// References to names outside `nodes` are ignored; they are resolved against
/// data already present in the remote system.
pub fn build_dependency_report(nodes: &[DependencyNode]) -> DependencyReport {
    let known: BTreeSet<&str> = nodes.iter().map(|node| node.name.as_str()).collect();
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for node in nodes {
        graph.entry(node.name.clone()).or_default();
        for dependency in &node.depends_on {
            if dependency == &node.name || !known.contains(dependency.as_str()) {
                continue;
            }
            graph
                .entry(dependency.clone())
                .or_default()
                .insert(node.name.clone());
        }
    }

    let edges = graph.values().map(BTreeSet::len).sum();
    match toposort(&graph) {
        Ok(order) => DependencyReport {
            nodes: graph.len(),
            edges,
            topo_order: Some(order),
            cycle: None,
        },
        Err(cycle) => DependencyReport {
            nodes: graph.len(),
            edges,
            topo_order: None,
            cycle: Some(cycle),
        },
    }
}

fn toposort(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, Vec<String>> {
    let mut indegree: BTreeMap<&str, usize> = graph.keys().map(|node| (node.as_str(), 0)).collect();
    for targets in graph.values() {
        for target in targets {
            *indegree.entry(target.as_str()).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        order.push(node.to_string());
        for target in graph.get(node).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(target.as_str()) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert(target.as_str());
                }
            }
        }
    }

    if order.len() == graph.len() {
        Ok(order)
    } else {
        Err(indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(node, _)| node.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisites_come_first() {
        let nodes = vec![
            DependencyNode::new("locations", ["warehouses"]),
            DependencyNode::new("warehouses", Vec::<String>::new()),
            DependencyNode::new("products", ["categories", "res.company"]),
            DependencyNode::new("categories", Vec::<String>::new()),
        ];
        let report = build_dependency_report(&nodes);

        assert_eq!(
            report.topo_order,
            Some(vec![
                "categories".to_string(),
                "products".to_string(),
                "warehouses".to_string(),
                "locations".to_string(),
            ])
        );
        assert_eq!(report.edges, 2);
        assert!(report.cycle.is_none());
    }

    #[test]
    fn reports_cycle_members() {
        let nodes = vec![
            DependencyNode::new("a", ["b"]),
            DependencyNode::new("b", ["a"]),
            DependencyNode::new("c", Vec::<String>::new()),
        ];
        let report = build_dependency_report(&nodes);

        assert!(report.topo_order.is_none());
        assert_eq!(report.cycle, Some(vec!["a".to_string(), "b".to_string()]));
    }
}
