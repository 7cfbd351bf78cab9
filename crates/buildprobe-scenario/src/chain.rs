//! Step dependency graph using `petgraph`.
//!
//! Each step is a node. An edge points from the step that produces an image
//! to every later step that builds on it, so a topological sort yields
//! producers first.

use std::collections::HashMap;

use buildprobe_common::error::{HarnessError, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::scenario::Scenario;

/// Validated dependencies between the steps of one scenario.
#[derive(Debug)]
pub struct ChainGraph {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
}

impl ChainGraph {
    /// Builds the graph, rejecting references the scenario cannot satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for a reference to an image no
    /// earlier step produces, a step building on its own image, or an image
    /// rebuilt without `force`.
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..scenario.steps.len()).map(|i| graph.add_node(i)).collect();
        let mut producers: HashMap<&str, usize> = HashMap::new();

        for (index, step) in scenario.steps.iter().enumerate() {
            if let Some(base) = step.source.base_image() {
                if base == step.image {
                    return Err(chain_err(format!(
                        "step \"{}\" builds image \"{base}\" from itself",
                        step.name
                    )));
                }
                let Some(&producer) = producers.get(base) else {
                    let later = scenario.steps[index + 1..].iter().any(|s| s.image == base);
                    let what = if later { "a later step" } else { "no step" };
                    return Err(chain_err(format!(
                        "step \"{}\" builds on image \"{base}\", which {what} produces",
                        step.name
                    )));
                };
                let _ = graph.add_edge(nodes[producer], nodes[index], ());
            }
            if producers.contains_key(step.image.as_str()) && !step.options.force {
                return Err(chain_err(format!(
                    "step \"{}\" rebuilds image \"{}\" without force",
                    step.name, step.image
                )));
            }
            let _ = producers.insert(step.image.as_str(), index);
        }

        let chain = Self { graph, nodes };
        let _ = chain.build_order()?;
        tracing::debug!(
            scenario = %scenario.name,
            steps = chain.nodes.len(),
            links = chain.graph.edge_count(),
            "step chain validated"
        );
        Ok(chain)
    }

    /// Index of the step whose image `step` builds on.
    #[must_use]
    pub fn base_of(&self, step: usize) -> Option<usize> {
        let node = *self.nodes.get(step)?;
        self.graph
            .neighbors_directed(node, Direction::Incoming)
            .next()
            .and_then(|n| self.graph.node_weight(n).copied())
    }

    /// Indices of the steps that build on the image of `step`.
    #[must_use]
    pub fn dependents_of(&self, step: usize) -> Vec<usize> {
        let Some(&node) = self.nodes.get(step) else {
            return Vec::new();
        };
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n).copied())
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Step indices with every producer before its dependents.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if the graph contains a cycle.
    pub fn build_order(&self) -> Result<Vec<usize>> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .filter_map(|n| self.graph.node_weight(n).copied())
                    .collect()
            })
            .map_err(|_cycle| chain_err("cyclic dependency between steps".into()))
    }
}

fn chain_err(message: String) -> HarnessError {
    HarnessError::Config { message }
}
