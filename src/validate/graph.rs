//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of ZiShard.
//! The ZiShard project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! Dependency graph over record keys and cycle detection.
//!
//! Detection is an iterative depth-first search with an explicit stack, so
//! long dependency chains cannot overflow the thread stack. Entry points are
//! visited in key order and each entry point reports at most one cycle, which
//! keeps reports deterministic and bounded.

use std::collections::{BTreeMap, HashSet};

/// Adjacency list keyed by node, edges in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZiDependencyGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl ZiDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.entry(from.into()).or_default().push(to.into());
    }

    pub fn node_count(&self) -> usize {
        let mut nodes: HashSet<&str> = self.edges.keys().map(String::as_str).collect();
        for targets in self.edges.values() {
            nodes.extend(targets.iter().map(String::as_str));
        }
        nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Cycles as node paths, each starting at the node the search re-entered.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let no_edges: Vec<String> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut on_stack: HashSet<&str> = HashSet::new();
        let mut cycles = Vec::new();

        for entry in self.edges.keys() {
            let entry = entry.as_str();
            if visited.contains(entry) {
                continue;
            }

            let mut reported = false;
            let mut path: Vec<&str> = vec![entry];
            let mut stack: Vec<(&str, usize)> = vec![(entry, 0)];
            on_stack.insert(entry);

            while let Some(&(node, next)) = stack.last() {
                let targets = self.edges.get(node).unwrap_or(&no_edges);
                if next < targets.len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let target = targets[next].as_str();
                    if on_stack.contains(target) {
                        if !reported {
                            let start = path.iter().position(|n| *n == target).unwrap_or(0);
                            cycles.push(path[start..].iter().map(|n| n.to_string()).collect());
                            reported = true;
                        }
                    } else if !visited.contains(target) {
                        on_stack.insert(target);
                        path.push(target);
                        stack.push((target, 0));
                    }
                } else {
                    stack.pop();
                    path.pop();
                    on_stack.remove(node);
                    visited.insert(node);
                }
            }
        }
        cycles
    }
}
