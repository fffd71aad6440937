//! Arena-based control-flow graph used to verify per-function metadata.
//!
//! Nodes live in a `Vec` and refer to each other by index, with an
//! address-to-index map for lookup, so the (cyclic) graph never owns itself.
//! Edges are forward-only; reachability is a depth-first walk over a visited
//! set of indices.

use std::collections::BTreeMap;

/// Sentinel address for the synthetic "function exit" node.
///
/// Blocks that leave the function (returns, noreturn calls, killers) point
/// here so that "every real block has a successor" can be checked uniformly.
pub const INVALID_ADDRESS: u64 = u64::MAX;

#[derive(Debug)]
struct CfgNode {
    address: u64,
    successors: Vec<usize>,
}

/// Control-flow graph of a single function, keyed by block start address.
#[derive(Debug)]
pub struct FunctionCfg {
    entry: u64,
    nodes: Vec<CfgNode>,
    index: BTreeMap<u64, usize>,
}

impl FunctionCfg {
    pub fn new(entry: u64) -> Self {
        Self { entry, nodes: Vec::new(), index: BTreeMap::new() }
    }

    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the node for `address`, inserting it if missing.
    pub fn get_or_insert(&mut self, address: u64) -> usize {
        if let Some(&idx) = self.index.get(&address) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(CfgNode { address, successors: Vec::new() });
        self.index.insert(address, idx);
        idx
    }

    pub fn add_edge(&mut self, from: u64, to: u64) {
        let from_idx = self.get_or_insert(from);
        let to_idx = self.get_or_insert(to);
        if !self.nodes[from_idx].successors.contains(&to_idx) {
            self.nodes[from_idx].successors.push(to_idx);
        }
    }

    /// Whether every node is reachable from the entry node.
    ///
    /// An empty graph is trivially fine; a non-empty graph without an entry
    /// node is not.
    pub fn all_reachable(&self) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        let Some(&entry_idx) = self.index.get(&self.entry) else {
            return false;
        };
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![entry_idx];
        let mut seen = 0usize;
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            seen += 1;
            for &succ in &self.nodes[idx].successors {
                if !visited[succ] {
                    stack.push(succ);
                }
            }
        }
        seen == self.nodes.len()
    }

    /// Whether the only nodes without successors carry the invalid address,
    /// i.e. every real block flows somewhere.
    pub fn only_invalid_exits(&self) -> bool {
        self.nodes
            .iter()
            .all(|node| node.address == INVALID_ADDRESS || !node.successors.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_is_trivially_reachable() {
        let cfg = FunctionCfg::new(0x1000);
        assert!(cfg.all_reachable());
        assert!(cfg.only_invalid_exits());
    }

    #[test]
    fn disconnected_node_is_detected() {
        let mut cfg = FunctionCfg::new(0x1000);
        cfg.add_edge(0x1000, INVALID_ADDRESS);
        cfg.get_or_insert(0x2000);
        assert!(!cfg.all_reachable());
    }

    #[test]
    fn valid_block_without_successors_is_detected() {
        let mut cfg = FunctionCfg::new(0x1000);
        cfg.add_edge(0x1000, 0x1010);
        // 0x1010 has no successors and a valid address.
        assert!(!cfg.only_invalid_exits());
    }

    #[test]
    fn loops_terminate_and_count_once() {
        let mut cfg = FunctionCfg::new(0x1000);
        cfg.add_edge(0x1000, 0x1010);
        cfg.add_edge(0x1010, 0x1000);
        cfg.add_edge(0x1010, INVALID_ADDRESS);
        assert!(cfg.all_reachable());
        assert!(cfg.only_invalid_exits());
    }
}
