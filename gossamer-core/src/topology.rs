//! Cluster topology and block ownership.
//!
//! A cluster is an ordered list of node addresses; the local node is
//! identified by its position in the list. The node count must be a
//! power of two so that block ownership reduces to a mask:
//! `master(block) = block & (nodes - 1)`. Every block therefore has
//! exactly one master, and ownership is computable without any shared
//! state or coordination.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
/// An invalid cluster configuration.
pub enum TopologyError {
    #[error("node count {0} is not a power of two")]
    NodeCount(usize),
    #[error("local index {local} out of range for {nodes} nodes")]
    LocalIndex { local: usize, nodes: usize },
}

/// The ordered list of cluster nodes and the local node's place in it.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<SocketAddr>,
    local: usize,
    mask: usize,
}

impl Topology {
    /// Validates the node list and local index.
    ///
    /// Fails fast, before any socket or thread is created.
    pub fn new(nodes: Vec<SocketAddr>, local: usize) -> Result<Self, TopologyError> {
        if !nodes.len().is_power_of_two() {
            return Err(TopologyError::NodeCount(nodes.len()));
        }
        if local >= nodes.len() {
            return Err(TopologyError::LocalIndex {
                local,
                nodes: nodes.len(),
            });
        }
        let mask = nodes.len() - 1;
        Ok(Self { nodes, local, mask })
    }

    /// Number of nodes in the cluster, always at least 1.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The local node's index.
    pub fn local_index(&self) -> usize {
        self.local
    }

    /// The address the local gossip endpoint binds to.
    pub fn local_addr(&self) -> SocketAddr {
        self.nodes[self.local]
    }

    /// The address of node `node`.
    pub fn addr(&self, node: usize) -> SocketAddr {
        self.nodes[node]
    }

    /// The node holding the authoritative value of `block`.
    pub fn master(&self, block: usize) -> usize {
        block & self.mask
    }

    /// Whether the local node is the master of `block`.
    pub fn is_local_master(&self, block: usize) -> bool {
        self.master(block) == self.local
    }

    /// All nodes except the local one, in list order.
    pub fn peers(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        let local = self.local;
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != local)
            .map(|(_, addr)| *addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(n: usize) -> Vec<SocketAddr> {
        (0..n)
            .map(|i| format!("127.0.0.1:{}", 9000 + i).parse().unwrap())
            .collect()
    }

    #[test]
    fn rejects_non_power_of_two_clusters() {
        for n in &[0, 3, 5, 6, 7, 12] {
            assert_eq!(
                Topology::new(addrs(*n), 0).unwrap_err(),
                TopologyError::NodeCount(*n)
            );
        }
        for n in &[1, 2, 4, 8, 16] {
            assert!(Topology::new(addrs(*n), 0).is_ok());
        }
    }

    #[test]
    fn rejects_out_of_range_local_index() {
        assert_eq!(
            Topology::new(addrs(4), 4).unwrap_err(),
            TopologyError::LocalIndex { local: 4, nodes: 4 }
        );
    }

    #[test]
    fn masters_cycle_through_nodes() {
        let topology = Topology::new(addrs(4), 0).unwrap();
        let masters: Vec<usize> = (0..8).map(|b| topology.master(b)).collect();
        assert_eq!(masters, vec![0, 1, 2, 3, 0, 1, 2, 3]);
        assert!(topology.is_local_master(0));
        assert!(topology.is_local_master(4));
        assert!(!topology.is_local_master(1));
    }

    #[test]
    fn every_block_has_one_master() {
        for &n in &[1usize, 2, 4, 8, 16, 32] {
            let topology = Topology::new(addrs(n), 0).unwrap();
            for block in 0..256 {
                let master = topology.master(block);
                assert!(master < n);
                assert_eq!(master, block % n);
            }
        }
    }

    #[test]
    fn peers_skip_the_local_node() {
        let nodes = addrs(4);
        let topology = Topology::new(nodes.clone(), 2).unwrap();
        let peers: Vec<SocketAddr> = topology.peers().collect();
        assert_eq!(peers, vec![nodes[0], nodes[1], nodes[3]]);
        assert_eq!(topology.local_addr(), nodes[2]);
    }
}
