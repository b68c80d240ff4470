//! # Gossamer core
//!
//! The data model shared by every Gossamer component: the flat
//! [`ParameterVector`] that trainers and the gossip streamer mutate
//! concurrently, the [`BlockLayout`] that partitions it into
//! datagram-sized blocks, the cluster [`Topology`] that assigns each
//! block its single master node, and the [`message`] codec for the
//! block datagrams exchanged between nodes.
//!
//! This crate performs no I/O and spawns no threads. The gossip
//! endpoint lives in `gossamer-node`, the training coordinators in
//! `gossamer-trainer`; both are built on the types defined here.
//!
//! ## A note on data races
//!
//! Gossamer's parameter synchronization is deliberately lossy and
//! unsynchronized: training workers and the gossip streamer write the
//! same parameter vector without locks, in the asynchronous
//! ("Hogwild") style. [`ParameterVector`] encapsulates that one
//! intentional data race; see its documentation for the exact
//! contract.
//!
//! [`ParameterVector`]: params/struct.ParameterVector.html
//! [`BlockLayout`]: block/struct.BlockLayout.html
//! [`Topology`]: topology/struct.Topology.html
//! [`message`]: message/index.html

pub mod block;
pub mod message;
pub mod params;
pub mod topology;

pub use self::{
    block::{BlockLayout, BlockLayoutError, MAX_BLOCK_LEN},
    params::{ParamSpan, ParameterVector, SpanAllocator},
    topology::{Topology, TopologyError},
};
