//! # Gossamer node
//!
//! The per-node runtime of the Gossamer gossip protocol: a
//! [`Streamer`] that owns the local UDP endpoint and replicates the
//! shared parameter vector across the cluster, [`Settings`] loaded
//! from a TOML file with environment overrides, and the tracing setup
//! used by the `node` binary.
//!
//! A node runs the streamer for the life of the process; training
//! coordinators (from `gossamer-trainer`) mutate the same parameter
//! vector from their own threads. There is no central arbiter and no
//! locking between the two; the protocol is loss-tolerant and the
//! replica is approximately consistent by design.
//!
//! [`Streamer`]: streamer/struct.Streamer.html
//! [`Settings`]: settings/struct.Settings.html

#[macro_use]
extern crate tracing;

pub mod logging;
pub mod settings;
pub mod streamer;

pub use self::{
    settings::{Settings, SettingsError},
    streamer::{Streamer, StreamerCounters, StreamerError, StreamerHandle},
};
