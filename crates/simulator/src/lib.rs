//! Kronos simulator
//!
//! A command-line driver on top of `kronos-simulation`. Every subcommand
//! builds a fresh in-process [`Cluster`](kronos_simulation::Cluster) of
//! `M` shards with `N` nodes each and runs one protocol on all of its nodes:
//!
//! - `sequence` feeds dummy records through Kronos for a number of epochs
//!   and reports throughput
//! - `liveness`, `safety` and `reconfig` run the accountability protocols
//!   against a TOML fixture
//! - `evidence` signs two conflicting claims with the cluster's keys and
//!   writes the result as a safety fixture
//!
//! Keys are derived from the cluster seed, so evidence written with one seed
//! only verifies on clusters built with the same seed and shape.

pub mod commands;

pub use commands::{run_cli, Cli, Command};
