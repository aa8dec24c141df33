// src/dag/mod.rs

//! Object dependency ordering.
//!
//! - [`graph`] collects explicit and implicit dependency edges.
//! - [`sort`] checks for cycles and splits the graph into layers.

pub mod graph;
pub mod sort;

pub use graph::DependencyGraph;
pub use sort::{layers, reverse_layers};
