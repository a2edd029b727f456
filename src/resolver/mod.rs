//! Project-configuration graph resolution and file assignment.

pub mod assign;
pub mod graph;

pub use assign::{assign_files, FileGroup, GroupKey};
pub use graph::{ConfigGraph, ConfigLoadFailure, ConfigLoader};
