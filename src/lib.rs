pub mod analysis;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod progress;
pub mod project;
pub mod resolver;
pub mod util;
