pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod outcome;
pub mod paths;
pub mod report;
pub mod settings;
pub mod stats;

// Public API - curated exports only
pub mod api;

// Re-export key items at module level for convenience
pub use api::*;
