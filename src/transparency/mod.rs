//! Transparency module for the Synheart Stress Agent.
//!
//! Exposes what the pipeline has processed so far. Counters live in memory
//! only and are reset when the process exits.

pub mod stats;

// Re-export commonly used types
pub use stats::{create_shared_stats, PipelineStats, SharedStats, StatsSnapshot};
