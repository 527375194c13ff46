//! Multi-pass AI review over a budgeted slice of the repository.
//!
//! Provides the chat provider seam and OpenAI-compatible client, per-pass
//! context selection, prompt construction and response parsing, the
//! pass orchestrator, and cross-pass finding deduplication.

pub mod context;
pub mod dedup;
pub mod llm;
pub mod pipeline;
pub mod prompt;

pub use pipeline::{run_review, PassResult, ReviewInput, ReviewPipeline, ReviewReport, ReviewStats};
