//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `ArticleState`: state machine for one article inside the worker pool
//! - `CrawlState`: durable progress markers and counters
//! - `ProgressFile`: human-readable TOML mirror of `CrawlState`
//! - `Batch` / `Watermark`: ordered work and the gap-free prefix of finished work
//! - `SequenceCounter`: serialized monotonic allocator

mod article_state;
mod counter;
mod crawl_state;
mod progress;
mod progress_file;

// Re-export main types
pub use article_state::ArticleState;
pub use counter::SequenceCounter;
pub use crawl_state::{CrawlState, ProgressCursor};
pub use progress::{Batch, BatchKind, PendingArticle, Watermark};
pub use progress_file::ProgressFile;
