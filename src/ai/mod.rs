mod cache;
mod summarizer;

pub use cache::{hash_source, SummaryCache, SummaryRequest, DEFAULT_INSTRUCTION};
pub use summarizer::{Completion, Summarizer};
