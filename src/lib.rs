pub mod book;
pub mod config;
pub mod error;
pub mod improve;
pub mod llm;
pub mod narration;
pub mod pages;
pub mod pool;
pub mod source;

pub use book::{Book, Page};
pub use config::{AudioFormat, Config, LlmConfig, NarrationConfig, PagingConfig};
pub use error::{Error, Result};
pub use improve::{improve_pages, Improvement, TranscriptImprover};
pub use llm::{LlmError, OpenAiClient};
pub use narration::{narrate_pages, NarrationCleaner, SpeechEngine};
pub use pages::{chunk_to_pages, Chunk, PagePipeline, PageRange, SmartSplitter, SplitRequest};
pub use source::load_document;
