use async_trait::async_trait;
use serde::Serialize;

use super::Chunk;
use crate::llm::LlmError;

pub const SPLIT_INSTRUCTIONS: &str = "\
You split long book text into narration pages.
Partition the text into coherent chunks of {min_words} to {max_words} words, about {count} chunks in total.
Rules:
- Preserve all content and its original order. Do not summarise, paraphrase or drop sentences.
- Never split in the middle of a sentence.
- Keep headings and section context attached to the content they introduce.
- Remove non-essential metadata such as page numbers, running headers and footers.
- Give every chunk a short descriptive title.
Respond with JSON only: {\"chunks\": [{\"title\": \"...\", \"text\": \"...\"}]}";

/// Input to a smart split call.
#[derive(Debug, Clone, Serialize)]
pub struct SplitRequest {
    pub long_text: String,
    pub target_chunk_count: usize,
    pub min_words: usize,
    pub max_words: usize,
}

impl SplitRequest {
    pub fn instructions(&self) -> String {
        SPLIT_INSTRUCTIONS
            .replace("{min_words}", &self.min_words.to_string())
            .replace("{max_words}", &self.max_words.to_string())
            .replace("{count}", &self.target_chunk_count.to_string())
    }
}

/// Breaks an oversized unit into titled, ordered chunks covering all of it.
#[async_trait]
pub trait SmartSplitter: Send + Sync {
    async fn split(&self, request: &SplitRequest) -> Result<Vec<Chunk>, LlmError>;
}
