#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use audiobook_pages::pages::{Chunk, SmartSplitter, SplitRequest};
use audiobook_pages::{LlmError, PagingConfig};

/// Groups whole sentences into chunks of roughly `max_words`, the way a
/// well-behaved model would.
pub struct SentenceSplitter {
    pub calls: AtomicUsize,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn split_sentences(request: &SplitRequest) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in request.long_text.split_whitespace() {
        current.push(word);
        if current.len() >= request.max_words && word.ends_with('.') {
            chunks.push(Chunk {
                title: format!("Part {}", chunks.len() + 1),
                text: current.join(" "),
            });
            current.clear();
        }
    }
    if !current.is_empty() {
        chunks.push(Chunk {
            title: format!("Part {}", chunks.len() + 1),
            text: current.join(" "),
        });
    }
    chunks
}

#[async_trait]
impl SmartSplitter for SentenceSplitter {
    async fn split(&self, request: &SplitRequest) -> Result<Vec<Chunk>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Vary latency by content so completions arrive out of order.
        let jitter = request.long_text.len() as u64 % 7;
        tokio::time::sleep(Duration::from_millis(jitter * 3)).await;
        Ok(split_sentences(request))
    }
}

/// Always fails for units containing `needle`.
pub struct FailsOn {
    pub needle: String,
    pub failures: AtomicUsize,
}

impl FailsOn {
    pub fn new(needle: &str) -> Self {
        Self {
            needle: needle.to_string(),
            failures: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SmartSplitter for FailsOn {
    async fn split(&self, request: &SplitRequest) -> Result<Vec<Chunk>, LlmError> {
        if request.long_text.contains(&self.needle) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(LlmError::ServerError {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(split_sentences(request))
    }
}

/// Fails the first `failures` calls, then behaves.
pub struct Flaky {
    pub remaining_failures: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Flaky {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SmartSplitter for Flaky {
    async fn split(&self, request: &SplitRequest) -> Result<Vec<Chunk>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(LlmError::RateLimited);
        }
        Ok(split_sentences(request))
    }
}

/// Answers with something that is not worth keeping.
pub struct Returns(pub Vec<Chunk>);

#[async_trait]
impl SmartSplitter for Returns {
    async fn split(&self, _request: &SplitRequest) -> Result<Vec<Chunk>, LlmError> {
        Ok(self.0.clone())
    }
}

/// Never answers in time.
pub struct Hangs;

#[async_trait]
impl SmartSplitter for Hangs {
    async fn split(&self, request: &SplitRequest) -> Result<Vec<Chunk>, LlmError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(split_sentences(request))
    }
}

pub fn test_config() -> PagingConfig {
    PagingConfig {
        target_words: 40,
        oversize_ratio: 1.5,
        min_chunk_words: 5,
        max_chunk_words: 20,
        workers: 4,
        max_attempts: 3,
        retry_backoff_ms: 0,
        request_timeout_secs: 5,
        min_coverage: 0.8,
    }
}

/// `n` sentences of ten words each, tagged so they can be traced.
pub fn sentences(tag: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{tag} sentence {i} has exactly ten words in it today."))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn non_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
