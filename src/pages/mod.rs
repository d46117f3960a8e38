//! Page partitioning: marker split, length balancing, smart splitting and
//! reassembly of a long document into narration-sized chunks.

mod assembler;
mod balancer;
mod dispatcher;
mod markers;
mod splitter;

use std::ops::Range;
use std::sync::Arc;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};

use crate::config::PagingConfig;

pub use assembler::assemble;
pub use balancer::LengthBalancer;
pub use dispatcher::{ChunkDispatcher, DispatchResult};
pub use markers::{MarkerSplitter, PageRange};
pub use splitter::{SmartSplitter, SplitRequest, SPLIT_INSTRUCTIONS};

/// Trimmed text between two page markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// Position in the unfiltered marker split.
    pub index: usize,
    pub text: String,
}

/// Adjacent raw pages packed together by the balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub index: usize,
    /// Raw page indices this unit was built from.
    pub pages: Range<usize>,
    pub text: String,
    pub word_count: usize,
}

impl Unit {
    pub fn new(index: usize, pages: Range<usize>, text: String) -> Self {
        let word_count = word_count(&text);
        Self {
            index,
            pages,
            text,
            word_count,
        }
    }
}

/// One narrated/displayed page. `title` is empty for pass-through units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub title: String,
    pub text: String,
}

impl Chunk {
    pub fn untitled(text: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            text: text.into(),
        }
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Full `chunk_to_pages` pipeline with its collaborators wired in.
pub struct PagePipeline {
    markers: MarkerSplitter,
    balancer: LengthBalancer,
    dispatcher: ChunkDispatcher,
}

impl PagePipeline {
    pub fn new(config: PagingConfig, splitter: Arc<dyn SmartSplitter>) -> Self {
        Self {
            markers: MarkerSplitter::new(),
            balancer: LengthBalancer::new(config.target_words, config.oversize_ratio),
            dispatcher: ChunkDispatcher::new(splitter, config),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.dispatcher = self.dispatcher.with_progress(progress);
        self
    }

    pub async fn run(&self, document: &str, range: Option<PageRange>) -> Vec<Chunk> {
        let mut pages = self.markers.split(document);
        let total = pages.len();
        if let Some(range) = range {
            pages = range.select(pages);
            log::info!(
                "Page range {} keeps {} of {} raw pages",
                range,
                pages.len(),
                total
            );
        }
        if pages.is_empty() {
            log::info!("Document has no content, nothing to paginate");
            return Vec::new();
        }

        let units = self.balancer.balance(&pages);
        log::info!("Balanced {} raw pages into {} units", pages.len(), units.len());

        let dispatched = self.dispatcher.dispatch(units).await;
        let chunks = assemble(dispatched);
        log::info!("Assembled {} pages", chunks.len());
        chunks
    }
}

pub async fn chunk_to_pages(
    document: &str,
    range: Option<PageRange>,
    splitter: Arc<dyn SmartSplitter>,
    config: &PagingConfig,
) -> Vec<Chunk> {
    PagePipeline::new(config.clone(), splitter)
        .run(document, range)
        .await
}
