use std::sync::Arc;

use async_trait::async_trait;
use indicatif::ProgressBar;
use serde::Deserialize;

use crate::book::Page;
use crate::llm::LlmError;
use crate::pool::run_indexed;

pub const IMPROVE_INSTRUCTIONS: &str = "\
You prepare book pages for narration.
Return JSON with two fields:
- \"transcript\": the page rewritten as clean text to be read aloud. Fix OCR and hyphenation errors, \
remove page numbers, headers, footers, footnote markers and markup. Do not add or drop content.
- \"markdown\": the same page as readable markdown, using # for headings, * for bullet points \
and - for numbered lists, with blank lines between paragraphs.
Respond with JSON only: {\"transcript\": \"...\", \"markdown\": \"...\"}";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Improvement {
    pub transcript: String,
    pub markdown: String,
}

#[async_trait]
pub trait TranscriptImprover: Send + Sync {
    async fn improve(&self, text: &str) -> Result<Improvement, LlmError>;
}

/// Rewrites every page into a narration transcript plus markdown. Pages
/// whose attempts all fail keep their original text for both.
pub async fn improve_pages(
    pages: Vec<Page>,
    improver: Arc<dyn TranscriptImprover>,
    workers: usize,
    max_attempts: u32,
    progress: &ProgressBar,
) -> Vec<Page> {
    log::info!("Improving transcript of {} pages...", pages.len());
    progress.set_length(pages.len() as u64);
    let max_attempts = max_attempts.max(1);

    let improved = run_indexed(pages.clone(), workers, progress, move |_, page| {
        let improver = Arc::clone(&improver);
        async move { improve_one(improver.as_ref(), page, max_attempts).await }
    })
    .await;

    pages
        .into_iter()
        .zip(improved)
        .map(|(original, improved)| improved.unwrap_or(original))
        .collect()
}

async fn improve_one(improver: &dyn TranscriptImprover, mut page: Page, max_attempts: u32) -> Page {
    for attempt in 1..=max_attempts {
        match improver.improve(&page.text).await {
            Ok(improvement) if !improvement.transcript.trim().is_empty() => {
                log::debug!("Improved page {}: {}", page.index, preview(&improvement.transcript));
                page.transcript = Some(improvement.transcript);
                if !improvement.markdown.trim().is_empty() {
                    page.markdown = improvement.markdown;
                }
                return page;
            }
            Ok(_) => log::warn!(
                "Empty transcript for page {}, try {}/{}",
                page.index,
                attempt,
                max_attempts
            ),
            Err(e) => log::warn!(
                "Failed to improve page {}: {}, try {}/{}",
                page.index,
                e,
                attempt,
                max_attempts
            ),
        }
    }
    log::error!("Keeping original text for page {}", page.index);
    page
}

fn preview(text: &str) -> String {
    text.chars().take(60).collect::<String>() + "..."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Shouting;

    #[async_trait]
    impl TranscriptImprover for Shouting {
        async fn improve(&self, text: &str) -> Result<Improvement, LlmError> {
            if text.contains("fail") {
                return Err(LlmError::RateLimited);
            }
            Ok(Improvement {
                transcript: text.to_uppercase(),
                markdown: format!("# {}", text),
            })
        }
    }

    struct FlakyOnce(AtomicUsize);

    #[async_trait]
    impl TranscriptImprover for FlakyOnce {
        async fn improve(&self, text: &str) -> Result<Improvement, LlmError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(LlmError::InvalidResponse("truncated".into()));
            }
            Ok(Improvement {
                transcript: text.to_string(),
                markdown: String::new(),
            })
        }
    }

    fn pages(texts: &[&str]) -> Vec<Page> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Page::from_chunk(i, Chunk::untitled(*t)))
            .collect()
    }

    #[tokio::test]
    async fn improves_in_order_and_keeps_failures() {
        let input = pages(&["one", "please fail", "three"]);

        let out = improve_pages(input, Arc::new(Shouting), 4, 3, &ProgressBar::hidden()).await;

        assert_eq!(out[0].transcript.as_deref(), Some("ONE"));
        assert_eq!(out[0].markdown, "# one");
        assert_eq!(out[1].transcript, None);
        assert_eq!(out[1].markdown, "please fail");
        assert_eq!(out[2].transcript.as_deref(), Some("THREE"));
    }

    #[tokio::test]
    async fn retries_then_keeps_markdown_when_blank() {
        let input = pages(&["only page"]);

        let out = improve_pages(
            input,
            Arc::new(FlakyOnce(AtomicUsize::new(0))),
            1,
            3,
            &ProgressBar::hidden(),
        )
        .await;

        assert_eq!(out[0].transcript.as_deref(), Some("only page"));
        assert_eq!(out[0].markdown, "only page");
    }
}
