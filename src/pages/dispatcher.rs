use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;

use super::{Chunk, SmartSplitter, SplitRequest, Unit};
use crate::config::PagingConfig;
use crate::pool::run_indexed;

/// A unit paired with the chunks it expanded into.
pub type DispatchResult = (Unit, Vec<Chunk>);

/// Sends oversized units to the smart splitter across a bounded pool and
/// puts the answers back in unit order.
pub struct ChunkDispatcher {
    splitter: Arc<dyn SmartSplitter>,
    config: PagingConfig,
    progress: ProgressBar,
}

impl ChunkDispatcher {
    pub fn new(splitter: Arc<dyn SmartSplitter>, config: PagingConfig) -> Self {
        Self {
            splitter,
            config,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn needs_split(&self, unit: &Unit) -> bool {
        unit.word_count > self.config.max_chunk_words
    }

    pub async fn dispatch(&self, units: Vec<Unit>) -> Vec<DispatchResult> {
        let jobs: Vec<(usize, SplitRequest)> = units
            .iter()
            .filter(|unit| self.needs_split(unit))
            .map(|unit| (unit.index, self.request_for(unit)))
            .collect();
        log::info!(
            "{} units pass through, {} go to the smart splitter",
            units.len() - jobs.len(),
            jobs.len()
        );

        self.progress.set_length(jobs.len() as u64);
        let splitter = Arc::clone(&self.splitter);
        let policy = RetryPolicy::from(&self.config);

        let mut answers = run_indexed(
            jobs,
            self.config.workers,
            &self.progress,
            move |_, (unit_index, request)| {
                let splitter = Arc::clone(&splitter);
                async move {
                    split_with_retry(splitter.as_ref(), unit_index, &request, policy).await
                }
            },
        )
        .await
        .into_iter();

        units
            .into_iter()
            .map(|unit| {
                if !self.needs_split(&unit) {
                    let chunk = Chunk::untitled(unit.text.clone());
                    return (unit, vec![chunk]);
                }
                match answers.next().flatten().flatten() {
                    Some(chunks) => (unit, chunks),
                    None => {
                        log::warn!(
                            "Unit {} ({} words) falls back to a single untitled page",
                            unit.index,
                            unit.word_count
                        );
                        let chunk = Chunk::untitled(unit.text.clone());
                        (unit, vec![chunk])
                    }
                }
            })
            .collect()
    }

    fn request_for(&self, unit: &Unit) -> SplitRequest {
        let max_words = self.config.max_chunk_words.max(1);
        SplitRequest {
            long_text: unit.text.clone(),
            target_chunk_count: unit.word_count.div_ceil(max_words).max(1),
            min_words: self.config.min_chunk_words,
            max_words,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    timeout: Duration,
    min_coverage: f64,
}

impl From<&PagingConfig> for RetryPolicy {
    fn from(config: &PagingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
            timeout: config.request_timeout(),
            min_coverage: config.min_coverage,
        }
    }
}

async fn split_with_retry(
    splitter: &dyn SmartSplitter,
    index: usize,
    request: &SplitRequest,
    policy: RetryPolicy,
) -> Option<Vec<Chunk>> {
    for attempt in 1..=policy.max_attempts {
        match tokio::time::timeout(policy.timeout, splitter.split(request)).await {
            Ok(Ok(chunks)) => match validate(chunks, &request.long_text, policy.min_coverage) {
                Ok(chunks) => {
                    log::debug!("Unit {} split into {} chunks", index, chunks.len());
                    return Some(chunks);
                }
                Err(reason) => log::warn!(
                    "Unit {}: unusable split ({}), attempt {}/{}",
                    index,
                    reason,
                    attempt,
                    policy.max_attempts
                ),
            },
            Ok(Err(e)) => log::warn!(
                "Unit {}: smart split failed: {}, attempt {}/{}",
                index,
                e,
                attempt,
                policy.max_attempts
            ),
            Err(_) => log::warn!(
                "Unit {}: smart split timed out after {:?}, attempt {}/{}",
                index,
                policy.timeout,
                attempt,
                policy.max_attempts
            ),
        }

        if attempt < policy.max_attempts && !policy.backoff.is_zero() {
            tokio::time::sleep(backoff_delay(policy.backoff, attempt)).await;
        }
    }
    None
}

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff after the `attempt`-th failure, capped at a minute.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Drops blank chunks and rejects answers that lost too much of the input.
fn validate(chunks: Vec<Chunk>, source: &str, min_coverage: f64) -> Result<Vec<Chunk>, String> {
    let chunks: Vec<Chunk> = chunks
        .into_iter()
        .filter(|chunk| !chunk.text.trim().is_empty())
        .collect();
    if chunks.is_empty() {
        return Err("no chunks returned".to_string());
    }

    let expected = visible_chars(source);
    let got: usize = chunks.iter().map(|chunk| visible_chars(&chunk.text)).sum();
    if expected > 0 && (got as f64) < expected as f64 * min_coverage {
        return Err(format!("covers {} of {} characters", got, expected));
    }
    Ok(chunks)
}

fn visible_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);

        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 40), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
        assert_eq!(backoff_delay(Duration::ZERO, 5), Duration::ZERO);
    }

    #[test]
    fn validate_drops_blank_chunks() {
        let chunks = vec![
            Chunk::untitled("Hello there."),
            Chunk::untitled("  \n"),
            Chunk::untitled("General Kenobi."),
        ];

        let kept = validate(chunks, "Hello there. General Kenobi.", 0.8).unwrap();

        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn validate_rejects_lossy_answers() {
        let source = "one two three four five six seven eight nine ten";
        assert!(validate(vec![Chunk::untitled("one two")], source, 0.8).is_err());
        assert!(validate(vec![Chunk::untitled("   ")], source, 0.0).is_err());
        assert!(validate(vec![Chunk::untitled("one two")], source, 0.0).is_ok());
    }
}
