use std::future::Future;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}";

pub fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message);
    pb
}

/// Runs `task` over every item with at most `workers` in flight and returns
/// the results in submission order, whatever order they complete in.
///
/// A slot is `None` only if its task died before reporting back.
pub async fn run_indexed<T, R, F, Fut>(
    items: Vec<T>,
    workers: usize,
    progress: &ProgressBar,
    task: F,
) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let workers = workers.clamp(1, Semaphore::MAX_PERMITS);
    let semaphore = Arc::new(Semaphore::new(workers));
    let task = Arc::new(task);

    // Workers send (index, result); the loop below owns the slots.
    let (tx, mut rx) = mpsc::channel::<(usize, R)>(workers.saturating_mul(2).min(total.max(1)));

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let task = Arc::clone(&task);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let result = task(index, item).await;
            let _ = tx.send((index, result)).await;
        });
    }

    // rx closes once every spawned task has dropped its sender
    drop(tx);

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some((index, result)) = rx.recv().await {
        slots[index] = Some(result);
        progress.inc(1);
    }
    progress.finish_and_clear();
    slots
}
