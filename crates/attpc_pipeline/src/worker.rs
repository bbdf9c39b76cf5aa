//! Event-level worker pool (§5: "event-level data parallelism over a
//! bounded worker pool; within an event, all computation is
//! single-threaded"). `rayon`'s global thread pool already gives a
//! bounded pool sized to available cores; this module adds the
//! cancellation flag §5 requires ("a worker observes a cancellation
//! flag between events; partial per-event work is discarded cleanly").

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, cheaply-cloned cancellation token. Checked between events,
/// never mid-event: an event's compute is atomic per §5.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Runs `work` once per item in `items`, in parallel across the bounded
/// pool, skipping items once `token` is cancelled. Returns only the
/// outputs produced before cancellation (order does not correspond to
/// `items`' order -- per §5, output is a relation keyed by event id,
/// not a sequence).
pub fn run_events<T, R, F>(items: &[T], token: &CancellationToken, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    items
        .par_iter()
        .filter_map(|item| {
            if token.is_cancelled() {
                None
            } else {
                Some(work(item))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn processes_all_items_when_not_cancelled() {
        let token = CancellationToken::new();
        let items: Vec<i64> = (0..50).collect();
        let results = run_events(&items, &token, |x| x * 2);
        assert_eq!(results.len(), 50);
        assert_eq!(results.iter().sum::<i64>(), items.iter().map(|x| x * 2).sum::<i64>());
    }

    #[test]
    fn cancelled_token_yields_fewer_results() {
        let token = CancellationToken::new();
        token.cancel();
        let items: Vec<i64> = (0..50).collect();
        let results = run_events(&items, &token, |x| *x);
        assert!(results.is_empty());
    }

    #[test]
    fn cancellation_is_observed_mid_run() {
        let token = CancellationToken::new();
        let counter = AtomicUsize::new(0);
        let items: Vec<i64> = (0..1000).collect();
        let cancel_after = 10;
        let results = run_events(&items, &token, |x| {
            let seen = counter.fetch_add(1, Ordering::Relaxed);
            if seen >= cancel_after {
                token.cancel();
            }
            *x
        });
        assert!(results.len() <= items.len());
    }
}
